use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::job::Job;
use super::registry::{Handler, HandlerRegistry};
use super::retry::RetryPolicy;

/// Pool lifecycle. Moves forward only, each transition happens once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting jobs
    Open,
    /// Rejecting jobs, workers draining the queue
    Closing,
    /// Every worker has exited
    Closed,
}

/// Everything guarded by the pool lock.
pub(crate) struct PoolState<T> {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) registry: HandlerRegistry<T>,
    pub(crate) policy: RetryPolicy<T>,
    /// Producer side of the job queue; taken out when the pool starts closing
    pub(crate) jobs_tx: Option<flume::Sender<Job<T>>>,
}

/// State shared between the pool handle, its workers and the supervisor.
///
/// Handlers and sinks never run while the lock is held, so a poisoned lock
/// can only come from a panic in our own bookkeeping; the guards recover the
/// inner value instead of propagating the poison.
pub(crate) struct SharedState<T> {
    state: RwLock<PoolState<T>>,
    respawns: AtomicUsize,
}

impl<T> SharedState<T> {
    pub(crate) fn new(policy: RetryPolicy<T>, jobs_tx: flume::Sender<Job<T>>) -> Self {
        Self {
            state: RwLock::new(PoolState {
                lifecycle: Lifecycle::Open,
                registry: HandlerRegistry::new(),
                policy,
                jobs_tx: Some(jobs_tx),
            }),
            respawns: AtomicUsize::new(0),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, PoolState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, PoolState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the handler for `worker_id` and snapshot the retry policy in one
    /// read-lock acquisition.
    pub(crate) fn route(&self, worker_id: &str) -> Option<(Handler<T>, RetryPolicy<T>)> {
        let state = self.read();
        let handler = state.registry.get(worker_id)?;
        Some((handler, state.policy.clone()))
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.read().lifecycle
    }

    pub(crate) fn record_respawn(&self) {
        self.respawns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn respawns(&self) -> usize {
        self.respawns.load(Ordering::Relaxed)
    }
}
