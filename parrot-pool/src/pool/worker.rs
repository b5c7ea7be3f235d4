//! # Worker Thread Implementation
//!
//! Each worker is a dedicated OS thread pulling jobs from the pool's shared
//! queue until the queue is closed and drained.
//!
//! ## Key Responsibilities
//! - Claiming jobs (and waking a sender blocked on the claim)
//! - Resolving the handler for the job's worker ID
//! - Running the retry loop and reporting exhausted jobs to the fault sink
//! - Reporting its own exit to the supervisor exactly once
//!
//! ## Failure Handling
//! Handler faults never leave the retry loop. The only fault that ends a
//! worker is a panic raised by the fault sink; it is caught at the thread
//! boundary, logged, and reported as [`ExitReason::Faulted`] so the supervisor
//! can start a replacement. Replacements are started while the pool closes
//! too, so the queue is always drained by someone.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, trace};
use uuid::Uuid;

use super::error::{panic_message, PoolError};
use super::job::Job;
use super::retry::AttemptOutcome;
use super::state::SharedState;

/// Why a worker thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExitReason {
    /// The job queue was closed and empty
    Drained,
    /// The fault sink panicked
    Faulted(String),
}

/// Exit report sent by every worker as its last action
#[derive(Debug, Clone)]
pub(crate) struct WorkerExit {
    pub(crate) worker: usize,
    pub(crate) reason: ExitReason,
}

/// Starts worker threads wired to one pool.
///
/// Shared by the pool constructor (initial workers) and the supervisor
/// (replacements). Worker numbers are never reused.
pub(crate) struct WorkerLauncher<T> {
    pool_id: Uuid,
    thread_name_prefix: String,
    shared: Arc<SharedState<T>>,
    jobs_rx: flume::Receiver<Job<T>>,
    exit_tx: flume::Sender<WorkerExit>,
    next_worker: AtomicUsize,
    live: AtomicUsize,
}

impl<T: Send + 'static> WorkerLauncher<T> {
    pub(crate) fn new(
        pool_id: Uuid,
        thread_name_prefix: String,
        shared: Arc<SharedState<T>>,
        jobs_rx: flume::Receiver<Job<T>>,
        exit_tx: flume::Sender<WorkerExit>,
    ) -> Self {
        Self {
            pool_id,
            thread_name_prefix,
            shared,
            jobs_rx,
            exit_tx,
            next_worker: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
        }
    }

    /// Spawn one worker thread.
    ///
    /// The worker logs through the subscriber that is current on the calling
    /// thread, so scoped subscribers follow jobs into the pool.
    ///
    /// # Returns
    /// The new worker's number
    pub(crate) fn launch(&self) -> Result<usize, PoolError> {
        let number = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.thread_name_prefix, number);
        let worker = Worker {
            number,
            pool_id: self.pool_id,
            shared: Arc::clone(&self.shared),
            jobs_rx: self.jobs_rx.clone(),
            exit_tx: self.exit_tx.clone(),
        };
        let dispatch = crate::logging::current_subscriber();

        // Counted before the thread exists so its exit can never be seen first
        self.live.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || tracing::dispatcher::with_default(&dispatch, || worker.run()));

        if let Err(source) = spawned {
            self.live.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::Spawn { name, source });
        }
        Ok(number)
    }

    /// Record that a worker is gone for good.
    ///
    /// # Returns
    /// Workers still alive
    pub(crate) fn retire(&self) -> usize {
        self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }

    /// Workers started and not yet retired
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn shared(&self) -> &SharedState<T> {
        &self.shared
    }
}

impl<T> fmt::Debug for WorkerLauncher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLauncher")
            .field("pool_id", &self.pool_id)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("next_worker", &self.next_worker.load(Ordering::Relaxed))
            .field("live", &self.live.load(Ordering::SeqCst))
            .finish()
    }
}

struct Worker<T> {
    number: usize,
    pool_id: Uuid,
    shared: Arc<SharedState<T>>,
    jobs_rx: flume::Receiver<Job<T>>,
    exit_tx: flume::Sender<WorkerExit>,
}

impl<T: Send + 'static> Worker<T> {
    /// Thread entry point
    fn run(self) {
        let span = crate::worker_span!(self.pool_id, self.number);
        let _guard = span.enter();
        crate::log_worker!(self.number, "started");

        let reason = match panic::catch_unwind(AssertUnwindSafe(|| self.process_jobs())) {
            Ok(()) => ExitReason::Drained,
            Err(payload) => {
                let message = panic_message(payload);
                error!(worker = self.number, error = %message, "Fault sink panicked, worker exiting");
                ExitReason::Faulted(message)
            }
        };

        crate::log_worker!(self.number, "exited", reason = ?reason);
        // A send error means the whole pool is gone and nobody is counting exits
        let _ = self.exit_tx.send(WorkerExit {
            worker: self.number,
            reason,
        });
    }

    /// Process jobs until the queue is closed and empty
    fn process_jobs(&self) {
        while let Ok(mut job) = self.jobs_rx.recv() {
            job.claim();

            let Some((handler, policy)) = self.shared.route(job.worker_id()) else {
                trace!(worker_id = job.worker_id(), "No handler registered, dropping job");
                continue;
            };

            match policy.run(job.data(), |data: &T| handler(data)) {
                AttemptOutcome::Succeeded { attempts } => {
                    trace!(worker_id = job.worker_id(), attempts, "Job done");
                }
                AttemptOutcome::Exhausted { attempts, fault } => {
                    debug!(worker_id = job.worker_id(), attempts, error = %fault, "Job exhausted its attempts");
                    // Runs outside the attempt isolation: a panic here ends this worker
                    if let Some(sink) = policy.fault_sink() {
                        sink(job.data(), &fault);
                    }
                }
            }
        }
    }
}
