use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, trace};
use uuid::Uuid;

use super::config::PoolConfig;
use super::error::{JobFault, PoolError};
use super::job::{Job, DEFAULT_WORKER_ID};
use super::retry::{Backoff, RetryPolicy};
use super::state::{Lifecycle, SharedState};
use super::supervisor::{Supervisor, SupervisorReport};
use super::worker::WorkerLauncher;

/// Fixed-size pool of supervised worker threads
///
/// Jobs are routed by worker ID to registered handlers. Each job runs through
/// the pool's retry policy; jobs that exhaust it are handed to the fault sink.
/// A worker that dies (only a panicking fault sink can do that) is replaced by
/// the supervisor, so `size` workers stay alive while the pool is open.
///
/// # Thread Safety
/// - All methods take `&self`; share the pool with `Arc<Pool<T>>`
/// - Handlers, the registry and the retry policy sit behind one `RwLock`
/// - Workers read a fresh handler and policy snapshot for every job
///
/// # Lifecycle
/// `Open -> Closing -> Closed`. `close` drains every queued job before it
/// returns; dropping an open pool starts the same close on a background thread.
///
/// # Examples
///
/// ```rust,no_run
/// use parrot_pool::Pool;
///
/// let pool: Pool<u64> = Pool::with_size(4).unwrap();
/// pool.register_default(|n: &u64| {
///     println!("processing {}", n);
///     Ok(())
/// })
/// .set_max_attempts(3);
///
/// pool.send_job(7);
/// pool.close();
/// ```
pub struct Pool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    id: Uuid,
    size: usize,
    thread_name_prefix: String,
    shared: Arc<SharedState<T>>,
    shutdown_tx: flume::Sender<()>,
    supervisor: Mutex<Option<JoinHandle<SupervisorReport>>>,
}

impl<T: Send + 'static> Pool<T> {
    /// Create a pool with one worker per available CPU.
    ///
    /// Exhausted jobs go to [`log_fault`](super::log_fault), which reports
    /// through `tracing`: nothing is printed unless a subscriber is installed
    /// (see [`crate::logging`]).
    pub fn new() -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with `size` workers and default settings otherwise.
    pub fn with_size(size: usize) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::default().with_size(size))
    }

    /// Create a pool from a full configuration.
    ///
    /// Starts the supervisor and `config.size` workers before returning.
    ///
    /// # Errors
    /// - `PoolError::InvalidSize` when `config.size` is 0
    /// - `PoolError::Spawn` when a thread cannot be started; anything already
    ///   started is shut down again
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        if config.size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let id = Uuid::new_v4();
        let (jobs_tx, jobs_rx) = flume::unbounded();
        let (exit_tx, exit_rx) = flume::unbounded();
        let (shutdown_tx, shutdown_rx) = flume::bounded(1);

        let policy = RetryPolicy::new()
            .with_max_attempts(config.max_attempts)
            .with_backoff(config.backoff)
            .with_max_delay(config.max_delay);
        let shared = Arc::new(SharedState::new(policy, jobs_tx));
        let launcher = Arc::new(WorkerLauncher::new(
            id,
            config.thread_name_prefix.clone(),
            Arc::clone(&shared),
            jobs_rx,
            exit_tx,
        ));

        let supervisor = Supervisor::new(Arc::clone(&launcher), shutdown_rx, exit_rx)
            .spawn(config.supervisor_thread_name())?;

        let inner = Arc::new(PoolInner {
            id,
            size: config.size,
            thread_name_prefix: config.thread_name_prefix,
            shared,
            shutdown_tx,
            supervisor: Mutex::new(Some(supervisor)),
        });

        for started in 0..inner.size {
            if let Err(err) = launcher.launch() {
                crate::log_error!(err, pool_id = %id, started);
                inner.shutdown();
                return Err(err);
            }
        }

        crate::log_lifecycle!("pool", "open", pool_id = %id, size = inner.size);
        Ok(Self { inner })
    }

    // --- Handler registration ---

    /// Install `handler` for jobs sent to `worker_id`, replacing any previous one.
    pub fn register<F>(&self, worker_id: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let worker_id = worker_id.into();
        let replaced = self
            .inner
            .shared
            .write()
            .registry
            .insert(worker_id.clone(), Arc::new(handler))
            .is_some();
        debug!(pool_id = %self.inner.id, worker_id = %worker_id, replaced, "Handler registered");
        self
    }

    /// Install the handler used by `send_job` and `send_job_sync`.
    pub fn register_default<F>(&self, handler: F) -> &Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(DEFAULT_WORKER_ID, handler)
    }

    /// Whether a handler is registered for `worker_id`
    pub fn has_handler(&self, worker_id: &str) -> bool {
        self.inner.shared.read().registry.contains(worker_id)
    }

    // --- Retry configuration ---

    /// Attempts per job; 0 retries until success or until the predicate says stop.
    pub fn set_max_attempts(&self, max_attempts: u32) -> &Self {
        self.inner.shared.write().policy.set_max_attempts(max_attempts);
        self
    }

    /// Wait `delay` between attempts. Shorthand for `Backoff::Constant`.
    pub fn set_retry_delay(&self, delay: Duration) -> &Self {
        self.set_backoff(Backoff::Constant(delay))
    }

    pub fn set_backoff(&self, backoff: Backoff) -> &Self {
        self.inner.shared.write().policy.set_backoff(backoff);
        self
    }

    /// Cap every backoff delay, or remove the cap with `None`.
    pub fn set_max_retry_delay(&self, max_delay: Option<Duration>) -> &Self {
        self.inner.shared.write().policy.set_max_delay(max_delay);
        self
    }

    /// Consulted after each fault while attempts remain, with the payload, the
    /// fault and the 0-based attempt index. Returning `false` stops retrying.
    pub fn set_retry_predicate<F>(&self, predicate: F) -> &Self
    where
        F: Fn(&T, &JobFault, u32) -> bool + Send + Sync + 'static,
    {
        self.inner.shared.write().policy.set_retry_predicate(Some(Arc::new(predicate)));
        self
    }

    pub fn clear_retry_predicate(&self) -> &Self {
        self.inner.shared.write().policy.set_retry_predicate(None);
        self
    }

    /// Receive the payload and final fault of every job that exhausts its attempts.
    ///
    /// A panic inside the sink ends the worker that called it; the
    /// supervisor starts a replacement.
    pub fn set_fault_sink<F>(&self, sink: F) -> &Self
    where
        F: Fn(&T, &JobFault) + Send + Sync + 'static,
    {
        self.inner.shared.write().policy.set_fault_sink(Some(Arc::new(sink)));
        self
    }

    /// Discard the faults of exhausted jobs silently.
    pub fn clear_fault_sink(&self) -> &Self {
        self.inner.shared.write().policy.set_fault_sink(None);
        self
    }

    /// Snapshot of the current retry policy
    pub fn retry_policy(&self) -> RetryPolicy<T> {
        self.inner.shared.read().policy.clone()
    }

    // --- Submission ---

    /// Queue a job for the default handler and return immediately.
    ///
    /// Dropped silently once the pool is closing.
    pub fn send_job(&self, data: T) {
        self.send_job_for_worker_id(DEFAULT_WORKER_ID, data);
    }

    /// Queue a job for `worker_id` and return immediately.
    ///
    /// Dropped silently once the pool is closing. Jobs for an ID without a
    /// handler are dropped by the worker that claims them.
    pub fn send_job_for_worker_id(&self, worker_id: impl Into<String>, data: T) {
        self.inner.admit(Job::new(worker_id, data));
    }

    /// Queue a job for the default handler and block until a worker claims it.
    pub fn send_job_sync(&self, data: T) {
        self.send_job_sync_for_worker_id(DEFAULT_WORKER_ID, data);
    }

    /// Queue a job for `worker_id` and block until a worker claims it.
    ///
    /// Returns once the job is taken off the queue, not once it is processed.
    /// Returns immediately if the pool is closing.
    pub fn send_job_sync_for_worker_id(&self, worker_id: impl Into<String>, data: T) {
        let (job, claim_rx) = Job::with_claim(worker_id, data);
        if self.inner.admit(job) {
            // Err only if the job was dropped unclaimed, nothing left to wait for
            let _ = claim_rx.recv();
        }
    }

    /// Async form of [`send_job_sync`](Self::send_job_sync).
    pub async fn send_job_sync_async(&self, data: T) {
        self.send_job_sync_for_worker_id_async(DEFAULT_WORKER_ID, data).await;
    }

    /// Async form of [`send_job_sync_for_worker_id`](Self::send_job_sync_for_worker_id).
    pub async fn send_job_sync_for_worker_id_async(&self, worker_id: impl Into<String>, data: T) {
        let (job, claim_rx) = Job::with_claim(worker_id, data);
        if self.inner.admit(job) {
            let _ = claim_rx.recv_async().await;
        }
    }

    // --- Shutdown ---

    /// Stop accepting jobs, let the workers drain the queue, and wait for all
    /// of them to exit.
    ///
    /// Only the first call does anything; later or concurrent calls return
    /// immediately. Blocks for as long as a running handler takes, and a
    /// handler that never returns blocks this forever.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// Run [`close`](Self::close) on a background thread and return immediately.
    pub fn close_async(&self) {
        self.inner.close_detached();
    }

    // --- Introspection ---

    /// Configured number of workers
    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.shared.lifecycle()
    }

    /// Whether `close` has finished
    pub fn is_closed(&self) -> bool {
        self.lifecycle() == Lifecycle::Closed
    }

    /// Replacement workers started by the supervisor so far
    pub fn respawn_count(&self) -> usize {
        self.inner.shared.respawns()
    }

    /// Unique ID of this pool, attached to its log events
    pub fn id(&self) -> Uuid {
        self.inner.id
    }
}

impl<T: Send + 'static> PoolInner<T> {
    /// Put a job on the queue if the pool is open.
    ///
    /// The queue is unbounded, so the send never blocks while the read lock is held.
    fn admit(&self, job: Job<T>) -> bool {
        let state = self.shared.read();
        if state.lifecycle != Lifecycle::Open {
            trace!(pool_id = %self.id, worker_id = job.worker_id(), "Pool is closing, dropping job");
            return false;
        }

        match &state.jobs_tx {
            Some(jobs_tx) => jobs_tx.send(job).is_ok(),
            None => false,
        }
    }

    /// Close the pool and wait until the queue is drained.
    fn shutdown(&self) {
        let span = crate::pool_span!(self.id);
        let _guard = span.enter();

        // Flip the lifecycle under the exclusive lock; drain outside it so
        // workers can still resolve handlers for the jobs left in the queue
        let jobs_tx = {
            let mut state = self.shared.write();
            if state.lifecycle != Lifecycle::Open {
                return;
            }
            state.lifecycle = Lifecycle::Closing;
            state.jobs_tx.take()
        };
        crate::log_lifecycle!("pool", "closing", pool_id = %self.id);

        // Workers exit once the queue is disconnected and empty; the
        // supervisor keeps replacing faulted ones until the last has drained
        drop(jobs_tx);
        let report = self.stop_supervisor();

        self.shared.write().lifecycle = Lifecycle::Closed;
        crate::log_lifecycle!("pool", "closed", pool_id = %self.id, respawned = report.respawned, lost = report.lost);
    }

    fn stop_supervisor(&self) -> SupervisorReport {
        // Fails only if the supervisor thread is already gone
        let _ = self.shutdown_tx.send(());

        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle.map(JoinHandle::join) {
            Some(Ok(report)) => report,
            Some(Err(payload)) => {
                error!(pool_id = %self.id, error = %super::error::panic_message(payload), "Supervisor thread panicked");
                SupervisorReport::default()
            }
            None => SupervisorReport::default(),
        }
    }

    fn close_detached(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let name = format!("{}-closer", self.thread_name_prefix);
        if let Err(err) = thread::Builder::new().name(name).spawn(move || inner.shutdown()) {
            crate::log_error!(err, pool_id = %self.id, "Could not start background close");
        }
    }
}

impl<T: Send + 'static> Drop for Pool<T> {
    fn drop(&mut self) {
        if self.inner.shared.lifecycle() == Lifecycle::Open {
            self.inner.close_detached();
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.shared.read();
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("size", &self.inner.size)
            .field("lifecycle", &state.lifecycle)
            .field("registry", &state.registry)
            .field("policy", &state.policy)
            .finish()
    }
}
