//! # Worker Pool Module
//!
//! A fixed number of worker threads consume jobs from one shared queue and
//! dispatch each job to the handler registered for its worker ID.
//!
//! ## Key Concepts
//! - Routing: jobs carry a worker ID, handlers are registered per ID
//! - Retry: every job runs through the pool's [`RetryPolicy`]
//! - Supervision: a worker that dies is replaced, keeping the pool at its size
//!
//! ## Components
//! - [`Pool`]: the facade (configuration, submission, shutdown)
//! - [`HandlerRegistry`]: worker ID to handler mapping
//! - [`RetryPolicy`] and [`Backoff`]: attempt cap, delays, predicate, fault sink
//! - worker and supervisor threads (internal)
//!
//! ## Thread Safety
//! - Registry and policy behind one `RwLock`, written only by the setters
//! - Channels (flume) for everything that crosses threads: jobs, worker exits,
//!   shutdown
//! - Handlers and sinks never run while the lock is held

mod config;
mod error;
mod job;
#[allow(clippy::module_inception)]
mod pool;
mod registry;
mod retry;
mod state;
mod supervisor;
mod worker;

pub use config::{PoolConfig, DEFAULT_THREAD_NAME_PREFIX};
pub use error::{JobFault, PoolError};
pub use job::{Job, DEFAULT_WORKER_ID};
pub use pool::Pool;
pub use registry::{Handler, HandlerRegistry};
pub use retry::{log_fault, AttemptOutcome, Backoff, FaultSink, RetryPolicy, RetryPredicate};
pub use state::Lifecycle;
