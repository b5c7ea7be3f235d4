// Parrot Pool
//
// A fixed-size, supervised worker pool: jobs are routed by worker ID to
// registered handlers, failed attempts are retried according to a
// configurable policy, and dead workers are replaced automatically.

pub mod logging;
pub mod pool;

// Re-export commonly used types
pub use pool::*;
