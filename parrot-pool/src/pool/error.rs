use std::any::Any;
use std::io;

use thiserror::Error;

/// Errors raised while building a pool.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool size must be at least 1")]
    InvalidSize,
    #[error("Failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Fault produced by a single handler attempt.
///
/// Handlers report failure either by returning `Err` or by panicking; both end
/// up here so the retry loop can treat them as plain data.
#[derive(Error, Debug)]
pub enum JobFault {
    #[error("Handler failed: {0}")]
    Failed(#[from] anyhow::Error),
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl JobFault {
    /// Build a fault from a payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        JobFault::Panicked(panic_message(payload))
    }

    /// Whether the handler panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self, JobFault::Panicked(_))
    }
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}
