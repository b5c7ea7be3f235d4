use std::time::Duration;

use super::retry::Backoff;

pub const DEFAULT_THREAD_NAME_PREFIX: &str = "parrot-pool-worker";

/// Configuration for a [`Pool`](super::Pool)
///
/// Everything except `size` and `thread_name_prefix` can be changed later
/// through the pool setters; these fields only seed the initial retry policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads kept alive
    pub size: usize,

    /// Worker threads are named `{prefix}-{n}`
    pub thread_name_prefix: String,

    /// Attempts per job, 0 for unlimited
    pub max_attempts: u32,

    /// Delay schedule between attempts
    pub backoff: Backoff,

    /// Upper bound applied to every backoff delay
    pub max_delay: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: num_cpus::get(),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            max_attempts: 1,
            backoff: Backoff::default(),
            max_delay: None,
        }
    }
}

impl PoolConfig {
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Name of the supervisor thread for this configuration
    pub(crate) fn supervisor_thread_name(&self) -> String {
        format!("{}-supervisor", self.thread_name_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = PoolConfig::default()
            .with_size(3)
            .with_thread_name_prefix("thumbnailer")
            .with_max_attempts(0)
            .with_backoff(Backoff::Linear { base: Duration::from_millis(5) })
            .with_max_delay(Duration::from_millis(40));

        assert_eq!(config.size, 3);
        assert_eq!(config.thread_name_prefix, "thumbnailer");
        assert_eq!(config.max_attempts, 0);
        assert_eq!(config.backoff, Backoff::Linear { base: Duration::from_millis(5) });
        assert_eq!(config.max_delay, Some(Duration::from_millis(40)));
        assert_eq!(config.supervisor_thread_name(), "thumbnailer-supervisor");
    }
}
