// Logging System for Parrot Pool
//
// This module provides the logging setup and the logging macros used by the
// pool. It's built on top of the `tracing` ecosystem, so applications that
// already install their own subscriber can skip `init` entirely; the pool
// only emits events.
//
// # Usage Examples
//
// ## Basic Initialization
//
// ```rust
// use parrot_pool::logging;
//
// // INFO level, console output
// logging::init_default();
//
// // Or with custom settings
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// ## Presets
//
// ```rust
// use parrot_pool::logging;
//
// logging::init_development(); // DEBUG, worker internals at TRACE
// logging::init_production();  // INFO, JSON, no file/line info
// logging::init_test();        // WARN, compact
// ```
//
// ## Pool Events
//
// Lifecycle changes (pool open/closing/closed, supervisor stop) are logged at
// INFO, worker start/exit at INFO inside a `worker` span, retries at DEBUG,
// routing misses at TRACE, and faulted workers at WARN/ERROR.

use std::io;
use std::sync::Once;

use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, registry::LookupSpan, EnvFilter, Layer};

#[doc(hidden)]
pub use tracing;

/// Configuration for the logging system
///
/// # Examples
///
/// ```rust
/// use parrot_pool::logging::LogConfig;
/// use tracing::Level;
///
/// let custom_config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     show_file_line: false,
///     show_thread_info: true,
///     show_time: true,
///     target_filters: Some("parrot_pool=debug,parrot_pool::pool::worker=trace".to_string()),
/// };
/// assert!(custom_config.json_format);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id (worker threads are named)
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

/// Initialize the logging system with the given configuration
///
/// Sets the global tracing subscriber. Safe to call multiple times; only the
/// first call (of any `init*` function) takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer(&config));

        set_global_subscriber(subscriber);
    });
}

/// Build the level filter: `RUST_LOG` first, then the configured level and
/// target directives on top.
fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.trim().parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }

    env_filter
}

fn console_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if config.json_format {
        return fmt::layer().json().flatten_event(true).boxed();
    }

    let layer = fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info);

    if config.show_time {
        layer.boxed()
    } else {
        layer.without_time().boxed()
    }
}

// Helper function to set the global subscriber
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open a log file in append mode, creating it if needed
///
/// # Errors
/// Returns an error if the file cannot be opened or created
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(Box::new(file))
}

/// Initialize logging with both console and file output
///
/// Console output follows `config`; the file always gets plain text with
/// file/line and thread information.
///
/// # Errors
/// Returns an error if the log file cannot be opened. Nothing is installed in
/// that case, so a later `init*` call can still succeed.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    // Fail early instead of silently falling back to stderr for every event
    file_writer(log_file)?;

    INIT.call_once(|| {
        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer(&config))
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// Initialize with [`LogConfig::default`]: INFO level, human-readable console output
pub fn init_default() {
    init(LogConfig::default());
}

/// Development preset
///
/// - DEBUG level for the pool, TRACE for worker internals
/// - Colored console output with file/line information
/// - Thread names and IDs
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("parrot_pool=debug,parrot_pool::pool::worker=trace".to_string()),
    });
}

/// Production preset
///
/// JSON output for log aggregators, no file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Test preset: warnings and errors only, no timestamps or thread info
///
/// ```rust
/// use parrot_pool::logging;
///
/// logging::init_test();
/// ```
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Span wrapping everything a pool does
///
/// ```rust
/// use parrot_pool::pool_span;
///
/// let span = pool_span!("demo-pool");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! pool_span {
    ($pool_id:expr) => {
        $crate::logging::tracing::info_span!("pool", pool_id = %$pool_id)
    };
    ($pool_id:expr, $($fields:tt)*) => {
        $crate::logging::tracing::info_span!("pool", pool_id = %$pool_id, $($fields)*)
    };
}

/// Span entered by a worker thread for its whole life
#[macro_export]
macro_rules! worker_span {
    ($pool_id:expr, $worker:expr) => {
        $crate::logging::tracing::info_span!("worker", pool_id = %$pool_id, worker = $worker)
    };
}

/// Log lifecycle events of the pool and its supervisor
///
/// ```rust
/// use parrot_pool::log_lifecycle;
///
/// log_lifecycle!("pool", "open");
/// log_lifecycle!("pool", "closed", respawned = 2);
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($component:expr, $event:expr) => {
        $crate::logging::tracing::info!(component = $component, event = $event);
    };
    ($component:expr, $event:expr, $($fields:tt)*) => {
        $crate::logging::tracing::info!(component = $component, event = $event, $($fields)*);
    };
}

/// Log worker thread events
#[macro_export]
macro_rules! log_worker {
    ($worker:expr, $event:expr) => {
        $crate::logging::tracing::info!(worker = $worker, event = $event);
    };
    ($worker:expr, $event:expr, $($fields:tt)*) => {
        $crate::logging::tracing::info!(worker = $worker, event = $event, $($fields)*);
    };
}

/// Log error events
///
/// ```rust
/// use parrot_pool::log_error;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "spawn failed");
/// log_error!(error, component = "supervisor");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        $crate::logging::tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        $crate::logging::tracing::error!(error = %$error, $($fields)*);
    };
}

/// Get the current tracing dispatcher
///
/// Useful for threads spawned outside the pool that should log through the
/// same subscriber.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

// Re-export the most commonly used tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
