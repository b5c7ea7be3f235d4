//! # Retry Policy
//!
//! Decides how often a failing handler is re-run and what happens to the
//! fault that survives every attempt.
//!
//! ## Attempt Loop
//! 1. Invoke the handler inside `catch_unwind`, so a panic and an `Err` both
//!    become a [`JobFault`]
//! 2. Success ends the loop
//! 3. A fault ends the loop when the attempt cap is reached, or when the retry
//!    predicate answers `false` (or panics)
//! 4. Otherwise sleep for the backoff delay and try again
//!
//! The fault sink is not called from here. The worker calls it after the
//! loop, outside the panic isolation, so a panicking sink ends the worker.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::error::{panic_message, JobFault};

/// Called after a fault while attempts remain: `(data, fault, attempt_index)`.
/// Returning `false` stops retrying.
pub type RetryPredicate<T> = Arc<dyn Fn(&T, &JobFault, u32) -> bool + Send + Sync>;

/// Receives the payload and the final fault of a job that ran out of attempts.
pub type FaultSink<T> = Arc<dyn Fn(&T, &JobFault) + Send + Sync>;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Constant(Duration),
    /// Delay grows linearly: base * (attempt + 1).
    Linear {
        /// Base delay duration.
        base: Duration,
    },
    /// Delay doubles: base * 2^attempt.
    Exponential {
        /// Base delay duration.
        base: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Constant(Duration::ZERO)
    }
}

impl Backoff {
    /// Uncapped delay after the failed attempt with the given 0-based index.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Constant(delay) => *delay,
            Backoff::Linear { base } => base.saturating_mul(attempt.saturating_add(1)),
            Backoff::Exponential { base } => base.saturating_mul(2u32.saturating_pow(attempt)),
        }
    }
}

/// How a job's attempt loop ended.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// An attempt succeeded.
    Succeeded { attempts: u32 },
    /// Every permitted attempt failed; `fault` is the last one.
    Exhausted { attempts: u32, fault: JobFault },
}

impl AttemptOutcome {
    /// Number of handler invocations made for the job
    pub fn attempts(&self) -> u32 {
        match self {
            AttemptOutcome::Succeeded { attempts } | AttemptOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Retry configuration consulted by every job.
///
/// Workers take a clone of the policy when they start a job, so changes made
/// through the pool setters apply from the next job on, never in the middle
/// of a retry sequence. Cloning only bumps reference counts.
pub struct RetryPolicy<T> {
    max_attempts: u32,
    backoff: Backoff,
    max_delay: Option<Duration>,
    should_retry: Option<RetryPredicate<T>>,
    fault_sink: Option<FaultSink<T>>,
}

impl<T: 'static> RetryPolicy<T> {
    /// One attempt, no delay, no predicate, faults logged through `tracing`.
    pub fn new() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::default(),
            max_delay: None,
            should_retry: None,
            fault_sink: Some(log_fault()),
        }
    }
}

impl<T> RetryPolicy<T> {
    /// Set the attempt cap; 0 retries until success or until the predicate says stop.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cap every computed delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_retry_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T, &JobFault, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    pub fn with_fault_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&T, &JobFault) + Send + Sync + 'static,
    {
        self.fault_sink = Some(Arc::new(sink));
        self
    }

    /// Discard the faults of exhausted jobs silently.
    pub fn without_fault_sink(mut self) -> Self {
        self.fault_sink = None;
        self
    }

    pub(crate) fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts;
    }

    pub(crate) fn set_backoff(&mut self, backoff: Backoff) {
        self.backoff = backoff;
    }

    pub(crate) fn set_max_delay(&mut self, max_delay: Option<Duration>) {
        self.max_delay = max_delay;
    }

    pub(crate) fn set_retry_predicate(&mut self, predicate: Option<RetryPredicate<T>>) {
        self.should_retry = predicate;
    }

    pub(crate) fn set_fault_sink(&mut self, sink: Option<FaultSink<T>>) {
        self.fault_sink = sink;
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    pub fn has_retry_predicate(&self) -> bool {
        self.should_retry.is_some()
    }

    pub fn fault_sink(&self) -> Option<&FaultSink<T>> {
        self.fault_sink.as_ref()
    }

    /// Delay to wait after the failed attempt `attempt` (0-based), capped by `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.backoff.delay(attempt);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Run the attempt loop for one payload.
    ///
    /// Blocks the calling thread while sleeping between attempts. The fault
    /// sink is not invoked; the caller decides what to do with an
    /// [`AttemptOutcome::Exhausted`].
    pub fn run<F>(&self, data: &T, handler: F) -> AttemptOutcome
    where
        F: Fn(&T) -> anyhow::Result<()>,
    {
        let mut attempt: u32 = 0;
        loop {
            let fault = match invoke(&handler, data) {
                Ok(()) => {
                    return AttemptOutcome::Succeeded {
                        attempts: attempt.saturating_add(1),
                    }
                }
                Err(fault) => fault,
            };

            let attempts = attempt.saturating_add(1);
            if self.max_attempts != 0 && attempts >= self.max_attempts {
                return AttemptOutcome::Exhausted { attempts, fault };
            }
            if let Some(should_retry) = &self.should_retry {
                if !consult(should_retry, data, &fault, attempt) {
                    return AttemptOutcome::Exhausted { attempts, fault };
                }
            }

            let delay = self.delay_for_attempt(attempt);
            debug!(attempt, delay = ?delay, error = %fault, "Retrying job");
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            attempt = attempts;
        }
    }
}

impl<T: 'static> Default for RetryPolicy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RetryPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            max_delay: self.max_delay,
            should_retry: self.should_retry.clone(),
            fault_sink: self.fault_sink.clone(),
        }
    }
}

impl<T> fmt::Debug for RetryPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("max_delay", &self.max_delay)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<function>"))
            .field("fault_sink", &self.fault_sink.as_ref().map(|_| "<function>"))
            .finish()
    }
}

/// Default fault sink: reports the final fault as an `error` event.
///
/// The event goes through `tracing`, so it is only visible once a subscriber
/// is installed (for example with [`crate::logging::init_default`]). Without
/// one, exhausted jobs are discarded silently; install your own sink with
/// `Pool::set_fault_sink` if faults must reach a stream regardless.
pub fn log_fault<T: 'static>() -> FaultSink<T> {
    Arc::new(|_data: &T, fault: &JobFault| {
        error!(error = %fault, panicked = fault.is_panic(), "Job failed after all attempts");
    })
}

/// Ask the retry predicate whether to go on. A panicking predicate stops
/// retrying; the job keeps the handler's fault.
fn consult<T>(should_retry: &RetryPredicate<T>, data: &T, fault: &JobFault, attempt: u32) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| should_retry(data, fault, attempt))) {
        Ok(retry) => retry,
        Err(payload) => {
            warn!(attempt, error = %panic_message(payload), "Retry predicate panicked, giving up on job");
            false
        }
    }
}

/// Run one attempt, turning both `Err` and panics into a `JobFault`.
fn invoke<T, F>(handler: &F, data: &T) -> Result<(), JobFault>
where
    F: Fn(&T) -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| handler(data))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(JobFault::Failed(err)),
        Err(payload) => Err(JobFault::from_panic(payload)),
    }
}
