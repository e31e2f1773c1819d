use std::sync::Arc;
use std::time::Duration;

use crate::domain::{BackendError, PipelineError};

use super::capabilities::{PipelineObserver, Sleeper};

/// Hard ceiling on attempts so a misconfigured policy cannot retry for hours.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Smallest base delay; a zero base would retry in a tight loop with equal delays.
pub const MIN_BASE_DELAY: Duration = Duration::from_millis(1);

/// Retry budget for a single outbound language-model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled before every further retry.
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            base_delay: base_delay.max(MIN_BASE_DELAY),
        }
    }

    /// Delay slept before retry number `retry` (1-based).
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Wraps backend calls with bounded, exponentially spaced retries.
///
/// Retry state lives on the stack of [`BackoffController::call`], so one controller can be
/// shared by any number of concurrent pipelines.
pub struct BackoffController {
    policy: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn PipelineObserver>,
}

impl BackoffController {
    pub fn new(
        policy: BackoffPolicy,
        sleeper: Arc<dyn Sleeper>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            policy,
            sleeper,
            observer,
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the attempt budget
    /// is spent. Both failure paths surface as [`PipelineError::BackendUnavailable`].
    pub fn call<T, F>(&self, operation: &str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Result<T, BackendError>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => {
                    return Err(PipelineError::backend_unavailable(format!(
                        "{operation}: {err}"
                    )));
                }
                Err(err) if attempt >= self.policy.max_attempts => {
                    return Err(PipelineError::backend_unavailable(format!(
                        "{operation}: giving up after {attempt} attempts: {err}"
                    )));
                }
                Err(err) => {
                    let delay = self.policy.delay_before_retry(attempt);
                    self.observer.backend_retry(operation, attempt, delay, &err);
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
