//! Retry policy with exponential backoff.
//!
//! The delay before retry `n` (1-based) is `base_delay * multiplier^(n-1)`.
//! There is no jitter and no cap: upstream models carry their own bounded
//! policy.

use gateway_core::ReliabilityPolicy;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        ReliabilityPolicy::default().into()
    }
}

impl From<ReliabilityPolicy> for RetryConfig {
    fn from(policy: ReliabilityPolicy) -> Self {
        Self {
            max_retries: policy.max_retries,
            base_delay: policy.retry_delay,
            multiplier: policy.backoff_multiplier,
        }
    }
}

/// Retry policy implementation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

/// Final outcome of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Value or error handed back to the caller
    pub result: Result<T, E>,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl<T, E> RetryOutcome<T, E> {
    /// Retries performed after the first attempt.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy for one upstream model.
    #[must_use]
    pub fn from_reliability(policy: &ReliabilityPolicy) -> Self {
        Self::new((*policy).into())
    }

    /// Delay before retry `retry` (1-based). Zero for the first attempt.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.powi(exponent);
        let millis = self.config.base_delay.as_secs_f64() * 1000.0 * factor;
        if millis.is_finite() && millis > 0.0 {
            Duration::from_millis(millis.round() as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Run `operation` until `should_retry` rejects its outcome or retries
    /// run out.
    ///
    /// On exhaustion the most recent `Ok` value is preferred over a trailing
    /// error, so a real response from an earlier attempt is not masked by a
    /// later transport failure.
    pub async fn execute<F, Fut, T, E, R>(&self, mut operation: F, should_retry: R) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&Result<T, E>) -> bool,
        E: std::fmt::Display,
    {
        let mut last_ok: Option<T> = None;
        let mut attempt = 0;

        loop {
            let result = operation(attempt).await;
            attempt += 1;

            if !should_retry(&result) {
                if attempt > 1 {
                    debug!(attempts = attempt, "operation settled after retry");
                }
                return RetryOutcome { result, attempts: attempt };
            }

            let retries_done = attempt - 1;
            if retries_done >= self.config.max_retries {
                let result = match (result, last_ok) {
                    (Err(_), Some(previous)) => Ok(previous),
                    (result, _) => result,
                };
                return RetryOutcome { result, attempts: attempt };
            }

            let delay = self.delay_for_retry(attempt);
            match &result {
                Err(error) => warn!(
                    attempt,
                    max_retries = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after error"
                ),
                Ok(_) => warn!(
                    attempt,
                    max_retries = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after retryable result"
                ),
            }

            if let Ok(value) = result {
                last_ok = Some(value);
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
