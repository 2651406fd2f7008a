//! Bounded retries with exponential backoff.
//!
//! The policy drives an attempt closure, so it knows nothing about HTTP and
//! can be exercised without a network.
use crate::config::RetryConfig;
use crate::errors::{AttemptFailure, DeliveryError};
use crate::metrics_defs::{OUTBOUND_FAILURES, OUTBOUND_RETRIES_EXHAUSTED};
use shared::counter;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt `attempt` (0-based):
    /// `min(base_delay * multiplier^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay.max(0.0))
        }
    }

    /// Calls `attempt_fn` with the 1-based attempt number until it succeeds or
    /// attempts run out. Returns the value together with the attempts used.
    ///
    /// Both the attempt and the backoff sleep stop as soon as `cancel` fires.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<(T, u32), DeliveryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                result = attempt_fn(attempt) => result,
            };

            let failure = match result {
                Ok(value) => return Ok((value, attempt)),
                Err(failure) => failure,
            };
            counter!(OUTBOUND_FAILURES, "reason" => failure.reason()).increment(1);

            if attempt >= max_attempts {
                counter!(OUTBOUND_RETRIES_EXHAUSTED).increment(1);
                tracing::error!(attempt, error = %failure, "Delivery failed, no attempts left");
                return Err(DeliveryError::DeliveryFailed {
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.delay_for_attempt(attempt - 1);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Delivery attempt failed, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
