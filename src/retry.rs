//! Bounded retry with exponential backoff around one remote call.

use crate::error::ApiError;
use crate::limiter::RateLimiter;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

/// The call failed for good.
#[derive(Debug, Clone)]
pub struct Exhausted {
    pub attempts: u32,
    pub last: ApiError,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Run `op` under `limiter`:
    /// - every attempt first acquires a slot from the limiter;
    /// - `RateLimited` suspends the limiter and retries without spending an attempt;
    /// - retryable errors back off exponentially up to `max_retries`;
    /// - anything else fails immediately.
    pub fn run<T>(
        &self,
        limiter: &RateLimiter,
        what: &str,
        mut op: impl FnMut() -> Result<T, ApiError>,
    ) -> Result<T, Exhausted> {
        let mut attempts = 0u32;
        let mut delay = self.initial_delay;
        loop {
            limiter.acquire();
            match op() {
                Ok(v) => {
                    if attempts > 0 {
                        tracing::info!(what, attempts = attempts + 1, "succeeded after retry");
                    }
                    return Ok(v);
                }
                Err(ApiError::RateLimited { retry_after }) => {
                    limiter.suspend(retry_after);
                }
                Err(e) if e.is_retryable() && attempts < self.max_retries => {
                    attempts += 1;
                    tracing::warn!(
                        what,
                        error = %e,
                        attempt = attempts,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying"
                    );
                    limiter.clock().sleep(delay);
                    delay = Duration::from_secs_f64(delay.as_secs_f64() * self.multiplier).min(self.max_delay);
                }
                Err(e) => {
                    return Err(Exhausted { attempts: attempts + 1, last: e });
                }
            }
        }
    }
}
