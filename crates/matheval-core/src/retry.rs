//! Declarative retry policy and the generic retry combinator
//!
//! The solve phase retries generously: empty or garbled answers are a
//! frequent, recoverable model-side artifact. The policy object owns the
//! budget and backoff; the combinator owns the loop.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{EvalError, EvalResult};

/// Retry budget and backoff schedule for one phase
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after a transport failure, empty response or unusable answer
    pub base_delay: Duration,
    /// Longer delay after an explicit throttling signal
    pub rate_limit_delay: Duration,
    /// Add up to 500ms of random jitter to every delay
    pub jitter: bool,
}

impl RetryPolicy {
    /// The solve-phase policy: 20 attempts with short fixed backoff
    pub fn solve() -> Self {
        Self {
            max_attempts: 20,
            base_delay: Duration::from_secs(3),
            rate_limit_delay: Duration::from_secs(5),
            jitter: true,
        }
    }

    /// A zero-delay policy, used in tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            jitter: false,
        }
    }

    fn delay_for(&self, error: &EvalError) -> Duration {
        let base = if error.is_rate_limit() {
            self.rate_limit_delay
        } else {
            self.base_delay
        };
        if self.jitter {
            let jitter_ms = rand::thread_rng().gen_range(0..=500);
            base + Duration::from_millis(jitter_ms)
        } else {
            base
        }
    }
}

/// Run `operation` until it succeeds, a non-retryable error surfaces, or the
/// attempt budget is exhausted. The closure receives the 1-based attempt
/// number.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> EvalResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = EvalResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !error.is_retryable() {
                    return Err(error);
                }
                if attempt < max_attempts {
                    let delay = policy.delay_for(&error);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "retrying after failure"
                    );
                    sleep(delay).await;
                } else {
                    warn!(attempts = max_attempts, error = %error, "retry budget exhausted");
                }
                last_error = Some(error);
            }
        }
    }

    Err(last_error.unwrap_or(EvalError::EmptyResponse))
}
