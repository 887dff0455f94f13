//! Retry policy
//!
//! One reusable policy for oracle and bridge calls. Each error classifies
//! itself through `Retryable`:
//! - `Backoff`: exponential delay (rate limits)
//! - `Fixed`: constant delay (timeouts, malformed responses, transient outages)
//! - `Fatal`: returned immediately
//!
//! **Backoff Strategy:**
//! - Initial delay: `base_delay`
//! - Multiplier: 2.0, capped at `max_delay`
//! - Optional jitter: up to +25% of the computed delay

use crate::error::{BridgeError, OracleError};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

/// How an error should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Backoff,
    Fixed,
    Fatal,
}

/// Errors that know whether they are worth retrying
pub trait Retryable {
    fn retry_class(&self) -> RetryClass;
}

impl Retryable for OracleError {
    fn retry_class(&self) -> RetryClass {
        match self {
            OracleError::RateLimited => RetryClass::Backoff,
            OracleError::Timeout | OracleError::Network(_) | OracleError::Malformed(_) => {
                RetryClass::Fixed
            }
            OracleError::Api(status, _) if *status >= 500 => RetryClass::Fixed,
            OracleError::Api(_, _) | OracleError::Unauthorized => RetryClass::Fatal,
        }
    }
}

impl Retryable for BridgeError {
    fn retry_class(&self) -> RetryClass {
        match self {
            BridgeError::Unavailable(_) | BridgeError::Io(_) => RetryClass::Fixed,
            BridgeError::Rejected(_) | BridgeError::InvalidRange { .. } => RetryClass::Fatal,
        }
    }
}

/// Bounded retry with per-class delay
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy allowing `max_retries` retries after the first attempt
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            base_delay,
            max_delay: base_delay.saturating_mul(32).max(base_delay),
            jitter: true,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before retry number `retry` (1-based) for the given class
    pub fn delay_for(&self, class: RetryClass, retry: u32) -> Duration {
        let base = match class {
            RetryClass::Fatal => return Duration::ZERO,
            RetryClass::Fixed => self.base_delay,
            RetryClass::Backoff => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        };

        if self.jitter && !base.is_zero() {
            let max_extra = (base.as_millis() as u64) / 4;
            let extra = rand::thread_rng().gen_range(0..=max_extra);
            base + Duration::from_millis(extra)
        } else {
            base
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out
    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start_time = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if attempt > 1 {
                tracing::debug!(operation = operation_name, attempt, "Retrying operation");
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis(),
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    let class = err.retry_class();

                    if class == RetryClass::Fatal {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            error = %err,
                            "Non-retryable error"
                        );
                        return Err(err);
                    }

                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis(),
                            error = %err,
                            "Operation failed: retries exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.delay_for(class, attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        retry_class = ?class,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Operation failed, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}
