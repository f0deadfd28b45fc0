//! Retry policy with exponential backoff.
//!
//! Only transient failures are retried. Delays grow geometrically from
//! `base_delay`, carry symmetric jitter and never exceed `max_delay`.

use gateway_core::ProviderError;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that know whether another attempt may succeed
pub trait Retryable: Display {
    /// Whether the failure is worth retrying
    fn is_transient(&self) -> bool;
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        ProviderError::is_transient(self)
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Jitter factor (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Retry policy implementation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration
    #[must_use]
    pub fn new(mut config: RetryConfig) -> Self {
        config.jitter = config.jitter.clamp(0.0, 1.0);
        Self { config }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// A policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_retries: 0,
            ..Default::default()
        })
    }

    /// Calculate delay before retry number `retry` (0-indexed)
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let max = self.config.max_delay.as_millis() as f64;
        let base = self.config.base_delay.as_millis() as f64;
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay = (base * self.config.multiplier.powi(exponent)).min(max);

        let jitter_range = delay * self.config.jitter;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_delay = (delay + jitter).clamp(0.0, max);

        Duration::from_millis(final_delay as u64)
    }

    /// Run `operation` until it succeeds, fails permanently or the budget
    /// runs out. The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Retry succeeded");
                    }
                    return RetryResult::Success { value, attempts: attempt };
                }
                Err(error) if !error.is_transient() => {
                    return RetryResult::NonRetryable { error, attempts: attempt };
                }
                Err(error) if attempt > self.config.max_retries => {
                    return RetryResult::Failed { error, attempts: attempt };
                }
                Err(error) => {
                    let delay = self.delay_for_attempt(attempt - 1);
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded
    Success {
        /// Returned value
        value: T,
        /// Attempts made, including the successful one
        attempts: u32,
    },
    /// Every attempt failed transiently
    Failed {
        /// The final error
        error: E,
        /// Number of attempts made
        attempts: u32,
    },
    /// Operation failed with a permanent error
    NonRetryable {
        /// The error
        error: E,
        /// Number of attempts made
        attempts: u32,
    },
}

impl<T, E> RetryResult<T, E> {
    /// Attempts made
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::NonRetryable { attempts, .. } => *attempts,
        }
    }

    /// Convert to a Result, dropping the attempt count
    ///
    /// # Errors
    /// Returns the error if the operation failed
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Failed { error, .. } | Self::NonRetryable { error, .. } => Err(error),
        }
    }

    /// Check if the operation succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
