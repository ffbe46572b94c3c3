//! Retry utilities with exponential backoff and jitter.
//!
//! Used around Kubernetes API calls that can fail transiently. Backoff doubles
//! per attempt up to a cap, and every delay is jittered so that many workers
//! failing together do not retry in lockstep.
//!
//! # Example
//!
//! ```ignore
//! use fleet_common::retry::{retry_with_backoff_when, RetryConfig};
//!
//! let verdict = retry_with_backoff_when(
//!     &RetryConfig::with_max_attempts(5),
//!     "reconcile",
//!     |e: &Error| e.is_retryable(),
//!     || reconcile(key.clone(), ctx.clone()),
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Create a config that retries forever (infinite attempts)
    pub fn infinite() -> Self {
        Self::default()
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Errors accepted by `should_retry` are retried until success or until
/// `max_attempts` is exhausted, in which case the last error is returned. Any
/// other error is returned immediately.
pub async fn retry_with_backoff_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => {
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed with non-retryable error"
                );
                return Err(e);
            }
            Err(e) => {
                if config.exhausted(attempt) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
