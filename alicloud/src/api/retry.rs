//! Bounded exponential backoff around single RAM calls
//!
//! Each call is retried while it fails with a retryable error, until the
//! elapsed-time budget would be exceeded. Not-found and permanent failures
//! stop the loop immediately and are reported as distinct variants so callers
//! can decide whether "not found" is a warning, an error or a success.

use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::error::{ApiError, ErrorClass};

#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Total budget across all attempts of one call
    pub max_elapsed_time: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    fn next_interval(&self, current: Duration) -> Duration {
        let next = current.mul_f64(self.multiplier);
        std::cmp::min(next, self.max_interval)
    }
}

/// Tagged result of a retried call
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("{0}")]
    NotFound(ApiError),

    #[error("{0}")]
    Permanent(ApiError),

    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ApiError,
    },
}

impl RetryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RetryError::NotFound(_))
    }

    pub fn api_error(&self) -> &ApiError {
        match self {
            RetryError::NotFound(e) | RetryError::Permanent(e) => e,
            RetryError::Exhausted { source, .. } => source,
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.api_error().code()
    }
}

/// Run `call` until it succeeds, fails for good, or the budget runs out
pub async fn retry<T, F, Fut, C>(
    backoff: &Backoff,
    operation: &str,
    classify: C,
    mut call: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    C: Fn(&ApiError) -> ErrorClass,
{
    let started = Instant::now();
    let mut interval = backoff.initial_interval;
    let mut attempts = 0;

    loop {
        attempts += 1;

        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match classify(&err) {
            ErrorClass::NotFound => return Err(RetryError::NotFound(err)),
            ErrorClass::Permanent => return Err(RetryError::Permanent(err)),
            ErrorClass::Retryable => {
                if started.elapsed() + interval > backoff.max_elapsed_time {
                    tracing::warn!(
                        "{} still failing after {} attempts, giving up: {}",
                        operation,
                        attempts,
                        err
                    );
                    return Err(RetryError::Exhausted {
                        attempts,
                        source: err,
                    });
                }

                tracing::debug!(
                    "Retrying {} after {}ms (attempt {}): {}",
                    operation,
                    interval.as_millis(),
                    attempts,
                    err
                );
                tokio::time::sleep(interval).await;
                interval = backoff.next_interval(interval);
            }
        }
    }
}
