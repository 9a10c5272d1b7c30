//! Bounded retries with exponential backoff for calls against the Ranger API.
//!
//! Only transport failures are retried. Once the final attempt fails, the last
//! [`TransportError`] is wrapped into a single [`ServiceError`], so callers only ever have to
//! deal with one error kind.
use std::time::Duration;

use snafu::Snafu;

use crate::client::TransportError;

#[derive(Debug, Snafu)]
#[snafu(display("max retries reached for {operation} after {attempts} attempts"))]
pub struct ServiceError {
    operation: String,
    attempts: u32,
    source: TransportError,
}

impl ServiceError {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// How often and how patiently a failing call is retried.
///
/// The defaults allow three attempts, sleeping 2s after the first and 4s after the second
/// failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Sleep after the first failed attempt.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after every further failed attempt.
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy which gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: u32) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// The sleep following the failed `attempt` (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.initial_delay
            .saturating_mul(self.backoff_factor.saturating_pow(exponent))
    }

    /// Runs `call` until it succeeds or the attempts are used up.
    ///
    /// `operation` only names the call in logs and in the resulting [`ServiceError`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts => {
                    let delay = self.delay_after_attempt(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        retry_in = ?delay,
                        error = &error as &dyn std::error::Error,
                        "request failed"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!(
                        operation,
                        attempts = attempt,
                        error = &error as &dyn std::error::Error,
                        "max retries reached for request"
                    );
                    return Err(ServiceError {
                        operation: operation.to_owned(),
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }
}
