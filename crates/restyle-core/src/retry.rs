//! Bounded retry with backoff
//!
//! A single mutation attempt is retried only while the classifier marks its
//! latest failure as transient. Delays follow the configured schedule, with
//! the last delay reused once the schedule runs out.

use crate::classifier::ErrorClassifier;
use crate::config::RetryConfig;
use crate::error::ErrorKind;
use std::future::Future;

/// Final failure of a retried operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure<E> {
    /// Error of the last attempt
    pub error: E,
    /// Classification of that error
    pub kind: ErrorKind,
    /// Attempts made, including the first one
    pub attempts: u32,
}

impl<E> RetryFailure<E> {
    /// Retries performed after the first attempt
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Retry policy consulting an [`ErrorClassifier`]
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
    classifier: ErrorClassifier,
}

impl RetryPolicy {
    /// Create policy
    #[inline]
    #[must_use]
    pub fn new(config: RetryConfig, classifier: ErrorClassifier) -> Self {
        Self { config, classifier }
    }

    /// Retry configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Classifier used for retry decisions
    #[inline]
    #[must_use]
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Run `operation`, retrying transient failures
    ///
    /// # Errors
    /// Returns the last error together with its classification and the number
    /// of attempts once a non-transient failure occurs or retries run out.
    pub async fn retry<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::debug!(attempts, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = self.classifier.classify(&error);
            let retries_done = attempts - 1;
            if !kind.is_retryable() || retries_done >= self.config.max_retries {
                return Err(RetryFailure {
                    error,
                    kind,
                    attempts,
                });
            }

            let delay = self.config.backoff_delay(retries_done);
            tracing::warn!(
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
