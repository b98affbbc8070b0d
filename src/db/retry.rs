//! Bounded retry with exponential backoff.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::DbError;

/// Decides whether a failed attempt is retried.
#[derive(Clone, Default)]
pub enum RetryClassifier {
    /// Retry only errors that [`DbError::is_retryable`] accepts.
    #[default]
    Transient,
    /// Retry every error.
    Always,
    /// Never retry.
    Never,
    Custom(Arc<dyn Fn(&DbError) -> bool + Send + Sync>),
}

impl RetryClassifier {
    pub fn custom(predicate: impl Fn(&DbError) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    pub fn should_retry(&self, error: &DbError) -> bool {
        match self {
            Self::Transient => error.is_retryable(),
            Self::Always => true,
            Self::Never => false,
            Self::Custom(predicate) => predicate(error),
        }
    }
}

impl fmt::Debug for RetryClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "Transient"),
            Self::Always => write!(f, "Always"),
            Self::Never => write!(f, "Never"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// The last error of a run that did not succeed, with the number of attempts made.
#[derive(Debug)]
pub struct RetryFailure {
    pub error: DbError,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles before each further retry.
    pub base_delay: Duration,
    pub classifier: RetryClassifier,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            classifier: RetryClassifier::default(),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO).with_classifier(RetryClassifier::Never)
    }

    pub fn with_classifier(mut self, classifier: RetryClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `retry` (1-based): `base_delay * 2^(retry - 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds, the classifier rejects the error,
    /// or the attempts are used up.
    ///
    /// `operation` receives the 1-based attempt number. On success the value
    /// is returned together with the number of attempts it took.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<(T, u32), RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(error) => {
                    if attempt >= max_attempts || !self.classifier.should_retry(&error) {
                        return Err(RetryFailure {
                            error,
                            attempts: attempt,
                        });
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_QUERY_RETRIES,
            Duration::from_millis(crate::config::DEFAULT_RETRY_BASE_DELAY_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn transient() -> DbError {
        DbError::connection("connection reset by peer", "retry")
    }

    #[test]
    fn test_delays_strictly_increase() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.delay_for(64), Duration::MAX);
        assert_eq!(policy.max_attempts(), u32::MAX);
    }

    #[test]
    fn test_classifiers() {
        let syntax = DbError::database("syntax error", Some("42601".into()), "");
        assert!(RetryClassifier::Transient.should_retry(&transient()));
        assert!(!RetryClassifier::Transient.should_retry(&syntax));
        assert!(RetryClassifier::Always.should_retry(&syntax));
        assert!(!RetryClassifier::Never.should_retry(&transient()));

        let only_syntax = RetryClassifier::custom(|e| e.code() == Some("42601"));
        assert!(only_syntax.should_retry(&syntax));
        assert!(!only_syntax.should_retry(&transient()));
        assert_eq!(format!("{:?}", only_syntax), "Custom(..)");
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let (value, attempts) = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 10ms + 20ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let failure = policy
            .run(|_| async { Err::<(), _>(transient()) })
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert!(matches!(failure.error, DbError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let failure = policy
            .run(|_| async {
                Err::<(), _>(DbError::database("syntax error", Some("42601".into()), ""))
            })
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
    }

    #[tokio::test]
    async fn test_always_retries_permanent_errors() {
        let policy =
            RetryPolicy::new(2, Duration::from_millis(1)).with_classifier(RetryClassifier::Always);
        let failure = policy
            .run(|_| async { Err::<(), _>(DbError::invalid_input("bad")) })
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 3);
    }
}
