//! Exponential-backoff retry for transient LLM errors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::types::LlmApiError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    /// Run the operation, retrying transient failures with doubling
    /// backoff. Permanent errors and exhausted budgets return the last
    /// error.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, LlmApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmApiError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient LLM error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000, 30_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let policy = RetryPolicy::new(3, 10, 100);

        let result = policy
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(LlmApiError::RateLimited("slow down".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_fast() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let policy = RetryPolicy::new(3, 10, 100);

        let result: Result<(), _> = policy
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LlmApiError::Invalid {
                        status: 401,
                        message: "bad key".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_returns_last_error() {
        let policy = RetryPolicy::new(2, 10, 100);
        let result: Result<(), _> = policy
            .execute(|| async { Err(LlmApiError::Network("reset".into())) })
            .await;
        assert!(matches!(result.unwrap_err(), LlmApiError::Network(_)));
    }
}
