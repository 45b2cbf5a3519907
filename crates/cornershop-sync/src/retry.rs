//! Bounded retry with exponential backoff around single adapter calls.

use std::future::Future;
use std::time::Duration;

use cornershop_store::{Result as StoreResult, StoreError};

use crate::config::SyncConfig;

/// Upper bound on a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Retry policy derived from [`SyncConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retry_count: u32,
    /// Delay before the first retry.
    pub backoff: Duration,
    /// Timeout applied to every attempt.
    pub call_timeout: Duration,
}

impl RetryPolicy {
    /// Policy taken from the engine configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            retry_count: config.retry_count,
            backoff: config.retry_backoff,
            call_timeout: config.call_timeout,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `op` under the per-call timeout, retrying transient failures.
    ///
    /// A timed out attempt becomes [`StoreError::Unavailable`]. Non-transient
    /// errors are returned straight away.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut retry = 0;
        loop {
            let result = match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Unavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.call_timeout
                ))),
            };

            match result {
                Err(e) if e.is_transient() && retry < self.retry_count => {
                    let delay = self.delay_for_retry(retry);
                    tracing::warn!(
                        operation,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
