//! Bounded exponential backoff for record-store writes.
//!
//! Only [`LeadQualError::is_transient`] errors are retried (persistence
//! failures). Identity conflicts and everything else surface immediately.

use std::future::Future;
use std::time::Duration;

use leadqual_shared::{PipelineConfig, Result};
use tracing::warn;

/// Retry behaviour for persistence calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Backoff is capped here.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl From<&PipelineConfig> for RetryConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

impl RetryConfig {
    /// Run `op`, retrying transient failures with doubling delay.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.base_delay;
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        what,
                        attempt,
                        max_attempts,
                        ?delay,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.max_delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use leadqual_shared::LeadQualError;

    use super::*;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn retries_persistence_until_success() {
        let calls = AtomicU32::new(0);
        let out = fast(3)
            .run("write", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LeadQualError::Persistence("database is locked".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .expect("third attempt succeeds");
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = fast(3)
            .run("write", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LeadQualError::Persistence("down".into()))
            })
            .await
            .expect_err("always fails");
        assert!(matches!(err, LeadQualError::Persistence(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast(5)
            .run("create", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LeadQualError::IdentityConflict {
                    table: "Leads".into(),
                    identity: "email:a@b.io".into(),
                })
            })
            .await
            .expect_err("conflict");
        assert!(matches!(err, LeadQualError::IdentityConflict { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
