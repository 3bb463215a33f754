//! Short local retries for transient store failures.
//!
//! The alert loop itself never retries a failed fetch within a cycle; the next
//! scheduled minute is the retry. What is still worth retrying is a SQLite read
//! that hits a writer's lock, or a pool that briefly cannot hand out a connection.

use crate::{CoreError, DatabaseError, ErrorExt};
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Exponential backoff bounds for one kind of transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based). The error's own
    /// `retry_after` hint only raises the first delay; later delays double.
    fn delay_before(&self, retry: usize, hint: Option<Duration>) -> Duration {
        let first = hint.map_or(self.initial_delay, |h| h.max(self.initial_delay));
        let factor = 1u32 << (retry.saturating_sub(1)).min(16);
        first.saturating_mul(factor).min(self.max_delay)
    }
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Retry policy for `error`, or `None` when retrying cannot help.
    pub fn policy_for(error: &CoreError) -> Option<RetryPolicy> {
        match error {
            // A writer holds the SQLite lock; it is usually released within milliseconds
            CoreError::Database(DatabaseError::DatabaseLocked) => Some(RetryPolicy {
                max_attempts: 5,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
            }),
            CoreError::Database(DatabaseError::ConnectionFailed { .. }) => Some(RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(2),
            }),
            _ => None,
        }
    }

    /// Runs `operation`, retrying it with backoff while it keeps failing with
    /// an error that has a retry policy. The policy comes from the first
    /// failure and bounds the total number of calls.
    pub async fn run<F, T, Fut>(mut operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>> + Send,
        T: Send,
    {
        let mut error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        let Some(policy) = Self::policy_for(&error) else {
            return Err(error);
        };
        let hint = error.retry_after();

        for attempt in 2..=policy.max_attempts {
            let delay = policy.delay_before(attempt - 1, hint);
            info!(
                "Attempt {}/{} failed. Retrying after {:?}: {}",
                attempt - 1,
                policy.max_attempts,
                delay,
                error.user_friendly_message()
            );
            tokio::time::sleep(delay).await;

            error = match operation().await {
                Ok(value) => return Ok(value),
                Err(next) if Self::policy_for(&next).is_some() => next,
                Err(next) => return Err(next),
            };
        }

        Err(error)
    }
}
