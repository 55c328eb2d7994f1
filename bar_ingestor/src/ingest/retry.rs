//! Exponential backoff around provider fetches.

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::providers::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`, capped at `max_delay`; `attempt` counts from 0.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Done { value: T, attempts: u32 },
    Failed { error: ProviderError, attempts: u32 },
    /// Cancelled while waiting between attempts.
    Cancelled { attempts: u32 },
}

/// Runs `op` until it succeeds, fails permanently or runs out of retries.
///
/// Only [`ProviderError::is_transient`] errors are retried. A call already in
/// flight is never interrupted; cancellation is honoured during backoff.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                return RetryOutcome::Done {
                    value,
                    attempts: attempt + 1,
                };
            }
            Err(error) if error.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    what,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "transient fetch failure, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return RetryOutcome::Cancelled { attempts: attempt + 1 };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(error) => {
                return RetryOutcome::Failed {
                    error,
                    attempts: attempt + 1,
                };
            }
        }
    }
}
