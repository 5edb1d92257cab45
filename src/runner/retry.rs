use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Final result of a retried operation and how many times it ran
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    /// Retrying stopped early because `cancel` fired
    pub cancelled: bool,
}

/// Delay before retry number `attempt` (1-based): base * 2^(attempt-1) + random(0..base)
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
    let jitter = if base_ms == 0 {
        0
    } else {
        rand::random::<u64>() % base_ms
    };
    Duration::from_millis(exp.saturating_add(jitter))
}

/// Run an async operation up to `max_attempts` times with jittered exponential
/// backoff. The operation receives the 1-based attempt number. Once `cancel`
/// fires no further attempt starts and a pending backoff sleep is cut short.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(result) => {
                return RetryOutcome {
                    result: Ok(result),
                    attempts,
                    cancelled: false,
                }
            }
            Err(e) if cancel.is_cancelled() => {
                debug!("Attempt {} failed after cancellation: {}", attempts, e);
                return RetryOutcome {
                    result: Err(e),
                    attempts,
                    cancelled: true,
                };
            }
            Err(e) if attempts >= max_attempts => {
                warn!("All {} attempts failed: {}", attempts, e);
                return RetryOutcome {
                    result: Err(e),
                    attempts,
                    cancelled: false,
                };
            }
            Err(e) => {
                let delay = backoff_delay(config.backoff_base_ms, attempts);
                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, e, delay
                );
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return RetryOutcome {
                            result: Err(e),
                            attempts,
                            cancelled: true,
                        };
                    }
                }
            }
        }
    }
}
