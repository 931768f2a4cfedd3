//! Fixed-delay retry for connection attempts.
//!
//! Connections are retried with a constant delay between attempts, never
//! exponentially. A budget of zero attempts means "retry forever".

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::ConnectionError;

/// Retry parameters for connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between failed attempts.
    pub delay: Duration,
    /// Maximum number of attempts; 0 = unbounded.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Unbounded retries with the given delay.
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: 0,
        }
    }

    /// Returns true once `attempts` failures have used up the budget.
    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever(Duration::from_secs(5))
    }
}

/// Runs `operation` until it succeeds, the budget runs out, or `cancel` fires.
///
/// Every failure is logged with the attempt number. Cancellation is only
/// observed between attempts (during the backoff sleep), never mid-attempt.
///
/// # Arguments
/// * `label` - Endpoint name for logging
/// * `policy` - Delay and attempt budget
/// * `cancel` - Shutdown token
/// * `operation` - Closure that performs one connection attempt
pub(crate) async fn with_fixed_backoff<T, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectionError>>,
{
    let mut attempts: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ConnectionError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(ConnectionError::Cancelled) => return Err(ConnectionError::Cancelled),
            Err(e) => {
                attempts = attempts.saturating_add(1);
                if policy.exhausted(attempts) {
                    log::error!(
                        "[Supervisor] {} giving up after {} attempt(s): {}",
                        label,
                        attempts,
                        e
                    );
                    return Err(ConnectionError::RetriesExhausted { attempts });
                }
                log::warn!(
                    "[Supervisor] {} reconnect in {}s (attempt {}): {}",
                    label,
                    policy.delay.as_secs_f32(),
                    attempts,
                    e
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}
