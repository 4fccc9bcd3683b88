use crate::config::RetryPolicy;
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Which loop a controller is serving. Registration abandons an account once
/// the rotation budget runs out; farming keeps cycling until cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    Registration,
    Farming,
}

/// Next step after a failed attempt, decided by [`RetryController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Sleep and retry against the same proxy.
    RetryAfter(Duration),
    /// Per-proxy attempts exhausted: move to the next proxy, counter reset.
    RotateProxy,
    /// Farming exhaustion: sleep the farming wait, then rotate if `rotate`
    /// is set, otherwise retry the current proxy. Counter reset either way.
    FarmingWait { wait: Duration, rotate: bool },
    /// Terminal failure for this account in this cycle.
    Abandon,
}

/// Explicit retry-with-rotation state machine.
///
/// One controller is scoped to a single operation invocation (one account's
/// registration run, or one farming session loop). It holds no I/O: callers
/// perform the sleeps and proxy swaps the returned [`RetryAction`] names.
#[derive(Debug)]
pub struct RetryController {
    policy: RetryPolicy,
    mode: RetryMode,
    attempt: u32,
    rotations: u32,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, mode: RetryMode) -> Self {
        Self {
            policy,
            mode,
            attempt: 0,
            rotations: 0,
        }
    }

    /// 1-based number of the attempt currently in flight.
    pub fn attempt(&self) -> u32 {
        self.attempt + 1
    }

    /// Completed full proxy cycles so far.
    pub fn rotations(&self) -> u32 {
        self.rotations
    }

    /// Reset after a successful operation.
    pub fn on_success(&mut self) {
        self.attempt = 0;
        self.rotations = 0;
    }

    /// Record a failed attempt and decide the next step.
    pub fn on_failure(&mut self) -> RetryAction {
        self.attempt += 1;
        if self.attempt < self.policy.max_attempts {
            return RetryAction::RetryAfter(Duration::from_secs(self.policy.delay_seconds));
        }

        // Per-proxy attempts exhausted.
        self.attempt = 0;
        match self.mode {
            RetryMode::Farming => RetryAction::FarmingWait {
                wait: Duration::from_secs(self.policy.farming_wait_seconds),
                rotate: self.policy.proxy_rotation,
            },
            RetryMode::Registration => {
                if !self.policy.proxy_rotation {
                    return RetryAction::Abandon;
                }
                self.rotations += 1;
                if self.rotations >= self.policy.max_rotations {
                    RetryAction::Abandon
                } else {
                    RetryAction::RotateProxy
                }
            }
        }
    }
}

/// Sleep that wakes early on cancellation. Returns false when cancelled.
pub async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Bounded retry with a fixed inter-attempt delay.
///
/// Used for single API calls where proxy rotation does not apply; each
/// failed attempt logs at WARN and exhaustion logs at ERROR.
pub async fn with_retry<T, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {:#}",
                    operation_name, attempt, max_attempts, e
                );
                if attempt == max_attempts {
                    error!("{} failed after {} attempts", operation_name, max_attempts);
                    return Err(e).context(format!(
                        "{} failed after {} attempts",
                        operation_name, max_attempts
                    ));
                }
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!()
}
