//! Retry and polling policies.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::PollTimeout;
use crate::sleep::Sleeper;

/// Deadline applied to every individual attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Total budget for eventual-consistency polling.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed pause between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `unit * 2^attempt`.
    Exponential { unit: Duration },

    /// The same pause every time.
    Fixed(Duration),
}

impl Backoff {
    /// Delay to wait after the 0-indexed `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Exponential { unit } => unit.saturating_mul(1u32 << attempt.min(31)),
            Backoff::Fixed(delay) => delay,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            unit: Duration::from_secs(1),
        }
    }
}

/// How a single logical request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,

    /// Deadline for each attempt, independent of the overall budget.
    pub attempt_timeout: Duration,

    /// Pause between attempts. Never applied before the first attempt.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// One attempt, no retry.
    pub fn single() -> Self {
        Self::with_attempts(1)
    }

    /// Up to `max_attempts` attempts with the default exponential backoff.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            backoff: Backoff::default(),
        }
    }

    /// Override the per-attempt deadline.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Effective attempt count.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single()
    }
}

/// Wait for an operation to succeed within a wall-clock budget.
///
/// Distinct from [`RetryPolicy`]: this re-runs a whole operation while a
/// freshly written record becomes visible, rather than retrying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_POLL_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollPolicy {
    /// Run `attempt` until it returns `Ok` or the budget is spent.
    ///
    /// The operation always runs at least once.
    pub async fn poll<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        operation: &str,
        mut attempt: F,
    ) -> Result<T, PollTimeout>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match attempt().await {
                Ok(value) => {
                    debug!(operation, polls, "Poll succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(operation, polls, error = %e, "Poll attempt failed");
                }
            }

            if Instant::now() + self.interval > deadline {
                return Err(PollTimeout {
                    operation: operation.to_string(),
                    elapsed: started.elapsed(),
                });
            }
            sleeper.sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::sleep::{RecordingSleeper, TokioSleeper};

    #[test]
    fn test_exponential_backoff_doubles() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(5), Duration::from_secs(32));
    }

    #[test]
    fn test_backoff_saturates() {
        let backoff = Backoff::default();
        assert!(backoff.delay(200) >= backoff.delay(31));
    }

    #[test]
    fn test_default_policy_is_single_shot() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.attempt_timeout, DEFAULT_ATTEMPT_TIMEOUT);

        let zero = RetryPolicy::with_attempts(0);
        assert_eq!(zero.attempts(), 1);
    }

    #[tokio::test]
    async fn test_poll_returns_first_success() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let value = PollPolicy::default()
            .poll(&sleeper, "list clouds", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(
            sleeper.recorded(),
            vec![DEFAULT_POLL_INTERVAL, DEFAULT_POLL_INTERVAL]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = PollPolicy::default()
            .poll(&TokioSleeper, "list clouds", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("unavailable")
            })
            .await
            .unwrap_err();

        assert_eq!(err.operation, "list clouds");
        // 30s budget with a 3s interval: the first poll plus one per interval.
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }
}
