//! Retry policy: decides what happens to a delivery whose handler failed.

use std::time::Duration;

/// Default redelivery delay after a handler failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// What to do with a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put it back on the queue after the given delay.
    Requeue(Duration),
    /// Stop retrying and move it to the dead-letter queue.
    DeadLetter,
}

/// Fixed-delay retry policy with an optional attempt ceiling.
///
/// `max_attempts: None` retries forever. The ceiling counts deliveries, so
/// `Some(3)` means the handler runs at most three times for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retries forever with `delay` between attempts.
    pub fn unlimited(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Retries with `delay` until `max_attempts` deliveries have failed.
    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Decides the fate of a delivery whose `attempt`-th handling failed.
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        match self.max_attempts {
            Some(max) if attempt >= max => RetryDecision::DeadLetter,
            _ => RetryDecision::Requeue(self.delay),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unlimited(DEFAULT_RETRY_DELAY)
    }
}
