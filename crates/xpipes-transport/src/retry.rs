use std::time::Duration;

/// Default number of open attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between open attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Delay schedule between open attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Sleep the same amount after every failed attempt.
    Fixed(Duration),
    /// Double the delay after every failed attempt, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

/// Bounded retry policy for opening a pipe endpoint.
///
/// The peer may not have created or opened its end yet, so open failures
/// of the rendezvous kind are retried up to `max_attempts` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fixed delay between a bounded number of attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Exponential backoff starting at `initial` and capped at `max`.
    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { initial, max },
        }
    }

    /// Retry without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Try exactly once.
    pub fn no_retry() -> Self {
        Self::immediate(1)
    }

    /// Number of attempts actually made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}
