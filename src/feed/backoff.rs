//! Retry counters and exponential backoff

use std::time::Duration;

/// Backoff delay for retry `attempt`: `min(base * 2^attempt, max)`
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

/// Attempt counter with a ceiling and the backoff it implies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    ceiling: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryState {
    pub fn new(ceiling: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: 0,
            ceiling,
            base_delay,
            max_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Count one failure and return the new attempt count
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// The ceiling has been reached
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.ceiling
    }

    /// More failures than the ceiling allows
    pub fn is_exceeded(&self) -> bool {
        self.attempts > self.ceiling
    }

    /// Delay before the next retry
    pub fn delay(&self) -> Duration {
        backoff_delay(self.base_delay, self.max_delay, self.attempts)
    }
}
