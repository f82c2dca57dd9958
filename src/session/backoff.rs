//! Exponential reconnection delay.
//!
//! The delay starts at the policy's base, doubles after every attempt up to
//! the ceiling, and only returns to the base after a successful open.

use std::time::Duration;

use crate::client::ReconnectPolicy;

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    ceiling: Duration,
    max_attempts: u32,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: &ReconnectPolicy) -> Self {
        Self {
            base: policy.base_delay,
            ceiling: policy.max_delay,
            max_attempts: policy.max_attempts,
            current: policy.base_delay,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&self) -> Option<Duration> {
        (self.attempts < self.max_attempts).then_some(self.current)
    }

    /// Records that an attempt is starting and doubles the delay.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.current = self.current.saturating_mul(2).min(self.ceiling);
    }

    /// Resets after a successful open. Returns the attempts made before it.
    pub fn reset(&mut self) -> u32 {
        let attempts = self.attempts;
        self.attempts = 0;
        self.current = self.base;
        attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
