//! Reconnection policy.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use socket_session::ReconnectPolicy;
//!
//! let policy = ReconnectPolicy::new()
//!     .with_max_attempts(5)
//!     .with_delays(Duration::from_millis(500), Duration::from_secs(8));
//!
//! assert!(policy.enabled);
//! assert_eq!(policy.max_attempts, 5);
//! ```

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Delay before the first reconnection attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for the reconnection delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Default attempt limit, effectively unbounded.
pub const DEFAULT_MAX_ATTEMPTS: u32 = u32::MAX;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// How the session retries after losing the channel.
///
/// The delay starts at `base_delay` and doubles after each attempt, capped
/// at `max_delay`. It returns to `base_delay` only after a successful open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retry automatically after an unrequested close.
    pub enabled: bool,

    /// Attempts allowed before giving up with `ReconnectFailed`.
    pub max_attempts: u32,

    /// Delay before the first attempt.
    pub base_delay: Duration,

    /// Ceiling for the doubled delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ReconnectPolicy {
    /// Creates the default policy: enabled, unbounded, 1s doubling to 10s.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Creates a policy that never retries.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ReconnectPolicy {
    /// Enables or disables automatic retries.
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the attempt limit.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base delay and its ceiling.
    #[inline]
    #[must_use]
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ReconnectPolicy {
    /// Checks that the delays make sense.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.base_delay.is_zero() {
            return Err("reconnect base delay must be greater than zero".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err(format!(
                "reconnect max delay ({:?}) is shorter than base delay ({:?})",
                self.max_delay, self.base_delay
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = ReconnectPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.max_attempts, u32::MAX);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_disabled_keeps_other_defaults() {
        let policy = ReconnectPolicy::disabled();
        assert!(!policy.enabled);
        assert_eq!(policy.base_delay, DEFAULT_BASE_DELAY);
    }

    #[test]
    fn test_builder_methods() {
        let policy = ReconnectPolicy::new()
            .with_enabled(false)
            .with_max_attempts(3)
            .with_delays(Duration::from_millis(100), Duration::from_millis(400));

        assert!(!policy.enabled);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(400));
    }

    #[test]
    fn test_validate() {
        assert!(ReconnectPolicy::new().validate().is_ok());

        let zero = ReconnectPolicy::new().with_delays(Duration::ZERO, Duration::from_secs(1));
        assert!(zero.validate().is_err());

        let inverted =
            ReconnectPolicy::new().with_delays(Duration::from_secs(5), Duration::from_secs(1));
        assert!(inverted.validate().unwrap_err().contains("shorter"));
    }
}
