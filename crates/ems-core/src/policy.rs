//! Connect policy for sessions.
//!
//! The policy is a plain value passed into every session, so it can be
//! versioned, stored in a config file and tested without a transport.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ems_core::ConnectPolicy;
//!
//! let policy = ConnectPolicy::default()
//!     .max_attempts(5)
//!     .attempt_timeout(Duration::from_secs(20));
//! assert!(policy.validate().is_ok());
//! ```

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result, TransportError};

/// Default number of connect attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default bound on a single connect attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default pause between connect attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Default bound on service discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a characteristic read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry and timeout limits for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectPolicy {
    /// Total connect attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Bound on each connect attempt. A timeout counts as a failed attempt.
    pub attempt_timeout: Duration,
    /// Pause before the second attempt.
    pub backoff: Duration,
    /// Growth of the pause per further attempt (1.0 = constant).
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each pause.
    pub jitter: bool,
    /// Bound on service discovery.
    pub discovery_timeout: Duration,
    /// Bound on each characteristic read.
    pub read_timeout: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            backoff: DEFAULT_BACKOFF,
            backoff_multiplier: 1.0,
            jitter: false,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ConnectPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, no retries.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Longer limits for noisy RF environments or devices slow to wake up.
    pub fn patient() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(25),
            backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: true,
            discovery_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(15),
        }
    }

    /// Short limits for a device that is known to be close by.
    pub fn fast() -> Self {
        Self {
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(8),
            backoff: Duration::from_millis(50),
            backoff_multiplier: 1.0,
            jitter: false,
            discovery_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }

    // ==================== Builder Methods ====================

    /// Set total connect attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the pause between attempts.
    #[must_use]
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Validate the policy and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_config("max_attempts must be >= 1"));
        }
        if self.attempt_timeout.is_zero() {
            return Err(Error::invalid_config("attempt_timeout must be > 0"));
        }
        if self.discovery_timeout.is_zero() {
            return Err(Error::invalid_config("discovery_timeout must be > 0"));
        }
        if self.read_timeout.is_zero() {
            return Err(Error::invalid_config("read_timeout must be > 0"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config("backoff_multiplier must be >= 1.0"));
        }
        Ok(())
    }

    /// Pause before the attempt following failed attempt number `attempt`
    /// (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay = if self.jitter {
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            base * jitter_factor
        } else {
            base
        };

        Duration::try_from_secs_f64(delay).unwrap_or(Duration::MAX)
    }

    /// Whether a failed attempt with `status` should be followed by another.
    pub fn should_retry(&self, attempt: u32, status: &TransportError) -> bool {
        attempt < self.max_attempts && status.is_retryable()
    }
}
