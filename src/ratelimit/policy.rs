//! Rate policy: the immutable `(limit, window)` pair every decision uses.

use std::time::Duration;

use crate::error::{GatekeeperError, Result};

/// Longest window a policy accepts (one year).
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Maximum number of requests admitted per window and the window length.
///
/// A policy is validated once at construction and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    limit: u64,
    window: Duration,
}

impl RatePolicy {
    /// Create a new policy.
    ///
    /// Fails with [`GatekeeperError::Config`] when `limit` is zero or
    /// `window` is empty or longer than [`MAX_WINDOW`].
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(GatekeeperError::Config(
                "rate limit must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(GatekeeperError::Config(
                "rate limit window must be greater than zero".to_string(),
            ));
        }
        if window > MAX_WINDOW {
            return Err(GatekeeperError::Config(format!(
                "rate limit window {:?} exceeds maximum of {:?}",
                window, MAX_WINDOW
            )));
        }
        Ok(Self { limit, window })
    }

    /// Maximum requests admitted within one window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of the window, re-armed on every increment.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a post-increment count falls within the limit.
    pub fn admits(&self, count: u64) -> bool {
        count <= self.limit
    }
}
