//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::policy::RatePolicy;
use super::store::CounterStore;
use crate::error::{GatekeeperError, Result};

/// Default deadline for a single counter store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);
/// Default namespace prepended to every client key in the store.
pub const DEFAULT_KEY_PREFIX: &str = "ratelimit:";

/// The rate decision engine.
///
/// Holds only the immutable policy and a handle to the shared counter
/// store; every decision re-queries the store. Several limiters built on
/// the same store enforce one combined limit.
pub struct RateLimiter<S> {
    store: Arc<S>,
    policy: RatePolicy,
    store_timeout: Duration,
    key_prefix: String,
}

impl<S: CounterStore> RateLimiter<S> {
    /// Create a new rate limiter over `store` enforcing `policy`.
    pub fn new(store: Arc<S>, policy: RatePolicy) -> Self {
        Self {
            store,
            policy,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Bound every store round trip by `timeout`.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Namespace store keys with `prefix`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The key under which `key`'s counter is stored.
    pub fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Decide whether a request from `key` may proceed.
    ///
    /// Increments the key's window counter, re-arms its expiry to a full
    /// window from now, and admits iff the new count is within the limit.
    /// Any store failure or timeout denies the request.
    pub async fn allow(&self, key: &str) -> bool {
        match self.hit(key).await {
            Ok(count) => {
                let admitted = self.policy.admits(count);
                trace!(
                    key = %key,
                    count = count,
                    limit = self.policy.limit(),
                    admitted = admitted,
                    "Rate limit decision"
                );
                if !admitted {
                    debug!(key = %key, count = count, "Client over limit");
                }
                admitted
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Counter store failed, denying request");
                false
            }
        }
    }

    /// Record one hit for `key` and return the post-increment count.
    async fn hit(&self, key: &str) -> Result<u64> {
        let store_key = self.store_key(key);
        let window = self.policy.window();

        tokio::time::timeout(
            self.store_timeout,
            self.store.incr_with_expiry(&store_key, window),
        )
        .await
        .map_err(|_| GatekeeperError::StoreTimeout(self.store_timeout))?
    }
}
