//! Counter store trait for abstracting in-process and remote stores.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for counter store implementations.
///
/// This trait abstracts over the `InMemoryCounterStore` and the
/// `RedisCounterStore` so the rate limiter can work with either.
///
/// Implementations must execute the increment and the expiry update as one
/// indivisible unit: no concurrent caller may observe the incremented value
/// without its refreshed expiry, and a failure must not apply one half
/// without the other.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter at `key`, (re-)set its time-to-live to `ttl`
    /// from now, and return the post-increment value.
    ///
    /// A missing or expired counter starts again from zero before the
    /// increment, so the first call for a key returns 1.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64>;
}

