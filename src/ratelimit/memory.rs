//! In-process counter store.
//!
//! Keeps window counters in a single locked map. Holding the lock across
//! the expiry check, the increment and the TTL refresh gives the same
//! all-or-nothing behavior a transactional remote store provides.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::store::CounterStore;
use crate::error::{GatekeeperError, Result};

/// A single window counter.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    expires_at: Instant,
}

impl WindowCounter {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counter store living inside the current process.
///
/// Expired counters are treated as absent on access and physically removed
/// by [`InMemoryCounterStore::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, WindowCounter>>,
}

impl InMemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the live count for a key.
    ///
    /// Returns `None` if the key has no counter or its counter has expired.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let counters = self.counters.lock();
        counters
            .get(key)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.count)
    }

    /// Get the remaining time-to-live for a key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let counters = self.counters.lock();
        counters
            .get(key)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.expires_at - now)
    }

    /// Remove every expired counter and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let before = counters.len();
        counters.retain(|_, c| !c.is_expired(now));
        before - counters.len()
    }

    /// Number of counters held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            GatekeeperError::StoreUnavailable(format!("ttl {:?} overflows the clock", ttl))
        })?;
        let mut counters = self.counters.lock();

        let counter = counters.entry(key.to_string()).or_insert(WindowCounter {
            count: 0,
            expires_at: now,
        });
        if counter.is_expired(now) {
            counter.count = 0;
        }
        counter.count += 1;
        counter.expires_at = expires_at;

        trace!(key = %key, count = counter.count, "Incremented in-memory counter");
        Ok(counter.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_first_increment_returns_one() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.incr_with_expiry("k", WINDOW).await.unwrap(), 1);
        assert_eq!(store.count("k"), Some(1));
        assert_eq!(store.ttl("k"), Some(WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_increments_accumulate() {
        let store = InMemoryCounterStore::new();
        for expected in 1..=4 {
            assert_eq!(store.incr_with_expiry("k", WINDOW).await.unwrap(), expected);
        }
        assert_eq!(store.count("k"), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_restarts_after_expiry() {
        let store = InMemoryCounterStore::new();
        store.incr_with_expiry("k", WINDOW).await.unwrap();
        store.incr_with_expiry("k", WINDOW).await.unwrap();

        tokio::time::advance(WINDOW).await;
        assert_eq!(store.count("k"), None);

        assert_eq!(store.incr_with_expiry("k", WINDOW).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_increment_refreshes_ttl() {
        let store = InMemoryCounterStore::new();
        store.incr_with_expiry("k", WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(15)));

        store.incr_with_expiry("k", WINDOW).await.unwrap();
        assert_eq!(store.ttl("k"), Some(WINDOW));

        // Original creation time plus one window has passed; still alive.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.count("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_isolated() {
        let store = InMemoryCounterStore::new();
        store.incr_with_expiry("a", WINDOW).await.unwrap();
        store.incr_with_expiry("a", WINDOW).await.unwrap();
        store.incr_with_expiry("b", WINDOW).await.unwrap();

        assert_eq!(store.count("a"), Some(2));
        assert_eq!(store.count("b"), Some(1));
        assert_eq!(store.count("c"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_is_an_error() {
        let store = InMemoryCounterStore::new();
        store.incr_with_expiry("k", WINDOW).await.unwrap();

        let err = store
            .incr_with_expiry("k", Duration::from_secs(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, GatekeeperError::StoreUnavailable(_)));

        // The failed call leaves the counter untouched.
        assert_eq!(store.count("k"), Some(1));
        assert_eq!(store.ttl("k"), Some(WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = InMemoryCounterStore::new();
        store.incr_with_expiry("short", Duration::from_secs(1)).await.unwrap();
        store.incr_with_expiry("long", WINDOW).await.unwrap();
        assert_eq!(store.len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.count("long"), Some(1));

        tokio::time::advance(WINDOW).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }
}
