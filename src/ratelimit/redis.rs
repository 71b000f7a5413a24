//! Redis counter store.
//!
//! Counters live in Redis so any number of gatekeeper replicas can share
//! one limit per client. Each hit is a single `MULTI`/`EXEC` transaction:
//!
//! ```text
//! MULTI
//! INCR    <key>
//! PEXPIRE <key> <window_ms>
//! EXEC
//! ```
//!
//! Redis applies the whole block or nothing, so a counter can never be left
//! without an expiry.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use tracing::{info, trace};

use super::store::CounterStore;
use crate::error::{GatekeeperError, Result};

/// Counter store backed by a Redis server.
///
/// Holds a reconnecting connection manager; cloning the store shares the
/// underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379`).
    ///
    /// Fails if the server cannot be reached within `connect_timeout`.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(url)?;

        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| GatekeeperError::StoreTimeout(connect_timeout))??;

        info!(url = %url, "Connected to Redis counter store");
        Ok(Self { conn })
    }
}

/// Classify a Redis failure: transport problems become
/// [`GatekeeperError::StoreUnavailable`], everything else stays a Redis error.
fn store_error(e: RedisError) -> GatekeeperError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() {
        GatekeeperError::StoreUnavailable(e.to_string())
    } else {
        GatekeeperError::Redis(e)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.conn.clone();
        let ttl_ms = i64::try_from(ttl.as_millis())
            .map_err(|_| GatekeeperError::Config(format!("ttl {:?} is too long for Redis", ttl)))?
            .max(1);

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .pexpire(key, ttl_ms)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        trace!(key = %key, count = count, "Incremented Redis counter");
        Ok(count)
    }
}
