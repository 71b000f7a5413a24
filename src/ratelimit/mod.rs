//! Rate limiting logic and counter stores.

mod key;
mod limiter;
mod memory;
mod policy;
mod redis;
mod store;

pub use key::{ClientKey, FALLBACK_KEY};
pub use limiter::{RateLimiter, DEFAULT_KEY_PREFIX, DEFAULT_STORE_TIMEOUT};
pub use memory::InMemoryCounterStore;
pub use policy::{RatePolicy, MAX_WINDOW};
pub use self::redis::RedisCounterStore;
pub use store::CounterStore;
