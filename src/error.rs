//! Error types for the Gatekeeper service.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Gatekeeper operations.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The counter store could not be reached or could not complete an
    /// operation (connection refused or dropped, I/O failure)
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// The counter store did not answer before the deadline
    #[error("Counter store timed out after {0:?}")]
    StoreTimeout(Duration),

    /// Redis protocol or connection errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
