//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::admission;
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{CounterStore, RateLimiter};

/// HTTP server with every route gated by the admission middleware.
pub struct HttpServer<S: CounterStore + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter<S>>,
}

impl<S: CounterStore + 'static> HttpServer<S> {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter<S>>) -> Self {
        Self { addr, rate_limiter }
    }

    /// Build the application router with the admission layer in front.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(hello_handler))
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.rate_limiter),
                admission::<S>,
            ))
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GatekeeperError::Io(e)
        })?;

        info!(
            addr = %self.addr,
            limit = self.rate_limiter.policy().limit(),
            window = ?self.rate_limiter.policy().window(),
            "Starting HTTP server"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GatekeeperError::Io(e)
        })
    }
}

async fn hello_handler() -> &'static str {
    "Hello, world!\n"
}
