//! Admission middleware.
//!
//! Sits in front of any axum router or service. Every request is charged
//! against its client's window counter before the downstream handler runs.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::ExtensionRejection;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{trace, warn};

use crate::ratelimit::{ClientKey, CounterStore, RateLimiter};

/// Body sent with every rejection.
pub const REJECTION_BODY: &str = "Rate limit exceeded";

/// Admit or reject a request based on its client's request rate.
///
/// Attach with `axum::middleware::from_fn_with_state(limiter, admission::<S>)`.
/// The client key is the peer IP from `ConnectInfo<SocketAddr>`; requests
/// without connect info all share the fallback key.
pub async fn admission<S>(
    State(limiter): State<Arc<RateLimiter<S>>>,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    request: Request,
    next: Next,
) -> Response
where
    S: CounterStore + 'static,
{
    let key = ClientKey::from(connect_info.ok().map(|ConnectInfo(addr)| addr));

    if !limiter.allow(key.as_str()).await {
        warn!(client = %key, "Rate limit exceeded");
        return rate_limit_exceeded_response();
    }

    trace!(client = %key, "Request admitted");
    next.run(request).await
}

/// Generate a 429 Too Many Requests response.
pub fn rate_limit_exceeded_response() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, REJECTION_BODY).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    use crate::error::{GatekeeperError, Result};
    use crate::ratelimit::{InMemoryCounterStore, RatePolicy};

    struct UnreachableStore;

    #[async_trait]
    impl CounterStore for UnreachableStore {
        async fn incr_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<u64> {
            Err(GatekeeperError::StoreUnavailable("connection refused".to_string()))
        }
    }

    fn create_test_app<S: CounterStore + 'static>(
        limiter: Arc<RateLimiter<S>>,
        hits: Arc<AtomicUsize>,
    ) -> Router {
        Router::new()
            .route(
                "/",
                get(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        "Hello, world!"
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(limiter, admission::<S>))
    }

    fn memory_limiter(limit: u64) -> Arc<RateLimiter<InMemoryCounterStore>> {
        let policy = RatePolicy::new(limit, Duration::from_secs(60)).unwrap();
        Arc::new(RateLimiter::new(Arc::new(InMemoryCounterStore::new()), policy))
    }

    fn request_from(addr: &str) -> Request {
        let addr: SocketAddr = addr.parse().unwrap();
        Request::builder()
            .uri("/")
            .extension(ConnectInfo(addr))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = create_test_app(memory_limiter(5), Arc::clone(&hits));

        let response = app.oneshot(request_from("1.2.3.4:5000")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Hello, world!");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_over_limit_request_is_rejected() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = create_test_app(memory_limiter(2), Arc::clone(&hits));

        for _ in 0..2 {
            let response = app.clone().oneshot(request_from("1.2.3.4:5000")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(request_from("1.2.3.4:5001")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_text(response).await, REJECTION_BODY);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clients_are_limited_separately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = create_test_app(memory_limiter(1), Arc::clone(&hits));

        let a = app.clone().oneshot(request_from("1.2.3.4:1")).await.unwrap();
        let b = app.clone().oneshot(request_from("5.6.7.8:1")).await.unwrap();
        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);

        let a = app.oneshot(request_from("1.2.3.4:2")).await.unwrap();
        assert_eq!(a.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_connect_info_uses_fallback_key() {
        let hits = Arc::new(AtomicUsize::new(0));
        let limiter = memory_limiter(1);
        let app = create_test_app(Arc::clone(&limiter), Arc::clone(&hits));

        let request = || Request::builder().uri("/").body(Body::empty()).unwrap();

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        let fallback = limiter.store_key(crate::ratelimit::FALLBACK_KEY);
        assert_eq!(limiter.store().count(&fallback), Some(2));
    }

    #[tokio::test]
    async fn test_store_failure_looks_like_rate_limit() {
        let hits = Arc::new(AtomicUsize::new(0));
        let policy = RatePolicy::new(100, Duration::from_secs(60)).unwrap();
        let limiter = Arc::new(RateLimiter::new(Arc::new(UnreachableStore), policy));
        let app = create_test_app(limiter, Arc::clone(&hits));

        let response = app.oneshot(request_from("1.2.3.4:5000")).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_text(response).await, REJECTION_BODY);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
