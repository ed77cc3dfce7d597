//! Request throttling for the read API
//!
//! One shared quota covers every route, `/health` included. Callers over the
//! quota get 429 with a `Retry-After` hint in whole seconds.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(120) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

pub struct ThrottleConfig {
    pub requests_per_minute: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_PER_MINUTE.get(),
        }
    }
}

pub type ApiLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Zero is not a usable quota; it is replaced by the default with a warning.
pub fn build_limiter(config: ThrottleConfig) -> ApiLimiter {
    let per_minute = match NonZeroU32::new(config.requests_per_minute) {
        Some(n) => n,
        None => {
            tracing::warn!(
                "API_REQUESTS_PER_MINUTE is zero, throttling at {} per minute",
                DEFAULT_PER_MINUTE
            );
            DEFAULT_PER_MINUTE
        }
    };
    Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)))
}

pub async fn throttle(State(limiter): State<ApiLimiter>, request: Request, next: Next) -> Response {
    let Err(not_until) = limiter.check() else {
        return next.run(request).await;
    };

    let wait = not_until.wait_time_from(DefaultClock::default().now());
    let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    tracing::warn!(
        "Throttled {} {} (retry in {}s)",
        request.method(),
        request.uri().path(),
        retry_after
    );

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "too many requests" })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.max(1)));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn throttled_app(per_minute: u32) -> Router {
        let limiter = build_limiter(ThrottleConfig {
            requests_per_minute: per_minute,
        });
        Router::new()
            .route("/data/latest", get(|| async { "rows" }))
            .layer(middleware::from_fn_with_state(limiter, throttle))
    }

    fn latest() -> Request<Body> {
        Request::builder()
            .uri("/data/latest")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_third_request_in_a_minute_is_throttled() {
        let app = throttled_app(2);
        for _ in 0..2 {
            let response = app.clone().oneshot(latest()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(latest()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=30).contains(&retry_after));
    }

    #[test]
    fn test_zero_quota_uses_default() {
        let limiter = build_limiter(ThrottleConfig {
            requests_per_minute: 0,
        });
        for _ in 0..120 {
            assert!(limiter.check().is_ok());
        }
        assert!(limiter.check().is_err());
    }
}
