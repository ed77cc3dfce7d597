use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::secrets::constant_time_eq;

/// Bearer token expected on protected read endpoints
#[derive(Clone)]
pub struct BearerToken(Arc<Zeroizing<String>>);

impl BearerToken {
    pub fn new(token: Zeroizing<String>) -> Self {
        Self(Arc::new(token))
    }

    /// Check a presented token without leaking timing on partial matches
    pub fn matches(&self, presented: &str) -> bool {
        constant_time_eq(self.0.as_str(), presented)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Middleware to require authentication for protected endpoints
pub async fn require_auth(
    State(token): State<BearerToken>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header.and_then(|auth| auth.strip_prefix("Bearer ")) {
        Some(presented) if token.matches(presented.trim()) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API token attempted");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing or malformed Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
