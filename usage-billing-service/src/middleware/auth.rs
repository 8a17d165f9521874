//! Key-based guards for admin and service-to-service routes.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use subtle::ConstantTimeEq;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Api-Key";
pub const SERVICE_KEY_HEADER: &str = "X-Service-Key";

fn key_matches(headers: &HeaderMap, header: &str, expected: &Secret<String>) -> bool {
    let expected = expected.expose_secret();
    match headers.get(header).and_then(|value| value.to_str().ok()) {
        Some(key) if !expected.is_empty() => bool::from(key.as_bytes().ct_eq(expected.as_bytes())),
        _ => false,
    }
}

/// Platform administrator check for `/admin` routes.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if key_matches(&headers, ADMIN_KEY_HEADER, &state.config.security.admin_api_key) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Failed admin authentication attempt");
    AppError::Forbidden(anyhow::anyhow!(
        "Platform administrator privilege required"
    ))
    .into_response()
}

/// Internal caller check for `/internal` routes.
pub async fn service_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if key_matches(&headers, SERVICE_KEY_HEADER, &state.config.security.service_api_key) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rejected internal call without valid service key");
    AppError::Forbidden(anyhow::anyhow!("Invalid or missing service key")).into_response()
}
