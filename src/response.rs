use crate::algorithms::RateLimitInfo;
use crate::error::ErrorResponse;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Write the `X-RateLimit-*` headers for `info`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    let values = [
        (HEADER_LIMIT, info.limit.to_string()),
        (HEADER_REMAINING, info.remaining.to_string()),
        (HEADER_RESET, info.reset.to_string()),
    ];
    for (name, value) in values {
        // Decimal digits are always valid header values.
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

/// 429 with the rate limit headers and a JSON error body.
pub fn rate_limited(info: &RateLimitInfo) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse::new("Rate limit exceeded")),
    )
        .into_response();
    apply_rate_limit_headers(response.headers_mut(), info);
    response
}

/// Generic 500 used for every failure inside the rate limiting path.
pub fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal rate limit error")),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct RateLimitResponse {
    pub identifier: String,
    pub strategy: String,
    #[serde(flatten)]
    pub info: RateLimitInfo,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub store: StoreStatus,
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub backend: String,
    pub status: String,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn new(store: StoreStatus) -> Self {
        let status = if store.error.is_none() {
            "healthy"
        } else {
            "unhealthy"
        };
        Self {
            status: status.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.store.error.is_none()
    }
}
