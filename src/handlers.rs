use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::error::Error;
use crate::health::HealthChecker;
use crate::rate_limiter::RateLimiter;
use crate::response::{apply_rate_limit_headers, RateLimitResponse};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: RateLimiter,
    pub health: HealthChecker,
    /// Whether `create_app` mounts the `/rate-limit` routes.
    pub admin_routes: bool,
}

impl AppState {
    pub fn new(rate_limiter: RateLimiter, health: HealthChecker) -> Self {
        Self {
            rate_limiter,
            health,
            admin_routes: false,
        }
    }

    pub fn with_admin_routes(mut self, enabled: bool) -> Self {
        self.admin_routes = enabled;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: String,
    pub identifier: String,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub message: String,
}

/// Current limit state for a partition key such as `api:abc`, `ip:10.0.0.1`
/// or, when keyed per path, `ip:10.0.0.1:/api/ping`.
pub async fn rate_limit_status(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let info = state.rate_limiter.info(&identifier).await.map_err(|e| {
        tracing::error!(identifier = %identifier, error = %e, "failed to read rate limit info");
        e
    })?;

    let mut response = Json(RateLimitResponse {
        strategy: state.rate_limiter.algorithm().name().to_string(),
        identifier,
        info,
    })
    .into_response();
    apply_rate_limit_headers(response.headers_mut(), &info);
    Ok(response)
}

/// Drop all stored state for a partition key
pub async fn reset_rate_limit(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, Error> {
    state.rate_limiter.reset(&identifier).await.map_err(|e| {
        tracing::error!(identifier = %identifier, error = %e, "failed to reset rate limit");
        e
    })?;
    tracing::info!(identifier = %identifier, "rate limit reset");

    Ok(Json(ResetResponse {
        status: "reset".to_string(),
        identifier,
    }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.check_health().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// Rate limited endpoint
pub async fn ping() -> impl IntoResponse {
    Json(PingResponse {
        message: "pong".to_string(),
    })
}
