use crate::key_generator::extract_client_ip;
use crate::rate_limiter::{Outcome, RateLimiter};
use crate::response::{internal_error, rate_limited};
use crate::error::Error;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::info;
use uuid::Uuid;

/// Rate limiting middleware. Apply with
/// `axum::middleware::from_fn_with_state(limiter, rate_limit_middleware)`.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let outcome = match limiter.identify(&request) {
        Ok(identifier) => limiter.check_identifier(&identifier).await,
        Err(outcome) => outcome,
    };

    match outcome {
        Outcome::Permit => next.run(request).await,
        Outcome::Deny(info) => rate_limited(&info),
        Outcome::Unidentified => Error::InvalidIdentifier.into_response(),
        Outcome::Error => internal_error(),
    }
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip =
        extract_client_ip(request.headers(), peer).unwrap_or_else(|| "unknown".to_string());

    info!(
        target: "ratekeeper::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "ratekeeper::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}
