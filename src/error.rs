use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a counter/state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key holds no state. Bucket strategies treat this as "start fresh".
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The key exists but does not hold a value of the expected kind.
    #[error("invalid value at {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A persisted bucket state could not be decoded.
    #[error("malformed state at {key}: {source}")]
    MalformedState {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode state: {0}")]
    StateEncoding(#[source] serde_json::Error),

    /// Neither a credential nor a network origin could be found on the request.
    #[error("unable to identify client")]
    InvalidIdentifier,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::Configuration(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidIdentifier => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Store details stay in the logs; callers get a generic body.
        let status = self.status_code();
        let body = match self {
            Error::InvalidIdentifier => ErrorResponse::new("Unable to identify client"),
            _ => ErrorResponse::new("Internal rate limit error"),
        };
        (status, Json(body)).into_response()
    }
}
