//! Identifier extraction for rate limiting.
//!
//! The identifier is the partition key handed to the algorithms: the
//! caller's API key when one is supplied, otherwise the client IP.

use crate::error::{Error, Result};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use regex::Regex;
use std::net::SocketAddr;
use std::sync::OnceLock;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Strategy for generating rate limit keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// `api:<key>` or `ip:<addr>`
    #[default]
    Client,
    /// Client identifier suffixed with the normalized request path
    PerPath,
}

/// Generates rate limiting keys based on request context
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator {
    strategy: KeyStrategy,
}

impl KeyGenerator {
    pub fn new(strategy: KeyStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    pub fn from_request<B>(&self, request: &Request<B>) -> Result<String> {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        self.generate_key(request.headers(), peer, request.uri().path())
    }

    /// Generate a rate limit key from request headers and metadata
    pub fn generate_key(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        path: &str,
    ) -> Result<String> {
        let client = client_identifier(headers, peer)?;
        match self.strategy {
            KeyStrategy::Client => Ok(client),
            KeyStrategy::PerPath => Ok(format!("{}:{}", client, normalize_path(path))),
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn client_identifier(headers: &HeaderMap, peer: Option<SocketAddr>) -> Result<String> {
    if let Some(api_key) = header_value(headers, API_KEY_HEADER) {
        return Ok(format!("api:{}", api_key));
    }
    extract_client_ip(headers, peer)
        .map(|ip| format!("ip:{}", ip))
        .ok_or(Error::InvalidIdentifier)
}

/// Extract client IP from forwarding headers, falling back to the socket peer.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|xff| xff.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        .or_else(|| header_value(headers, "x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Collapse repeated slashes and drop a trailing slash, keeping `/` for the root.
pub fn normalize_path(path: &str) -> String {
    static SLASHES: OnceLock<Regex> = OnceLock::new();
    let slashes = SLASHES.get_or_init(|| Regex::new("/{2,}").expect("static pattern"));

    let collapsed = slashes.replace_all(path, "/");
    let trimmed = collapsed.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
