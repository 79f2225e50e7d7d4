use crate::algorithms::{RateLimitAlgorithm, RateLimitInfo};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::key_generator::{KeyGenerator, KeyStrategy};
use crate::rate_limit_config::RateLimitConfig;
use crate::store::CounterStore;
use axum::http::Request;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of running one request through the limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Permit,
    Deny(RateLimitInfo),
    /// Extraction found neither a credential nor an origin.
    Unidentified,
    /// The store failed; the request must not proceed.
    Error,
}

/// One applied rate limit: an algorithm plus the way requests are keyed.
///
/// Cheap to clone; clones share the same algorithm instance.
#[derive(Clone)]
pub struct RateLimiter {
    algorithm: Arc<dyn RateLimitAlgorithm>,
    keys: KeyGenerator,
}

impl RateLimiter {
    pub fn new(algorithm: Arc<dyn RateLimitAlgorithm>, strategy: KeyStrategy) -> Self {
        Self {
            algorithm,
            keys: KeyGenerator::new(strategy),
        }
    }

    pub fn from_config(
        config: &RateLimitConfig,
        strategy: KeyStrategy,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self::new(config.build(store, clock)?, strategy))
    }

    /// Same algorithm, keyed per request path.
    pub fn per_path(&self) -> Self {
        Self {
            algorithm: Arc::clone(&self.algorithm),
            keys: KeyGenerator::new(KeyStrategy::PerPath),
        }
    }

    pub fn algorithm(&self) -> &Arc<dyn RateLimitAlgorithm> {
        &self.algorithm
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.keys.strategy()
    }

    /// Derive the partition key for `request`.
    ///
    /// Synchronous so that no borrow of the request is held across the
    /// store round trips that follow.
    pub fn identify<B>(&self, request: &Request<B>) -> std::result::Result<String, Outcome> {
        self.keys.from_request(request).map_err(|e| match e {
            Error::InvalidIdentifier => {
                warn!(uri = %request.uri(), "rate limit identifier could not be derived");
                Outcome::Unidentified
            }
            other => {
                error!(error = %other, "rate limit identifier extraction failed");
                Outcome::Error
            }
        })
    }

    /// CALL_ALLOW -> PERMIT | DENY (with info) | ERROR
    pub async fn check_identifier(&self, identifier: &str) -> Outcome {
        match self.algorithm.allow(identifier).await {
            Ok(true) => {
                debug!(identifier = %identifier, strategy = self.algorithm.name(), "request permitted");
                Outcome::Permit
            }
            Ok(false) => match self.algorithm.info(identifier).await {
                Ok(limit) => {
                    info!(
                        identifier = %identifier,
                        strategy = self.algorithm.name(),
                        limit = limit.limit,
                        reset = limit.reset,
                        "rate limit exceeded"
                    );
                    Outcome::Deny(limit)
                }
                Err(e) => {
                    error!(identifier = %identifier, error = %e, "failed to read rate limit info");
                    Outcome::Error
                }
            },
            Err(e) => {
                error!(identifier = %identifier, error = %e, "rate limit check failed");
                Outcome::Error
            }
        }
    }

    pub async fn info(&self, identifier: &str) -> Result<RateLimitInfo> {
        self.algorithm.info(identifier).await
    }

    pub async fn reset(&self, identifier: &str) -> Result<()> {
        self.algorithm.reset(identifier).await
    }
}
