use crate::error::{Error, Result};
use crate::key_generator::KeyStrategy;
use crate::rate_limit_config::{RateLimitConfig, RateLimitStrategy};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Service configuration, read from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "ratekeeper", version, about = "Rate limited REST API service")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; the in-memory store is used when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Deadline applied to every store operation
    #[arg(long, env = "STORE_TIMEOUT", default_value = "500ms", value_parser = humantime::parse_duration)]
    pub store_timeout: Duration,

    /// How often the in-memory store drops expired entries
    #[arg(long, env = "CLEANUP_INTERVAL", default_value = "60s", value_parser = humantime::parse_duration)]
    pub cleanup_interval: Duration,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Mount the `/rate-limit/*identifier` inspection and reset routes. Off by default.
    #[arg(long, env = "ENABLE_ADMIN_ROUTES", default_value_t = false)]
    pub enable_admin_routes: bool,

    /// fixed_window, sliding_window, token_bucket or leaky_bucket
    #[arg(long, env = "RATE_LIMIT_STRATEGY", default_value = "fixed_window")]
    pub strategy: String,

    /// Requests per window for the windowed strategies
    #[arg(long, env = "RATE_LIMIT_LIMIT", default_value_t = 100)]
    pub limit: u64,

    /// Window length, or state expiry for the bucket strategies
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value = "60s", value_parser = humantime::parse_duration)]
    pub window: Duration,

    /// Bucket capacity
    #[arg(long, env = "RATE_LIMIT_BURST", default_value_t = 20)]
    pub burst: u64,

    /// Refill or leak rate, per second
    #[arg(long, env = "RATE_LIMIT_RATE", default_value_t = 10.0)]
    pub rate: f64,

    /// Key limits by client and request path instead of client only
    #[arg(long, env = "RATE_LIMIT_PER_PATH", default_value_t = false)]
    pub per_path: bool,
}

impl Default for Config {
    fn default() -> Self {
        let rate_limit = RateLimitConfig::default();
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            redis_url: None,
            store_timeout: Duration::from_millis(500),
            cleanup_interval: Duration::from_secs(60),
            log_level: "info".to_string(),
            enable_admin_routes: false,
            strategy: rate_limit.strategy.to_string(),
            limit: rate_limit.limit,
            window: rate_limit.window,
            burst: rate_limit.burst,
            rate: rate_limit.rate,
            per_path: false,
        }
    }
}

impl Config {
    /// Load `.env`, then parse flags and environment variables.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let config =
            Config::try_parse().map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The rate limit section as a checked `RateLimitConfig`.
    pub fn rate_limit(&self) -> Result<RateLimitConfig> {
        let config = RateLimitConfig {
            strategy: self.strategy.parse::<RateLimitStrategy>()?,
            limit: self.limit,
            window: self.window,
            burst: self.burst,
            rate: self.rate,
        };
        config.check()?;
        Ok(config)
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        if self.per_path {
            KeyStrategy::PerPath
        } else {
            KeyStrategy::Client
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.redis_url {
            validate_redis_url(url)?;
        }
        if self.store_timeout.is_zero() {
            return Err(Error::Configuration(
                "store timeout must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::Configuration(
                "cleanup interval must be greater than zero".to_string(),
            ));
        }
        self.rate_limit()?;
        Ok(())
    }
}

/// Validates a Redis URL
pub fn validate_redis_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(Error::Configuration("Redis URL cannot be empty".to_string()));
    }
    if !url.starts_with("redis://") && !url.starts_with("rediss://") {
        return Err(Error::Configuration(
            "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
        ));
    }
    Ok(())
}
