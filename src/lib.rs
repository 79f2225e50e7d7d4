pub mod algorithms;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod middleware;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod store;

pub use algorithms::{RateLimitAlgorithm, RateLimitInfo};
pub use config::Config;
pub use error::{Error, Result, StoreError};
pub use rate_limit_config::{RateLimitConfig, RateLimitStrategy};
pub use rate_limiter::{Outcome, RateLimiter};
pub use server::create_app;
pub use store::{CounterStore, MemoryStore, RedisStore};
