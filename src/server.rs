use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::handlers::{health_check, ping, rate_limit_status, reset_rate_limit, AppState};
use crate::health::HealthChecker;
use crate::middleware::{logging_middleware, rate_limit_middleware};
use crate::rate_limiter::RateLimiter;
use crate::store::{CounterStore, MemoryStore, RedisStore};
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the router. Only `/api` routes pass through the rate limiter.
///
/// The `/rate-limit` routes are mounted only when `state.admin_routes` is set.
/// They take a wildcard so per-path keys, which contain `/`, stay addressable.
pub fn create_app(state: AppState) -> Router {
    let limiter = state.rate_limiter.clone();

    let api = Router::new()
        .route("/api/ping", get(ping))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let mut router = Router::new().route("/health", get(health_check));
    if state.admin_routes {
        router = router.route(
            "/rate-limit/*identifier",
            get(rate_limit_status).delete(reset_rate_limit),
        );
    }

    router
        .merge(api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
    sweeper: Option<JoinHandle<()>>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut sweeper = None;

        let (store, backend): (Arc<dyn CounterStore>, &'static str) = match &config.redis_url {
            Some(url) => {
                let store = RedisStore::connect(url, config.store_timeout).await?;
                tracing::info!(redis_url = %url, "using redis store");
                (Arc::new(store), "redis")
            }
            None => {
                let store = MemoryStore::with_clock(Arc::clone(&clock));
                sweeper = Some(spawn_sweeper(store.clone(), config.cleanup_interval));
                tracing::info!("REDIS_URL not set, using in-memory store");
                (Arc::new(store), "memory")
            }
        };

        let rate_limit = config.rate_limit()?;
        let limiter = RateLimiter::from_config(
            &rate_limit,
            config.key_strategy(),
            Arc::clone(&store),
            clock,
        )?;
        tracing::info!(
            strategy = %rate_limit.strategy,
            limit = rate_limit.limit,
            window = ?rate_limit.window,
            burst = rate_limit.burst,
            rate = rate_limit.rate,
            per_path = config.per_path,
            "rate limiter configured"
        );

        if config.enable_admin_routes {
            tracing::warn!("admin routes enabled: /rate-limit/*identifier can read and reset limits");
        }
        let state = AppState::new(limiter, HealthChecker::new(store, backend))
            .with_admin_routes(config.enable_admin_routes);

        Ok(Self {
            app: create_app(state),
            bind_addr: config.bind_addr,
            sweeper,
        })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("ratekeeper listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
        Ok(())
    }
}

/// Periodically drop expired entries from the in-memory store.
fn spawn_sweeper(store: MemoryStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = store.len(), "purged expired entries");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
