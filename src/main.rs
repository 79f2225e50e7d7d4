use anyhow::Result;
use ratekeeper::config::Config;
use ratekeeper::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Reads .env before parsing flags and environment variables
    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ratekeeper={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ratekeeper service");
    tracing::info!(
        bind_addr = %config.bind_addr,
        store = if config.redis_url.is_some() { "redis" } else { "memory" },
        strategy = %config.strategy,
        "Configuration loaded"
    );

    let server = Server::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
