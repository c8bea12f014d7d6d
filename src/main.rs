use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use feedmix::feed::RoutingFetcher;
use feedmix::web::{AppState, WebServer};
use feedmix::{Config, Database};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = feedmix::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        feedmix::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = run(config).await {
        error!("feedmix exited with error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> feedmix::Result<()> {
    config.validate()?;

    info!("feedmix - feed aggregator");
    info!(
        "{} sources configured, stale after {}s",
        config.sources.len(),
        config.refresh.stale_after_secs
    );

    let db = Database::open(&config.database.path).await?;

    let fetcher = Arc::new(RoutingFetcher::from_config(&config.refresh)?);
    let state = Arc::new(AppState::from_config(&config, db.clone(), fetcher));
    let coordinator = state.coordinator.clone();

    let shutdown = CancellationToken::new();
    let server = WebServer::new(&config.server, state)?;
    info!("Server configured on {}", server.addr());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        signal.cancel();
    });

    server.run(shutdown).await?;

    // Background refreshes release their keys on cancellation
    coordinator.shutdown();
    coordinator.wait_idle().await;
    db.close().await;

    info!("feedmix stopped");
    Ok(())
}
