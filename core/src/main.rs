/// Lost & Found API server - Main entry point
use lostfound_core::{messenger_api, Backend, Config};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let backend = Backend::open(&config.data_dir, config.event_capacity)
        .map_err(|e| anyhow::anyhow!("Storage error: {}", e))?;
    info!("Starting Lost & Found server");
    info!("   Data dir: {:?}", config.data_dir);

    tokio::select! {
        res = messenger_api::start_messenger_api(backend, config.listen_addr) => {
            res.map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
        }
    }

    Ok(())
}
