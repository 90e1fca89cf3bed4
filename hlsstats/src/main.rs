mod http;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use hlsstats_core::{
    logging, Config, MemoryStreamStore, RedisStreamStore, StreamStore, ViewerStats,
    ViewerStatsConfig,
};

/// HLS viewer presence tracking server
#[derive(Debug, Parser)]
#[command(name = "hlsstats", version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "HLSSTATS_CONFIG", default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = Config::load(Some(&args.config))?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("hlsstats starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Stream store
    let store: Arc<dyn StreamStore> = if config.redis.url.is_empty() {
        info!("Redis not configured, using in-memory stream store");
        Arc::new(MemoryStreamStore::new())
    } else {
        let store = RedisStreamStore::connect(&config.redis.url, config.redis.key_prefix.clone())
            .await
            .map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?;
        info!("Connected to Redis stream store");
        Arc::new(store)
    };

    // 4. Viewer stats: construct, bind settings and store, start sweeping
    let stats = Arc::new(ViewerStats::new(ViewerStatsConfig::default()));
    stats.configure(config.viewer_stats.clone(), store)?;
    stats.start()?;

    // 5. HTTP server
    let app = http::create_router(Arc::clone(&stats));
    let listener = tokio::net::TcpListener::bind(config.http_address()).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Final sweep so the store reflects the last known counts
    stats.stop().await;
    let report = stats.sweep_now().await;
    info!(
        flushed = report.flushed,
        failed = report.failed,
        total_viewers = stats.get_global_total(),
        "hlsstats stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
