mod api;
mod categories;
mod config;
mod error;
mod fetcher;
mod ladder;
mod refresh;
mod scanner;
mod tracker;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::categories::CategoryTable;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::HttpPageSource;
use crate::tracker::Engine;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        "Ladder endpoint {} | chunk {} | ceiling {} (deep: {}) | pacing {}ms | categories: {} ({})",
        cfg.ladder_api_url,
        cfg.chunk_size,
        cfg.scan_ceiling,
        cfg.deep_scan_ceiling.map_or_else(|| "none".to_string(), |c| c.to_string()),
        cfg.pacing_delay_ms,
        cfg.category_variant,
        CategoryTable::for_variant(cfg.category_variant).len(),
    );

    // --- Page source + engine ---
    let latency = Arc::new(LatencyStats::new());
    let source = Arc::new(HttpPageSource::new(&cfg, Arc::clone(&latency))?);
    let engine = Arc::new(Engine::new(source, cfg.clone()));

    // --- HTTP API server ---
    let api_state = ApiState::new(engine, latency);
    let sessions = Arc::clone(&api_state.sessions);
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Stop scans and auto-refresh timers still running.
    for entry in sessions.iter() {
        entry.value().shutdown();
    }
    info!("Shut down, {} session(s) closed", sessions.len());
    Ok(())
}
