mod api;
mod config;
mod data;
mod error;
mod metrics;
mod scanner;
mod screener;
mod spreads;
mod state;
mod types;

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, AppState};
use crate::config::{AppConfig, Config};
use crate::data::DataFetcher;
use crate::error::Result;
use crate::metrics::MockEstimator;
use crate::scanner::Scanner;
use crate::screener::validate_symbols;
use crate::state::ScreenerStore;

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
    // --- Application document ---
    let app_cfg = AppConfig::load(&cfg.config_path);
    let criteria = app_cfg.screening.default_criteria.clone();
    let watchlist = validate_symbols(&app_cfg.screening.default_symbols);
    info!(
        "Loaded configuration: source={} fallback={} symbols={} cache_ttl={}m",
        app_cfg.data_sources.default,
        app_cfg.data_sources.fallback,
        watchlist.len(),
        app_cfg.cache.duration_minutes,
    );

    // --- Shared state ---
    let fetcher = Arc::new(DataFetcher::new(app_cfg, Arc::new(MockEstimator::new()))?);
    let store = ScreenerStore::new(criteria, watchlist);
    let scanner = Arc::new(Scanner::new(Arc::clone(&fetcher), Arc::clone(&store)));

    // No scheduled scans: the first request that finds the store empty runs one.
    let state = Arc::new(AppState { fetcher, store, scanner });

    // --- HTTP server ---
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
