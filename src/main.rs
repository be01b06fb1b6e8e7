//! pricecall service entry point.
//!
//! Loads configuration, initialises structured logging, builds the
//! participant store and price oracle, and serves the HTTP API until
//! Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use pricecall::api::{self, ApiState};
use pricecall::config;
use pricecall::engine::{SystemClock, VoteEngine};
use pricecall::oracle::FailoverOracle;
use pricecall::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("PRICECALL_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    let store = storage::from_config(&cfg.storage).await?;
    let oracle = FailoverOracle::from_config(&cfg.oracle)?;
    info!(
        sources = ?oracle.source_names(),
        timeout_secs = cfg.oracle.timeout_secs,
        storage = ?cfg.storage.backend,
        "pricecall starting up"
    );

    let engine = VoteEngine::new(store, Arc::new(oracle), Arc::new(SystemClock));
    api::serve(Arc::new(ApiState::new(engine)), cfg.listen_port()).await?;

    info!("pricecall shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pricecall=info,tower_http=info"));

    let json_logging = std::env::var("PRICECALL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
