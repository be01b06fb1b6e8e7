//! Price oracle.
//!
//! Defines the `PriceSource` capability (one upstream provider) and the
//! `PriceOracle` the engine consumes. `FailoverOracle` walks an ordered
//! list of sources, trying each exactly once under a timeout, and returns
//! the first positive price. If every source fails the caller gets a
//! single `DependencyFailure`.

pub mod binance;
pub mod coingecko;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::{OracleConfig, PriceProvider};
use crate::types::{Price, VoteError};

pub use binance::BinanceSource;
pub use coingecko::CoinGeckoSource;

/// A price observed from a named source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub price: Price,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// One upstream price provider for the tracked asset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Fetch the current price. Empty or unparseable results are errors.
    async fn fetch_price(&self) -> Result<Price>;
}

/// What the vote engine needs: one current price, or a dependency failure.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn current_price(&self) -> Result<Quote, VoteError>;
}

/// Ordered failover across price sources.
pub struct FailoverOracle {
    sources: Vec<Arc<dyn PriceSource>>,
    timeout: Duration,
}

impl FailoverOracle {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    /// Build the configured sources in declaration order.
    pub fn from_config(cfg: &OracleConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let mut sources: Vec<Arc<dyn PriceSource>> = Vec::with_capacity(cfg.sources.len());

        for source in &cfg.sources {
            let api_key = source
                .api_key_env
                .as_deref()
                .and_then(|env| std::env::var(env).ok())
                .filter(|key| !key.is_empty())
                .map(SecretString::new);
            let base_url = source.base_url.clone();

            let built: Arc<dyn PriceSource> = match source.provider {
                PriceProvider::Binance => Arc::new(BinanceSource::new(base_url, api_key, timeout)?),
                PriceProvider::CoinGecko => Arc::new(CoinGeckoSource::new(base_url, api_key, timeout)?),
            };
            sources.push(built);
        }

        Ok(Self::new(sources, timeout))
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl PriceOracle for FailoverOracle {
    async fn current_price(&self) -> Result<Quote, VoteError> {
        let mut failures = Vec::new();

        for source in &self.sources {
            let name = source.name();
            match tokio::time::timeout(self.timeout, source.fetch_price()).await {
                Ok(Ok(price)) if price > Decimal::ZERO => {
                    debug!(source = name, %price, "Price fetched");
                    return Ok(Quote {
                        price,
                        source: name.to_string(),
                        fetched_at: Utc::now(),
                    });
                }
                Ok(Ok(price)) => {
                    warn!(source = name, %price, "Source returned no usable price, trying next");
                    failures.push(format!("{name}: no quote available"));
                }
                Ok(Err(e)) => {
                    warn!(source = name, error = %e, "Price source failed, trying next");
                    failures.push(format!("{name}: {e:#}"));
                }
                Err(_) => {
                    warn!(source = name, timeout_secs = self.timeout.as_secs(), "Price source timed out, trying next");
                    failures.push(format!("{name}: timed out"));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no price sources configured".to_string());
        }
        error!(failures = ?failures, "All price sources failed");
        Err(VoteError::DependencyFailure(failures.join("; ")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
