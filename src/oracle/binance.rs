//! Binance spot price source.
//!
//! API: `GET /api/v3/ticker/price?symbol=BTCUSDT`
//! Auth: optional `X-MBX-APIKEY` header (public endpoint works without).
//! Response: `{"symbol": "BTCUSDT", "price": "67012.34000000"}`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::PriceSource;
use crate::types::Price;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// USDT-quoted pair used as the USD reference.
const SYMBOL: &str = "BTCUSDT";

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

pub struct BinanceSource {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl BinanceSource {
    pub fn new(base_url: Option<String>, api_key: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("pricecall/0.1.0")
            .build()
            .context("Failed to build Binance HTTP client")?;
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self { http, base_url, api_key })
    }

    fn ticker_url(&self) -> String {
        format!("{}/api/v3/ticker/price?symbol={}", self.base_url, urlencoding::encode(SYMBOL))
    }
}

/// Parse a ticker body into a price.
fn parse_ticker(body: &str) -> Result<Price> {
    let ticker: TickerPrice = serde_json::from_str(body).context("Failed to parse Binance ticker")?;
    if ticker.symbol != SYMBOL {
        anyhow::bail!("Binance returned ticker for {} instead of {SYMBOL}", ticker.symbol);
    }
    let raw = ticker.price.trim();
    if raw.is_empty() {
        anyhow::bail!("Binance returned no price data for {SYMBOL}");
    }
    Price::from_str(raw).with_context(|| format!("Failed to parse Binance price: {raw}"))
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_price(&self) -> Result<Price> {
        let mut req = self.http.get(self.ticker_url());
        if let Some(key) = &self.api_key {
            req = req.header("X-MBX-APIKEY", key.expose_secret().as_str());
        }

        let resp = req.send().await.context("Binance request failed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Binance API error: {status}");
        }

        let body = resp.text().await.context("Failed to read Binance response")?;
        let price = parse_ticker(&body)?;
        debug!(%price, symbol = SYMBOL, "Binance price");
        Ok(price)
    }
}
