//! CoinGecko price source.
//!
//! API: `GET /api/v3/simple/price?ids=bitcoin&vs_currencies=usd`
//! Auth: optional `x-cg-demo-api-key` header.
//! Response: `{"bitcoin": {"usd": 67012.0}}`. An empty object means no quote.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::PriceSource;
use crate::types::{Price, TRACKED_ASSET, TRACKED_CURRENCY};

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";

type SimplePriceResponse = HashMap<String, HashMap<String, Price>>;

pub struct CoinGeckoSource {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl CoinGeckoSource {
    pub fn new(base_url: Option<String>, api_key: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("pricecall/0.1.0")
            .build()
            .context("Failed to build CoinGecko HTTP client")?;
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self { http, base_url, api_key })
    }

    fn simple_price_url(&self) -> String {
        format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            urlencoding::encode(TRACKED_ASSET),
            urlencoding::encode(&vs_currency()),
        )
    }
}

fn vs_currency() -> String {
    TRACKED_CURRENCY.to_ascii_lowercase()
}

fn parse_simple_price(body: &str) -> Result<Price> {
    let data: SimplePriceResponse =
        serde_json::from_str(body).context("Failed to parse CoinGecko response")?;
    data.get(TRACKED_ASSET)
        .and_then(|quotes| quotes.get(&vs_currency()))
        .copied()
        .with_context(|| format!("CoinGecko returned no {TRACKED_ASSET}/{TRACKED_CURRENCY} quote"))
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch_price(&self) -> Result<Price> {
        let mut req = self.http.get(self.simple_price_url());
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key.expose_secret().as_str());
        }

        let resp = req.send().await.context("CoinGecko request failed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("CoinGecko API error: {status}");
        }

        let body = resp.text().await.context("Failed to read CoinGecko response")?;
        let price = parse_simple_price(&body)?;
        debug!(%price, "CoinGecko price");
        Ok(price)
    }
}
