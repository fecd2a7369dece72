//! Equity quote feed (Financial Modeling Prep `/quote`).
//!
//! Endpoint: `/api/v3/quote/{SYM1,SYM2,...}?apikey=KEY`
//! Each quote carries symbol, name, price and `changesPercentage`.
//! Stocks are identified by ticker, so identity is stable across fetches.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use tracing::{debug, info};

use super::{AssetClass, AssetSource};
use crate::types::{AssetRef, Stock};

const BASE_URL: &str = "https://financialmodelingprep.com/api/v3";
const SOURCE_NAME: &str = "stock-quotes";

pub struct StockQuoteClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    symbols: Vec<String>,
}

impl StockQuoteClient {
    pub fn new(api_key: SecretString, symbols: Vec<String>) -> Result<Self> {
        Self::with_base_url(BASE_URL, api_key, symbols)
    }

    pub fn with_base_url(base_url: &str, api_key: SecretString, symbols: Vec<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("LEAGUES/0.1.0")
            .build()
            .context("Failed to build HTTP client for stock quotes")?;

        let mut seen = HashSet::new();
        let symbols: Vec<String> = symbols
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            symbols,
        })
    }

    fn quote_url(&self) -> String {
        format!(
            "{}/quote/{}?apikey={}",
            self.base_url,
            urlencoding::encode(&self.symbols.join(",")),
            urlencoding::encode(self.api_key.expose_secret()),
        )
    }

    /// Fetch quotes for the configured tickers.
    pub async fn fetch_quotes(&self) -> Result<Vec<Stock>> {
        if self.symbols.is_empty() {
            return Ok(Vec::new());
        }

        debug!(symbols = self.symbols.len(), "Fetching stock quotes");
        let resp = self
            .http
            .get(self.quote_url())
            .send()
            .await
            .context("Stock quote request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Stock quote API error {status}: {body}");
        }

        let quotes: Vec<Stock> = resp
            .json()
            .await
            .context("Failed to parse stock quote response")?;

        info!(count = quotes.len(), "Stock quotes fetched");
        Ok(quotes)
    }
}

#[async_trait]
impl AssetSource for StockQuoteClient {
    fn class(&self) -> AssetClass {
        AssetClass::Equity
    }

    async fn fetch_assets(&self) -> Result<Vec<AssetRef>> {
        Ok(self
            .fetch_quotes()
            .await?
            .into_iter()
            .map(AssetRef::Equity)
            .collect())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}
