//! CoinGecko coin feed.
//!
//! API docs: https://docs.coingecko.com/reference/coins-markets
//! Endpoint: `/api/v3/coins/markets?vs_currency=usd&order=market_cap_desc`
//! Auth: not required for the public tier (rate limited).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::{AssetClass, AssetSource};
use crate::types::{AssetRef, Coin};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const SOURCE_NAME: &str = "coingecko";

/// CoinGecko allows at most 250 per page.
const MAX_PER_PAGE: u32 = 250;

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    limit: u32,
}

impl CoinGeckoClient {
    /// Client returning the top `limit` coins by market cap.
    pub fn new(limit: u32) -> Result<Self> {
        Self::with_base_url(BASE_URL, limit)
    }

    pub fn with_base_url(base_url: &str, limit: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("LEAGUES/0.1.0")
            .build()
            .context("Failed to build HTTP client for CoinGecko")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            limit: limit.clamp(1, MAX_PER_PAGE),
        })
    }

    fn markets_url(&self) -> String {
        format!(
            "{}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={}&page=1&sparkline=false",
            self.base_url, self.limit,
        )
    }

    /// Fetch the top coins by market cap.
    pub async fn fetch_top_coins(&self) -> Result<Vec<Coin>> {
        let url = self.markets_url();
        debug!(url = %url, "Fetching CoinGecko markets");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("CoinGecko API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("CoinGecko API error {status}: {body}");
        }

        let coins: Vec<Coin> = resp
            .json()
            .await
            .context("Failed to parse CoinGecko markets response")?;

        info!(count = coins.len(), "CoinGecko coins fetched");
        Ok(coins)
    }
}

#[async_trait]
impl AssetSource for CoinGeckoClient {
    fn class(&self) -> AssetClass {
        AssetClass::Coin
    }

    async fn fetch_assets(&self) -> Result<Vec<AssetRef>> {
        Ok(self
            .fetch_top_coins()
            .await?
            .into_iter()
            .map(AssetRef::Coin)
            .collect())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markets_url() {
        let client = CoinGeckoClient::with_base_url("https://example.test/api/v3/", 20).unwrap();
        assert_eq!(
            client.markets_url(),
            "https://example.test/api/v3/coins/markets?vs_currency=usd&order=market_cap_desc&per_page=20&page=1&sparkline=false"
        );
    }

    #[test]
    fn test_limit_clamped() {
        assert_eq!(CoinGeckoClient::new(0).unwrap().limit, 1);
        assert_eq!(CoinGeckoClient::new(1000).unwrap().limit, MAX_PER_PAGE);
    }

    #[test]
    fn test_parse_markets_payload() {
        let json = r#"[
            {"id":"bitcoin","symbol":"btc","name":"Bitcoin",
             "image":"https://assets.coingecko.com/coins/images/1/large/bitcoin.png",
             "current_price":67000.5,"market_cap":1300000000000,
             "price_change_percentage_24h":1.8},
            {"id":"tether","symbol":"usdt","name":"Tether","image":"",
             "current_price":1.0,"price_change_percentage_24h":null}
        ]"#;
        let coins: Vec<Coin> = serde_json::from_str(json).unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id, "bitcoin");
        assert_eq!(coins[1].price_change_percentage_24h, 0.0);
        assert_eq!(AssetRef::Coin(coins[1].clone()).to_asset().image, None);
    }
}
