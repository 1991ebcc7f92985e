use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use moka::future::Cache;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

use explorer_core::{ChainCommunicationError, ChainResult, PriceSource};

/// How long a fetched price is reused
pub const PRICE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
}

/// USD prices from the CoinGecko `simple/price` endpoint
#[derive(Debug, Clone)]
pub struct CoinGeckoPrices {
    client: Client,
    base: Url,
    cache: Cache<String, f64>,
}

impl CoinGeckoPrices {
    /// Query the api at `url`, e.g. `https://api.coingecko.com/api/v3/`
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let base = url
            .parse::<Url>()
            .wrap_err_with(|| format!("Invalid price api url {url}"))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(PRICE_TTL)
                .build(),
        })
    }

    async fn fetch(&self, coin_gecko_id: &str) -> ChainResult<Option<f64>> {
        let mut url = self
            .base
            .join("simple/price")
            .map_err(ChainCommunicationError::from_other)?;
        url.query_pairs_mut()
            .append_pair("ids", coin_gecko_id)
            .append_pair("vs_currencies", "usd");
        let prices: HashMap<String, SimplePrice> = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(ChainCommunicationError::from_other)?
            .json()
            .await
            .map_err(ChainCommunicationError::from_other)?;
        Ok(prices.get(coin_gecko_id).and_then(|price| price.usd))
    }
}

#[async_trait]
impl PriceSource for CoinGeckoPrices {
    #[instrument(skip(self), err)]
    async fn usd_price(&self, coin_gecko_id: &str) -> ChainResult<Option<f64>> {
        if let Some(price) = self.cache.get(coin_gecko_id).await {
            return Ok(Some(price));
        }
        let price = self.fetch(coin_gecko_id).await?;
        if let Some(price) = price {
            debug!(coin_gecko_id, price, "Fetched price");
            self.cache.insert(coin_gecko_id.to_owned(), price).await;
        }
        Ok(price)
    }
}

/// Used when no price api is configured; every notional value is zero
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrices;

#[async_trait]
impl PriceSource for NoPrices {
    async fn usd_price(&self, _coin_gecko_id: &str) -> ChainResult<Option<f64>> {
        Ok(None)
    }
}
