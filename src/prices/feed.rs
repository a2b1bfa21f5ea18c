use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::config::PriceFeedSettings;
use crate::db::models::PricePoint;
use crate::utils::normalize_address;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Third-party source of daily USD price history.
#[async_trait]
pub trait HistoricalPriceFeed: Send + Sync {
    /// Ascending `(timestamp, price)` points covering the last `num_days` days.
    /// Timestamps are unix seconds.
    async fn get_historical_prices(
        &self,
        token: &str,
        num_days: u32,
    ) -> anyhow::Result<Vec<PricePoint>>;
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>,
}

/// Coingecko `market_chart` by contract address.
#[derive(Clone)]
pub struct CoingeckoFeed {
    client: Client,
    base_url: String,
    platform: String,
    api_key: Option<String>,
}

impl CoingeckoFeed {
    pub fn new(settings: &PriceFeedSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build price feed HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            platform: settings.platform.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn market_chart_url(&self, token: &str, num_days: u32) -> String {
        format!(
            "{}/coins/{}/contract/{}/market_chart?vs_currency=usd&days={}",
            self.base_url,
            self.platform,
            normalize_address(token),
            num_days.max(1)
        )
    }
}

/// Millisecond feed timestamps become seconds here and nowhere else.
fn into_points(chart: MarketChart) -> Vec<PricePoint> {
    chart
        .prices
        .into_iter()
        .filter(|(_, price)| price.is_finite())
        .map(|(ms, price)| PricePoint::from_millis(ms as i64, price))
        .collect()
}

#[async_trait]
impl HistoricalPriceFeed for CoingeckoFeed {
    async fn get_historical_prices(
        &self,
        token: &str,
        num_days: u32,
    ) -> anyhow::Result<Vec<PricePoint>> {
        let url = self.market_chart_url(token, num_days);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-pro-api-key", key);
        }

        let chart: MarketChart = request
            .send()
            .await
            .with_context(|| format!("Price feed request for {} failed", token))?
            .error_for_status()
            .with_context(|| format!("Price feed rejected request for {}", token))?
            .json()
            .await
            .with_context(|| format!("Undecodable price history for {}", token))?;

        let points = into_points(chart);
        debug!("Fetched {} price points for {}", points.len(), token);
        Ok(points)
    }
}
