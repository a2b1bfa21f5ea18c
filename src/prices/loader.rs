use std::sync::Arc;
use std::time::Duration;

use log::warn;

use super::HistoricalPriceFeed;
use crate::cache::TtlCache;
use crate::db::models::PricePoint;
use crate::db::TokenPriceRepository;
use crate::utils::normalize_address;

/// Loads leaf-token price histories.
///
/// Order of preference: cached feed response, live feed, stored price table.
/// When every source fails the series is empty and prices resolve to 0.
pub struct PriceSeriesLoader {
    feed: Arc<dyn HistoricalPriceFeed>,
    stored: Arc<dyn TokenPriceRepository>,
    cache: TtlCache<(String, u32), Vec<PricePoint>>,
    request_delay: Duration,
}

impl PriceSeriesLoader {
    pub fn new(
        feed: Arc<dyn HistoricalPriceFeed>,
        stored: Arc<dyn TokenPriceRepository>,
        cache_ttl: Duration,
        request_delay: Duration,
    ) -> Self {
        Self {
            feed,
            stored,
            cache: TtlCache::new(10_000, cache_ttl),
            request_delay,
        }
    }

    /// History of `token` over the last `num_days` days. `since` bounds the
    /// stored-table fallback.
    pub async fn load(&self, token: &str, num_days: u32, since: i64) -> Vec<PricePoint> {
        let token = normalize_address(token);
        let key = (token.clone(), num_days);

        if let Some(points) = self.cache.get(&key).await {
            return points;
        }

        match self.feed.get_historical_prices(&token, num_days).await {
            Ok(points) => {
                self.cache.set(key, points.clone()).await;
                if !self.request_delay.is_zero() {
                    tokio::time::sleep(self.request_delay).await;
                }
                points
            },
            Err(e) => {
                warn!(
                    "Price feed failed for {}, falling back to stored prices: {:#}",
                    token, e
                );
                self.load_stored(&token, since).await
            },
        }
    }

    async fn load_stored(&self, token: &str, since: i64) -> Vec<PricePoint> {
        match self.stored.get_token_prices(&[token.to_string()], since).await {
            Ok(mut prices) => prices.remove(token).unwrap_or_default(),
            Err(e) => {
                warn!("Stored prices unavailable for {}: {:#}", token, e);
                vec![]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, MockPriceFeed};

    fn loader(feed: Arc<MockPriceFeed>, store: Arc<MemoryStore>) -> PriceSeriesLoader {
        PriceSeriesLoader::new(feed, store, Duration::from_secs(60), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_feed_result_is_cached() {
        let feed = Arc::new(MockPriceFeed::default());
        feed.set("0xaaaa", vec![PricePoint::new(100, 2.0)]);
        let loader = loader(feed.clone(), Arc::new(MemoryStore::default()));

        assert_eq!(loader.load("0xAAAA", 2, 0).await, vec![PricePoint::new(100, 2.0)]);
        assert_eq!(loader.load("0xaaaa", 2, 0).await, vec![PricePoint::new(100, 2.0)]);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_stored_prices() {
        let feed = Arc::new(MockPriceFeed::default());
        feed.fail("0xaaaa");
        let store = Arc::new(MemoryStore::default());
        store.add_token_prices("0xaaaa", vec![PricePoint::new(50, 0.5), PricePoint::new(150, 1.5)]);

        let points = loader(feed, store).load("0xaaaa", 2, 100).await;
        assert_eq!(points, vec![PricePoint::new(150, 1.5)]);
    }

    #[tokio::test]
    async fn test_every_source_failing_yields_empty_series() {
        let feed = Arc::new(MockPriceFeed::default());
        feed.fail("0xaaaa");
        let store = Arc::new(MemoryStore::default());
        store.fail_price_reads();

        assert!(loader(feed, store).load("0xaaaa", 2, 0).await.is_empty());
    }
}
