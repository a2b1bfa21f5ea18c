use rustc_hash::FxHashMap;

use crate::db::models::PricePoint;
use crate::utils::normalize_address;

/// Per-token price histories with nearest-timestamp lookup.
///
/// Timestamps are unix seconds. Series keep insertion order; lookups scan
/// left to right and keep the first point on equal distance.
#[derive(Debug, Clone, Default)]
pub struct PriceTimeSeries {
    series: FxHashMap<String, Vec<PricePoint>>,
}

impl PriceTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the history of `token`.
    pub fn insert(&mut self, token: &str, points: Vec<PricePoint>) {
        self.series.insert(normalize_address(token), points);
    }

    pub fn contains(&self, token: &str) -> bool {
        self.series.contains_key(&normalize_address(token))
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Price closest in time to `timestamp`; 0 when the token has no history.
    pub fn price_at(&self, token: &str, timestamp: i64) -> f64 {
        self.series
            .get(&normalize_address(token))
            .map(|points| nearest_price(points, timestamp))
            .unwrap_or(0.0)
    }

    /// Every known token's price at `timestamp`.
    pub fn prices_at(&self, timestamp: i64) -> FxHashMap<String, f64> {
        self.series
            .iter()
            .map(|(token, points)| (token.clone(), nearest_price(points, timestamp)))
            .collect()
    }
}

fn nearest_price(points: &[PricePoint], timestamp: i64) -> f64 {
    let mut best: Option<&PricePoint> = None;

    for point in points {
        let closer = match best {
            Some(b) => (point.timestamp - timestamp).abs() < (b.timestamp - timestamp).abs(),
            None => true,
        };
        if closer {
            best = Some(point);
        }
    }

    best.map(|p| p.price).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> PriceTimeSeries {
        let mut series = PriceTimeSeries::new();
        series.insert(
            "0xAAAA",
            vec![PricePoint::new(100, 1.0), PricePoint::new(200, 2.0)],
        );
        series
    }

    #[test]
    fn test_nearest_point_wins() {
        let series = series();
        assert_eq!(series.price_at("0xaaaa", 140), 1.0);
        assert_eq!(series.price_at("0xaaaa", 160), 2.0);
        assert_eq!(series.price_at("0xaaaa", 10_000), 2.0);
        assert_eq!(series.price_at("0xaaaa", -50), 1.0);
    }

    #[test]
    fn test_tie_keeps_first_point() {
        assert_eq!(series().price_at("0xaaaa", 150), 1.0);
    }

    #[test]
    fn test_unknown_or_empty_is_zero() {
        let mut series = series();
        assert_eq!(series.price_at("0xbbbb", 150), 0.0);

        series.insert("0xbbbb", vec![]);
        assert!(series.contains("0xBBBB"));
        assert_eq!(series.price_at("0xbbbb", 150), 0.0);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(series().price_at("0xAaAa", 200), 2.0);
    }

    #[test]
    fn test_prices_at() {
        let prices = series().prices_at(190);
        assert_eq!(prices.get("0xaaaa"), Some(&2.0));
    }
}
