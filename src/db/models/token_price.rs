use serde::{Deserialize, Serialize};

/// One observation in a token's price history.
///
/// `timestamp` is unix seconds. Sources reporting milliseconds convert via
/// [`PricePoint::from_millis`] before anything else sees the value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self { timestamp, price }
    }

    pub fn from_millis(timestamp_ms: i64, price: f64) -> Self {
        Self {
            timestamp: timestamp_ms / 1000,
            price,
        }
    }
}
