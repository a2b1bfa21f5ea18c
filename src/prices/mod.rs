//! Token price histories: nearest-timestamp lookup, the live feed and its
//! stored-table fallback.

mod feed;
mod loader;
mod series;

pub use feed::{CoingeckoFeed, HistoricalPriceFeed};
pub use loader::PriceSeriesLoader;
pub use series::PriceTimeSeries;
