use serde::Serialize;

/// A user's holding of one token, either inside one pool or rolled up
/// across pools.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTokenData {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub balance: f64,
    pub price_per_token: f64,
    pub total_value: f64,
    pub percent_of_portfolio: f64,
}

/// A user's position in one pool for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPoolData {
    pub pool_id: String,
    pub pool_address: String,
    pub name: String,
    pub shares: f64,
    pub percent_share: f64,
    pub total_value: f64,
    pub price_per_share: f64,
    pub tokens: Vec<UserTokenData>,
    /// Pool-wide fees and volume of the period
    pub swap_fees: f64,
    pub swap_volume: f64,
    /// The user's cut of `swap_fees`
    pub my_fees: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub percent_of_portfolio: f64,
}

/// Valued portfolio at one day. Derived on read, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPortfolioData {
    pub timestamp: i64,
    pub pools: Vec<UserPoolData>,
    pub tokens: Vec<UserTokenData>,
    pub total_value: f64,
    pub total_swap_fees: f64,
    pub total_swap_volume: f64,
    pub my_fees: f64,
}

impl UserPortfolioData {
    pub fn empty(timestamp: i64) -> Self {
        Self {
            timestamp,
            pools: vec![],
            tokens: vec![],
            total_value: 0.0,
            total_swap_fees: 0.0,
            total_swap_volume: 0.0,
            my_fees: 0.0,
        }
    }
}
