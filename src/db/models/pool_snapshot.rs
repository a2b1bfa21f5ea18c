use serde::{Deserialize, Serialize};

/// Daily snapshot of a pool's aggregate state (PostgreSQL).
///
/// One row per (pool_id, day). `total_swap_volume` / `total_swap_fee` are
/// cumulative counters as reported upstream; `volume_24h` / `fees_24h` are
/// the non-negative deltas against the previous day's counters.
///
/// Query Patterns:
///   - "Get share price history for pool X over 30 days"
///   - "Get all pool rows for day D" (portfolio valuation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub id: String,
    pub pool_id: String,
    /// UTC midnight, unix seconds
    pub timestamp: i64,

    // Liquidity state
    pub total_liquidity: f64,
    pub total_shares: String,
    pub total_shares_num: f64,
    pub share_price: f64,
    /// Per-token balances, aligned with the pool's token indexes
    pub amounts: Vec<String>,

    // Cumulative counters
    pub total_swap_volume: f64,
    pub total_swap_fee: f64,
    pub swaps_count: i64,
    pub holders_count: i64,

    // Period metrics
    pub volume_24h: f64,
    pub fees_24h: f64,
}

impl PoolSnapshot {
    pub fn snapshot_id(pool_id: &str, timestamp: i64) -> String {
        format!("{}-{}", pool_id, timestamp)
    }

    /// Pool value per outstanding share, 0 when either side is missing.
    pub fn compute_share_price(total_liquidity: f64, total_shares: f64) -> f64 {
        if total_liquidity > 0.0 && total_shares > 0.0 {
            total_liquidity / total_shares
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_id() {
        assert_eq!(PoolSnapshot::snapshot_id("0xabc", 1_700_000_000), "0xabc-1700000000");
    }

    #[test]
    fn test_share_price_zero_guard() {
        assert_eq!(PoolSnapshot::compute_share_price(100.0, 50.0), 2.0);
        assert_eq!(PoolSnapshot::compute_share_price(100.0, 0.0), 0.0);
        assert_eq!(PoolSnapshot::compute_share_price(0.0, 10.0), 0.0);
    }
}
