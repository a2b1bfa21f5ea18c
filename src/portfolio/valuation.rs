use std::collections::HashMap;

use rustc_hash::FxHashMap;

use super::types::{UserPoolData, UserPortfolioData, UserTokenData};
use crate::db::models::{Pool, PoolSnapshot, WalletBalance};
use crate::prices::PriceTimeSeries;
use crate::utils::parse_f64;

/// Every pool's snapshot for one day, plus the user's staked shares that day.
#[derive(Debug, Clone, Default)]
pub struct DaySnapshots {
    pub timestamp: i64,
    snapshots: FxHashMap<String, PoolSnapshot>,
    staked: FxHashMap<String, f64>,
}

impl DaySnapshots {
    pub fn new(timestamp: i64, snapshots: Vec<PoolSnapshot>) -> Self {
        Self {
            timestamp,
            snapshots: snapshots
                .into_iter()
                .map(|s| (s.pool_id.clone(), s))
                .collect(),
            staked: FxHashMap::default(),
        }
    }

    /// Shares held outside the wallet (gauges, lockers), by pool id.
    pub fn with_staked(mut self, staked: FxHashMap<String, f64>) -> Self {
        self.staked = staked;
        self
    }

    pub fn get(&self, pool_id: &str) -> Option<&PoolSnapshot> {
        self.snapshots.get(pool_id)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub(crate) fn staked_pool_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.staked
            .iter()
            .filter(|(_, shares)| **shares > 0.0)
            .map(|(id, _)| id.clone())
    }

    fn staked_shares(&self, pool_id: &str) -> f64 {
        self.staked.get(pool_id).copied().unwrap_or(0.0)
    }
}

/// Wallet share balances summed per pool. Rows without a pool id
/// (auxiliary tokens) are not pool positions and are ignored.
pub fn wallet_shares(balances: &[WalletBalance]) -> FxHashMap<String, f64> {
    let mut shares: FxHashMap<String, f64> = FxHashMap::default();
    for balance in balances {
        if let Some(pool_id) = &balance.pool_id {
            *shares.entry(pool_id.clone()).or_insert(0.0) += balance.balance_num;
        }
    }
    shares
}

/// `numerator / denominator`, or 0 when the denominator is not positive.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Values a user's pool positions from daily snapshots and token prices.
///
/// Pure: every input is supplied by the caller, nothing is fetched.
#[derive(Debug, Clone, Default)]
pub struct PortfolioValuationEngine {
    symbol_overrides: HashMap<String, String>,
}

impl PortfolioValuationEngine {
    pub fn new(symbol_overrides: HashMap<String, String>) -> Self {
        Self { symbol_overrides }
    }

    /// Portfolio at `day`, with period metrics measured against `previous`.
    pub fn value_day(
        &self,
        pools: &[Pool],
        wallet: &FxHashMap<String, f64>,
        day: &DaySnapshots,
        previous: Option<&DaySnapshots>,
        prices: &PriceTimeSeries,
    ) -> UserPortfolioData {
        let mut positions: Vec<UserPoolData> = pools
            .iter()
            .filter_map(|pool| {
                let shares =
                    wallet.get(&pool.id).copied().unwrap_or(0.0) + day.staked_shares(&pool.id);
                if shares <= 0.0 {
                    return None;
                }
                let snapshot = day.get(&pool.id)?;
                let prev = previous.and_then(|p| p.get(&pool.id));
                Some(self.value_pool(pool, shares, snapshot, prev, day, prices))
            })
            .collect();

        let total_value: f64 = positions.iter().map(|p| p.total_value).sum();
        for position in &mut positions {
            position.percent_of_portfolio = ratio(position.total_value, total_value);
        }
        positions.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));

        let tokens = roll_up_tokens(&positions, total_value);

        UserPortfolioData {
            timestamp: day.timestamp,
            total_value,
            total_swap_fees: positions.iter().map(|p| p.swap_fees).sum(),
            total_swap_volume: positions.iter().map(|p| p.swap_volume).sum(),
            my_fees: positions.iter().map(|p| p.my_fees).sum(),
            pools: positions,
            tokens,
        }
    }

    /// Daily portfolios from `days` ordered newest first.
    ///
    /// Each day is measured against the next entry, so the oldest day only
    /// serves as a baseline. Days without any value are dropped.
    pub fn history(
        &self,
        pools: &[Pool],
        wallet: &FxHashMap<String, f64>,
        days: &[DaySnapshots],
        prices: &PriceTimeSeries,
    ) -> Vec<UserPortfolioData> {
        days.windows(2)
            .filter_map(|pair| {
                let data = self.value_day(pools, wallet, &pair[0], Some(&pair[1]), prices);
                (data.total_value > 0.0).then_some(data)
            })
            .collect()
    }

    fn value_pool(
        &self,
        pool: &Pool,
        shares: f64,
        snapshot: &PoolSnapshot,
        previous: Option<&PoolSnapshot>,
        day: &DaySnapshots,
        prices: &PriceTimeSeries,
    ) -> UserPoolData {
        let percent_share = ratio(shares, snapshot.total_shares_num);

        let mut tokens: Vec<UserTokenData> = pool
            .value_tokens()
            .map(|token| {
                let amount = usize::try_from(token.index)
                    .ok()
                    .and_then(|i| snapshot.amounts.get(i))
                    .map(|a| parse_f64(a))
                    .unwrap_or(0.0);
                let balance = amount * percent_share;
                let price = match &token.nested_pool_id {
                    Some(nested) => day.get(nested).map(|s| s.share_price).unwrap_or(0.0),
                    None => prices.price_at(&token.address, day.timestamp),
                };

                UserTokenData {
                    address: token.address.clone(),
                    symbol: self.display_symbol(&token.symbol),
                    name: token.name.clone(),
                    balance,
                    price_per_token: price,
                    total_value: balance * price,
                    percent_of_portfolio: 0.0,
                }
            })
            .collect();

        let total_value: f64 = tokens.iter().map(|t| t.total_value).sum();
        for token in &mut tokens {
            token.percent_of_portfolio = ratio(token.total_value, total_value);
        }
        tokens.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));

        // A pool without a previous row is younger than one period: no accrual
        let baseline = previous.unwrap_or(snapshot);
        let swap_fees = snapshot.total_swap_fee - baseline.total_swap_fee;
        let swap_volume = snapshot.total_swap_volume - baseline.total_swap_volume;

        let (price_change, price_change_percent) = match previous.map(|p| p.share_price) {
            Some(prev_price) if prev_price > 0.0 && snapshot.share_price > 0.0 => {
                let delta = snapshot.share_price - prev_price;
                (delta * shares, delta / snapshot.share_price)
            },
            _ => (0.0, 0.0),
        };

        UserPoolData {
            pool_id: pool.id.clone(),
            pool_address: pool.address.clone(),
            name: pool.name.clone(),
            shares,
            percent_share,
            total_value,
            price_per_share: ratio(total_value, shares),
            tokens,
            swap_fees,
            swap_volume,
            my_fees: (percent_share * swap_fees).max(0.0),
            price_change,
            price_change_percent,
            percent_of_portfolio: 0.0,
        }
    }

    fn display_symbol(&self, symbol: &str) -> String {
        self.symbol_overrides
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| symbol.to_string())
    }
}

/// Group per-pool holdings by symbol across the whole portfolio.
fn roll_up_tokens(positions: &[UserPoolData], total_value: f64) -> Vec<UserTokenData> {
    let mut by_symbol: FxHashMap<String, UserTokenData> = FxHashMap::default();

    for token in positions.iter().flat_map(|p| &p.tokens) {
        by_symbol
            .entry(token.symbol.clone())
            .and_modify(|t| {
                t.balance += token.balance;
                t.total_value += token.total_value;
            })
            .or_insert_with(|| token.clone());
    }

    let mut tokens: Vec<UserTokenData> = by_symbol
        .into_values()
        .map(|mut t| {
            t.price_per_token = ratio(t.total_value, t.balance);
            t.percent_of_portfolio = ratio(t.total_value, total_value);
            t
        })
        .collect();

    tokens.sort_by(|a, b| {
        b.total_value
            .total_cmp(&a.total_value)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SECONDS_PER_DAY;
    use crate::db::models::{PoolType, PricePoint};
    use crate::testing::{pool, snapshot, token};

    const DAY: i64 = 1_710_028_800;
    const PREV: i64 = DAY - SECONDS_PER_DAY;

    const TOKEN_A: &str = "0x000000000000000000000000000000000000000a";
    const TOKEN_B: &str = "0x000000000000000000000000000000000000000b";
    const TOKEN_C: &str = "0x000000000000000000000000000000000000000c";

    fn approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    fn pool_snapshot(
        pool_id: &str,
        timestamp: i64,
        total_shares: f64,
        amounts: &[&str],
        share_price: f64,
        fees: f64,
    ) -> PoolSnapshot {
        let mut s = snapshot(pool_id, timestamp, fees * 10.0, fees);
        s.total_shares_num = total_shares;
        s.total_shares = total_shares.to_string();
        s.amounts = amounts.iter().map(|a| a.to_string()).collect();
        s.share_price = share_price;
        s
    }

    fn prices() -> PriceTimeSeries {
        let mut prices = PriceTimeSeries::new();
        prices.insert(TOKEN_A, vec![PricePoint::new(PREV, 1.0), PricePoint::new(DAY, 1.0)]);
        prices.insert(TOKEN_B, vec![PricePoint::new(DAY, 2.0)]);
        prices.insert(TOKEN_C, vec![PricePoint::new(DAY, 4.0)]);
        prices
    }

    fn ab_pool() -> Pool {
        pool(
            "ab",
            "0x00000000000000000000000000000000000000ab",
            PoolType::Weighted,
            vec![token(TOKEN_A, "A", 0), token(TOKEN_B, "B", 1)],
        )
    }

    fn ac_pool() -> Pool {
        pool(
            "ac",
            "0x00000000000000000000000000000000000000ac",
            PoolType::Weighted,
            vec![token(TOKEN_A, "A", 0), token(TOKEN_C, "C", 1)],
        )
    }

    fn shares(entries: &[(&str, f64)]) -> FxHashMap<String, f64> {
        entries.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    #[test]
    fn test_price_change_percent_is_relative_to_current_share_price() {
        let day = DaySnapshots::new(DAY, vec![pool_snapshot("ab", DAY, 100.0, &["1000", "500"], 3.0, 5.0)]);
        let previous = DaySnapshots::new(PREV, vec![pool_snapshot("ab", PREV, 100.0, &["1000", "500"], 4.0, 2.0)]);

        let data = PortfolioValuationEngine::default().value_day(
            &[ab_pool()],
            &shares(&[("ab", 10.0)]),
            &day,
            Some(&previous),
            &prices(),
        );

        let position = &data.pools[0];
        approx(position.price_change, -10.0);
        approx(position.price_change_percent, -1.0 / 3.0);
    }

    #[test]
    fn test_single_pool_position() {
        let day = DaySnapshots::new(DAY, vec![pool_snapshot("ab", DAY, 100.0, &["1000", "500"], 2.0, 5.0)]);
        let previous = DaySnapshots::new(PREV, vec![pool_snapshot("ab", PREV, 100.0, &["1000", "500"], 1.0, 2.0)]);

        let data = PortfolioValuationEngine::default().value_day(
            &[ab_pool()],
            &shares(&[("ab", 10.0)]),
            &day,
            Some(&previous),
            &prices(),
        );

        assert_eq!(data.pools.len(), 1);
        let position = &data.pools[0];
        approx(position.percent_share, 0.1);
        approx(position.total_value, 200.0);
        approx(position.price_per_share, 20.0);
        approx(position.swap_fees, 3.0);
        approx(position.my_fees, 0.3);
        approx(position.price_change, 10.0);
        approx(position.price_change_percent, 0.5);
        approx(position.percent_of_portfolio, 1.0);

        let a = position.tokens.iter().find(|t| t.symbol == "A").unwrap();
        approx(a.balance, 100.0);
        approx(a.percent_of_portfolio, 0.5);

        approx(data.total_value, 200.0);
        approx(data.my_fees, 0.3);
    }

    #[test]
    fn test_cross_pool_totals_and_token_roll_up() {
        let day = DaySnapshots::new(
            DAY,
            vec![
                pool_snapshot("ab", DAY, 100.0, &["1000", "500"], 2.0, 5.0),
                pool_snapshot("ac", DAY, 10.0, &["100", "100"], 50.0, 1.0),
            ],
        );
        let mut overrides = HashMap::new();
        overrides.insert("C".to_string(), "C.e".to_string());

        let data = PortfolioValuationEngine::new(overrides).value_day(
            &[ab_pool(), ac_pool()],
            &shares(&[("ab", 10.0), ("ac", 5.0)]),
            &day,
            None,
            &prices(),
        );

        // ab: 100 A + 50 B = 200; ac: 50 A + 50 C = 250
        approx(data.total_value, 450.0);
        let pool_sum: f64 = data.pools.iter().map(|p| p.total_value).sum();
        approx(pool_sum, data.total_value);
        let percent_sum: f64 = data.pools.iter().map(|p| p.percent_of_portfolio).sum();
        approx(percent_sum, 1.0);
        assert_eq!(data.pools[0].pool_id, "ac");

        let symbols: Vec<&str> = data.tokens.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["C.e", "A", "B"]);
        let a = &data.tokens[1];
        approx(a.balance, 150.0);
        approx(a.total_value, 150.0);
        approx(a.price_per_token, 1.0);
        approx(a.percent_of_portfolio, 150.0 / 450.0);

        // No previous day: nothing accrued yet
        assert_eq!(data.pools[1].swap_fees, 0.0);
        assert_eq!(data.total_swap_fees, 0.0);
        assert_eq!(data.my_fees, 0.0);
    }

    #[test]
    fn test_zero_share_pools_are_omitted() {
        let day = DaySnapshots::new(
            DAY,
            vec![
                pool_snapshot("ab", DAY, 100.0, &["1000", "500"], 2.0, 5.0),
                pool_snapshot("ac", DAY, 10.0, &["100", "100"], 50.0, 1.0),
            ],
        );

        let data = PortfolioValuationEngine::default().value_day(
            &[ab_pool(), ac_pool()],
            &shares(&[("ab", 10.0), ("ac", 0.0)]),
            &day,
            None,
            &prices(),
        );

        assert_eq!(data.pools.len(), 1);
        assert_eq!(data.pools[0].pool_id, "ab");
    }

    #[test]
    fn test_staked_shares_count_toward_position() {
        let mut staked = FxHashMap::default();
        staked.insert("ab".to_string(), 10.0);
        let day = DaySnapshots::new(DAY, vec![pool_snapshot("ab", DAY, 100.0, &["1000", "500"], 2.0, 5.0)])
            .with_staked(staked);

        let data = PortfolioValuationEngine::default().value_day(
            &[ab_pool()],
            &shares(&[("ab", 10.0)]),
            &day,
            None,
            &prices(),
        );

        approx(data.pools[0].shares, 20.0);
        approx(data.total_value, 400.0);
    }

    #[test]
    fn test_zero_divisions_yield_zero() {
        let day = DaySnapshots::new(DAY, vec![pool_snapshot("ab", DAY, 0.0, &["1000", "500"], 0.0, 5.0)]);
        let previous = DaySnapshots::new(PREV, vec![pool_snapshot("ab", PREV, 0.0, &["1000", "500"], 1.0, 2.0)]);

        let data = PortfolioValuationEngine::default().value_day(
            &[ab_pool()],
            &shares(&[("ab", 10.0)]),
            &day,
            Some(&previous),
            &prices(),
        );

        let position = &data.pools[0];
        assert_eq!(position.percent_share, 0.0);
        assert_eq!(position.total_value, 0.0);
        assert_eq!(position.percent_of_portfolio, 0.0);
        assert_eq!(position.price_change, 0.0);
        assert_eq!(position.price_change_percent, 0.0);
        assert_eq!(position.my_fees, 0.0);
        assert!(data.tokens.iter().all(|t| t.price_per_token == 0.0));
    }

    #[test]
    fn test_nested_tokens_use_nested_share_price() {
        let mut nested_token = token("0x00000000000000000000000000000000000000ee", "bb-a", 1);
        nested_token.nested_pool_id = Some("nested".to_string());
        let composite = pool(
            "composite",
            "0x00000000000000000000000000000000000000cc",
            PoolType::PhantomStable,
            vec![
                token("0x00000000000000000000000000000000000000cc", "SELF", 0),
                nested_token,
            ],
        );

        let day = DaySnapshots::new(
            DAY,
            vec![
                pool_snapshot("composite", DAY, 10.0, &["1000000", "40"], 3.0, 0.0),
                pool_snapshot("nested", DAY, 40.0, &[], 1.5, 0.0),
            ],
        );

        let data = PortfolioValuationEngine::default().value_day(
            &[composite],
            &shares(&[("composite", 5.0)]),
            &day,
            None,
            &prices(),
        );

        let position = &data.pools[0];
        assert_eq!(position.tokens.len(), 1);
        approx(position.tokens[0].balance, 20.0);
        approx(position.tokens[0].price_per_token, 1.5);
        approx(position.total_value, 30.0);
    }

    #[test]
    fn test_history_pairs_days_and_skips_empty_ones() {
        let days = vec![
            DaySnapshots::new(DAY, vec![pool_snapshot("ab", DAY, 100.0, &["1000", "500"], 2.0, 5.0)]),
            DaySnapshots::new(PREV, vec![pool_snapshot("ab", PREV, 100.0, &["1000", "500"], 1.0, 2.0)]),
            DaySnapshots::new(PREV - SECONDS_PER_DAY, vec![]),
            DaySnapshots::new(PREV - 2 * SECONDS_PER_DAY, vec![]),
        ];

        let history = PortfolioValuationEngine::default().history(
            &[ab_pool()],
            &shares(&[("ab", 10.0)]),
            &days,
            &prices(),
        );

        let timestamps: Vec<i64> = history.iter().map(|d| d.timestamp).collect();
        assert_eq!(timestamps, vec![DAY, PREV]);
        approx(history[0].pools[0].my_fees, 0.3);
        // Oldest populated day has no previous row: no price change
        assert_eq!(history[1].pools[0].price_change, 0.0);
    }

    #[test]
    fn test_wallet_shares_ignore_auxiliary_rows() {
        let balances = vec![
            WalletBalance::for_pool("ab", "0xab", "0xuser", "1.5".to_string()),
            WalletBalance::for_auxiliary("fbeets", "0xfb", "0xuser", "9".to_string()),
        ];
        let shares = wallet_shares(&balances);
        assert_eq!(shares.len(), 1);
        assert_eq!(shares["ab"], 1.5);
    }
}
