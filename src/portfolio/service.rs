use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use super::types::UserPortfolioData;
use super::valuation::{wallet_shares, DaySnapshots, PortfolioValuationEngine};
use crate::clock::{Clock, SECONDS_PER_DAY};
use crate::config::PortfolioSettings;
use crate::db::models::Pool;
use crate::db::{PoolRepository, SnapshotRepository, WalletRepository};
use crate::error::Result;
use crate::prices::{PriceSeriesLoader, PriceTimeSeries};
use crate::utils::normalize_address;

/// Pool shares a user holds outside their wallet at a point in time
/// (staking gauges, lockers, farms), keyed by pool id.
#[async_trait]
pub trait StakedPositionSource: Send + Sync {
    async fn staked_shares(
        &self,
        user_address: &str,
        timestamp: i64,
    ) -> anyhow::Result<FxHashMap<String, f64>>;
}

/// For deployments without staking contracts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStakedPositions;

#[async_trait]
impl StakedPositionSource for NoStakedPositions {
    async fn staked_shares(
        &self,
        _user_address: &str,
        _timestamp: i64,
    ) -> anyhow::Result<FxHashMap<String, f64>> {
        Ok(FxHashMap::default())
    }
}

/// Loads persisted snapshots, balances and prices and hands them to the
/// valuation engine.
pub struct PortfolioService {
    pools: Arc<dyn PoolRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    wallets: Arc<dyn WalletRepository>,
    staked: Arc<dyn StakedPositionSource>,
    prices: Arc<PriceSeriesLoader>,
    clock: Arc<dyn Clock>,
    engine: PortfolioValuationEngine,
    history_days: u32,
}

impl PortfolioService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pools: Arc<dyn PoolRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        wallets: Arc<dyn WalletRepository>,
        staked: Arc<dyn StakedPositionSource>,
        prices: Arc<PriceSeriesLoader>,
        clock: Arc<dyn Clock>,
        settings: &PortfolioSettings,
    ) -> Self {
        Self {
            pools,
            snapshots,
            wallets,
            staked,
            prices,
            clock,
            engine: PortfolioValuationEngine::new(settings.symbol_overrides.clone()),
            history_days: settings.history_days,
        }
    }

    /// Today's portfolio measured against yesterday.
    pub async fn portfolio(&self, user_address: &str) -> Result<UserPortfolioData> {
        let user = normalize_address(user_address);
        let today = self.clock.start_of_today();
        let yesterday = today - SECONDS_PER_DAY;

        let day = self.load_day(&user, today).await?;
        if day.is_empty() {
            debug!("No pool snapshots for {} yet", today);
            return Ok(UserPortfolioData::empty(today));
        }
        let previous = self.load_day(&user, yesterday).await?;

        let pools = self.pools.get_pools().await?;
        let wallet = wallet_shares(&self.wallets.get_wallet_balances(&user).await?);
        let held = held_pool_ids(&wallet, std::slice::from_ref(&day));
        let prices = self.load_prices(&pools, &held, 2, yesterday).await;

        Ok(self
            .engine
            .value_day(&pools, &wallet, &day, Some(&previous), &prices))
    }

    /// One portfolio per day for the last `history_days` days, newest first.
    ///
    /// Balances are the current wallet balances; staked positions are
    /// looked up per day.
    pub async fn portfolio_history(&self, user_address: &str) -> Result<Vec<UserPortfolioData>> {
        let user = normalize_address(user_address);
        let today = self.clock.start_of_today();
        let oldest = today - self.history_days as i64 * SECONDS_PER_DAY;

        // One extra day at the end as the baseline of the oldest entry
        let days = try_join_all(
            (0..=self.history_days as i64)
                .map(|offset| self.load_day(&user, today - offset * SECONDS_PER_DAY)),
        )
        .await?;

        let pools = self.pools.get_pools().await?;
        let wallet = wallet_shares(&self.wallets.get_wallet_balances(&user).await?);
        let held = held_pool_ids(&wallet, &days);
        let prices = self
            .load_prices(&pools, &held, self.history_days + 1, oldest)
            .await;

        Ok(self.engine.history(&pools, &wallet, &days, &prices))
    }

    async fn load_day(&self, user: &str, timestamp: i64) -> Result<DaySnapshots> {
        let snapshots = self.snapshots.get_snapshots_at(timestamp).await?;
        let staked = self.staked.staked_shares(user, timestamp).await?;
        Ok(DaySnapshots::new(timestamp, snapshots).with_staked(staked))
    }

    /// Price histories for the leaf tokens of pools the user holds.
    async fn load_prices(
        &self,
        pools: &[Pool],
        held: &FxHashSet<String>,
        num_days: u32,
        since: i64,
    ) -> PriceTimeSeries {
        let mut tokens: Vec<String> = pools
            .iter()
            .filter(|p| held.contains(&p.id))
            .flat_map(|p| p.value_tokens())
            .filter(|t| t.nested_pool_id.is_none())
            .map(|t| normalize_address(&t.address))
            .collect();
        tokens.sort();
        tokens.dedup();

        let mut prices = PriceTimeSeries::new();
        for token in tokens {
            let points = self.prices.load(&token, num_days, since).await;
            prices.insert(&token, points);
        }
        prices
    }
}

/// Pools with a wallet or staked position on any of `days`.
fn held_pool_ids(wallet: &FxHashMap<String, f64>, days: &[DaySnapshots]) -> FxHashSet<String> {
    let mut held: FxHashSet<String> = wallet
        .iter()
        .filter(|(_, shares)| **shares > 0.0)
        .map(|(id, _)| id.clone())
        .collect();
    for day in days {
        held.extend(day.staked_pool_ids());
    }
    held
}
