//! Indexed pool data from GraphQL subgraphs.
//!
//! The pools subgraph serves cumulative pool snapshots, share holders, swaps
//! and point-in-time pool state; the blocks subgraph maps day starts to block
//! numbers.

use async_trait::async_trait;

use crate::config::AuxiliaryTokenSettings;
use crate::db::models::Pool;

mod client;
mod types;

pub use client::SubgraphClient;

/// Which cumulative snapshots to fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotFilter {
    /// Every pool, `timestamp >= since`
    Since(i64),
    /// Full history of the given pools
    Pools(Vec<String>),
}

/// Cumulative daily pool snapshot as indexed by the subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphPoolSnapshot {
    pub id: String,
    pub pool_id: String,
    pub timestamp: i64,
    pub liquidity: f64,
    pub total_shares: String,
    pub swap_volume: f64,
    pub swap_fees: f64,
    pub swaps_count: i64,
    pub holders_count: i64,
    pub amounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolShare {
    pub pool_id: String,
    pub pool_address: String,
    pub user_address: String,
    /// Decimal share balance
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Swap {
    pub timestamp: i64,
    pub token_in: String,
    pub token_out: String,
    pub token_amount_in: f64,
    pub token_amount_out: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolTokenBalance {
    pub address: String,
    pub balance: String,
}

/// Pool state as of a historical block.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolAtBlock {
    pub total_shares: String,
    pub swap_fee: f64,
    pub swaps_count: i64,
    pub holders_count: i64,
    pub total_swap_volume: f64,
    pub total_swap_fee: f64,
    pub tokens: Vec<PoolTokenBalance>,
}

/// First block of a UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyBlock {
    pub number: u64,
    /// Day start, unix seconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenHolder {
    pub address: String,
    pub balance: String,
}

/// Holder list of an auxiliary token plus the block it was indexed at.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHolders {
    pub holders: Vec<TokenHolder>,
    pub block: u64,
}

#[async_trait]
pub trait SubgraphSource: Send + Sync {
    /// Every pool with its token list.
    async fn get_pools(&self) -> anyhow::Result<Vec<Pool>>;

    /// Ascending by timestamp.
    async fn get_pool_snapshots(
        &self,
        filter: SnapshotFilter,
    ) -> anyhow::Result<Vec<SubgraphPoolSnapshot>>;

    /// Non-zero share balances of the given pools, minus `exclude`d holders.
    async fn get_pool_shares(
        &self,
        pool_ids: &[String],
        exclude: &[String],
    ) -> anyhow::Result<Vec<PoolShare>>;

    /// Ascending by timestamp.
    async fn get_swaps(&self, pool_id: &str, since: i64) -> anyhow::Result<Vec<Swap>>;

    /// `None` when the pool did not exist yet at `block`.
    async fn get_pool_at_block(
        &self,
        pool_id: &str,
        block: u64,
    ) -> anyhow::Result<Option<PoolAtBlock>>;

    /// Latest block the pools subgraph has indexed.
    async fn get_indexed_block(&self) -> anyhow::Result<u64>;

    /// Blocks for the given day starts. Days without a block yet are omitted.
    async fn get_daily_blocks(&self, day_starts: &[i64]) -> anyhow::Result<Vec<DailyBlock>>;

    /// `None` when the token has no holder subgraph configured.
    async fn get_token_holders(
        &self,
        token: &AuxiliaryTokenSettings,
    ) -> anyhow::Result<Option<TokenHolders>>;
}
