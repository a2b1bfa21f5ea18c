//! Persistence seams used by the engines.
//!
//! `PostgresClient` implements every trait here. Engines only hold
//! `Arc<dyn ...>` handles so tests can substitute in-memory stores.

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use super::models::{
    Pool, PoolSnapshot, PricePoint, SyncStatus, SyncType, WalletBalance, WalletBalanceBatch,
};

/// Pool registry with fully hydrated token lists.
#[async_trait]
pub trait PoolRepository: Send + Sync {
    async fn get_pools(&self) -> anyhow::Result<Vec<Pool>>;

    async fn get_pool(&self, pool_id: &str) -> anyhow::Result<Option<Pool>>;

    /// Pools with more than `min_shares` outstanding shares.
    async fn get_pools_with_shares(&self, min_shares: f64) -> anyhow::Result<Vec<Pool>>;

    /// Upsert pools and replace their token lists.
    async fn upsert_pools(&self, pools: &[Pool]) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Upsert by snapshot id. All rows commit or none do.
    async fn upsert_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<()>;

    /// Insert rows whose id does not exist yet; existing rows are untouched.
    async fn insert_missing_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<()>;

    async fn get_snapshot(&self, pool_id: &str, timestamp: i64)
        -> anyhow::Result<Option<PoolSnapshot>>;

    /// Every pool's row for exactly this day.
    async fn get_snapshots_at(&self, timestamp: i64) -> anyhow::Result<Vec<PoolSnapshot>>;

    /// Ascending by timestamp.
    async fn get_snapshots_for_pool(
        &self,
        pool_id: &str,
        since: i64,
    ) -> anyhow::Result<Vec<PoolSnapshot>>;

    /// Ascending by timestamp, all pools with more than `min_shares` shares.
    async fn get_snapshots_since(
        &self,
        since: i64,
        min_shares: f64,
    ) -> anyhow::Result<Vec<PoolSnapshot>>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn get_sync_status(&self, sync_type: SyncType) -> anyhow::Result<Option<SyncStatus>>;

    /// Balance deletes/upserts and the cursor write commit as one transaction.
    async fn commit_wallet_batch(&self, batch: &WalletBalanceBatch) -> anyhow::Result<()>;

    async fn get_wallet_balances(&self, user_address: &str) -> anyhow::Result<Vec<WalletBalance>>;
}

/// Stored price table, the fallback when the live feed fails.
#[async_trait]
pub trait TokenPriceRepository: Send + Sync {
    /// Ascending by timestamp, keyed by lowercase token address.
    async fn get_token_prices(
        &self,
        token_addresses: &[String],
        since: i64,
    ) -> anyhow::Result<FxHashMap<String, Vec<PricePoint>>>;
}
