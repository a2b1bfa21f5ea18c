//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy::primitives::{Address, B256, U256};
use anyhow::anyhow;
use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::config::AuxiliaryTokenSettings;
use crate::db::models::{
    Pool, PoolSnapshot, PoolToken, PoolType, PricePoint, SyncStatus, SyncType, WalletBalance,
    WalletBalanceBatch,
};
use crate::db::{PoolRepository, SnapshotRepository, TokenPriceRepository, WalletRepository};
use crate::prices::HistoricalPriceFeed;
use crate::rpc::log_watcher::check_range;
use crate::rpc::{BalanceFetcher, BalanceRequest, TokenBalance, TransferEvent, TransferLogSource};
use crate::subgraph::{
    DailyBlock, PoolAtBlock, PoolShare, SnapshotFilter, SubgraphPoolSnapshot, SubgraphSource,
    Swap, TokenHolders,
};

// ============================================
// Fixtures
// ============================================

pub fn token(address: &str, symbol: &str, index: i32) -> PoolToken {
    PoolToken {
        address: address.to_string(),
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        index,
        nested_pool_id: None,
    }
}

pub fn pool(id: &str, address: &str, pool_type: PoolType, tokens: Vec<PoolToken>) -> Pool {
    Pool {
        id: id.to_string(),
        address: address.to_string(),
        name: id.to_string(),
        pool_type,
        create_time: 0,
        total_shares_num: 100.0,
        tokens,
    }
}

pub fn snapshot(pool_id: &str, timestamp: i64, volume: f64, fees: f64) -> PoolSnapshot {
    PoolSnapshot {
        id: PoolSnapshot::snapshot_id(pool_id, timestamp),
        pool_id: pool_id.to_string(),
        timestamp,
        total_liquidity: 0.0,
        total_shares: "0".to_string(),
        total_shares_num: 0.0,
        share_price: 0.0,
        amounts: vec![],
        total_swap_volume: volume,
        total_swap_fee: fees,
        swaps_count: 0,
        holders_count: 0,
        volume_24h: 0.0,
        fees_24h: 0.0,
    }
}

pub fn subgraph_snapshot(pool_id: &str, timestamp: i64, volume: f64, fees: f64) -> SubgraphPoolSnapshot {
    SubgraphPoolSnapshot {
        id: format!("{}-{}", pool_id, timestamp),
        pool_id: pool_id.to_string(),
        timestamp,
        liquidity: 1000.0,
        total_shares: "100".to_string(),
        swap_volume: volume,
        swap_fees: fees,
        swaps_count: 1,
        holders_count: 1,
        amounts: vec!["1".to_string()],
    }
}

pub fn auxiliary_token(address: &str, prefix: &str, underlying_pool: &str) -> AuxiliaryTokenSettings {
    AuxiliaryTokenSettings {
        address: address.to_string(),
        key_prefix: prefix.to_string(),
        decimals: 18,
        underlying_pool_address: underlying_pool.to_string(),
        holders_subgraph_url: None,
        holders_balance_field: "balance".to_string(),
    }
}

// ============================================
// Repository
// ============================================

/// Every repository trait over plain maps.
#[derive(Default)]
pub struct MemoryStore {
    pools: Mutex<Vec<Pool>>,
    snapshots: Mutex<BTreeMap<String, PoolSnapshot>>,
    balances: Mutex<BTreeMap<String, WalletBalance>>,
    cursor: Mutex<Option<u64>>,
    prices: Mutex<FxHashMap<String, Vec<PricePoint>>>,
    fail_prices: AtomicBool,
    fail_commits: AtomicBool,
    snapshot_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn add_pool(&self, pool: Pool) {
        self.pools.lock().unwrap().push(pool);
    }

    pub fn add_snapshot(&self, snapshot: PoolSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot);
    }

    pub fn snapshot(&self, pool_id: &str, timestamp: i64) -> Option<PoolSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(&PoolSnapshot::snapshot_id(pool_id, timestamp))
            .cloned()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    /// Number of write calls, not rows.
    pub fn snapshot_writes(&self) -> usize {
        self.snapshot_writes.load(Ordering::SeqCst)
    }

    pub fn add_balance(&self, balance: WalletBalance) {
        self.balances
            .lock()
            .unwrap()
            .insert(balance.id.clone(), balance);
    }

    pub fn balance(&self, id: &str) -> Option<WalletBalance> {
        self.balances.lock().unwrap().get(id).cloned()
    }

    pub fn balance_count(&self) -> usize {
        self.balances.lock().unwrap().len()
    }

    pub fn cursor(&self) -> Option<u64> {
        *self.cursor.lock().unwrap()
    }

    pub fn set_cursor(&self, block: u64) {
        *self.cursor.lock().unwrap() = Some(block);
    }

    pub fn add_token_prices(&self, token: &str, points: Vec<PricePoint>) {
        self.prices
            .lock()
            .unwrap()
            .insert(token.to_string(), points);
    }

    pub fn fail_price_reads(&self) {
        self.fail_prices.store(true, Ordering::SeqCst);
    }

    pub fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PoolRepository for MemoryStore {
    async fn get_pools(&self) -> anyhow::Result<Vec<Pool>> {
        Ok(self.pools.lock().unwrap().clone())
    }

    async fn get_pool(&self, pool_id: &str) -> anyhow::Result<Option<Pool>> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == pool_id)
            .cloned())
    }

    async fn get_pools_with_shares(&self, min_shares: f64) -> anyhow::Result<Vec<Pool>> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.total_shares_num > min_shares)
            .cloned()
            .collect())
    }

    async fn upsert_pools(&self, pools: &[Pool]) -> anyhow::Result<()> {
        let mut stored = self.pools.lock().unwrap();
        for pool in pools {
            match stored.iter_mut().find(|p| p.id == pool.id) {
                Some(existing) => *existing = pool.clone(),
                None => stored.push(pool.clone()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for MemoryStore {
    async fn upsert_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<()> {
        self.snapshot_writes.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.snapshots.lock().unwrap();
        for snapshot in snapshots {
            stored.insert(snapshot.id.clone(), snapshot.clone());
        }
        Ok(())
    }

    async fn insert_missing_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<()> {
        self.snapshot_writes.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.snapshots.lock().unwrap();
        for snapshot in snapshots {
            stored
                .entry(snapshot.id.clone())
                .or_insert_with(|| snapshot.clone());
        }
        Ok(())
    }

    async fn get_snapshot(
        &self,
        pool_id: &str,
        timestamp: i64,
    ) -> anyhow::Result<Option<PoolSnapshot>> {
        Ok(self.snapshot(pool_id, timestamp))
    }

    async fn get_snapshots_at(&self, timestamp: i64) -> anyhow::Result<Vec<PoolSnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.timestamp == timestamp)
            .cloned()
            .collect())
    }

    async fn get_snapshots_for_pool(
        &self,
        pool_id: &str,
        since: i64,
    ) -> anyhow::Result<Vec<PoolSnapshot>> {
        let mut rows: Vec<PoolSnapshot> = self
            .snapshots
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.pool_id == pool_id && s.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.timestamp);
        Ok(rows)
    }

    async fn get_snapshots_since(
        &self,
        since: i64,
        min_shares: f64,
    ) -> anyhow::Result<Vec<PoolSnapshot>> {
        let mut rows: Vec<PoolSnapshot> = self
            .snapshots
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.timestamp >= since && s.total_shares_num > min_shares)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.timestamp);
        Ok(rows)
    }
}

#[async_trait]
impl WalletRepository for MemoryStore {
    async fn get_sync_status(&self, sync_type: SyncType) -> anyhow::Result<Option<SyncStatus>> {
        Ok(self.cursor().map(|block| SyncStatus::new(sync_type, block)))
    }

    async fn commit_wallet_batch(&self, batch: &WalletBalanceBatch) -> anyhow::Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(anyhow!("commit rejected"));
        }

        let mut balances = self.balances.lock().unwrap();
        if batch.reset {
            balances.clear();
        }
        for balance in &batch.balances {
            balances.insert(balance.id.clone(), balance.clone());
        }

        if let Some(status) = &batch.cursor {
            let mut cursor = self.cursor.lock().unwrap();
            *cursor = match *cursor {
                Some(current) if !batch.reset => Some(current.max(status.block_number)),
                _ => Some(status.block_number),
            };
        }
        Ok(())
    }

    async fn get_wallet_balances(&self, user_address: &str) -> anyhow::Result<Vec<WalletBalance>> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.user_address == user_address)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TokenPriceRepository for MemoryStore {
    async fn get_token_prices(
        &self,
        token_addresses: &[String],
        since: i64,
    ) -> anyhow::Result<FxHashMap<String, Vec<PricePoint>>> {
        if self.fail_prices.load(Ordering::SeqCst) {
            return Err(anyhow!("price table unavailable"));
        }

        let prices = self.prices.lock().unwrap();
        Ok(token_addresses
            .iter()
            .filter_map(|token| {
                let points: Vec<PricePoint> = prices
                    .get(token)?
                    .iter()
                    .filter(|p| p.timestamp >= since)
                    .copied()
                    .collect();
                Some((token.clone(), points))
            })
            .collect())
    }
}

// ============================================
// Price feed
// ============================================

#[derive(Default)]
pub struct MockPriceFeed {
    series: Mutex<FxHashMap<String, Vec<PricePoint>>>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl MockPriceFeed {
    pub fn set(&self, token: &str, points: Vec<PricePoint>) {
        self.series
            .lock()
            .unwrap()
            .insert(token.to_string(), points);
    }

    pub fn fail(&self, token: &str) {
        self.failing.lock().unwrap().insert(token.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoricalPriceFeed for MockPriceFeed {
    async fn get_historical_prices(
        &self,
        token: &str,
        _num_days: u32,
    ) -> anyhow::Result<Vec<PricePoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(token) {
            return Err(anyhow!("rate limited"));
        }
        self.series
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| anyhow!("unknown token {}", token))
    }
}

// ============================================
// Subgraph
// ============================================

#[derive(Default)]
pub struct MockSubgraph {
    pub pools: Vec<Pool>,
    pub snapshots: Vec<SubgraphPoolSnapshot>,
    pub shares: Vec<PoolShare>,
    pub swaps: FxHashMap<String, Vec<Swap>>,
    pub pool_states: FxHashMap<(String, u64), PoolAtBlock>,
    pub indexed_block: u64,
    /// Day start to block number
    pub daily_blocks: BTreeMap<i64, u64>,
    pub holders: FxHashMap<String, TokenHolders>,
    pub fail_pool_state: bool,
}

#[async_trait]
impl SubgraphSource for MockSubgraph {
    async fn get_pools(&self) -> anyhow::Result<Vec<Pool>> {
        Ok(self.pools.clone())
    }

    async fn get_pool_snapshots(
        &self,
        filter: SnapshotFilter,
    ) -> anyhow::Result<Vec<SubgraphPoolSnapshot>> {
        let mut rows: Vec<SubgraphPoolSnapshot> = self
            .snapshots
            .iter()
            .filter(|s| match &filter {
                SnapshotFilter::Since(since) => s.timestamp >= *since,
                SnapshotFilter::Pools(ids) => ids.contains(&s.pool_id),
            })
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.timestamp);
        Ok(rows)
    }

    async fn get_pool_shares(
        &self,
        pool_ids: &[String],
        exclude: &[String],
    ) -> anyhow::Result<Vec<PoolShare>> {
        Ok(self
            .shares
            .iter()
            .filter(|s| pool_ids.contains(&s.pool_id) && !exclude.contains(&s.user_address))
            .cloned()
            .collect())
    }

    async fn get_swaps(&self, pool_id: &str, since: i64) -> anyhow::Result<Vec<Swap>> {
        Ok(self
            .swaps
            .get(pool_id)
            .map(|swaps| swaps.iter().filter(|s| s.timestamp >= since).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_pool_at_block(
        &self,
        pool_id: &str,
        block: u64,
    ) -> anyhow::Result<Option<PoolAtBlock>> {
        if self.fail_pool_state {
            return Err(anyhow!("indexer unavailable"));
        }
        Ok(self.pool_states.get(&(pool_id.to_string(), block)).cloned())
    }

    async fn get_indexed_block(&self) -> anyhow::Result<u64> {
        Ok(self.indexed_block)
    }

    async fn get_daily_blocks(&self, day_starts: &[i64]) -> anyhow::Result<Vec<DailyBlock>> {
        let mut blocks: Vec<DailyBlock> = day_starts
            .iter()
            .filter_map(|ts| {
                self.daily_blocks.get(ts).map(|number| DailyBlock {
                    number: *number,
                    timestamp: *ts,
                })
            })
            .collect();
        blocks.sort_by_key(|b| b.timestamp);
        Ok(blocks)
    }

    async fn get_token_holders(
        &self,
        token: &AuxiliaryTokenSettings,
    ) -> anyhow::Result<Option<TokenHolders>> {
        Ok(self.holders.get(&token.address).cloned())
    }
}

// ============================================
// Chain
// ============================================

/// Transfer logs and token balances of a fake chain.
pub struct MockChain {
    latest: AtomicU64,
    max_block_range: u64,
    pub events: Mutex<Vec<TransferEvent>>,
    balances: Mutex<FxHashMap<(Address, Address), U256>>,
    pub log_ranges: Mutex<Vec<(u64, u64)>>,
    pub balance_requests: Mutex<Vec<BalanceRequest>>,
    balance_calls: AtomicUsize,
    fail_balances: AtomicBool,
}

impl MockChain {
    pub fn new(latest: u64) -> Self {
        Self {
            latest: AtomicU64::new(latest),
            max_block_range: 500,
            events: Mutex::new(vec![]),
            balances: Mutex::new(FxHashMap::default()),
            log_ranges: Mutex::new(vec![]),
            balance_requests: Mutex::new(vec![]),
            balance_calls: AtomicUsize::new(0),
            fail_balances: AtomicBool::new(false),
        }
    }

    pub fn transfer(&self, contract: Address, from: Address, to: Address, block: u64) {
        self.events.lock().unwrap().push(TransferEvent {
            contract,
            from,
            to,
            amount: U256::from(1u64),
            block_number: Some(block),
        });
    }

    pub fn set_balance(&self, token: Address, account: Address, raw: U256) {
        self.balances.lock().unwrap().insert((token, account), raw);
    }

    pub fn fail_balances(&self) {
        self.fail_balances.store(true, Ordering::SeqCst);
    }

    /// Number of `fetch_balances` calls, successful or not.
    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<BalanceRequest> {
        self.balance_requests.lock().unwrap().clone()
    }

    pub fn ranges(&self) -> Vec<(u64, u64)> {
        self.log_ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferLogSource for MockChain {
    async fn latest_block(&self) -> anyhow::Result<u64> {
        Ok(self.latest.load(Ordering::SeqCst))
    }

    async fn get_transfer_events(
        &self,
        from_block: u64,
        to_block: u64,
        _topic: B256,
    ) -> crate::Result<Vec<TransferEvent>> {
        check_range(from_block, to_block, self.max_block_range)?;
        self.log_ranges.lock().unwrap().push((from_block, to_block));

        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.block_number
                    .map(|b| b >= from_block && b <= to_block)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BalanceFetcher for MockChain {
    async fn fetch_balances(&self, requests: &[BalanceRequest]) -> crate::Result<Vec<TokenBalance>> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_balances.load(Ordering::SeqCst) {
            return Err(anyhow!("multicall reverted").into());
        }

        self.balance_requests
            .lock()
            .unwrap()
            .extend_from_slice(requests);

        let balances = self.balances.lock().unwrap();
        Ok(requests
            .iter()
            .map(|r| TokenBalance {
                token: r.token,
                account: r.account,
                raw: balances
                    .get(&(r.token, r.account))
                    .copied()
                    .unwrap_or(U256::ZERO),
            })
            .collect())
    }
}
