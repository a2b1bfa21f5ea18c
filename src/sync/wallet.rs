use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use alloy::sol_types::SolEvent;
use anyhow::Context;
use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};

use super::snapshots::MIN_TOTAL_SHARES;
use crate::abis::Transfer;
use crate::config::AuxiliaryTokenSettings;
use crate::db::models::{SyncStatus, SyncType, WalletBalance, WalletBalanceBatch};
use crate::db::{PoolRepository, WalletRepository};
use crate::error::{Error, Result};
use crate::rpc::{
    address_key, parse_address, BalanceFetcher, BalanceRequest, TokenBalance, TransferLogSource,
};
use crate::subgraph::{PoolShare, SubgraphSource};
use crate::utils::{format_units, normalize_address, u256_to_f64, ZERO_ADDRESS};

/// Pool share tokens are always 18 decimals.
const POOL_SHARE_DECIMALS: u8 = 18;

/// Pool ids per holder query during bootstrap.
const INIT_POOL_CHUNK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    pub balances: usize,
    pub block: u64,
}

/// Outcome of one incremental catch-up pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletSyncReport {
    pub from_block: u64,
    pub to_block: u64,
    pub refreshed: usize,
}

/// What a tracked token address stands for.
#[derive(Debug, Clone)]
enum Tracked {
    Pool(String),
    Auxiliary(usize),
}

/// Keeps per-account pool share balances current.
///
/// A bootstrap loads full holder lists from the subgraph; afterwards each
/// pass follows `Transfer` logs from the persisted cursor and re-reads the
/// balances of every touched account.
pub struct WalletBalanceSyncEngine {
    subgraph: Arc<dyn SubgraphSource>,
    pools: Arc<dyn PoolRepository>,
    wallets: Arc<dyn WalletRepository>,
    logs: Arc<dyn TransferLogSource>,
    balances: Arc<dyn BalanceFetcher>,
    vault_address: String,
    auxiliary_tokens: Vec<AuxiliaryTokenSettings>,
    max_block_range: u64,
}

impl WalletBalanceSyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subgraph: Arc<dyn SubgraphSource>,
        pools: Arc<dyn PoolRepository>,
        wallets: Arc<dyn WalletRepository>,
        logs: Arc<dyn TransferLogSource>,
        balances: Arc<dyn BalanceFetcher>,
        vault_address: &str,
        auxiliary_tokens: Vec<AuxiliaryTokenSettings>,
        max_block_range: u64,
    ) -> Self {
        let auxiliary_tokens = auxiliary_tokens
            .into_iter()
            .map(|mut t| {
                t.address = normalize_address(&t.address);
                t.underlying_pool_address = normalize_address(&t.underlying_pool_address);
                t
            })
            .collect();

        Self {
            subgraph,
            pools,
            wallets,
            logs,
            balances,
            vault_address: normalize_address(vault_address),
            auxiliary_tokens,
            max_block_range,
        }
    }

    /// Rebuild every balance row from subgraph holder lists.
    ///
    /// Existing rows are discarded and the cursor is set to the lowest block
    /// the consulted subgraphs have indexed.
    pub async fn init(&self) -> Result<InitReport> {
        let started = Instant::now();
        let mut block = self.subgraph.get_indexed_block().await?;

        let pools = self.pools.get_pools_with_shares(MIN_TOTAL_SHARES).await?;
        let pool_ids: Vec<String> = pools.iter().map(|p| p.id.clone()).collect();
        let exclude = self.excluded_holders();

        let mut balances = Vec::new();
        for chunk in pool_ids.chunks(INIT_POOL_CHUNK) {
            let shares = self.subgraph.get_pool_shares(chunk, &exclude).await?;
            balances.extend(shares.into_iter().filter_map(share_balance));
        }

        for token in &self.auxiliary_tokens {
            let Some(holders) = self.subgraph.get_token_holders(token).await? else {
                continue;
            };
            block = block.min(holders.block);
            balances.extend(
                holders
                    .holders
                    .into_iter()
                    .filter(|h| h.address != ZERO_ADDRESS)
                    .map(|h| {
                        WalletBalance::for_auxiliary(&token.key_prefix, &token.address, &h.address, h.balance)
                    }),
            );
        }

        let count = balances.len();
        self.wallets
            .commit_wallet_batch(&WalletBalanceBatch {
                reset: true,
                balances,
                cursor: Some(SyncStatus::new(SyncType::Wallet, block)),
            })
            .await?;

        info!(
            "Wallet balances bootstrapped: {} rows across {} pools at block {} in {:?}",
            count,
            pool_ids.len(),
            block,
            started.elapsed()
        );
        Ok(InitReport {
            balances: count,
            block,
        })
    }

    /// Load one pool's holders. Sets the cursor only if none exists yet.
    pub async fn init_pool(&self, pool_id: &str) -> Result<usize> {
        let pool = self
            .pools
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| Error::PoolNotFound(pool_id.to_string()))?;

        let block = self.subgraph.get_indexed_block().await?;
        let shares = self
            .subgraph
            .get_pool_shares(&[pool.id.clone()], &self.excluded_holders())
            .await?;
        let balances: Vec<WalletBalance> = shares.into_iter().filter_map(share_balance).collect();

        let cursor = match self.wallets.get_sync_status(SyncType::Wallet).await? {
            Some(_) => None,
            None => Some(SyncStatus::new(SyncType::Wallet, block)),
        };

        let count = balances.len();
        self.wallets
            .commit_wallet_batch(&WalletBalanceBatch {
                reset: false,
                balances,
                cursor,
            })
            .await?;

        info!("Loaded {} holder balances for pool {}", count, pool.id);
        Ok(count)
    }

    /// Catch up on at most one capped block range past the cursor.
    ///
    /// Returns `None` when the chain head has not moved past the cursor.
    pub async fn sync_changed(&self) -> Result<Option<WalletSyncReport>> {
        let status = self
            .wallets
            .get_sync_status(SyncType::Wallet)
            .await?
            .ok_or_else(|| Error::NotInitialized {
                domain: SyncType::Wallet.to_string(),
            })?;

        let latest = self.logs.latest_block().await?;
        let from_block = status.block_number + 1;
        if latest < from_block {
            debug!("Chain head {} not past wallet cursor {}", latest, status.block_number);
            return Ok(None);
        }

        let to_block = if latest - from_block > self.max_block_range {
            from_block + self.max_block_range
        } else {
            latest
        };

        let events = self
            .logs
            .get_transfer_events(from_block, to_block, Transfer::SIGNATURE_HASH)
            .await?;

        let tracked = self.tracked_tokens().await?;

        let mut seen: FxHashSet<BalanceRequest> = FxHashSet::default();
        let mut requests = Vec::new();
        for event in events.iter().filter(|e| tracked.contains_key(&e.contract)) {
            for account in [event.from, event.to] {
                if account == Address::ZERO {
                    continue;
                }
                let request = BalanceRequest::new(event.contract, account);
                if seen.insert(request) {
                    requests.push(request);
                }
            }
        }

        let balances = if requests.is_empty() {
            vec![]
        } else {
            let fetched = self.balances.fetch_balances(&requests).await?;
            self.to_wallet_balances(&fetched, &tracked)?
        };

        let refreshed = balances.len();
        self.wallets
            .commit_wallet_batch(&WalletBalanceBatch {
                reset: false,
                balances,
                cursor: Some(SyncStatus::new(SyncType::Wallet, to_block)),
            })
            .await?;

        info!(
            "Wallet sync blocks {}..={}: {} transfers, {} balances refreshed",
            from_block,
            to_block,
            events.len(),
            refreshed
        );
        Ok(Some(WalletSyncReport {
            from_block,
            to_block,
            refreshed,
        }))
    }

    /// Re-read one account's balance in one pool, plus any auxiliary token
    /// wrapping that pool. The cursor is not touched.
    pub async fn sync_one(&self, user_address: &str, pool_id: &str) -> Result<Vec<WalletBalance>> {
        let pool = self
            .pools
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| Error::PoolNotFound(pool_id.to_string()))?;

        let account = parse_address(user_address)?;
        if account == Address::ZERO {
            return Ok(vec![]);
        }

        let pool_token = parse_address(&pool.address)?;
        let mut tracked: FxHashMap<Address, Tracked> = FxHashMap::default();
        tracked.insert(pool_token, Tracked::Pool(pool.id.clone()));
        let mut requests = vec![BalanceRequest::new(pool_token, account)];

        for (i, token) in self.auxiliary_tokens.iter().enumerate() {
            if token.underlying_pool_address == pool.address {
                let address = parse_address(&token.address)?;
                tracked.insert(address, Tracked::Auxiliary(i));
                requests.push(BalanceRequest::new(address, account));
            }
        }

        let fetched = self.balances.fetch_balances(&requests).await?;
        let balances = self.to_wallet_balances(&fetched, &tracked)?;

        self.wallets
            .commit_wallet_batch(&WalletBalanceBatch {
                reset: false,
                balances: balances.clone(),
                cursor: None,
            })
            .await?;

        Ok(balances)
    }

    fn excluded_holders(&self) -> Vec<String> {
        vec![ZERO_ADDRESS.to_string(), self.vault_address.clone()]
    }

    /// Pool share tokens and auxiliary tokens by contract address.
    async fn tracked_tokens(&self) -> Result<FxHashMap<Address, Tracked>> {
        let mut tracked = FxHashMap::default();

        for pool in self.pools.get_pools().await? {
            let address = parse_address(&pool.address)?;
            tracked.insert(address, Tracked::Pool(pool.id));
        }
        for (i, token) in self.auxiliary_tokens.iter().enumerate() {
            tracked.insert(parse_address(&token.address)?, Tracked::Auxiliary(i));
        }

        Ok(tracked)
    }

    fn to_wallet_balances(
        &self,
        fetched: &[TokenBalance],
        tracked: &FxHashMap<Address, Tracked>,
    ) -> Result<Vec<WalletBalance>> {
        let mut balances = Vec::with_capacity(fetched.len());
        for b in fetched.iter().filter(|b| b.account != Address::ZERO) {
            let token = address_key(&b.token);
            let user = address_key(&b.account);

            let balance = match tracked.get(&b.token) {
                Some(Tracked::Pool(pool_id)) => {
                    let mut balance = WalletBalance::for_pool(
                        pool_id,
                        &token,
                        &user,
                        format_units(b.raw, POOL_SHARE_DECIMALS).context("pool share balance")?,
                    );
                    balance.balance_num = u256_to_f64(b.raw, POOL_SHARE_DECIMALS);
                    balance
                },
                Some(Tracked::Auxiliary(i)) => {
                    let Some(aux) = self.auxiliary_tokens.get(*i) else {
                        continue;
                    };
                    let mut balance = WalletBalance::for_auxiliary(
                        &aux.key_prefix,
                        &token,
                        &user,
                        format_units(b.raw, aux.decimals)
                            .with_context(|| format!("{} balance", aux.key_prefix))?,
                    );
                    balance.balance_num = u256_to_f64(b.raw, aux.decimals);
                    balance
                },
                None => continue,
            };
            balances.push(balance);
        }
        Ok(balances)
    }
}

fn share_balance(share: PoolShare) -> Option<WalletBalance> {
    if share.user_address == ZERO_ADDRESS {
        return None;
    }
    Some(WalletBalance::for_pool(
        &share.pool_id,
        &share.pool_address,
        &share.user_address,
        share.balance,
    ))
}
