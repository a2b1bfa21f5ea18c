use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio_util::sync::CancellationToken;

use crate::clock::{day_start, Clock, SECONDS_PER_DAY};
use crate::db::models::{Pool, PoolSnapshot, PricePoint};
use crate::db::{PoolRepository, SnapshotRepository};
use crate::error::{Error, Result};
use crate::prices::{PriceSeriesLoader, PriceTimeSeries};
use crate::subgraph::{PoolAtBlock, SnapshotFilter, SubgraphPoolSnapshot, SubgraphSource, Swap};
use crate::utils::parse_f64;

/// Pools at or below this many shares are treated as empty.
pub const MIN_TOTAL_SHARES: f64 = 1e-12;

/// How far back a backfill reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillRange {
    /// Today plus the previous `n - 1` days
    Days(u32),
    /// Every day since the pool was created
    SinceCreation,
}

/// Lookback window of snapshot reads, measured from the start of today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRange {
    ThirtyDays,
    NinetyDays,
    OneHundredEightyDays,
    OneYear,
    AllTime,
}

impl SnapshotRange {
    pub fn since(&self, start_of_today: i64) -> i64 {
        let days = match self {
            SnapshotRange::ThirtyDays => 30,
            SnapshotRange::NinetyDays => 90,
            SnapshotRange::OneHundredEightyDays => 180,
            SnapshotRange::OneYear => 365,
            SnapshotRange::AllTime => return 0,
        };
        start_of_today - days * SECONDS_PER_DAY
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSyncReport {
    pub snapshots_written: usize,
    pub pools_reconstructed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub days_written: usize,
    pub days_skipped: usize,
}

/// Cumulative counters a pool's first snapshot in a batch is diffed against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Baseline {
    pub volume: f64,
    pub fees: f64,
}

/// Mirrors daily pool snapshots from the subgraph and rebuilds the ones it
/// does not index.
pub struct SnapshotSyncEngine {
    subgraph: Arc<dyn SubgraphSource>,
    pools: Arc<dyn PoolRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    prices: Arc<PriceSeriesLoader>,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
}

impl SnapshotSyncEngine {
    pub fn new(
        subgraph: Arc<dyn SubgraphSource>,
        pools: Arc<dyn PoolRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        prices: Arc<PriceSeriesLoader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subgraph,
            pools,
            snapshots,
            prices,
            clock,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Backfills stop between days once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Refresh the pool registry from the subgraph.
    pub async fn sync_pools(&self) -> Result<usize> {
        let pools = self.subgraph.get_pools().await?;
        self.pools.upsert_pools(&pools).await?;
        info!("Pool registry refreshed with {} pools", pools.len());
        Ok(pools.len())
    }

    /// Mirror the last `days_to_sync` days of subgraph snapshots, then rebuild
    /// the pools the subgraph does not snapshot.
    pub async fn sync_latest(&self, days_to_sync: u32) -> Result<SnapshotSyncReport> {
        let started = Instant::now();
        let days = i64::from(days_to_sync.max(1));
        let today = self.clock.start_of_today();
        let window_start = today - (days - 1) * SECONDS_PER_DAY;
        let baseline_day = today - days * SECONDS_PER_DAY;

        let fetched = self
            .subgraph
            .get_pool_snapshots(SnapshotFilter::Since(window_start))
            .await?;

        let baselines: FxHashMap<String, Baseline> = self
            .snapshots
            .get_snapshots_at(baseline_day)
            .await?
            .into_iter()
            .map(|s| {
                let baseline = Baseline {
                    volume: s.total_swap_volume,
                    fees: s.total_swap_fee,
                };
                (s.pool_id, baseline)
            })
            .collect();

        let mut rows = Vec::with_capacity(fetched.len());
        for (pool_id, pool_snapshots) in group_by_pool(fetched) {
            let baseline = baselines.get(&pool_id).copied().unwrap_or_default();
            rows.extend(daily_snapshots(&pool_snapshots, baseline));
        }

        self.snapshots.upsert_snapshots(&rows).await?;
        info!(
            "Synced {} pool snapshots since {} in {:?}",
            rows.len(),
            window_start,
            started.elapsed()
        );

        let candidates: Vec<Pool> = self
            .pools
            .get_pools()
            .await?
            .into_iter()
            .filter(Pool::needs_reconstructed_snapshots)
            .collect();

        let mut reconstructed = 0;
        for pool in order_nested_first(candidates) {
            if self.cancellation_token.is_cancelled() {
                info!("Snapshot reconstruction cancelled");
                break;
            }
            self.backfill(&pool.id, BackfillRange::Days(days_to_sync.max(1)))
                .await?;
            reconstructed += 1;
        }

        Ok(SnapshotSyncReport {
            snapshots_written: rows.len(),
            pools_reconstructed: reconstructed,
        })
    }

    /// Full subgraph history of `pool_ids`, diffed from a zero baseline.
    /// Rows that already exist are left untouched.
    pub async fn load_all_snapshots(&self, pool_ids: &[String]) -> Result<usize> {
        let fetched = self
            .subgraph
            .get_pool_snapshots(SnapshotFilter::Pools(pool_ids.to_vec()))
            .await?;

        let rows: Vec<PoolSnapshot> = group_by_pool(fetched)
            .into_iter()
            .flat_map(|(_, snapshots)| daily_snapshots(&snapshots, Baseline::default()))
            .collect();

        self.snapshots.insert_missing_snapshots(&rows).await?;
        info!("Loaded {} historical snapshots for {} pools", rows.len(), pool_ids.len());
        Ok(rows.len())
    }

    /// Rebuild daily snapshots from swaps and point-in-time pool state.
    ///
    /// Each day commits on its own, so a cancelled or failed run keeps the
    /// days already written and can simply be re-run.
    pub async fn backfill(&self, pool_id: &str, range: BackfillRange) -> Result<BackfillReport> {
        let pool = self
            .pools
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| Error::PoolNotFound(pool_id.to_string()))?;

        if pool.pool_type.is_underlying() {
            return Err(Error::UnsupportedPoolType {
                pool_id: pool.id.clone(),
                pool_type: pool.pool_type.to_string(),
            });
        }

        let today = self.clock.start_of_today();
        let num_days = match range {
            BackfillRange::Days(n) => i64::from(n.max(1)),
            BackfillRange::SinceCreation => {
                ((today - day_start(pool.create_time)) / SECONDS_PER_DAY).max(0) + 1
            },
        };
        let day_starts: Vec<i64> = (0..num_days)
            .rev()
            .map(|i| today - i * SECONDS_PER_DAY)
            .collect();
        let since = day_starts.first().copied().unwrap_or(today);

        let prices = self.load_price_series(&pool, num_days, since).await?;
        let swaps = self.subgraph.get_swaps(&pool.id, since).await?;
        let blocks = self.subgraph.get_daily_blocks(&day_starts).await?;

        let mut report = BackfillReport::default();
        for block in blocks {
            if self.cancellation_token.is_cancelled() {
                info!("Backfill of pool {} cancelled at day {}", pool.id, block.timestamp);
                break;
            }

            let Some(state) = self.subgraph.get_pool_at_block(&pool.id, block.number).await? else {
                info!(
                    "Pool {} does not exist at block {}, skipping day {}",
                    pool.id, block.number, block.timestamp
                );
                report.days_skipped += 1;
                continue;
            };

            let snapshot = reconstruct_day(&pool, block.timestamp, &state, &swaps, &prices);
            self.snapshots.upsert_snapshots(&[snapshot]).await?;
            report.days_written += 1;
        }

        info!(
            "Backfilled pool {}: {} days written, {} skipped",
            pool.id, report.days_written, report.days_skipped
        );
        Ok(report)
    }

    /// Leaf tokens come from the price loader, nested pool tokens from the
    /// nested pool's own share price history.
    async fn load_price_series(
        &self,
        pool: &Pool,
        num_days: i64,
        since: i64,
    ) -> Result<PriceTimeSeries> {
        let mut series = PriceTimeSeries::new();
        let feed_days = u32::try_from(num_days).unwrap_or(u32::MAX);

        for token in pool.value_tokens() {
            let points = match &token.nested_pool_id {
                Some(nested_id) => {
                    let nested = self.snapshots.get_snapshots_for_pool(nested_id, 0).await?;
                    if nested.is_empty() {
                        warn!(
                            "Nested pool {} of {} has no snapshots yet, its token prices as 0",
                            nested_id, pool.id
                        );
                    }
                    nested
                        .iter()
                        .map(|s| PricePoint::new(s.timestamp, s.share_price))
                        .collect()
                },
                None => self.prices.load(&token.address, feed_days, since).await,
            };
            series.insert(&token.address, points);
        }

        Ok(series)
    }

    pub async fn snapshots_for_pool(
        &self,
        pool_id: &str,
        range: SnapshotRange,
    ) -> Result<Vec<PoolSnapshot>> {
        let since = range.since(self.clock.start_of_today());
        Ok(self.snapshots.get_snapshots_for_pool(pool_id, since).await?)
    }

    pub async fn snapshot_for_pool(
        &self,
        pool_id: &str,
        timestamp: i64,
    ) -> Result<Option<PoolSnapshot>> {
        Ok(self
            .snapshots
            .get_snapshot(pool_id, day_start(timestamp))
            .await?)
    }

    /// Snapshots of every pool with outstanding shares.
    pub async fn snapshots_for_all_pools(&self, range: SnapshotRange) -> Result<Vec<PoolSnapshot>> {
        let since = range.since(self.clock.start_of_today());
        Ok(self
            .snapshots
            .get_snapshots_since(since, MIN_TOTAL_SHARES)
            .await?)
    }
}

/// Split into per-pool runs, pools in first-seen order, each run keeping the
/// input (ascending timestamp) order.
pub(crate) fn group_by_pool(
    snapshots: Vec<SubgraphPoolSnapshot>,
) -> Vec<(String, Vec<SubgraphPoolSnapshot>)> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: FxHashMap<String, Vec<SubgraphPoolSnapshot>> = FxHashMap::default();

    for snapshot in snapshots {
        if !grouped.contains_key(&snapshot.pool_id) {
            order.push(snapshot.pool_id.clone());
        }
        grouped
            .entry(snapshot.pool_id.clone())
            .or_default()
            .push(snapshot);
    }

    order
        .into_iter()
        .filter_map(|id| grouped.remove(&id).map(|rows| (id, rows)))
        .collect()
}

/// Turn one pool's cumulative snapshots into daily rows.
///
/// Each row diffs against the previous one; the first against `baseline`.
/// Counter regressions clamp to zero.
pub(crate) fn daily_snapshots(
    snapshots: &[SubgraphPoolSnapshot],
    baseline: Baseline,
) -> Vec<PoolSnapshot> {
    let mut previous = baseline;

    snapshots
        .iter()
        .map(|snapshot| {
            let volume_delta = snapshot.swap_volume - previous.volume;
            let fee_delta = snapshot.swap_fees - previous.fees;

            if volume_delta < 0.0 || fee_delta < 0.0 {
                warn!(
                    "Cumulative counters regressed for pool {} at {}: volume {} -> {}, fees {} -> {}",
                    snapshot.pool_id,
                    snapshot.timestamp,
                    previous.volume,
                    snapshot.swap_volume,
                    previous.fees,
                    snapshot.swap_fees
                );
            }

            previous = Baseline {
                volume: snapshot.swap_volume,
                fees: snapshot.swap_fees,
            };

            let timestamp = day_start(snapshot.timestamp);
            let total_shares_num = parse_f64(&snapshot.total_shares);

            PoolSnapshot {
                id: PoolSnapshot::snapshot_id(&snapshot.pool_id, timestamp),
                pool_id: snapshot.pool_id.clone(),
                timestamp,
                total_liquidity: snapshot.liquidity,
                total_shares: snapshot.total_shares.clone(),
                total_shares_num,
                share_price: PoolSnapshot::compute_share_price(snapshot.liquidity, total_shares_num),
                amounts: snapshot.amounts.clone(),
                total_swap_volume: snapshot.swap_volume,
                total_swap_fee: snapshot.swap_fees,
                swaps_count: snapshot.swaps_count,
                holders_count: snapshot.holders_count,
                volume_24h: volume_delta.max(0.0),
                fees_24h: fee_delta.max(0.0),
            }
        })
        .collect()
}

/// Notional of the pool's swaps in `[day, day + 1d)`.
///
/// Swaps in or out of the pool's own share token are joins/exits routed as
/// swaps and are left out. Each swap is priced by its input token, or by its
/// output token when the input has no price.
pub(crate) fn day_volume(
    pool_address: &str,
    day: i64,
    swaps: &[Swap],
    prices: &PriceTimeSeries,
) -> f64 {
    let end = day + SECONDS_PER_DAY;

    swaps
        .iter()
        .filter(|s| s.timestamp >= day && s.timestamp < end)
        .filter(|s| s.token_in != pool_address && s.token_out != pool_address)
        .map(|s| {
            let price_in = prices.price_at(&s.token_in, s.timestamp);
            if price_in != 0.0 {
                return price_in * s.token_amount_in;
            }
            prices.price_at(&s.token_out, s.timestamp) * s.token_amount_out
        })
        .sum()
}

/// Snapshot of `pool` for `day` from its state at the day's first block.
/// Balances are priced at the end of the day.
pub(crate) fn reconstruct_day(
    pool: &Pool,
    day: i64,
    state: &PoolAtBlock,
    swaps: &[Swap],
    prices: &PriceTimeSeries,
) -> PoolSnapshot {
    let end = day + SECONDS_PER_DAY;

    let total_liquidity: f64 = state
        .tokens
        .iter()
        .map(|t| parse_f64(&t.balance) * prices.price_at(&t.address, end))
        .sum();
    let total_liquidity = if total_liquidity.is_finite() {
        total_liquidity
    } else {
        0.0
    };

    let total_shares_num = parse_f64(&state.total_shares);
    let volume_24h = day_volume(&pool.address, day, swaps, prices);

    PoolSnapshot {
        id: PoolSnapshot::snapshot_id(&pool.id, day),
        pool_id: pool.id.clone(),
        timestamp: day,
        total_liquidity,
        total_shares: state.total_shares.clone(),
        total_shares_num,
        share_price: PoolSnapshot::compute_share_price(total_liquidity, total_shares_num),
        amounts: state.tokens.iter().map(|t| t.balance.clone()).collect(),
        total_swap_volume: state.total_swap_volume,
        total_swap_fee: state.total_swap_fee,
        swaps_count: state.swaps_count,
        holders_count: state.holders_count,
        volume_24h,
        fees_24h: volume_24h * state.swap_fee,
    }
}

/// Order pools so every nested pool comes before the composites holding it.
/// Nested pools outside `pools` impose no ordering.
pub(crate) fn order_nested_first(pools: Vec<Pool>) -> Vec<Pool> {
    fn visit(
        id: &str,
        by_id: &FxHashMap<String, Pool>,
        visited: &mut FxHashSet<String>,
        ordered: &mut Vec<Pool>,
    ) {
        if !visited.insert(id.to_string()) {
            return;
        }
        let Some(pool) = by_id.get(id) else {
            return;
        };
        for nested in pool.nested_pool_ids() {
            visit(nested, by_id, visited, ordered);
        }
        ordered.push(pool.clone());
    }

    let ids: Vec<String> = pools.iter().map(|p| p.id.clone()).collect();
    let by_id: FxHashMap<String, Pool> = pools.into_iter().map(|p| (p.id.clone(), p)).collect();
    let mut visited = FxHashSet::default();
    let mut ordered = Vec::with_capacity(ids.len());

    for id in &ids {
        visit(id, &by_id, &mut visited, &mut ordered);
    }

    debug!("Reconstruction order: {:?}", ordered.iter().map(|p| &p.id).collect::<Vec<_>>());
    ordered
}
