//! Raw GraphQL response shapes and their conversion into domain records.
//!
//! BigInt and BigDecimal fields arrive as strings, Int fields as numbers.

use serde::{Deserialize, Deserializer};

use super::{
    DailyBlock, PoolAtBlock, PoolShare, PoolTokenBalance, SubgraphPoolSnapshot, Swap,
    TokenHolder,
};
use crate::db::models::{Pool, PoolToken, PoolType};
use crate::utils::{normalize_address, parse_f64};

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

/// Paged list aliased to `items` in every query.
#[derive(Debug, Deserialize)]
pub(crate) struct Items<T> {
    pub items: Vec<T>,
}

/// Entities paged by `id_gt`.
pub(crate) trait Identified {
    fn id(&self) -> &str;
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PoolRef {
    pub id: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetaBlock {
    pub number: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Meta {
    pub block: MetaBlock,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetaResponse {
    #[serde(rename = "_meta")]
    pub meta: Meta,
}

// ============================================
// Pools
// ============================================

#[derive(Debug, Deserialize)]
pub(crate) struct RawNestedToken {
    pub pool: Option<IdRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPoolToken {
    pub address: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub index: Option<i32>,
    pub token: Option<RawNestedToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawPool {
    pub id: String,
    pub address: String,
    pub name: Option<String>,
    pub pool_type: Option<String>,
    pub create_time: i64,
    pub total_shares: String,
    #[serde(default)]
    pub tokens: Option<Vec<RawPoolToken>>,
}

impl Identified for RawPool {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Map the subgraph's pool type names onto the families the engines track.
pub(crate) fn parse_pool_type(value: &str) -> PoolType {
    match value {
        "Weighted" | "WeightedPool" => PoolType::Weighted,
        "Stable" => PoolType::Stable,
        "MetaStable" => PoolType::MetaStable,
        "StablePhantom" | "ComposableStable" => PoolType::PhantomStable,
        "LiquidityBootstrapping" => PoolType::LiquidityBootstrapping,
        "Element" => PoolType::Element,
        "Investment" => PoolType::Investment,
        t if t.ends_with("Linear") => PoolType::Linear,
        _ => PoolType::Unknown,
    }
}

impl From<RawPool> for Pool {
    fn from(raw: RawPool) -> Self {
        let tokens = raw
            .tokens
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, token)| PoolToken {
                address: normalize_address(&token.address),
                symbol: token.symbol,
                name: token.name,
                index: token.index.unwrap_or(position as i32),
                nested_pool_id: token.token.and_then(|t| t.pool).map(|p| p.id),
            })
            .collect();

        Pool {
            id: raw.id,
            address: normalize_address(&raw.address),
            name: raw.name.unwrap_or_default(),
            pool_type: raw
                .pool_type
                .as_deref()
                .map(parse_pool_type)
                .unwrap_or(PoolType::Unknown),
            create_time: raw.create_time,
            total_shares_num: parse_f64(&raw.total_shares),
            tokens,
        }
    }
}

// ============================================
// Snapshots
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawPoolSnapshot {
    pub id: String,
    pub pool: IdRef,
    pub timestamp: i64,
    pub liquidity: String,
    pub total_shares: String,
    pub swap_volume: String,
    pub swap_fees: String,
    #[serde(deserialize_with = "int_from_string")]
    pub swaps_count: i64,
    #[serde(deserialize_with = "int_from_string")]
    pub holders_count: i64,
    #[serde(default)]
    pub amounts: Vec<String>,
}

impl Identified for RawPoolSnapshot {
    fn id(&self) -> &str {
        &self.id
    }
}

impl From<RawPoolSnapshot> for SubgraphPoolSnapshot {
    fn from(raw: RawPoolSnapshot) -> Self {
        Self {
            id: raw.id,
            pool_id: raw.pool.id,
            timestamp: raw.timestamp,
            liquidity: parse_f64(&raw.liquidity),
            total_shares: raw.total_shares,
            swap_volume: parse_f64(&raw.swap_volume),
            swap_fees: parse_f64(&raw.swap_fees),
            swaps_count: raw.swaps_count,
            holders_count: raw.holders_count,
            amounts: raw.amounts,
        }
    }
}

// ============================================
// Shares, swaps, holders
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawPoolShare {
    pub id: String,
    pub pool_id: PoolRef,
    pub user_address: IdRef,
    pub balance: String,
}

impl Identified for RawPoolShare {
    fn id(&self) -> &str {
        &self.id
    }
}

impl From<RawPoolShare> for PoolShare {
    fn from(raw: RawPoolShare) -> Self {
        Self {
            pool_id: raw.pool_id.id,
            pool_address: normalize_address(&raw.pool_id.address),
            user_address: normalize_address(&raw.user_address.id),
            balance: raw.balance,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSwap {
    pub id: String,
    pub timestamp: i64,
    pub token_in: String,
    pub token_out: String,
    pub token_amount_in: String,
    pub token_amount_out: String,
}

impl Identified for RawSwap {
    fn id(&self) -> &str {
        &self.id
    }
}

impl From<RawSwap> for Swap {
    fn from(raw: RawSwap) -> Self {
        Self {
            timestamp: raw.timestamp,
            token_in: normalize_address(&raw.token_in),
            token_out: normalize_address(&raw.token_out),
            token_amount_in: parse_f64(&raw.token_amount_in),
            token_amount_out: parse_f64(&raw.token_amount_out),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawHolder {
    pub id: String,
    pub address: String,
    pub balance: String,
}

impl Identified for RawHolder {
    fn id(&self) -> &str {
        &self.id
    }
}

impl From<RawHolder> for TokenHolder {
    fn from(raw: RawHolder) -> Self {
        Self {
            address: normalize_address(&raw.address),
            balance: raw.balance,
        }
    }
}

// ============================================
// Point-in-time pool state
// ============================================

#[derive(Debug, Deserialize)]
pub(crate) struct RawTokenBalance {
    pub address: String,
    pub balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawPoolAtBlock {
    pub total_shares: String,
    pub swap_fee: String,
    #[serde(deserialize_with = "int_from_string")]
    pub swaps_count: i64,
    #[serde(deserialize_with = "int_from_string")]
    pub holders_count: i64,
    pub total_swap_volume: String,
    pub total_swap_fee: String,
    #[serde(default)]
    pub tokens: Option<Vec<RawTokenBalance>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PoolAtBlockResponse {
    pub pool: Option<RawPoolAtBlock>,
}

impl From<RawPoolAtBlock> for PoolAtBlock {
    fn from(raw: RawPoolAtBlock) -> Self {
        Self {
            total_shares: raw.total_shares,
            swap_fee: parse_f64(&raw.swap_fee),
            swaps_count: raw.swaps_count,
            holders_count: raw.holders_count,
            total_swap_volume: parse_f64(&raw.total_swap_volume),
            total_swap_fee: parse_f64(&raw.total_swap_fee),
            tokens: raw
                .tokens
                .unwrap_or_default()
                .into_iter()
                .map(|t| PoolTokenBalance {
                    address: normalize_address(&t.address),
                    balance: t.balance,
                })
                .collect(),
        }
    }
}

// ============================================
// Blocks
// ============================================

#[derive(Debug, Deserialize)]
pub(crate) struct RawBlock {
    #[serde(deserialize_with = "u64_from_string")]
    pub number: u64,
}

/// One aliased `blocks` lookup per day start.
pub(crate) fn daily_blocks_query(day_starts: &[i64]) -> String {
    let lookups: Vec<String> = day_starts
        .iter()
        .map(|ts| {
            format!(
                r#"t{ts}: blocks(first: 1, orderBy: timestamp, orderDirection: asc, where: {{ timestamp_gte: "{ts}", timestamp_lt: "{end}" }}) {{ number }}"#,
                ts = ts,
                end = ts + 600
            )
        })
        .collect();

    format!("query DailyBlocks {{ {} }}", lookups.join(" "))
}

/// Pair aliased lookups back with their day starts, ascending.
pub(crate) fn collect_daily_blocks(
    day_starts: &[i64],
    mut response: std::collections::HashMap<String, Vec<RawBlock>>,
) -> Vec<DailyBlock> {
    let mut blocks: Vec<DailyBlock> = day_starts
        .iter()
        .filter_map(|ts| {
            let block = response.remove(&format!("t{}", ts))?.into_iter().next()?;
            Some(DailyBlock {
                number: block.number,
                timestamp: *ts,
            })
        })
        .collect();

    blocks.sort_by_key(|b| b.timestamp);
    blocks
}

// ============================================
// Deserialize helpers
// ============================================

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrInt {
    Str(String),
    Int(i64),
}

fn int_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Int(v) => Ok(v),
        StringOrInt::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn u64_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = int_from_string(deserializer)?;
    u64::try_from(value).map_err(serde::de::Error::custom)
}
