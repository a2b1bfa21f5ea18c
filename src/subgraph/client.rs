use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::types::{
    collect_daily_blocks, daily_blocks_query, GraphQlResponse, Identified, Items,
    MetaResponse, PoolAtBlockResponse, RawBlock, RawHolder, RawPool, RawPoolShare,
    RawPoolSnapshot, RawSwap,
};
use super::{
    DailyBlock, PoolAtBlock, PoolShare, SnapshotFilter, SubgraphPoolSnapshot, SubgraphSource,
    Swap, TokenHolders,
};
use crate::config::{AuxiliaryTokenSettings, SubgraphSettings};
use crate::db::models::Pool;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const POOLS_QUERY: &str = r#"
query Pools($first: Int!, $lastId: String!) {
    items: pools(first: $first, orderBy: id, orderDirection: asc, where: { id_gt: $lastId }) {
        id address name poolType createTime totalShares
        tokens { address symbol name index token { pool { id } } }
    }
}
"#;

const SNAPSHOTS_SINCE_QUERY: &str = r#"
query PoolSnapshots($first: Int!, $lastId: String!, $since: Int!) {
    items: poolSnapshots(first: $first, orderBy: id, orderDirection: asc,
        where: { id_gt: $lastId, timestamp_gte: $since }) {
        id pool { id } timestamp liquidity totalShares swapVolume swapFees
        swapsCount holdersCount amounts
    }
}
"#;

const SNAPSHOTS_FOR_POOLS_QUERY: &str = r#"
query PoolSnapshots($first: Int!, $lastId: String!, $poolIds: [String!]!) {
    items: poolSnapshots(first: $first, orderBy: id, orderDirection: asc,
        where: { id_gt: $lastId, pool_in: $poolIds }) {
        id pool { id } timestamp liquidity totalShares swapVolume swapFees
        swapsCount holdersCount amounts
    }
}
"#;

const POOL_SHARES_QUERY: &str = r#"
query PoolShares($first: Int!, $lastId: String!, $poolIds: [String!]!, $exclude: [String!]!) {
    items: poolShares(first: $first, orderBy: id, orderDirection: asc,
        where: { id_gt: $lastId, poolId_in: $poolIds, userAddress_not_in: $exclude, balance_not: "0" }) {
        id poolId { id address } userAddress { id } balance
    }
}
"#;

const SWAPS_QUERY: &str = r#"
query Swaps($first: Int!, $lastId: String!, $poolId: String!, $since: Int!) {
    items: swaps(first: $first, orderBy: id, orderDirection: asc,
        where: { id_gt: $lastId, poolId: $poolId, timestamp_gte: $since }) {
        id timestamp tokenIn tokenOut tokenAmountIn tokenAmountOut
    }
}
"#;

const POOL_AT_BLOCK_QUERY: &str = r#"
query PoolAtBlock($id: ID!, $block: Int!) {
    pool(id: $id, block: { number: $block }) {
        totalShares swapFee swapsCount holdersCount totalSwapVolume totalSwapFee
        tokens { address balance }
    }
}
"#;

const META_QUERY: &str = "query Meta { _meta { block { number } } }";

/// GraphQL client for the pools and blocks subgraphs.
#[derive(Clone)]
pub struct SubgraphClient {
    client: Client,
    pools_url: String,
    blocks_url: String,
    page_size: usize,
}

impl SubgraphClient {
    pub fn new(settings: &SubgraphSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build subgraph HTTP client")?;

        Ok(Self {
            client,
            pools_url: settings.pools_url.clone(),
            blocks_url: settings.blocks_url.clone(),
            page_size: settings.page_size.max(1),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &str,
        variables: Value,
    ) -> anyhow::Result<T> {
        let response = self
            .client
            .post(url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .with_context(|| format!("Subgraph request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Subgraph {} returned an error status", url))?;

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Undecodable subgraph response from {}", url))?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            error!("GraphQL errors from {}: {:?}", url, messages);
            return Err(anyhow!("GraphQL errors from {}: {}", url, messages.join("; ")));
        }

        body.data
            .ok_or_else(|| anyhow!("Subgraph response from {} carried no data", url))
    }

    /// Page through a list aliased to `items`, keyed by ascending id.
    async fn query_all<T>(&self, url: &str, query: &str, variables: Value) -> anyhow::Result<Vec<T>>
    where
        T: DeserializeOwned + Identified,
    {
        let mut all = Vec::new();
        let mut last_id = String::new();

        loop {
            let mut vars = variables.clone();
            if let Value::Object(map) = &mut vars {
                map.insert("first".to_string(), json!(self.page_size));
                map.insert("lastId".to_string(), json!(last_id));
            }

            let page: Items<T> = self.query(url, query, vars).await?;
            let count = page.items.len();

            if let Some(last) = page.items.last() {
                last_id = last.id().to_string();
            }
            all.extend(page.items);

            if count < self.page_size {
                break;
            }
        }

        debug!("Fetched {} records from {}", all.len(), url);
        Ok(all)
    }

    async fn indexed_block(&self, url: &str) -> anyhow::Result<u64> {
        let meta: MetaResponse = self.query(url, META_QUERY, json!({})).await?;
        Ok(meta.meta.block.number)
    }
}

#[async_trait]
impl SubgraphSource for SubgraphClient {
    async fn get_pools(&self) -> anyhow::Result<Vec<Pool>> {
        let raw: Vec<RawPool> = self.query_all(&self.pools_url, POOLS_QUERY, json!({})).await?;
        Ok(raw.into_iter().map(Pool::from).collect())
    }

    async fn get_pool_snapshots(
        &self,
        filter: SnapshotFilter,
    ) -> anyhow::Result<Vec<SubgraphPoolSnapshot>> {
        let raw: Vec<RawPoolSnapshot> = match filter {
            SnapshotFilter::Since(since) => {
                self.query_all(&self.pools_url, SNAPSHOTS_SINCE_QUERY, json!({ "since": since }))
                    .await?
            },
            SnapshotFilter::Pools(pool_ids) => {
                if pool_ids.is_empty() {
                    return Ok(vec![]);
                }
                self.query_all(
                    &self.pools_url,
                    SNAPSHOTS_FOR_POOLS_QUERY,
                    json!({ "poolIds": pool_ids }),
                )
                .await?
            },
        };

        let mut snapshots: Vec<SubgraphPoolSnapshot> =
            raw.into_iter().map(SubgraphPoolSnapshot::from).collect();
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }

    async fn get_pool_shares(
        &self,
        pool_ids: &[String],
        exclude: &[String],
    ) -> anyhow::Result<Vec<PoolShare>> {
        if pool_ids.is_empty() {
            return Ok(vec![]);
        }

        let raw: Vec<RawPoolShare> = self
            .query_all(
                &self.pools_url,
                POOL_SHARES_QUERY,
                json!({ "poolIds": pool_ids, "exclude": exclude }),
            )
            .await?;

        Ok(raw.into_iter().map(PoolShare::from).collect())
    }

    async fn get_swaps(&self, pool_id: &str, since: i64) -> anyhow::Result<Vec<Swap>> {
        let raw: Vec<RawSwap> = self
            .query_all(
                &self.pools_url,
                SWAPS_QUERY,
                json!({ "poolId": pool_id, "since": since }),
            )
            .await?;

        let mut swaps: Vec<Swap> = raw.into_iter().map(Swap::from).collect();
        swaps.sort_by_key(|s| s.timestamp);
        Ok(swaps)
    }

    async fn get_pool_at_block(
        &self,
        pool_id: &str,
        block: u64,
    ) -> anyhow::Result<Option<PoolAtBlock>> {
        let response: PoolAtBlockResponse = self
            .query(
                &self.pools_url,
                POOL_AT_BLOCK_QUERY,
                json!({ "id": pool_id, "block": block }),
            )
            .await?;

        Ok(response.pool.map(PoolAtBlock::from))
    }

    async fn get_indexed_block(&self) -> anyhow::Result<u64> {
        self.indexed_block(&self.pools_url).await
    }

    async fn get_daily_blocks(&self, day_starts: &[i64]) -> anyhow::Result<Vec<DailyBlock>> {
        if day_starts.is_empty() {
            return Ok(vec![]);
        }

        let mut blocks = Vec::with_capacity(day_starts.len());
        // Keep each aliased query small enough for the indexer's complexity limit
        for chunk in day_starts.chunks(100) {
            let response: HashMap<String, Vec<RawBlock>> = self
                .query(&self.blocks_url, &daily_blocks_query(chunk), json!({}))
                .await?;
            blocks.extend(collect_daily_blocks(chunk, response));
        }

        blocks.sort_by_key(|b| b.timestamp);
        Ok(blocks)
    }

    async fn get_token_holders(
        &self,
        token: &AuxiliaryTokenSettings,
    ) -> anyhow::Result<Option<TokenHolders>> {
        let Some(url) = token.holders_subgraph_url.as_deref() else {
            return Ok(None);
        };

        let field = &token.holders_balance_field;
        let query = format!(
            r#"
            query Holders($first: Int!, $lastId: String!) {{
                items: users(first: $first, orderBy: id, orderDirection: asc,
                    where: {{ id_gt: $lastId, {field}_not: "0" }}) {{
                    id address balance: {field}
                }}
            }}
            "#,
            field = field
        );

        let block = self.indexed_block(url).await?;
        let raw: Vec<RawHolder> = self.query_all(url, &query, json!({})).await?;

        Ok(Some(TokenHolders {
            holders: raw.into_iter().map(Into::into).collect(),
            block,
        }))
    }
}
