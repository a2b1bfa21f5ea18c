use async_trait::async_trait;
use log::error;
use rustc_hash::FxHashMap;
use tokio_postgres::types::ToSql;

use crate::db::models::{
    Pool, PoolSnapshot, PoolToken, PricePoint, SyncStatus, SyncType, WalletBalance,
    WalletBalanceBatch,
};
use crate::db::postgres::PostgresClient;
use crate::db::repository::{
    PoolRepository, SnapshotRepository, TokenPriceRepository, WalletRepository,
};

const BATCH_SIZE: usize = 500;

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

/// Build `($1, $2, ...), ($n+1, ...)` for a multi-row VALUES clause.
fn values_placeholders(rows: usize, cols_per_row: usize) -> String {
    (0..rows)
        .map(|i| {
            let start = i * cols_per_row + 1;
            let placeholders: Vec<String> = (start..start + cols_per_row)
                .map(|n| format!("${}", n))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

const SNAPSHOT_COLUMNS: &str = r#"
    id, pool_id, timestamp, total_liquidity, total_shares, total_shares_num,
    share_price, amounts, total_swap_volume, total_swap_fee, swaps_count,
    holders_count, volume_24h, fees_24h
"#;

const SNAPSHOT_COLS_PER_ROW: usize = 14;

fn snapshot_params(snapshot: &PoolSnapshot) -> [&(dyn ToSql + Sync); SNAPSHOT_COLS_PER_ROW] {
    [
        &snapshot.id,
        &snapshot.pool_id,
        &snapshot.timestamp,
        &snapshot.total_liquidity,
        &snapshot.total_shares,
        &snapshot.total_shares_num,
        &snapshot.share_price,
        &snapshot.amounts,
        &snapshot.total_swap_volume,
        &snapshot.total_swap_fee,
        &snapshot.swaps_count,
        &snapshot.holders_count,
        &snapshot.volume_24h,
        &snapshot.fees_24h,
    ]
}

impl PostgresClient {
    async fn load_pools(&self, min_shares: Option<f64>) -> anyhow::Result<Vec<Pool>> {
        let client = self.pool.get().await?;

        let pool_rows = match min_shares {
            Some(min) => {
                client
                    .query(
                        r#"
                        SELECT id, address, name, pool_type, create_time, total_shares_num
                        FROM mirror.pools
                        WHERE total_shares_num > $1
                        ORDER BY create_time, id
                        "#,
                        &[&min],
                    )
                    .await?
            },
            None => {
                client
                    .query(
                        r#"
                        SELECT id, address, name, pool_type, create_time, total_shares_num
                        FROM mirror.pools
                        ORDER BY create_time, id
                        "#,
                        &[],
                    )
                    .await?
            },
        };

        if pool_rows.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = pool_rows.iter().map(|row| row.get("id")).collect();
        let token_rows = client
            .query(
                r#"
                SELECT pool_id, token_index, address, symbol, name, nested_pool_id
                FROM mirror.pool_tokens
                WHERE pool_id = ANY($1)
                ORDER BY pool_id, token_index
                "#,
                &[&ids],
            )
            .await?;

        let mut tokens_by_pool: FxHashMap<String, Vec<PoolToken>> = FxHashMap::default();
        for row in &token_rows {
            let pool_id: String = row.get("pool_id");
            tokens_by_pool
                .entry(pool_id)
                .or_default()
                .push(row_to_pool_token(row));
        }

        Ok(pool_rows
            .iter()
            .map(|row| {
                let mut pool = row_to_pool(row);
                pool.tokens = tokens_by_pool.remove(&pool.id).unwrap_or_default();
                pool
            })
            .collect())
    }

    async fn write_snapshots(
        &self,
        snapshots: &[PoolSnapshot],
        overwrite: bool,
    ) -> anyhow::Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let conflict = if overwrite {
            r#"ON CONFLICT (id) DO UPDATE SET
                total_liquidity = EXCLUDED.total_liquidity,
                total_shares = EXCLUDED.total_shares,
                total_shares_num = EXCLUDED.total_shares_num,
                share_price = EXCLUDED.share_price,
                amounts = EXCLUDED.amounts,
                total_swap_volume = EXCLUDED.total_swap_volume,
                total_swap_fee = EXCLUDED.total_swap_fee,
                swaps_count = EXCLUDED.swaps_count,
                holders_count = EXCLUDED.holders_count,
                volume_24h = EXCLUDED.volume_24h,
                fees_24h = EXCLUDED.fees_24h,
                updated_at = NOW()"#
        } else {
            "ON CONFLICT DO NOTHING"
        };

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        for chunk in snapshots.chunks(BATCH_SIZE) {
            let query = format!(
                "INSERT INTO mirror.pool_snapshots ({}) VALUES {} {}",
                SNAPSHOT_COLUMNS,
                values_placeholders(chunk.len(), SNAPSHOT_COLS_PER_ROW),
                conflict
            );

            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * SNAPSHOT_COLS_PER_ROW);
            for snapshot in chunk {
                params.extend(snapshot_params(snapshot));
            }

            tx.execute(&query, &params).await.map_err(|e| {
                error!("Failed to write {} pool snapshots: {:?}", chunk.len(), e);
                e
            })?;
        }

        tx.commit().await?;
        Ok(())
    }
}

// ==================== POOLS ====================

#[async_trait]
impl PoolRepository for PostgresClient {
    async fn get_pools(&self) -> anyhow::Result<Vec<Pool>> {
        self.load_pools(None).await
    }

    async fn get_pool(&self, pool_id: &str) -> anyhow::Result<Option<Pool>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, address, name, pool_type, create_time, total_shares_num
                FROM mirror.pools
                WHERE id = $1
                "#,
                &[&pool_id],
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let token_rows = client
            .query(
                r#"
                SELECT pool_id, token_index, address, symbol, name, nested_pool_id
                FROM mirror.pool_tokens
                WHERE pool_id = $1
                ORDER BY token_index
                "#,
                &[&pool_id],
            )
            .await?;

        let mut pool = row_to_pool(&row);
        pool.tokens = token_rows.iter().map(row_to_pool_token).collect();
        Ok(Some(pool))
    }

    async fn get_pools_with_shares(&self, min_shares: f64) -> anyhow::Result<Vec<Pool>> {
        self.load_pools(Some(min_shares)).await
    }

    async fn upsert_pools(&self, pools: &[Pool]) -> anyhow::Result<()> {
        if pools.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 6;
        const TOKEN_COLS_PER_ROW: usize = 6;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        for chunk in pools.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO mirror.pools (
                    id, address, name, pool_type, create_time, total_shares_num
                ) VALUES {}
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    pool_type = EXCLUDED.pool_type,
                    total_shares_num = EXCLUDED.total_shares_num,
                    updated_at = NOW()
                "#,
                values_placeholders(chunk.len(), COLS_PER_ROW)
            );

            let names: Vec<String> = chunk.iter().map(|p| sanitize_string(&p.name)).collect();
            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);
            for (i, pool) in chunk.iter().enumerate() {
                params.push(&pool.id);
                params.push(&pool.address);
                params.push(&names[i]);
                params.push(&pool.pool_type);
                params.push(&pool.create_time);
                params.push(&pool.total_shares_num);
            }

            tx.execute(&query, &params).await.map_err(|e| {
                error!("Failed to upsert {} pools: {:?}", chunk.len(), e);
                e
            })?;
        }

        let ids: Vec<&str> = pools.iter().map(|p| p.id.as_str()).collect();
        tx.execute("DELETE FROM mirror.pool_tokens WHERE pool_id = ANY($1)", &[&ids])
            .await?;

        let tokens: Vec<(&str, PoolToken)> = pools
            .iter()
            .flat_map(|pool| {
                pool.tokens.iter().map(move |token| {
                    let mut token = token.clone();
                    token.symbol = sanitize_string(&token.symbol);
                    token.name = sanitize_string(&token.name);
                    (pool.id.as_str(), token)
                })
            })
            .collect();

        for chunk in tokens.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO mirror.pool_tokens (
                    pool_id, token_index, address, symbol, name, nested_pool_id
                ) VALUES {}
                "#,
                values_placeholders(chunk.len(), TOKEN_COLS_PER_ROW)
            );

            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * TOKEN_COLS_PER_ROW);
            for (pool_id, token) in chunk {
                params.push(pool_id);
                params.push(&token.index);
                params.push(&token.address);
                params.push(&token.symbol);
                params.push(&token.name);
                params.push(&token.nested_pool_id);
            }

            tx.execute(&query, &params).await.map_err(|e| {
                error!("Failed to insert {} pool tokens: {:?}", chunk.len(), e);
                e
            })?;
        }

        tx.commit().await?;
        Ok(())
    }
}

// ==================== SNAPSHOTS ====================

#[async_trait]
impl SnapshotRepository for PostgresClient {
    async fn upsert_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<()> {
        self.write_snapshots(snapshots, true).await
    }

    async fn insert_missing_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<()> {
        self.write_snapshots(snapshots, false).await
    }

    async fn get_snapshot(
        &self,
        pool_id: &str,
        timestamp: i64,
    ) -> anyhow::Result<Option<PoolSnapshot>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM mirror.pool_snapshots WHERE pool_id = $1 AND timestamp = $2",
            SNAPSHOT_COLUMNS
        );

        let row = client.query_opt(&query, &[&pool_id, &timestamp]).await?;
        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn get_snapshots_at(&self, timestamp: i64) -> anyhow::Result<Vec<PoolSnapshot>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM mirror.pool_snapshots WHERE timestamp = $1",
            SNAPSHOT_COLUMNS
        );

        let rows = client.query(&query, &[&timestamp]).await?;
        Ok(rows.iter().map(row_to_snapshot).collect())
    }

    async fn get_snapshots_for_pool(
        &self,
        pool_id: &str,
        since: i64,
    ) -> anyhow::Result<Vec<PoolSnapshot>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {} FROM mirror.pool_snapshots
            WHERE pool_id = $1 AND timestamp >= $2
            ORDER BY timestamp ASC
            "#,
            SNAPSHOT_COLUMNS
        );

        let rows = client.query(&query, &[&pool_id, &since]).await?;
        Ok(rows.iter().map(row_to_snapshot).collect())
    }

    async fn get_snapshots_since(
        &self,
        since: i64,
        min_shares: f64,
    ) -> anyhow::Result<Vec<PoolSnapshot>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {} FROM mirror.pool_snapshots
            WHERE timestamp >= $1 AND total_shares_num > $2
            ORDER BY timestamp ASC
            "#,
            SNAPSHOT_COLUMNS
        );

        let rows = client.query(&query, &[&since, &min_shares]).await?;
        Ok(rows.iter().map(row_to_snapshot).collect())
    }
}

// ==================== WALLET BALANCES ====================

#[async_trait]
impl WalletRepository for PostgresClient {
    async fn get_sync_status(&self, sync_type: SyncType) -> anyhow::Result<Option<SyncStatus>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT block_number FROM mirror.sync_status WHERE sync_type = $1",
                &[&sync_type.as_str()],
            )
            .await?;

        Ok(row.map(|row| {
            let block: i64 = row.get("block_number");
            SyncStatus::new(sync_type, block.max(0) as u64)
        }))
    }

    async fn commit_wallet_batch(&self, batch: &WalletBalanceBatch) -> anyhow::Result<()> {
        const COLS_PER_ROW: usize = 6;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        if batch.reset {
            tx.execute("DELETE FROM mirror.wallet_balances", &[]).await?;
        }

        for chunk in batch.balances.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO mirror.wallet_balances (
                    id, user_address, pool_id, token_address, balance, balance_num
                ) VALUES {}
                ON CONFLICT (id) DO UPDATE SET
                    balance = EXCLUDED.balance,
                    balance_num = EXCLUDED.balance_num,
                    updated_at = NOW()
                "#,
                values_placeholders(chunk.len(), COLS_PER_ROW)
            );

            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);
            for balance in chunk {
                params.push(&balance.id);
                params.push(&balance.user_address);
                params.push(&balance.pool_id);
                params.push(&balance.token_address);
                params.push(&balance.balance);
                params.push(&balance.balance_num);
            }

            tx.execute(&query, &params).await.map_err(|e| {
                error!("Failed to upsert {} wallet balances: {:?}", chunk.len(), e);
                e
            })?;
        }

        if let Some(cursor) = &batch.cursor {
            let block = cursor.block_number as i64;
            let query = if batch.reset {
                r#"
                INSERT INTO mirror.sync_status (sync_type, block_number, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (sync_type) DO UPDATE SET
                    block_number = EXCLUDED.block_number,
                    updated_at = NOW()
                "#
            } else {
                r#"
                INSERT INTO mirror.sync_status (sync_type, block_number, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (sync_type) DO UPDATE SET
                    block_number = GREATEST(mirror.sync_status.block_number, EXCLUDED.block_number),
                    updated_at = NOW()
                "#
            };

            tx.execute(query, &[&cursor.sync_type.as_str(), &block])
                .await
                .map_err(|e| {
                    error!("Failed to write {} cursor at block {}: {:?}", cursor.sync_type, block, e);
                    e
                })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_wallet_balances(&self, user_address: &str) -> anyhow::Result<Vec<WalletBalance>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, user_address, pool_id, token_address, balance, balance_num
                FROM mirror.wallet_balances
                WHERE user_address = $1
                "#,
                &[&user_address.to_lowercase()],
            )
            .await?;

        Ok(rows.iter().map(row_to_wallet_balance).collect())
    }
}

// ==================== TOKEN PRICES ====================

#[async_trait]
impl TokenPriceRepository for PostgresClient {
    async fn get_token_prices(
        &self,
        token_addresses: &[String],
        since: i64,
    ) -> anyhow::Result<FxHashMap<String, Vec<PricePoint>>> {
        if token_addresses.is_empty() {
            return Ok(FxHashMap::default());
        }

        let addresses: Vec<String> = token_addresses.iter().map(|a| a.to_lowercase()).collect();
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT token_address, timestamp, price
                FROM mirror.token_prices
                WHERE token_address = ANY($1) AND timestamp >= $2
                ORDER BY token_address, timestamp ASC
                "#,
                &[&addresses, &since],
            )
            .await?;

        let mut prices: FxHashMap<String, Vec<PricePoint>> = FxHashMap::default();
        for row in &rows {
            let address: String = row.get("token_address");
            prices
                .entry(address.to_lowercase())
                .or_default()
                .push(PricePoint::new(row.get("timestamp"), row.get("price")));
        }

        Ok(prices)
    }
}

// ==================== ROW HELPERS ====================

fn get_lowercased(row: &tokio_postgres::Row, col: &str) -> String {
    let s: String = row.get(col);
    s.to_lowercase()
}

fn row_to_pool(row: &tokio_postgres::Row) -> Pool {
    Pool {
        id: row.get("id"),
        address: get_lowercased(row, "address"),
        name: row.get("name"),
        pool_type: row.get("pool_type"),
        create_time: row.get("create_time"),
        total_shares_num: row.get("total_shares_num"),
        tokens: vec![],
    }
}

fn row_to_pool_token(row: &tokio_postgres::Row) -> PoolToken {
    PoolToken {
        address: get_lowercased(row, "address"),
        symbol: row.get("symbol"),
        name: row.get("name"),
        index: row.get("token_index"),
        nested_pool_id: row.get("nested_pool_id"),
    }
}

fn row_to_snapshot(row: &tokio_postgres::Row) -> PoolSnapshot {
    PoolSnapshot {
        id: row.get("id"),
        pool_id: row.get("pool_id"),
        timestamp: row.get("timestamp"),
        total_liquidity: row.get("total_liquidity"),
        total_shares: row.get("total_shares"),
        total_shares_num: row.get("total_shares_num"),
        share_price: row.get("share_price"),
        amounts: row.get("amounts"),
        total_swap_volume: row.get("total_swap_volume"),
        total_swap_fee: row.get("total_swap_fee"),
        swaps_count: row.get("swaps_count"),
        holders_count: row.get("holders_count"),
        volume_24h: row.get("volume_24h"),
        fees_24h: row.get("fees_24h"),
    }
}

fn row_to_wallet_balance(row: &tokio_postgres::Row) -> WalletBalance {
    WalletBalance {
        id: row.get("id"),
        user_address: get_lowercased(row, "user_address"),
        pool_id: row.get("pool_id"),
        token_address: get_lowercased(row, "token_address"),
        balance: row.get("balance"),
        balance_num: row.get("balance_num"),
    }
}
