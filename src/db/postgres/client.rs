use std::time::Duration;

use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

/// Split SQL into statements, respecting dollar-quoted strings.
/// `DO $$ ... $$` blocks in the schema contain semicolons of their own.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_dollar_quote = false;
    // Delimiters are ASCII, so byte offsets are always char boundaries here
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if i + 1 < bytes.len() && bytes[i] == b'$' && bytes[i + 1] == b'$' {
            in_dollar_quote = !in_dollar_quote;
            i += 2;
            continue;
        }

        if bytes[i] == b';' && !in_dollar_quote {
            let stmt = &sql[start..i];
            if !stmt.trim().is_empty() {
                statements.push(stmt);
            }
            start = i + 1;
        }
        i += 1;
    }

    if start < sql.len() {
        let stmt = &sql[start..];
        if !stmt.trim().is_empty() {
            statements.push(stmt);
        }
    }

    statements
}

/// PostgreSQL client with connection pooling.
///
/// Backs every repository trait: pools, daily snapshots, wallet balances,
/// sync cursors and the stored price table. Uses `deadpool-postgres`
/// for connection management.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

/// Schema applied on startup. Every statement is idempotent.
const SCHEMA: &str = include_str!("../../../schema/postgres.sql");

/// Delay before retrying the connection check after `attempt` failures.
fn connect_backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * 2_u64.pow(attempt.saturating_sub(1).min(5)))
}

impl PostgresClient {
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        info!(
            "Connecting to PostgreSQL at {}:{}/{}",
            settings.host, settings.port, settings.database
        );

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.database);

        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(settings.pool_size)
            .build()
            .context("Failed to create PostgreSQL connection pool")?;

        let attempts = settings.connect_attempts.max(1);
        let mut attempt = 1;
        loop {
            match pool.get().await {
                Ok(_conn) => break,
                Err(e) if attempt < attempts => {
                    let delay = connect_backoff(attempt);
                    warn!(
                        "PostgreSQL not reachable ({}), attempt {}/{}, retrying in {:?}",
                        e, attempt, attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("PostgreSQL not reachable after {} attempts", attempts)
                    });
                },
            }
        }

        info!("Connected to PostgreSQL (pool size {})", settings.pool_size);
        Ok(Self { pool })
    }

    /// Apply the bundled schema.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await?;

        let statements = split_sql_statements(SCHEMA);
        for stmt in &statements {
            client
                .batch_execute(stmt)
                .await
                .with_context(|| format!("Migration failed at: {}", stmt.trim()))?;
        }

        info!("Applied {} schema statements", statements.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_dollar_quotes() {
        let sql = r#"
            CREATE SCHEMA IF NOT EXISTS mirror;
            DO $$ BEGIN
                CREATE TYPE mirror.pool_type AS ENUM ('WEIGHTED');
            EXCEPTION WHEN duplicate_object THEN NULL;
            END $$;
            CREATE TABLE t (id TEXT)
        "#;

        let statements: Vec<&str> = split_sql_statements(sql)
            .into_iter()
            .map(str::trim)
            .collect();

        assert_eq!(statements.len(), 3);
        assert!(statements[1].starts_with("DO $$"));
        assert!(statements[1].ends_with("END $$"));
        assert_eq!(statements[2], "CREATE TABLE t (id TEXT)");
    }

    #[test]
    fn test_bundled_schema_creates_every_table() {
        let statements = split_sql_statements(SCHEMA);
        for table in [
            "mirror.pools",
            "mirror.pool_tokens",
            "mirror.pool_snapshots",
            "mirror.wallet_balances",
            "mirror.sync_status",
            "mirror.token_prices",
        ] {
            let create = format!("CREATE TABLE IF NOT EXISTS {} (", table);
            assert!(
                statements.iter().any(|s| s.contains(&create)),
                "missing {}",
                table
            );
        }
    }

    #[test]
    fn test_connect_backoff_doubles_then_caps() {
        assert_eq!(connect_backoff(1), Duration::from_millis(250));
        assert_eq!(connect_backoff(2), Duration::from_millis(500));
        assert_eq!(connect_backoff(3), Duration::from_secs(1));
        assert_eq!(connect_backoff(20), Duration::from_secs(8));
    }
}
