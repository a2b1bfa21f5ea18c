use std::sync::Arc;

use log::info;

use crate::config::Settings;

pub mod models;
pub mod postgres;
pub mod repository;

pub use postgres::PostgresClient;
pub use repository::{PoolRepository, SnapshotRepository, TokenPriceRepository, WalletRepository};

/// Database handle shared by the engines.
///
/// PostgreSQL holds everything: the pool registry, daily pool snapshots,
/// wallet balances, sync cursors and the stored price table.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: Arc<Settings>) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;

        postgres.migrate().await?;
        info!("Database ready");

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }
}
