//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Mirroring the latest daily pool snapshots from the subgraph
//! - Following share transfers to keep wallet balances current
//!
//! Every job holds its own run guard: a tick that fires while the previous
//! run is still going is skipped, so runs against one cursor never overlap.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::CronSettings;
use crate::sync::{SnapshotSyncEngine, WalletBalanceSyncEngine};

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    snapshots: Arc<SnapshotSyncEngine>,
    wallets: Arc<WalletBalanceSyncEngine>,
    settings: Arc<CronSettings>,
}

impl CronScheduler {
    pub fn new(
        snapshots: Arc<SnapshotSyncEngine>,
        wallets: Arc<WalletBalanceSyncEngine>,
        settings: CronSettings,
    ) -> Self {
        Self {
            snapshots,
            wallets,
            settings: Arc::new(settings),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_sync_snapshots_job(&scheduler).await?;
        self.register_sync_wallet_balances_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 2);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_sync_snapshots_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let engine = self.snapshots.clone();
        let interval = self.settings.snapshot_interval_secs;
        let days_to_sync = self.settings.days_to_sync;
        let guard = Arc::new(Mutex::new(()));

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let engine = engine.clone();
            let guard = guard.clone();
            Box::pin(async move {
                let Ok(_running) = guard.try_lock() else {
                    warn!("Previous sync_snapshots run still in progress, skipping");
                    return;
                };
                if let Err(e) = jobs::sync_snapshots::run(&engine, days_to_sync).await {
                    error!("Failed to sync pool snapshots: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered sync_snapshots job (every {}s)", interval);
        Ok(())
    }

    async fn register_sync_wallet_balances_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let engine = self.wallets.clone();
        let interval = self.settings.wallet_interval_secs;
        let guard = Arc::new(Mutex::new(()));

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let engine = engine.clone();
            let guard = guard.clone();
            Box::pin(async move {
                let Ok(_running) = guard.try_lock() else {
                    warn!("Previous sync_wallet_balances run still in progress, skipping");
                    return;
                };
                if let Err(e) = jobs::sync_wallet_balances::run(&engine).await {
                    error!("Failed to sync wallet balances: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered sync_wallet_balances job (every {}s)", interval);
        Ok(())
    }
}
