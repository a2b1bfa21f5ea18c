//! Job to mirror the latest daily pool snapshots.
//!
//! Refreshes the pool registry first so newly created pools get rows on the
//! same pass.

use anyhow::Result;
use log::info;

use crate::sync::SnapshotSyncEngine;

pub async fn run(engine: &SnapshotSyncEngine, days_to_sync: u32) -> Result<()> {
    info!("Starting sync_snapshots job...");

    let start = std::time::Instant::now();

    engine.sync_pools().await?;
    let report = engine.sync_latest(days_to_sync).await?;

    info!(
        "Completed sync_snapshots job: {} snapshots, {} pools reconstructed in {:?}",
        report.snapshots_written,
        report.pools_reconstructed,
        start.elapsed()
    );
    Ok(())
}
