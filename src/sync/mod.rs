//! Incremental sync engines: daily pool snapshots and wallet share balances.

mod snapshots;
mod wallet;

pub use snapshots::{
    BackfillRange, BackfillReport, SnapshotRange, SnapshotSyncEngine, SnapshotSyncReport,
    MIN_TOTAL_SHARES,
};
pub use wallet::{InitReport, WalletBalanceSyncEngine, WalletSyncReport};
