pub mod abis;
pub mod cache;
pub mod clock;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod portfolio;
pub mod prices;
pub mod rpc;
pub mod subgraph;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use cron::CronScheduler;
pub use db::Database;
pub use error::{Error, Result};
pub use portfolio::{PortfolioService, PortfolioValuationEngine};
pub use sync::{SnapshotSyncEngine, WalletBalanceSyncEngine};
