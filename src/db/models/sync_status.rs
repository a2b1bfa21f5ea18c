use std::fmt;

use serde::{Deserialize, Serialize};

/// Cursor domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncType {
    Wallet,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Wallet => "WALLET",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental sync cursor (PostgreSQL).
///
/// Last block whose transfers are reflected in persisted balances. One row
/// per domain, never moves backwards outside of a bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub sync_type: SyncType,
    pub block_number: u64,
}

impl SyncStatus {
    pub fn new(sync_type: SyncType, block_number: u64) -> Self {
        Self {
            sync_type,
            block_number,
        }
    }
}
