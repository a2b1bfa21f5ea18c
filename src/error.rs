use thiserror::Error;

/// Errors surfaced by the sync and valuation engines.
///
/// Collaborator failures (subgraph, RPC, price feed, database) arrive as
/// `anyhow::Error` and are carried in [`Error::External`]. Everything else is
/// a precondition the caller has to fix before retrying.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{domain} sync called before its cursor was initialized")]
    NotInitialized { domain: String },

    #[error("pool {0} not found")]
    PoolNotFound(String),

    #[error("pool {pool_id} has unsupported type {pool_type} for this operation")]
    UnsupportedPoolType { pool_id: String, pool_type: String },

    #[error("block range {from}..={to} exceeds the cap of {max} blocks")]
    BlockRangeTooLarge { from: u64, to: u64, max: u64 },

    #[error("invalid block range {from}..={to}")]
    InvalidBlockRange { from: u64, to: u64 },

    #[error("multicall returned {got} results for {expected} calls")]
    IncompleteMulticall { expected: usize, got: usize },

    #[error(transparent)]
    External(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
