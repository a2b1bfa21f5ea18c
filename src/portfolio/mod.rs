//! Per-user valuation of pool positions over the persisted snapshots and
//! wallet balances.

mod service;
mod types;
mod valuation;

pub use service::{NoStakedPositions, PortfolioService, StakedPositionSource};
pub use types::{UserPoolData, UserPortfolioData, UserTokenData};
pub use valuation::{wallet_shares, DaySnapshots, PortfolioValuationEngine};
