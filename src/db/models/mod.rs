mod pool;
mod pool_snapshot;
mod sync_status;
mod token_price;
mod wallet_balance;

pub use pool::{Pool, PoolToken, PoolType};
pub use pool_snapshot::PoolSnapshot;
pub use sync_status::{SyncStatus, SyncType};
pub use token_price::PricePoint;
pub use wallet_balance::{WalletBalance, WalletBalanceBatch};
