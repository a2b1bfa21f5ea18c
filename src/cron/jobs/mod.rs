pub mod sync_snapshots;
pub mod sync_wallet_balances;
