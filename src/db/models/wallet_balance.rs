use serde::{Deserialize, Serialize};

use super::SyncStatus;

/// Latest known balance of one account for one tracked token (PostgreSQL).
///
/// Pool share balances are keyed `{pool_id}-{user}`; auxiliary wrapped-share
/// tokens are keyed `{key_prefix}-{user}` and carry no pool id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub id: String,
    pub user_address: String,
    pub pool_id: Option<String>,
    pub token_address: String,
    pub balance: String,
    pub balance_num: f64,
}

impl WalletBalance {
    pub fn for_pool(pool_id: &str, token_address: &str, user_address: &str, balance: String) -> Self {
        let balance_num = crate::utils::parse_f64(&balance);
        Self {
            id: format!("{}-{}", pool_id, user_address),
            user_address: user_address.to_string(),
            pool_id: Some(pool_id.to_string()),
            token_address: token_address.to_string(),
            balance,
            balance_num,
        }
    }

    pub fn for_auxiliary(
        key_prefix: &str,
        token_address: &str,
        user_address: &str,
        balance: String,
    ) -> Self {
        let balance_num = crate::utils::parse_f64(&balance);
        Self {
            id: format!("{}-{}", key_prefix, user_address),
            user_address: user_address.to_string(),
            pool_id: None,
            token_address: token_address.to_string(),
            balance,
            balance_num,
        }
    }
}

/// Everything one wallet sync pass writes. Committed atomically.
///
/// `reset` wipes all balance rows first and writes the cursor as-is (bootstrap).
/// Without `reset` the cursor only ever moves forward.
#[derive(Debug, Clone, Default)]
pub struct WalletBalanceBatch {
    pub reset: bool,
    pub balances: Vec<WalletBalance>,
    pub cursor: Option<SyncStatus>,
}
