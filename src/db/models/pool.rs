use std::fmt;

use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};

/// Pool families as reported by the pool registry.
///
/// Only the distinctions the sync engines care about are modeled: linear
/// pools underlie composite pools and are never reconstructed, phantom-stable
/// pools are not snapshotted by the subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "pool_type")]
pub enum PoolType {
    #[postgres(name = "WEIGHTED")]
    Weighted,
    #[postgres(name = "STABLE")]
    Stable,
    #[postgres(name = "META_STABLE")]
    MetaStable,
    #[postgres(name = "PHANTOM_STABLE")]
    PhantomStable,
    #[postgres(name = "LINEAR")]
    Linear,
    #[postgres(name = "LIQUIDITY_BOOTSTRAPPING")]
    LiquidityBootstrapping,
    #[postgres(name = "ELEMENT")]
    Element,
    #[postgres(name = "INVESTMENT")]
    Investment,
    #[postgres(name = "UNKNOWN")]
    Unknown,
}

impl PoolType {
    /// Pools that exist to be nested inside composite pools.
    pub fn is_underlying(&self) -> bool {
        matches!(self, PoolType::Linear)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Weighted => "WEIGHTED",
            PoolType::Stable => "STABLE",
            PoolType::MetaStable => "META_STABLE",
            PoolType::PhantomStable => "PHANTOM_STABLE",
            PoolType::Linear => "LINEAR",
            PoolType::LiquidityBootstrapping => "LIQUIDITY_BOOTSTRAPPING",
            PoolType::Element => "ELEMENT",
            PoolType::Investment => "INVESTMENT",
            PoolType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token slot inside a pool. `index` matches the position of the token's
/// balance in snapshot `amounts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolToken {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub index: i32,
    /// Set when this token is the share token of another pool
    pub nested_pool_id: Option<String>,
}

/// Pool aggregate with its token list (PostgreSQL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub address: String,
    pub name: String,
    pub pool_type: PoolType,
    /// Unix seconds
    pub create_time: i64,
    pub total_shares_num: f64,
    pub tokens: Vec<PoolToken>,
}

impl Pool {
    pub fn nested_pool_ids(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| t.nested_pool_id.as_deref())
            .collect()
    }

    pub fn has_nested_pools(&self) -> bool {
        self.tokens.iter().any(|t| t.nested_pool_id.is_some())
    }

    /// The subgraph does not snapshot these; their daily rows are rebuilt
    /// from swaps and point-in-time pool state.
    pub fn needs_reconstructed_snapshots(&self) -> bool {
        !self.pool_type.is_underlying()
            && (self.pool_type == PoolType::PhantomStable || self.has_nested_pools())
    }

    /// Tokens that carry value, excluding the pool's own share token
    /// (phantom pools list themselves).
    pub fn value_tokens(&self) -> impl Iterator<Item = &PoolToken> {
        self.tokens.iter().filter(move |t| t.address != self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(address: &str, nested: Option<&str>) -> PoolToken {
        PoolToken {
            address: address.to_string(),
            symbol: "TKN".to_string(),
            name: "Token".to_string(),
            index: 0,
            nested_pool_id: nested.map(str::to_string),
        }
    }

    fn pool(pool_type: PoolType, tokens: Vec<PoolToken>) -> Pool {
        Pool {
            id: "p".to_string(),
            address: "0xpool".to_string(),
            name: "Pool".to_string(),
            pool_type,
            create_time: 0,
            total_shares_num: 1.0,
            tokens,
        }
    }

    #[test]
    fn test_reconstruction_candidates() {
        let weighted = pool(PoolType::Weighted, vec![token("0xa", None)]);
        assert!(!weighted.needs_reconstructed_snapshots());

        let composite = pool(PoolType::Weighted, vec![token("0xa", Some("nested"))]);
        assert!(composite.needs_reconstructed_snapshots());

        let phantom = pool(PoolType::PhantomStable, vec![token("0xa", None)]);
        assert!(phantom.needs_reconstructed_snapshots());

        let linear = pool(PoolType::Linear, vec![token("0xa", Some("nested"))]);
        assert!(!linear.needs_reconstructed_snapshots());
    }

    #[test]
    fn test_value_tokens_skip_own_share_token() {
        let phantom = pool(
            PoolType::PhantomStable,
            vec![token("0xpool", None), token("0xa", None)],
        );
        let addresses: Vec<&str> = phantom.value_tokens().map(|t| t.address.as_str()).collect();
        assert_eq!(addresses, vec!["0xa"]);
    }
}
