use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Pools and their token lists
/// - Daily pool snapshots
/// - Wallet balances and the wallet sync cursor
/// - The stored token price table used as a price-feed fallback
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_pool_size() -> usize {
    16
}

fn default_connect_attempts() -> u32 {
    5
}

/// RPC node configuration for log retrieval and multicall balance reads.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub multicall_address: String,
    /// Vault/treasury address; never tracked as a share holder.
    pub vault_address: String,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    #[serde(default = "default_multicall_chunk_size")]
    pub multicall_chunk_size: usize,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

fn default_max_block_range() -> u64 {
    500
}

fn default_multicall_chunk_size() -> usize {
    500
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

/// Subgraph endpoints.
///
/// `pools_url` serves pool snapshots, share holders, swaps and point-in-time
/// pool state. `blocks_url` maps timestamps to block numbers.
#[derive(Debug, Deserialize, Clone)]
pub struct SubgraphSettings {
    pub pools_url: String,
    pub blocks_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    1000
}

/// Third-party historical price feed.
#[derive(Debug, Deserialize, Clone)]
pub struct PriceFeedSettings {
    #[serde(default = "default_price_feed_url")]
    pub base_url: String,
    /// Asset platform the token contracts live on (e.g. "fantom", "ethereum")
    pub platform: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Pause after every successful feed call to respect rate limits
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_price_feed_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_request_delay_ms() -> u64 {
    5_000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Wrapped-share token tracked alongside pool share tokens.
///
/// Balances are stored under `{key_prefix}-{user}` without a pool id.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AuxiliaryTokenSettings {
    pub address: String,
    pub key_prefix: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Pool whose shares this token wraps
    pub underlying_pool_address: String,
    /// Optional holder subgraph used during bootstrap
    #[serde(default)]
    pub holders_subgraph_url: Option<String>,
    /// Balance field of the holder subgraph's `users` entity
    #[serde(default = "default_holders_balance_field")]
    pub holders_balance_field: String,
}

fn default_decimals() -> u8 {
    18
}

fn default_holders_balance_field() -> String {
    "balance".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortfolioSettings {
    #[serde(default = "default_history_days")]
    pub history_days: u32,
    /// Display symbol overrides, keyed by on-chain symbol
    #[serde(default)]
    pub symbol_overrides: HashMap<String, String>,
}

fn default_history_days() -> u32 {
    30
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            history_days: default_history_days(),
            symbol_overrides: HashMap::new(),
        }
    }
}

/// Configuration for cron job intervals
#[derive(Debug, Deserialize, Clone)]
pub struct CronSettings {
    /// Interval for syncing the latest pool snapshots - default 1 hour
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
    /// Interval for incremental wallet balance catch-up - default 30 seconds
    #[serde(default = "default_wallet_interval")]
    pub wallet_interval_secs: u64,
    /// Days covered by each snapshot sync pass
    #[serde(default = "default_days_to_sync")]
    pub days_to_sync: u32,
}

fn default_snapshot_interval() -> u64 {
    3600
}

fn default_wallet_interval() -> u64 {
    30
}

fn default_days_to_sync() -> u32 {
    2
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: default_snapshot_interval(),
            wallet_interval_secs: default_wallet_interval(),
            days_to_sync: default_days_to_sync(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, with `POOL_MIRROR__SECTION__KEY`
/// environment variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub chain: ChainSettings,
    pub subgraph: SubgraphSettings,
    pub price_feed: PriceFeedSettings,
    #[serde(default)]
    pub auxiliary_tokens: Vec<AuxiliaryTokenSettings>,
    #[serde(default)]
    pub portfolio: PortfolioSettings,
    #[serde(default)]
    pub cron: CronSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("POOL_MIRROR").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
