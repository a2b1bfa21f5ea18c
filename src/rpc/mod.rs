//! Chain RPC access: bounded transfer-log retrieval and batched balance reads.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::Context;
use async_trait::async_trait;
use url::Url;

use crate::utils::hex_encode;

pub mod log_watcher;
pub mod multicall;

pub use log_watcher::ChainLogWatcher;
pub use multicall::MulticallBalanceFetcher;

/// A decoded ERC20 `Transfer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BalanceRequest {
    pub token: Address,
    pub account: Address,
}

impl BalanceRequest {
    pub fn new(token: Address, account: Address) -> Self {
        Self { token, account }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBalance {
    pub token: Address,
    pub account: Address,
    pub raw: U256,
}

#[async_trait]
pub trait TransferLogSource: Send + Sync {
    async fn latest_block(&self) -> anyhow::Result<u64>;

    /// Transfer-shaped logs emitted in `from_block..=to_block` with `topic` as
    /// topic0. The range must not exceed the configured cap.
    async fn get_transfer_events(
        &self,
        from_block: u64,
        to_block: u64,
        topic: B256,
    ) -> crate::Result<Vec<TransferEvent>>;
}

#[async_trait]
pub trait BalanceFetcher: Send + Sync {
    /// One result per request, in request order. Any failed call fails the batch.
    async fn fetch_balances(&self, requests: &[BalanceRequest]) -> crate::Result<Vec<TokenBalance>>;
}

/// HTTP provider shared by the watcher and the fetcher.
pub fn connect(rpc_url: &str) -> anyhow::Result<DynProvider> {
    let url = Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL {}", rpc_url))?;
    let client = ProviderBuilder::new().connect_http(url);
    Ok(DynProvider::new(client))
}

/// Current head block of the connected chain.
pub(crate) async fn head_block(provider: &DynProvider) -> anyhow::Result<u64> {
    provider
        .get_block_number()
        .await
        .context("Failed to fetch latest block number")
}

/// Lowercase 0x-prefixed form used for storage keys.
pub fn address_key(address: &Address) -> String {
    hex_encode(address.as_slice())
}

pub fn parse_address(value: &str) -> anyhow::Result<Address> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid address {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_key_is_lowercase() {
        let address = parse_address("0xDE1E704dae0B4051e80DAbB26ab6ad6c12262DA0").unwrap();
        assert_eq!(address_key(&address), "0xde1e704dae0b4051e80dabb26ab6ad6c12262da0");
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(parse_address("0x1234").is_err());
    }
}
