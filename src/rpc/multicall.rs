use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use alloy::sol_types::SolCall;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use log::debug;

use super::{BalanceFetcher, BalanceRequest, TokenBalance};
use crate::abis::{Call3, IMulticall3, McResult, IERC20};
use crate::config::ChainSettings;
use crate::error::{Error, Result};

/// Batches `balanceOf` reads through Multicall3 `aggregate3`.
///
/// Calls are sent with `allowFailure = false`, so one reverting call fails
/// the whole chunk and the caller retries the pass. No retries happen here.
#[derive(Clone)]
pub struct MulticallBalanceFetcher {
    provider: DynProvider,
    multicall_address: Address,
    chunk_size: usize,
    timeout: Duration,
}

impl MulticallBalanceFetcher {
    pub fn new(provider: DynProvider, settings: &ChainSettings) -> anyhow::Result<Self> {
        let multicall_address = super::parse_address(&settings.multicall_address)
            .context("Invalid multicall address")?;

        Ok(Self {
            provider,
            multicall_address,
            chunk_size: settings.multicall_chunk_size.max(1),
            timeout: Duration::from_secs(settings.rpc_timeout_secs),
        })
    }

    async fn fetch_chunk(&self, chunk: &[BalanceRequest]) -> Result<Vec<TokenBalance>> {
        let multicall = IMulticall3::new(self.multicall_address, &self.provider);
        let calls: Vec<Call3> = chunk
            .iter()
            .map(|request| Call3 {
                target: request.token,
                allowFailure: false,
                callData: IERC20::balanceOfCall {
                    account: request.account,
                }
                .abi_encode()
                .into(),
            })
            .collect();

        let results = tokio::time::timeout(self.timeout, multicall.aggregate3(calls).call())
            .await
            .context("Multicall timeout")?
            .context("Multicall aggregate3 failed")?;

        decode_balances(chunk, &results)
    }
}

/// Pair each request with its decoded `balanceOf` return.
pub(crate) fn decode_balances(
    requests: &[BalanceRequest],
    results: &[McResult],
) -> Result<Vec<TokenBalance>> {
    if results.len() != requests.len() {
        return Err(Error::IncompleteMulticall {
            expected: requests.len(),
            got: results.len(),
        });
    }

    requests
        .iter()
        .zip(results)
        .map(|(request, result)| {
            if !result.success {
                return Err(anyhow!(
                    "balanceOf({}) on {} failed",
                    request.account,
                    request.token
                )
                .into());
            }

            let raw: U256 = IERC20::balanceOfCall::abi_decode_returns(&result.returnData)
                .with_context(|| format!("Undecodable balanceOf return from {}", request.token))?;

            Ok(TokenBalance {
                token: request.token,
                account: request.account,
                raw,
            })
        })
        .collect()
}

#[async_trait]
impl BalanceFetcher for MulticallBalanceFetcher {
    async fn fetch_balances(&self, requests: &[BalanceRequest]) -> Result<Vec<TokenBalance>> {
        let mut balances = Vec::with_capacity(requests.len());

        for chunk in requests.chunks(self.chunk_size) {
            balances.extend(self.fetch_chunk(chunk).await?);
        }

        debug!("Fetched {} balances via multicall", balances.len());
        Ok(balances)
    }
}
