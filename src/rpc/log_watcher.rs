use std::time::Duration;

use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use anyhow::Context;
use async_trait::async_trait;
use log::debug;

use super::{head_block, TransferEvent, TransferLogSource};
use crate::abis::Transfer;
use crate::config::ChainSettings;
use crate::error::{Error, Result};

/// Fetches and decodes transfer logs over a capped block range.
///
/// Splitting a larger backlog into ranges is the caller's job.
#[derive(Clone)]
pub struct ChainLogWatcher {
    provider: DynProvider,
    max_block_range: u64,
    timeout: Duration,
}

impl ChainLogWatcher {
    pub fn new(provider: DynProvider, settings: &ChainSettings) -> Self {
        Self {
            provider,
            max_block_range: settings.max_block_range,
            timeout: Duration::from_secs(settings.rpc_timeout_secs),
        }
    }

    pub fn max_block_range(&self) -> u64 {
        self.max_block_range
    }
}

/// Reject inverted ranges and ranges wider than the cap.
pub(crate) fn check_range(from_block: u64, to_block: u64, max: u64) -> Result<()> {
    if from_block > to_block {
        return Err(Error::InvalidBlockRange {
            from: from_block,
            to: to_block,
        });
    }
    if to_block - from_block > max {
        return Err(Error::BlockRangeTooLarge {
            from: from_block,
            to: to_block,
            max,
        });
    }
    Ok(())
}

/// Decode a log as an ERC20 transfer. NFT transfers share the topic but index
/// the token id, so they fail to decode and are skipped.
pub(crate) fn decode_transfer(log: &Log) -> Option<TransferEvent> {
    let event = Transfer::decode_log_data(log.data()).ok()?;
    Some(TransferEvent {
        contract: log.address(),
        from: event.from,
        to: event.to,
        amount: event.value,
        block_number: log.block_number,
    })
}

#[async_trait]
impl TransferLogSource for ChainLogWatcher {
    async fn latest_block(&self) -> anyhow::Result<u64> {
        tokio::time::timeout(self.timeout, head_block(&self.provider))
            .await
            .context("Latest block timeout")?
    }

    async fn get_transfer_events(
        &self,
        from_block: u64,
        to_block: u64,
        topic: B256,
    ) -> Result<Vec<TransferEvent>> {
        check_range(from_block, to_block, self.max_block_range)?;

        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .event_signature(topic);

        let logs = tokio::time::timeout(self.timeout, self.provider.get_logs(&filter))
            .await
            .context("get_logs timeout")?
            .with_context(|| format!("get_logs failed for blocks {}..={}", from_block, to_block))?;

        let events: Vec<TransferEvent> = logs.iter().filter_map(decode_transfer).collect();
        debug!(
            "Blocks {}..={}: {} logs, {} decoded transfers",
            from_block,
            to_block,
            logs.len(),
            events.len()
        );

        Ok(events)
    }
}
