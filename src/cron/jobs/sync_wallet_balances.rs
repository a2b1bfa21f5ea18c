//! Job to follow share transfers and refresh the touched balances.
//!
//! Each engine pass covers at most one capped block range, so a run keeps
//! going until the cursor reaches the chain head or the pass limit is hit.

use anyhow::Result;
use log::info;

use crate::sync::WalletBalanceSyncEngine;

/// Upper bound on passes per run; whatever is left waits for the next tick.
const MAX_PASSES_PER_RUN: usize = 20;

pub async fn run(engine: &WalletBalanceSyncEngine) -> Result<()> {
    let start = std::time::Instant::now();
    let mut passes = 0;
    let mut refreshed = 0;
    let mut last_block = None;

    while passes < MAX_PASSES_PER_RUN {
        let Some(report) = engine.sync_changed().await? else {
            break;
        };
        passes += 1;
        refreshed += report.refreshed;
        last_block = Some(report.to_block);
    }

    if let Some(block) = last_block {
        info!(
            "Completed sync_wallet_balances job: {} passes, {} balances refreshed, cursor at {} in {:?}",
            passes,
            refreshed,
            block,
            start.elapsed()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{MemoryStore, MockChain, MockSubgraph};

    #[tokio::test]
    async fn test_run_catches_up_in_capped_passes() {
        let store = Arc::new(MemoryStore::default());
        store.set_cursor(1_000);
        let chain = Arc::new(MockChain::new(2_200));

        let engine = WalletBalanceSyncEngine::new(
            Arc::new(MockSubgraph::default()),
            store.clone(),
            store.clone(),
            chain.clone(),
            chain.clone(),
            "0x0000000000000000000000000000000000000ba1",
            vec![],
            500,
        );

        run(&engine).await.unwrap();

        assert_eq!(
            chain.ranges(),
            vec![(1_001, 1_501), (1_502, 2_002), (2_003, 2_200)]
        );
        assert_eq!(store.cursor(), Some(2_200));
    }

    #[tokio::test]
    async fn test_run_before_init_fails() {
        let store = Arc::new(MemoryStore::default());
        let chain = Arc::new(MockChain::new(10));

        let engine = WalletBalanceSyncEngine::new(
            Arc::new(MockSubgraph::default()),
            store.clone(),
            store,
            chain.clone(),
            chain,
            "0x0000000000000000000000000000000000000ba1",
            vec![],
            500,
        );

        assert!(run(&engine).await.is_err());
    }
}
