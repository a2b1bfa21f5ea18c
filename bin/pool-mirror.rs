use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use pool_mirror::clock::SystemClock;
use pool_mirror::db::models::SyncType;
use pool_mirror::db::WalletRepository;
use pool_mirror::prices::{CoingeckoFeed, PriceSeriesLoader};
use pool_mirror::rpc::{self, ChainLogWatcher, MulticallBalanceFetcher};
use pool_mirror::subgraph::SubgraphClient;
use pool_mirror::{CronScheduler, Database, Settings, SnapshotSyncEngine, WalletBalanceSyncEngine};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to install logger")?;

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let db = Database::new(settings.clone())
        .await
        .context("Failed to initialize database connection")?;

    let cancellation_token = CancellationToken::new();

    let subgraph = Arc::new(SubgraphClient::new(&settings.subgraph)?);
    let feed = Arc::new(CoingeckoFeed::new(&settings.price_feed)?);
    let prices = Arc::new(PriceSeriesLoader::new(
        feed,
        db.postgres.clone(),
        Duration::from_secs(settings.price_feed.cache_ttl_secs),
        Duration::from_millis(settings.price_feed.request_delay_ms),
    ));

    let provider = rpc::connect(&settings.chain.rpc_url)?;
    let watcher = Arc::new(ChainLogWatcher::new(provider.clone(), &settings.chain));
    let fetcher = Arc::new(MulticallBalanceFetcher::new(provider, &settings.chain)?);

    let snapshots = Arc::new(
        SnapshotSyncEngine::new(
            subgraph.clone(),
            db.postgres.clone(),
            db.postgres.clone(),
            prices,
            Arc::new(SystemClock),
        )
        .with_cancellation(cancellation_token.child_token()),
    );

    let wallets = Arc::new(WalletBalanceSyncEngine::new(
        subgraph,
        db.postgres.clone(),
        db.postgres.clone(),
        watcher.clone(),
        fetcher,
        &settings.chain.vault_address,
        settings.auxiliary_tokens.clone(),
        watcher.max_block_range(),
    ));

    // The registry must exist before holders can be enumerated
    snapshots
        .sync_pools()
        .await
        .context("Failed to load the pool registry")?;

    if db.postgres.get_sync_status(SyncType::Wallet).await?.is_none() {
        info!("No wallet cursor found, bootstrapping balances from the subgraph");
        let report = wallets
            .init()
            .await
            .context("Failed to bootstrap wallet balances")?;
        info!(
            "Bootstrapped {} balances, cursor at block {}",
            report.balances, report.block
        );
    }

    let cron_scheduler = CronScheduler::new(snapshots, wallets, settings.cron.clone());

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - sync jobs will run periodically");

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Pool mirror running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");
    cancellation_token.cancel();

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("All jobs stopped");
    Ok(())
}
