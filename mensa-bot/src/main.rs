use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mensa_bot::{sink, CatalogSynchronizer, ChannelSink, TimeoutSweeper};
use mensa_core::lifecycle::LifecycleManager;
use mensa_core::repository::Repository;
use mensa_core::sink::EventSink;
use mensa_provider::ProviderClient;
use mensa_store::{Config, DbClient, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mensa_bot=info,mensa_core=info,mensa_store=info,mensa_provider=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // configuration errors are fatal before any loop starts
    let config = Config::load().context("failed to load configuration")?;
    info!(database = %config.database.url, "starting mensa market engine");

    let db = DbClient::new(&config.database.url)
        .await
        .context("failed to open database")?;
    db.init_schema().await.context("failed to apply schema")?;
    let store: Arc<dyn Repository> = Arc::new(SqliteStore::new(db.pool.clone()));

    let (channel_sink, events_rx) = ChannelSink::new(256);
    let events: Arc<dyn EventSink> = Arc::new(channel_sink);

    let manager = Arc::new(LifecycleManager::new(
        store.clone(),
        events.clone(),
        chrono::Duration::minutes(config.market.pending_timeout_minutes as i64),
        config.market.confirm_policy,
    ));

    let provider = Arc::new(
        ProviderClient::new(config.provider.clone())
            .context("failed to build provider client")?,
    );

    let cancel = CancellationToken::new();
    let renderer = tokio::spawn(sink::log_events(events_rx));

    let sweeper = TimeoutSweeper::new(
        store.clone(),
        manager.clone(),
        Duration::from_secs(config.market.sweep_interval_minutes * 60),
    );
    let sweeper_handle = tokio::spawn(sweeper.run(cancel.clone()));

    let synchronizer = CatalogSynchronizer::new(
        provider,
        store.clone(),
        manager.clone(),
        events.clone(),
        Duration::from_secs(config.market.sync_interval_minutes * 60),
    );
    let sync_handle = tokio::spawn(synchronizer.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, draining background loops");
    cancel.cancel();

    let grace = Duration::from_secs(config.market.shutdown_grace_seconds);
    let drained = tokio::time::timeout(grace, async {
        let _ = sweeper_handle.await;
        let _ = sync_handle.await;
    })
    .await;
    if drained.is_err() {
        warn!(?grace, "background loops did not stop within the grace period");
    }
    renderer.abort();

    info!("mensa market engine stopped");
    Ok(())
}
