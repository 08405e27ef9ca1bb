use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mensa_core::error::MarketError;
use mensa_core::lifecycle::LifecycleManager;
use mensa_core::repository::Repository;
use mensa_core::sink::EventSink;
use mensa_domain::{EventKind, LifecycleEvent, Slot, SyncCursor, SyncOutcome};
use mensa_provider::{Catalog, CatalogSource};

/// Outcome of one synchronization run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: bool,
    pub catalog_size: usize,
    pub added: usize,
    pub withdrawn: usize,
    pub restored: usize,
    pub listings_invalidated: usize,
}

impl SyncReport {
    fn failed() -> Self {
        Self::default()
    }
}

/// Catalog synchronization loop: fetches the provider catalog on a coarse
/// fixed interval and reconciles it against the locally known slots. A
/// failed fetch mutates nothing; the next scheduled run is the only retry.
pub struct CatalogSynchronizer {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn Repository>,
    manager: Arc<LifecycleManager>,
    events: Arc<dyn EventSink>,
    interval: Duration,
}

impl CatalogSynchronizer {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn Repository>,
        manager: Arc<LifecycleManager>,
        events: Arc<dyn EventSink>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            manager,
            events,
            interval,
        }
    }

    /// Runs until cancelled. The first run fires immediately when the last
    /// recorded sync is overdue (or absent, or failed); otherwise it waits
    /// out the remainder of the interval.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "catalog synchronizer started");
        let first = Instant::now() + self.startup_delay().await;
        let mut ticker = interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        error!(error = %e, "sync run failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("catalog synchronizer stopping");
                    break;
                }
            }
        }
    }

    async fn startup_delay(&self) -> Duration {
        match self.store.last_sync().await {
            Ok(Some(cursor)) if cursor.outcome == SyncOutcome::Succeeded => {
                let age = (Utc::now() - cursor.finished_at)
                    .to_std()
                    .unwrap_or_default();
                match self.interval.checked_sub(age) {
                    Some(remaining) if !remaining.is_zero() => {
                        info!(?remaining, "last sync still fresh, delaying first run");
                        remaining
                    }
                    _ => Duration::ZERO,
                }
            }
            Ok(_) => Duration::ZERO,
            Err(e) => {
                warn!(error = %e, "could not read sync cursor, syncing immediately");
                Duration::ZERO
            }
        }
    }

    /// One fetch-and-reconcile pass. Provider failures are recorded on the
    /// cursor and reported as a `SyncFailed` event without touching any
    /// slot or listing; only storage failures propagate.
    pub async fn sync_once(&self) -> Result<SyncReport, MarketError> {
        let catalog = match self.source.fetch_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "catalog fetch failed, keeping local state");
                self.store
                    .record_sync(&SyncCursor::failed(e.to_string()))
                    .await?;
                self.events.emit(LifecycleEvent::sync(EventKind::SyncFailed));
                return Ok(SyncReport::failed());
            }
        };

        let report = self.reconcile(catalog).await?;
        self.store
            .record_sync(&SyncCursor::succeeded(report.catalog_size as u32))
            .await?;
        self.events
            .emit(LifecycleEvent::sync(EventKind::SyncSucceeded));
        info!(
            catalog = report.catalog_size,
            added = report.added,
            withdrawn = report.withdrawn,
            restored = report.restored,
            invalidated = report.listings_invalidated,
            "catalog sync complete"
        );
        Ok(report)
    }

    /// Reconciles by provider identifier: new identifiers become available
    /// slots, absent ones are marked unavailable, present ones are left
    /// untouched (metadata is not assumed to change), and a previously
    /// withdrawn identifier that reappears is restored.
    async fn reconcile(&self, catalog: Catalog) -> Result<SyncReport, MarketError> {
        let known = self.store.all_slots().await?;
        let seen: HashSet<&str> = catalog
            .entries
            .iter()
            .map(|e| e.provider_id.as_str())
            .collect();
        let known_ids: HashSet<&str> = known.iter().map(|s| s.provider_id.as_str()).collect();

        let mut report = SyncReport {
            succeeded: true,
            catalog_size: catalog.entries.len(),
            ..SyncReport::default()
        };

        for entry in &catalog.entries {
            if !known_ids.contains(entry.provider_id.as_str()) {
                let slot = Slot::new(
                    entry.provider_id.clone(),
                    entry.date,
                    entry.sitting.clone(),
                    entry.description.clone(),
                    entry.price,
                );
                self.store.insert_slot(&slot).await?;
                report.added += 1;
            }
        }

        for slot in &known {
            if seen.contains(slot.provider_id.as_str()) {
                if !slot.available && self.store.set_slot_availability(slot.id, true).await? {
                    report.restored += 1;
                }
            } else if slot.available
                && self.store.set_slot_availability(slot.id, false).await?
            {
                report.withdrawn += 1;
            }
        }

        // retire listings still referencing an unavailable slot: the ones
        // withdrawn this run, plus any left active after an earlier run
        // raced a claim
        for slot in self.store.all_slots().await? {
            if slot.available {
                continue;
            }
            for listing in self.store.active_listings_for_slot(slot.id).await? {
                match self.manager.invalidate(listing.id).await {
                    Ok(()) => report.listings_invalidated += 1,
                    Err(e) if e.is_conflict() => {
                        debug!(listing = %listing.id, error = %e, "listing settled during invalidation");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(report)
    }
}
