use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::broadcast;

use mensa_bot::{CatalogSynchronizer, ChannelSink, TimeoutSweeper};
use mensa_core::lifecycle::LifecycleManager;
use mensa_core::memory::MemoryStore;
use mensa_core::policy::ConfirmPolicy;
use mensa_core::repository::Repository;
use mensa_core::sink::EventSink;
use mensa_core::MarketError;
use mensa_domain::{ClaimStatus, EventKind, LifecycleEvent, ListingStatus, Slot};
use mensa_provider::{Catalog, CatalogEntry, CatalogSource, ProviderError};
use mensa_store::{DbClient, SqliteStore};

struct ScriptedSource {
    catalog: Mutex<Catalog>,
}

impl ScriptedSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            catalog: Mutex::new(Catalog::default()),
        })
    }

    fn set(&self, entries: Vec<CatalogEntry>) {
        *self.catalog.lock().unwrap() = Catalog { entries };
    }
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    async fn fetch_catalog(&self) -> Result<Catalog, ProviderError> {
        Ok(self.catalog.lock().unwrap().clone())
    }
}

fn entry(provider_id: &str) -> CatalogEntry {
    CatalogEntry {
        provider_id: provider_id.to_string(),
        date: Utc::now().date_naive(),
        sitting: "lunch".to_string(),
        description: "stew".to_string(),
        price: Some(12.0),
    }
}

fn drain(rx: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

struct Harness {
    store: Arc<dyn Repository>,
    manager: Arc<LifecycleManager>,
    events_rx: broadcast::Receiver<LifecycleEvent>,
    events: Arc<dyn EventSink>,
}

fn harness_over(store: Arc<dyn Repository>, timeout_minutes: i64) -> Harness {
    let (sink, events_rx) = ChannelSink::new(64);
    let events: Arc<dyn EventSink> = Arc::new(sink);
    let manager = Arc::new(LifecycleManager::new(
        store.clone(),
        events.clone(),
        ChronoDuration::minutes(timeout_minutes),
        ConfirmPolicy::Either,
    ));
    Harness {
        store,
        manager,
        events_rx,
        events,
    }
}

fn memory_harness(timeout_minutes: i64) -> Harness {
    harness_over(Arc::new(MemoryStore::new()), timeout_minutes)
}

async fn sqlite_harness(timeout_minutes: i64) -> Harness {
    // single connection so the in-memory database is shared
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    let db = DbClient { pool: pool.clone() };
    db.init_schema().await.unwrap();
    harness_over(Arc::new(SqliteStore::new(pool)), timeout_minutes)
}

async fn seed_listing(h: &Harness) -> mensa_domain::Listing {
    let slot = Slot::new(
        "p-100".to_string(),
        Utc::now().date_naive(),
        "lunch".to_string(),
        "stew".to_string(),
        Some(12.0),
    );
    h.store.insert_slot(&slot).await.unwrap();
    h.manager.post(slot.id, "seller-1", 10.0).await.unwrap()
}

/// A five-minute pending timeout: a sweep at +4:00 must leave the claim
/// alone, a sweep at +5:30 must expire it with exactly one expiry event.
#[tokio::test]
async fn pending_claim_expires_between_sweeps() {
    let mut h = memory_harness(5);
    let listing = seed_listing(&h).await;
    let sweeper = TimeoutSweeper::new(
        h.store.clone(),
        h.manager.clone(),
        Duration::from_secs(120),
    );

    let t0 = Utc::now();
    let claim = h.manager.claim(listing.id, "buyer-1").await.unwrap();
    assert_eq!(drain(&mut h.events_rx), vec![EventKind::Claimed]);

    // 4 minutes in: not yet expirable
    assert_eq!(
        sweeper.sweep_at(t0 + ChronoDuration::minutes(4)).await.unwrap(),
        0
    );
    assert_eq!(
        h.store.listing(listing.id).await.unwrap().unwrap().status,
        ListingStatus::Claimed
    );
    assert!(drain(&mut h.events_rx).is_empty());

    // 5 minutes 30 in: the claim expires and the listing reopens
    assert_eq!(
        sweeper
            .sweep_at(t0 + ChronoDuration::seconds(5 * 60 + 30))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        h.store.listing(listing.id).await.unwrap().unwrap().status,
        ListingStatus::Open
    );
    assert_eq!(
        h.store.claim(claim.id).await.unwrap().unwrap().status,
        ClaimStatus::Expired
    );
    assert_eq!(drain(&mut h.events_rx), vec![EventKind::Expired]);
}

#[tokio::test]
async fn full_lifecycle_on_sqlite() {
    let mut h = sqlite_harness(5).await;
    let listing = seed_listing(&h).await;

    let claim = h.manager.claim(listing.id, "buyer-1").await.unwrap();
    h.manager.confirm(claim.id, "seller-1").await.unwrap();

    let sold = h.store.listing(listing.id).await.unwrap().unwrap();
    assert_eq!(sold.status, ListingStatus::Sold);
    assert!(sold.sold_at.is_some());

    // the settled claim is invisible to the sweep
    let sweeper = TimeoutSweeper::new(
        h.store.clone(),
        h.manager.clone(),
        Duration::from_secs(120),
    );
    assert_eq!(
        sweeper
            .sweep_at(Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap(),
        0
    );

    // and expiring it reports the conflict instead of corrupting state
    let err = h.manager.expire(claim.id).await.unwrap_err();
    assert!(matches!(err, MarketError::NotPending(_)));
    assert_eq!(
        drain(&mut h.events_rx),
        vec![EventKind::Claimed, EventKind::Confirmed]
    );
}

#[tokio::test]
async fn provider_withdrawal_voids_a_claimed_listing_on_sqlite() {
    let mut h = sqlite_harness(5).await;
    let source = ScriptedSource::new();
    let sync = CatalogSynchronizer::new(
        source.clone(),
        h.store.clone(),
        h.manager.clone(),
        h.events.clone(),
        Duration::from_secs(3600),
    );

    source.set(vec![entry("p-1"), entry("p-2")]);
    sync.sync_once().await.unwrap();

    let slot = h.store.slot_by_provider_id("p-1").await.unwrap().unwrap();
    let listing = h.manager.post(slot.id, "seller-1", 10.0).await.unwrap();
    let claim = h.manager.claim(listing.id, "buyer-1").await.unwrap();

    // the provider withdraws the slot under the pending claim
    source.set(vec![entry("p-2")]);
    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.withdrawn, 1);
    assert_eq!(report.listings_invalidated, 1);

    assert_eq!(
        h.store.listing(listing.id).await.unwrap().unwrap().status,
        ListingStatus::Expired
    );
    assert_eq!(
        h.store.claim(claim.id).await.unwrap().unwrap().status,
        ClaimStatus::Cancelled
    );

    let kinds = drain(&mut h.events_rx);
    assert_eq!(
        kinds,
        vec![
            EventKind::SyncSucceeded,
            EventKind::Claimed,
            EventKind::Voided,
            EventKind::SyncSucceeded,
        ]
    );
}

#[tokio::test]
async fn a_buyer_cannot_steal_a_claimed_listing_on_sqlite() {
    let h = sqlite_harness(5).await;
    let listing = seed_listing(&h).await;

    h.manager.claim(listing.id, "buyer-1").await.unwrap();
    let err = h.manager.claim(listing.id, "buyer-2").await.unwrap_err();
    assert!(matches!(err, MarketError::AlreadyClaimed(_)));

    // only one claim row exists for the listing
    let active = h
        .store
        .pending_claim_for_listing(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.buyer_id, "buyer-1");
}
