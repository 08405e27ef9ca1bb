use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mensa_core::error::MarketError;
use mensa_core::lifecycle::LifecycleManager;
use mensa_core::repository::Repository;

/// Timeout reconciliation loop: on a fixed interval, finds pending claims
/// past their deadline and expires them. Lateness only delays expiry, it
/// never breaks it, so scheduling jitter is harmless.
pub struct TimeoutSweeper {
    store: Arc<dyn Repository>,
    manager: Arc<LifecycleManager>,
    interval: Duration,
}

impl TimeoutSweeper {
    pub fn new(
        store: Arc<dyn Repository>,
        manager: Arc<LifecycleManager>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            manager,
            interval,
        }
    }

    /// Runs until cancelled. The first tick completes immediately, so
    /// claims already overdue after a restart are swept without waiting a
    /// full interval. A run finishes before the next fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "timeout sweeper started");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        // storage outage: skip this run, the next tick retries
                        error!(error = %e, "sweep run failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("timeout sweeper stopping");
                    break;
                }
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<usize, MarketError> {
        self.sweep_at(Utc::now()).await
    }

    /// One sweep against an explicit clock. Idempotent: re-running finds
    /// no newly expirable claims.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, MarketError> {
        let due = self.store.expired_pending_claims(now).await?;
        if due.is_empty() {
            debug!("no pending claims past their deadline");
            return Ok(0);
        }

        info!(count = due.len(), "expiring pending claims past deadline");
        let mut expired = 0;
        for claim in due {
            match self.manager.expire(claim.id).await {
                Ok(()) => expired += 1,
                Err(MarketError::NotPending(id)) => {
                    // a confirm or cancel won the race since the query
                    debug!(claim = %id, "claim settled before the sweep reached it");
                }
                Err(e) => {
                    warn!(claim = %claim.id, error = %e, "failed to expire claim");
                }
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use mensa_core::memory::MemoryStore;
    use mensa_core::policy::ConfirmPolicy;
    use mensa_core::repository::{ClaimRepository, ListingRepository, SlotRepository};
    use mensa_core::sink::TracingSink;
    use mensa_domain::{ClaimStatus, ListingStatus, Slot};

    struct Fixture {
        store: Arc<MemoryStore>,
        manager: Arc<LifecycleManager>,
        sweeper: TimeoutSweeper,
    }

    fn fixture(timeout_minutes: i64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(LifecycleManager::new(
            store.clone(),
            Arc::new(TracingSink),
            ChronoDuration::minutes(timeout_minutes),
            ConfirmPolicy::Either,
        ));
        let sweeper = TimeoutSweeper::new(
            store.clone(),
            manager.clone(),
            Duration::from_secs(60),
        );
        Fixture {
            store,
            manager,
            sweeper,
        }
    }

    async fn seed_claimed_listing(fx: &Fixture) -> (uuid::Uuid, uuid::Uuid) {
        let slot = Slot::new(
            "p-1".to_string(),
            Utc::now().date_naive(),
            "lunch".to_string(),
            "stew".to_string(),
            None,
        );
        fx.store.insert_slot(&slot).await.unwrap();
        let listing = fx.manager.post(slot.id, "seller-1", 10.0).await.unwrap();
        let claim = fx.manager.claim(listing.id, "buyer-1").await.unwrap();
        (listing.id, claim.id)
    }

    #[tokio::test]
    async fn sweep_before_the_deadline_is_a_noop() {
        let fx = fixture(5);
        let (listing_id, claim_id) = seed_claimed_listing(&fx).await;

        let now = Utc::now();
        assert_eq!(
            fx.sweeper.sweep_at(now + ChronoDuration::minutes(4)).await.unwrap(),
            0
        );
        let claim = fx.store.claim(claim_id).await.unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        let listing = fx.store.listing(listing_id).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Claimed);
    }

    #[tokio::test]
    async fn sweep_after_the_deadline_expires_the_claim() {
        let fx = fixture(5);
        let (listing_id, claim_id) = seed_claimed_listing(&fx).await;

        let now = Utc::now();
        assert_eq!(
            fx.sweeper
                .sweep_at(now + ChronoDuration::seconds(5 * 60 + 30))
                .await
                .unwrap(),
            1
        );
        let claim = fx.store.claim(claim_id).await.unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Expired);
        let listing = fx.store.listing(listing_id).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Open);

        // idempotent: an immediate re-run finds nothing
        assert_eq!(
            fx.sweeper
                .sweep_at(now + ChronoDuration::seconds(5 * 60 + 31))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn confirmed_claims_are_left_alone() {
        let fx = fixture(5);
        let (listing_id, claim_id) = seed_claimed_listing(&fx).await;
        fx.manager.confirm(claim_id, "seller-1").await.unwrap();

        let now = Utc::now();
        assert_eq!(
            fx.sweeper.sweep_at(now + ChronoDuration::minutes(10)).await.unwrap(),
            0
        );
        let listing = fx.store.listing(listing_id).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Sold);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let fx = fixture(5);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(fx.sweeper.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop in time")
            .unwrap();
    }
}
