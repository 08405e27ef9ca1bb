use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use mensa_domain::{Claim, ClaimStatus, Listing, ListingStatus, Slot, SyncCursor};

use crate::repository::{
    ClaimRepository, ListingRepository, RepoResult, SlotRepository, SyncCursorRepository,
};

/// In-memory persistence gateway over mutex-guarded maps. Backs the test
/// suite and ephemeral runs; the conditional-update contract is identical
/// to the SQLite store's. No await happens while the lock is held, so every
/// operation is a single critical section.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<Uuid, Slot>,
    listings: HashMap<Uuid, Listing>,
    claims: HashMap<Uuid, Claim>,
    cursor: Option<SyncCursor>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

#[async_trait]
impl SlotRepository for MemoryStore {
    async fn insert_slot(&self, slot: &Slot) -> RepoResult<()> {
        self.lock().slots.insert(slot.id, slot.clone());
        Ok(())
    }

    async fn slot(&self, id: Uuid) -> RepoResult<Option<Slot>> {
        Ok(self.lock().slots.get(&id).cloned())
    }

    async fn slot_by_provider_id(&self, provider_id: &str) -> RepoResult<Option<Slot>> {
        Ok(self
            .lock()
            .slots
            .values()
            .find(|s| s.provider_id == provider_id)
            .cloned())
    }

    async fn all_slots(&self) -> RepoResult<Vec<Slot>> {
        Ok(self.lock().slots.values().cloned().collect())
    }

    async fn set_slot_availability(&self, id: Uuid, available: bool) -> RepoResult<bool> {
        let mut inner = self.lock();
        match inner.slots.get_mut(&id) {
            Some(slot) if slot.available != available => {
                slot.available = available;
                slot.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ListingRepository for MemoryStore {
    async fn insert_listing(&self, listing: &Listing) -> RepoResult<()> {
        self.lock().listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn listing(&self, id: Uuid) -> RepoResult<Option<Listing>> {
        Ok(self.lock().listings.get(&id).cloned())
    }

    async fn listings_by_seller(&self, seller_id: &str) -> RepoResult<Vec<Listing>> {
        Ok(self
            .lock()
            .listings
            .values()
            .filter(|l| l.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn open_listings(&self) -> RepoResult<Vec<Listing>> {
        Ok(self
            .lock()
            .listings
            .values()
            .filter(|l| l.status == ListingStatus::Open)
            .cloned()
            .collect())
    }

    async fn active_listings_for_slot(&self, slot_id: Uuid) -> RepoResult<Vec<Listing>> {
        Ok(self
            .lock()
            .listings
            .values()
            .filter(|l| {
                l.slot_id == slot_id
                    && matches!(l.status, ListingStatus::Open | ListingStatus::Claimed)
            })
            .cloned()
            .collect())
    }

    async fn transition_listing(
        &self,
        id: Uuid,
        expected: ListingStatus,
        next: ListingStatus,
    ) -> RepoResult<bool> {
        let mut inner = self.lock();
        match inner.listings.get_mut(&id) {
            Some(listing) if listing.status == expected => {
                let now = Utc::now();
                listing.status = next;
                listing.updated_at = now;
                if next == ListingStatus::Sold {
                    listing.sold_at = Some(now);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ClaimRepository for MemoryStore {
    async fn claim_listing(&self, claim: &Claim) -> RepoResult<bool> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.listings.get_mut(&claim.listing_id) {
            Some(listing) if listing.status == ListingStatus::Open => {
                listing.status = ListingStatus::Claimed;
                listing.updated_at = Utc::now();
                inner.claims.insert(claim.id, claim.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim(&self, id: Uuid) -> RepoResult<Option<Claim>> {
        Ok(self.lock().claims.get(&id).cloned())
    }

    async fn pending_claim_for_listing(&self, listing_id: Uuid) -> RepoResult<Option<Claim>> {
        Ok(self
            .lock()
            .claims
            .values()
            .find(|c| c.listing_id == listing_id && c.status == ClaimStatus::Pending)
            .cloned())
    }

    async fn expired_pending_claims(&self, now: DateTime<Utc>) -> RepoResult<Vec<Claim>> {
        Ok(self
            .lock()
            .claims
            .values()
            .filter(|c| c.status == ClaimStatus::Pending && c.deadline <= now)
            .cloned()
            .collect())
    }

    async fn transition_claim(
        &self,
        id: Uuid,
        expected: ClaimStatus,
        next: ClaimStatus,
    ) -> RepoResult<bool> {
        let mut inner = self.lock();
        match inner.claims.get_mut(&id) {
            Some(claim) if claim.status == expected => {
                claim.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SyncCursorRepository for MemoryStore {
    async fn record_sync(&self, cursor: &SyncCursor) -> RepoResult<()> {
        self.lock().cursor = Some(cursor.clone());
        Ok(())
    }

    async fn last_sync(&self) -> RepoResult<Option<SyncCursor>> {
        Ok(self.lock().cursor.clone())
    }
}
