use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use mensa_domain::{Claim, ClaimStatus, Listing, ListingStatus, Slot, SyncCursor};

pub type RepoError = Box<dyn std::error::Error + Send + Sync>;
pub type RepoResult<T> = Result<T, RepoError>;

/// Repository trait for slot data access.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    async fn insert_slot(&self, slot: &Slot) -> RepoResult<()>;

    async fn slot(&self, id: Uuid) -> RepoResult<Option<Slot>>;

    async fn slot_by_provider_id(&self, provider_id: &str) -> RepoResult<Option<Slot>>;

    async fn all_slots(&self) -> RepoResult<Vec<Slot>>;

    /// Flips the availability flag. Returns false when the slot does not
    /// exist or already carries the requested flag.
    async fn set_slot_availability(&self, id: Uuid, available: bool) -> RepoResult<bool>;
}

/// Repository trait for listing data access.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn insert_listing(&self, listing: &Listing) -> RepoResult<()>;

    async fn listing(&self, id: Uuid) -> RepoResult<Option<Listing>>;

    async fn listings_by_seller(&self, seller_id: &str) -> RepoResult<Vec<Listing>>;

    async fn open_listings(&self) -> RepoResult<Vec<Listing>>;

    /// Listings still `Open` or `Claimed` that reference the slot.
    async fn active_listings_for_slot(&self, slot_id: Uuid) -> RepoResult<Vec<Listing>>;

    /// Conditional transition: "set status to `next` where id = `id` AND
    /// status = `expected`". Returns whether a row changed; a false result
    /// means a concurrent transition won. Stores stamp `sold_at` when
    /// `next` is `Sold`.
    async fn transition_listing(
        &self,
        id: Uuid,
        expected: ListingStatus,
        next: ListingStatus,
    ) -> RepoResult<bool>;
}

/// Repository trait for claim data access.
#[async_trait]
pub trait ClaimRepository: Send + Sync {
    /// Atomically inserts the claim and moves its listing `Open` ->
    /// `Claimed`. Returns false, inserting nothing, when the listing is
    /// not `Open`.
    async fn claim_listing(&self, claim: &Claim) -> RepoResult<bool>;

    async fn claim(&self, id: Uuid) -> RepoResult<Option<Claim>>;

    async fn pending_claim_for_listing(&self, listing_id: Uuid) -> RepoResult<Option<Claim>>;

    /// Pending claims whose deadline is at or before `now`.
    async fn expired_pending_claims(&self, now: DateTime<Utc>) -> RepoResult<Vec<Claim>>;

    /// Same conditional-transition contract as `transition_listing`.
    async fn transition_claim(
        &self,
        id: Uuid,
        expected: ClaimStatus,
        next: ClaimStatus,
    ) -> RepoResult<bool>;
}

/// Repository trait for the sync cursor.
#[async_trait]
pub trait SyncCursorRepository: Send + Sync {
    /// Overwrites the single cursor row.
    async fn record_sync(&self, cursor: &SyncCursor) -> RepoResult<()>;

    async fn last_sync(&self) -> RepoResult<Option<SyncCursor>>;
}

/// The full persistence gateway.
pub trait Repository:
    SlotRepository + ListingRepository + ClaimRepository + SyncCursorRepository
{
}

impl<T> Repository for T where
    T: SlotRepository + ListingRepository + ClaimRepository + SyncCursorRepository
{
}
