use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use mensa_domain::{Claim, ClaimStatus, EventKind, LifecycleEvent, Listing, ListingStatus};

use crate::error::MarketError;
use crate::policy::ConfirmPolicy;
use crate::repository::Repository;
use crate::sink::EventSink;

/// Owns the listing/claim state machine. Every transition is a single
/// conditional update against the gateway, so two racers on the same
/// listing resolve to one winner and one state-conflict error.
///
/// Ordering discipline: the pending claim is the lock for a `Claimed`
/// listing. Confirm, cancel, expire and withdraw must win the claim's
/// `Pending -> *` transition before touching the listing, which leaves the
/// listing's follow-up transition uncontended. For an `Open` listing the
/// `claim_listing` guard plays the same role.
pub struct LifecycleManager {
    store: Arc<dyn Repository>,
    events: Arc<dyn EventSink>,
    pending_timeout: Duration,
    confirm_policy: ConfirmPolicy,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn Repository>,
        events: Arc<dyn EventSink>,
        pending_timeout: Duration,
        confirm_policy: ConfirmPolicy,
    ) -> Self {
        Self {
            store,
            events,
            pending_timeout,
            confirm_policy,
        }
    }

    /// Creates an `Open` listing for an available slot.
    pub async fn post(
        &self,
        slot_id: Uuid,
        seller_id: &str,
        price: f64,
    ) -> Result<Listing, MarketError> {
        let slot = self
            .store
            .slot(slot_id)
            .await?
            .ok_or(MarketError::SlotNotFound(slot_id))?;
        if !slot.available {
            return Err(MarketError::SlotUnavailable(slot_id));
        }

        let listing = Listing::new(slot_id, seller_id.to_string(), price);
        self.store.insert_listing(&listing).await?;
        info!(listing = %listing.id, slot = %slot_id, seller = seller_id, "listing posted");
        Ok(listing)
    }

    /// Places a pending claim on an open listing and returns it; the
    /// claim's deadline is `now + pending_timeout`.
    pub async fn claim(&self, listing_id: Uuid, buyer_id: &str) -> Result<Claim, MarketError> {
        let listing = self
            .store
            .listing(listing_id)
            .await?
            .ok_or(MarketError::ListingNotFound(listing_id))?;
        if listing.seller_id == buyer_id {
            return Err(MarketError::Unauthorized {
                actor: buyer_id.to_string(),
                action: "claim their own listing",
            });
        }
        if listing.status != ListingStatus::Open {
            return Err(MarketError::AlreadyClaimed(listing_id));
        }

        let claim = Claim::new(
            listing_id,
            buyer_id.to_string(),
            Utc::now() + self.pending_timeout,
        );
        if !self.store.claim_listing(&claim).await? {
            // another buyer won between the read and the guarded insert
            return Err(MarketError::AlreadyClaimed(listing_id));
        }

        info!(
            listing = %listing_id,
            claim = %claim.id,
            buyer = buyer_id,
            deadline = %claim.deadline,
            "listing claimed"
        );
        self.events
            .emit(LifecycleEvent::claim(EventKind::Claimed, listing_id, claim.id));
        Ok(claim)
    }

    /// Confirms a pending claim: claim -> `Confirmed`, listing -> `Sold`.
    pub async fn confirm(&self, claim_id: Uuid, actor_id: &str) -> Result<(), MarketError> {
        let (claim, listing) = self.claim_with_listing(claim_id).await?;
        self.ensure_party(actor_id, &claim, &listing, "confirm this claim")?;
        if claim.status != ClaimStatus::Pending {
            return Err(MarketError::NotPending(claim_id));
        }
        if !self
            .confirm_policy
            .allows(actor_id, &claim.buyer_id, &listing.seller_id)
        {
            return Err(MarketError::Unauthorized {
                actor: actor_id.to_string(),
                action: "confirm this claim",
            });
        }

        if !self
            .store
            .transition_claim(claim_id, ClaimStatus::Pending, ClaimStatus::Confirmed)
            .await?
        {
            return Err(MarketError::NotPending(claim_id));
        }
        self.settle_listing(listing.id, ListingStatus::Sold).await?;

        info!(listing = %listing.id, claim = %claim_id, actor = actor_id, "claim confirmed");
        self.events
            .emit(LifecycleEvent::claim(EventKind::Confirmed, listing.id, claim_id));
        Ok(())
    }

    /// Cancels a pending claim (buyer backs out or seller rejects);
    /// the listing reopens.
    pub async fn cancel(&self, claim_id: Uuid, actor_id: &str) -> Result<(), MarketError> {
        let (claim, listing) = self.claim_with_listing(claim_id).await?;
        self.ensure_party(actor_id, &claim, &listing, "cancel this claim")?;
        if claim.status != ClaimStatus::Pending {
            return Err(MarketError::NotPending(claim_id));
        }

        if !self
            .store
            .transition_claim(claim_id, ClaimStatus::Pending, ClaimStatus::Cancelled)
            .await?
        {
            return Err(MarketError::NotPending(claim_id));
        }
        self.settle_listing(listing.id, ListingStatus::Open).await?;

        info!(listing = %listing.id, claim = %claim_id, actor = actor_id, "claim cancelled");
        self.events
            .emit(LifecycleEvent::claim(EventKind::Cancelled, listing.id, claim_id));
        Ok(())
    }

    /// Expires a pending claim past its deadline; the listing reopens.
    /// Called by the timeout sweep only. A `NotPending` result means a
    /// confirm or cancel won the race since the sweep's query.
    pub async fn expire(&self, claim_id: Uuid) -> Result<(), MarketError> {
        let (claim, listing) = self.claim_with_listing(claim_id).await?;
        if claim.status != ClaimStatus::Pending {
            return Err(MarketError::NotPending(claim_id));
        }

        if !self
            .store
            .transition_claim(claim_id, ClaimStatus::Pending, ClaimStatus::Expired)
            .await?
        {
            return Err(MarketError::NotPending(claim_id));
        }
        self.settle_listing(listing.id, ListingStatus::Open).await?;

        info!(listing = %listing.id, claim = %claim_id, "pending claim expired");
        self.events
            .emit(LifecycleEvent::claim(EventKind::Expired, listing.id, claim_id));
        Ok(())
    }

    /// Seller pulls a listing. Valid from `Open` or `Claimed`; a claimed
    /// listing first cancels its active claim.
    pub async fn withdraw(&self, listing_id: Uuid, seller_id: &str) -> Result<(), MarketError> {
        let listing = self
            .store
            .listing(listing_id)
            .await?
            .ok_or(MarketError::ListingNotFound(listing_id))?;
        if listing.seller_id != seller_id {
            return Err(MarketError::Unauthorized {
                actor: seller_id.to_string(),
                action: "withdraw this listing",
            });
        }

        match listing.status {
            ListingStatus::Open => {
                if !self
                    .store
                    .transition_listing(listing_id, ListingStatus::Open, ListingStatus::Withdrawn)
                    .await?
                {
                    return Err(MarketError::InvalidState {
                        id: listing_id,
                        status: listing.status,
                    });
                }
            }
            ListingStatus::Claimed => {
                let claim = self
                    .store
                    .pending_claim_for_listing(listing_id)
                    .await?
                    .ok_or(MarketError::InvalidState {
                        id: listing_id,
                        status: listing.status,
                    })?;
                if !self
                    .store
                    .transition_claim(claim.id, ClaimStatus::Pending, ClaimStatus::Cancelled)
                    .await?
                {
                    // the claim settled concurrently; the caller re-reads
                    return Err(MarketError::InvalidState {
                        id: listing_id,
                        status: listing.status,
                    });
                }
                self.settle_listing(listing_id, ListingStatus::Withdrawn)
                    .await?;
                self.events
                    .emit(LifecycleEvent::claim(EventKind::Cancelled, listing_id, claim.id));
            }
            status => {
                return Err(MarketError::InvalidState {
                    id: listing_id,
                    status,
                });
            }
        }

        info!(listing = %listing_id, seller = seller_id, "listing withdrawn");
        Ok(())
    }

    /// The underlying slot was withdrawn by the provider. An open listing
    /// expires; a claimed listing expires with its claim voided, which is
    /// notified distinctly from a timeout expiry. Called by catalog sync
    /// only.
    pub async fn invalidate(&self, listing_id: Uuid) -> Result<(), MarketError> {
        let listing = self
            .store
            .listing(listing_id)
            .await?
            .ok_or(MarketError::ListingNotFound(listing_id))?;

        match listing.status {
            ListingStatus::Open => {
                if !self
                    .store
                    .transition_listing(listing_id, ListingStatus::Open, ListingStatus::Expired)
                    .await?
                {
                    return Err(MarketError::InvalidState {
                        id: listing_id,
                        status: listing.status,
                    });
                }
                info!(listing = %listing_id, "listing expired, slot withdrawn by provider");
                self.events
                    .emit(LifecycleEvent::listing(EventKind::Expired, listing_id));
            }
            ListingStatus::Claimed => {
                let claim = self
                    .store
                    .pending_claim_for_listing(listing_id)
                    .await?
                    .ok_or(MarketError::InvalidState {
                        id: listing_id,
                        status: listing.status,
                    })?;
                if !self
                    .store
                    .transition_claim(claim.id, ClaimStatus::Pending, ClaimStatus::Cancelled)
                    .await?
                {
                    // a concurrent confirm made the sale final; leave it
                    return Err(MarketError::InvalidState {
                        id: listing_id,
                        status: listing.status,
                    });
                }
                self.settle_listing(listing_id, ListingStatus::Expired)
                    .await?;
                info!(
                    listing = %listing_id,
                    claim = %claim.id,
                    "claim voided, slot withdrawn by provider"
                );
                self.events
                    .emit(LifecycleEvent::claim(EventKind::Voided, listing_id, claim.id));
            }
            status => {
                debug!(listing = %listing_id, %status, "invalidate skipped terminal listing");
                return Err(MarketError::InvalidState {
                    id: listing_id,
                    status,
                });
            }
        }
        Ok(())
    }

    async fn claim_with_listing(
        &self,
        claim_id: Uuid,
    ) -> Result<(Claim, Listing), MarketError> {
        let claim = self
            .store
            .claim(claim_id)
            .await?
            .ok_or(MarketError::ClaimNotFound(claim_id))?;
        let listing = self
            .store
            .listing(claim.listing_id)
            .await?
            .ok_or(MarketError::ListingNotFound(claim.listing_id))?;
        Ok((claim, listing))
    }

    fn ensure_party(
        &self,
        actor_id: &str,
        claim: &Claim,
        listing: &Listing,
        action: &'static str,
    ) -> Result<(), MarketError> {
        if actor_id != claim.buyer_id && actor_id != listing.seller_id {
            return Err(MarketError::Unauthorized {
                actor: actor_id.to_string(),
                action,
            });
        }
        Ok(())
    }

    /// Moves a listing out of `Claimed` after its claim transition was won.
    /// The claim acts as the lock, so a miss here indicates a gateway
    /// inconsistency rather than an ordinary race.
    async fn settle_listing(
        &self,
        listing_id: Uuid,
        next: ListingStatus,
    ) -> Result<(), MarketError> {
        if !self
            .store
            .transition_listing(listing_id, ListingStatus::Claimed, next)
            .await?
        {
            warn!(listing = %listing_id, %next, "claimed listing was not in CLAIMED state");
        }
        Ok(())
    }
}
