use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened. `Voided` is a claim cancelled because the provider
/// withdrew the underlying slot, as opposed to a plain timeout `Expired`;
/// the notification layer words the two differently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Claimed,
    Confirmed,
    Cancelled,
    Expired,
    Voided,
    SyncFailed,
    SyncSucceeded,
}

/// Lifecycle event handed to the notification sink. Informational only:
/// delivery is best-effort and outside the transactional boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub listing_id: Option<Uuid>,
    pub claim_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn listing(kind: EventKind, listing_id: Uuid) -> Self {
        Self {
            kind,
            listing_id: Some(listing_id),
            claim_id: None,
            at: Utc::now(),
        }
    }

    pub fn claim(kind: EventKind, listing_id: Uuid, claim_id: Uuid) -> Self {
        Self {
            kind,
            listing_id: Some(listing_id),
            claim_id: Some(claim_id),
            at: Utc::now(),
        }
    }

    pub fn sync(kind: EventKind) -> Self {
        Self {
            kind,
            listing_id: None,
            claim_id: None,
            at: Utc::now(),
        }
    }
}
