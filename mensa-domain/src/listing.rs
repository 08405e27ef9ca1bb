use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::UnknownStatus;

/// Listing lifecycle states. `Sold`, `Withdrawn` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    /// Offered, no active claim.
    Open,
    /// Exactly one pending claim holds the listing.
    Claimed,
    Sold,
    Withdrawn,
    /// The underlying slot was withdrawn by the provider.
    Expired,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Open => "OPEN",
            ListingStatus::Claimed => "CLAIMED",
            ListingStatus::Sold => "SOLD",
            ListingStatus::Withdrawn => "WITHDRAWN",
            ListingStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ListingStatus::Sold | ListingStatus::Withdrawn | ListingStatus::Expired
        )
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(ListingStatus::Open),
            "CLAIMED" => Ok(ListingStatus::Claimed),
            "SOLD" => Ok(ListingStatus::Sold),
            "WITHDRAWN" => Ok(ListingStatus::Withdrawn),
            "EXPIRED" => Ok(ListingStatus::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A seller's offer of a specific slot. Owns at most one active claim at a
/// time; terminal rows are retained for audit, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub seller_id: String,
    pub status: ListingStatus,
    /// Asking price; opaque to the lifecycle.
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sold_at: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn new(slot_id: Uuid, seller_id: String, price: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slot_id,
            seller_id,
            status: ListingStatus::Open,
            price,
            created_at: now,
            updated_at: now,
            sold_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_codes() {
        for status in [
            ListingStatus::Open,
            ListingStatus::Claimed,
            ListingStatus::Sold,
            ListingStatus::Withdrawn,
            ListingStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<ListingStatus>().unwrap(), status);
        }
        assert!("PAUSED".parse::<ListingStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!ListingStatus::Open.is_terminal());
        assert!(!ListingStatus::Claimed.is_terminal());
        assert!(ListingStatus::Sold.is_terminal());
        assert!(ListingStatus::Withdrawn.is_terminal());
        assert!(ListingStatus::Expired.is_terminal());
    }
}
