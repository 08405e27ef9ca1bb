use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::UnknownStatus;

/// Claim lifecycle states. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Confirmed,
    Expired,
    Cancelled,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Confirmed => "CONFIRMED",
            ClaimStatus::Expired => "EXPIRED",
            ClaimStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ClaimStatus::Pending),
            "CONFIRMED" => Ok(ClaimStatus::Confirmed),
            "EXPIRED" => Ok(ClaimStatus::Expired),
            "CANCELLED" => Ok(ClaimStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A buyer's provisional or confirmed acquisition of a listing. The deadline
/// is fixed at creation; the timeout sweep expires claims past it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: String,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl Claim {
    pub fn new(listing_id: Uuid, buyer_id: String, deadline: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            listing_id,
            buyer_id,
            status: ClaimStatus::Pending,
            created_at: Utc::now(),
            deadline,
        }
    }

    /// Eligible for expiry at the deadline and not before.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn deadline_eligibility_is_inclusive() {
        let deadline = Utc::now() + Duration::minutes(5);
        let claim = Claim::new(Uuid::new_v4(), "buyer-1".to_string(), deadline);

        assert!(!claim.is_past_deadline(deadline - Duration::seconds(1)));
        assert!(claim.is_past_deadline(deadline));
        assert!(claim.is_past_deadline(deadline + Duration::seconds(1)));
    }
}
