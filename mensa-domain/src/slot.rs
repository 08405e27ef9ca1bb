use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One reservable unit sourced from the provider catalog: a meal for a
/// specific date and sitting. Slots are created and flipped unavailable by
/// catalog synchronization; they are never deleted because historical
/// listings keep referencing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    /// Provider-assigned identifier, stable across syncs.
    pub provider_id: String,
    pub date: NaiveDate,
    pub sitting: String,
    pub description: String,
    /// Provider list price; opaque to the lifecycle.
    pub price: Option<f64>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(
        provider_id: String,
        date: NaiveDate,
        sitting: String,
        description: String,
        price: Option<f64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_id,
            date,
            sitting,
            description,
            price,
            available: true,
            created_at: now,
            updated_at: now,
        }
    }
}
