pub mod claim;
pub mod events;
pub mod listing;
pub mod slot;
pub mod sync;

pub use claim::{Claim, ClaimStatus};
pub use events::{EventKind, LifecycleEvent};
pub use listing::{Listing, ListingStatus};
pub use slot::Slot;
pub use sync::{SyncCursor, SyncOutcome};

/// A status string in storage did not match any known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown status code: {0}")]
pub struct UnknownStatus(pub String);
