use mensa_domain::ListingStatus;
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures surfaced by lifecycle operations.
///
/// The state-conflict variants (`AlreadyClaimed`, `NotPending`,
/// `InvalidState`, `SlotUnavailable`) are expected outcomes of races and
/// are never fatal; background loops swallow them. `Storage` is fatal for
/// the operation in progress only.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("listing not found: {0}")]
    ListingNotFound(Uuid),

    #[error("claim not found: {0}")]
    ClaimNotFound(Uuid),

    #[error("slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("slot is not available: {0}")]
    SlotUnavailable(Uuid),

    #[error("listing {0} is not open for claims")]
    AlreadyClaimed(Uuid),

    #[error("claim {0} is no longer pending")]
    NotPending(Uuid),

    #[error("invalid transition for listing {id} from {status}")]
    InvalidState { id: Uuid, status: ListingStatus },

    #[error("{actor} is not allowed to {action}")]
    Unauthorized {
        actor: String,
        action: &'static str,
    },

    #[error("storage failure: {0}")]
    Storage(BoxError),
}

impl From<BoxError> for MarketError {
    fn from(err: BoxError) -> Self {
        MarketError::Storage(err)
    }
}

impl MarketError {
    /// Conflicts a background loop logs and moves past instead of
    /// escalating: some concurrent actor already settled the entity.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            MarketError::AlreadyClaimed(_)
                | MarketError::NotPending(_)
                | MarketError::InvalidState { .. }
                | MarketError::SlotUnavailable(_)
        )
    }
}
