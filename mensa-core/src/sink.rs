use mensa_domain::LifecycleEvent;
use tracing::info;

/// Receives lifecycle events for rendering as outbound notifications.
/// Delivery is best-effort and outside the transactional boundary: a sink
/// must not fail the operation that emitted the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Sink that logs events through tracing. Used where no notification
/// channel is wired, e.g. one-shot tooling.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LifecycleEvent) {
        info!(
            kind = ?event.kind,
            listing = ?event.listing_id,
            claim = ?event.claim_id,
            "lifecycle event"
        );
    }
}
