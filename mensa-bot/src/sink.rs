use mensa_core::sink::EventSink;
use mensa_domain::LifecycleEvent;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Fans lifecycle events out to broadcast subscribers; the conversational
/// layer renders them as outbound chat messages. A send with no subscriber
/// is dropped silently: events are informational, not authoritative state.
pub struct ChannelSink {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<LifecycleEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: LifecycleEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(kind = ?event.kind, "no notification subscriber, event dropped");
        }
    }
}

/// Drains a subscription and logs each event; stands in for the chat
/// renderer, which is outside this engine.
pub async fn log_events(mut rx: broadcast::Receiver<LifecycleEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => info!(
                kind = ?event.kind,
                listing = ?event.listing_id,
                claim = ?event.claim_id,
                "lifecycle event"
            ),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "notification stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
