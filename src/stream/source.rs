//! Pluggable event sources
//!
//! The agent only depends on the `EventSource` trait, so a live adapter
//! (websocket feed, shred decoder) can replace the synthetic generator
//! without touching the decision core.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::event::Event;

/// Produces a sequence of market events
#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` when the source is exhausted
    async fn next_event(&mut self) -> Option<Event>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Event source fed by another task through a channel
pub struct ChannelEventSource {
    rx: mpsc::Receiver<Event>,
}

impl ChannelEventSource {
    /// Create a source and the sender an adapter pushes into
    pub fn new(capacity: usize) -> (mpsc::Sender<Event>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    fn name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::EventKind;

    #[tokio::test]
    async fn test_channel_source_forwards_events_in_order() {
        let (tx, mut source) = ChannelEventSource::new(8);

        tx.send(Event::new(EventKind::Launch, "mint1", "creator", 0.0, 1)).await.unwrap();
        tx.send(Event::new(EventKind::Buy, "mint1", "w1", 0.2, 2)).await.unwrap();
        drop(tx);

        assert_eq!(source.next_event().await.unwrap().kind, EventKind::Launch);
        assert_eq!(source.next_event().await.unwrap().kind, EventKind::Buy);
        assert!(source.next_event().await.is_none());
    }
}
