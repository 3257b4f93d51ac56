//! Real-time update fan-out
//!
//! Every state change the agent makes is published as a typed JSON message.
//! Subscribers that fall behind lose the oldest messages; publishing with no
//! subscribers is a no-op.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::stream::now_ms;

/// Buffered messages per subscriber before lagging
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    SystemStatus,
    RegimeUpdate,
    DecisionCard,
    OrderUpdate,
    PositionUpdate,
    RiskUpdate,
    Incident,
    EquityTick,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<BroadcastMessage>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }

    /// Serialize and publish. Returns the number of subscribers reached.
    pub fn publish<T: Serialize>(&self, kind: MessageKind, payload: &T) -> usize {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                trace!(?kind, error = %e, "Dropping unserializable broadcast payload");
                return 0;
            }
        };

        let message = BroadcastMessage {
            kind,
            payload,
            timestamp: now_ms(),
        };
        // Err only means nobody is listening
        self.tx.send(message).unwrap_or(0)
    }
}
