//! Position update events.
//!
//! The decoder publishes a [`PositionUpdate`] for every `Pos` field it sees.
//! Updates carry the raw cardinal-delimited tokens exactly as received;
//! converting them to decimal degrees is the subscriber's job (see
//! [`crate::track::PositionTrack`]).
//!
//! The bus is an explicitly constructed [`tokio::sync::broadcast`] channel
//! handed to the decoder and to each subscriber. Publishing never waits for
//! subscribers; a subscriber that falls behind by more than the channel
//! capacity skips the oldest updates.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Default number of updates buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A position reported by a decoded call, still in wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionUpdate {
    /// Label of the link the call arrived on.
    pub source: String,
    /// Latitude token, e.g. `5325.71N`.
    pub raw_lat: String,
    /// Longitude token, e.g. `01433.82E`.
    pub raw_long: String,
}

/// Publish/subscribe hub for position updates.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PositionUpdate>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` updates per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new subscriber. It sees updates published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PositionUpdate> {
        self.tx.subscribe()
    }

    /// Publish an update without blocking.
    ///
    /// Returns the number of subscribers the update was queued for.
    pub fn publish(&self, update: PositionUpdate) -> usize {
        match self.tx.send(update) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(update)) => {
                debug!(
                    source = %update.source,
                    "No subscribers for position update {},{}",
                    update.raw_lat,
                    update.raw_long
                );
                0
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
