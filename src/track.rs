//! Subscriber that turns raw position updates into decoded positions.
//!
//! This is the consumer side of the split between the decoder (which only
//! forwards raw cardinal tokens) and the geo conversion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::events::PositionUpdate;
use crate::geo::{GeoError, GeoPosition};

/// A decoded position together with the link it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedPosition {
    pub source: String,
    #[serde(flatten)]
    pub position: GeoPosition,
}

/// Ordered list of every position decoded so far.
#[derive(Debug, Default)]
pub struct PositionTrack {
    positions: RwLock<Vec<TrackedPosition>>,
    rejected: AtomicU64,
}

impl PositionTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an update and append it to the track.
    ///
    /// Malformed updates are counted and returned as errors; the track is
    /// left unchanged.
    pub fn apply(&self, update: &PositionUpdate) -> Result<GeoPosition, GeoError> {
        match GeoPosition::from_raw(&update.raw_lat, &update.raw_long) {
            Ok(position) => {
                self.positions
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(TrackedPosition {
                        source: update.source.clone(),
                        position,
                    });
                Ok(position)
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Snapshot of the decoded positions in arrival order.
    pub fn positions(&self) -> Vec<TrackedPosition> {
        self.positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent decoded position.
    pub fn latest(&self) -> Option<TrackedPosition> {
        self.positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Number of updates that could not be decoded.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Consume updates from the bus until it closes.
    pub async fn follow(&self, mut rx: broadcast::Receiver<PositionUpdate>) {
        loop {
            match rx.recv().await {
                Ok(update) => match self.apply(&update) {
                    Ok(position) => {
                        info!(
                            source = %update.source,
                            "Position {:.5}, {:.5}",
                            position.latitude_degrees,
                            position.longitude_degrees
                        );
                    }
                    Err(e) => {
                        warn!(source = %update.source, "Dropping position update: {}", e);
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Position tracker lagged, skipped {} updates", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Position bus closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use std::sync::Arc;

    fn update(lat: &str, long: &str) -> PositionUpdate {
        PositionUpdate {
            source: "COM3".to_string(),
            raw_lat: lat.to_string(),
            raw_long: long.to_string(),
        }
    }

    #[test]
    fn test_apply_valid_update() {
        let track = PositionTrack::new();
        let pos = track.apply(&update("5325.71N", "01433.82E")).unwrap();

        assert!(pos.latitude_degrees > 53.0);
        assert!(pos.longitude_degrees > 14.0);
        assert_eq!(track.positions().len(), 1);
        assert_eq!(track.latest().unwrap().source, "COM3");
    }

    #[test]
    fn test_serialized_shape() {
        let track = PositionTrack::new();
        track.apply(&update("5330.00N", "00030.00W")).unwrap();

        let json = serde_json::to_value(track.positions()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "source": "COM3",
                "latitude_degrees": 53.5,
                "longitude_degrees": -0.5,
            }])
        );
    }

    #[test]
    fn test_apply_malformed_update() {
        let track = PositionTrack::new();
        assert!(track.apply(&update("north", "01433.82E")).is_err());
        assert!(track.positions().is_empty());
        assert_eq!(track.rejected(), 1);
    }

    #[tokio::test]
    async fn test_follow_until_bus_closes() {
        let track = Arc::new(PositionTrack::new());
        let bus = EventBus::new(8);
        let rx = bus.subscribe();

        let follower = {
            let track = Arc::clone(&track);
            tokio::spawn(async move { track.follow(rx).await })
        };

        bus.publish(update("5325.71N", "01433.82E"));
        bus.publish(update("bad", "01433.82E"));
        bus.publish(update("3352.00S", "15112.00E"));
        drop(bus);

        follower.await.unwrap();

        let positions = track.positions();
        assert_eq!(positions.len(), 2);
        assert!(positions[1].position.latitude_degrees < 0.0);
        assert_eq!(track.rejected(), 1);
    }
}
