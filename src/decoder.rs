//! The decode loop: frames in, call records, files and position events out.
//!
//! [`Decoder::run`] wakes on a fixed tick, cuts every complete frame out of
//! the shared buffer, then decodes them one by one outside the buffer lock:
//!
//! ```text
//! SharedBuffer ──drain──▶ Frame ──tokenize──▶ CallRecord ──▶ RecordStore
//!                                      │                  └─▶ DisplayLog
//!                                      └──▶ EventBus (PositionUpdate)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::buffer::SharedBuffer;
use crate::events::{EventBus, PositionUpdate};
use crate::fields::tokenize_frame;
use crate::frame::Frame;
use crate::record::{CallRecord, CallRecordBuilder, DisplayLog};
use crate::stats::DecoderStats;
use crate::storage::{RecordStore, StorageError, WriteOutcome};
use crate::tables::CodeTables;

/// Default decode tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// Default limit on one call file write from the decode loop.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns frames into persisted call records and position updates.
pub struct Decoder {
    tables: CodeTables,
    store: RecordStore,
    bus: EventBus,
    display: Arc<DisplayLog>,
    stats: Arc<DecoderStats>,
    source: String,
    write_timeout: Duration,
}

impl Decoder {
    /// Create a decoder writing into `store` and publishing on `bus`.
    ///
    /// `source` labels the position updates this decoder publishes.
    pub fn new(store: RecordStore, bus: EventBus, source: impl Into<String>) -> Self {
        Self {
            tables: CodeTables::new(),
            store,
            bus,
            display: Arc::new(DisplayLog::new()),
            stats: Arc::new(DecoderStats::new()),
            source: source.into(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Share an existing display log.
    pub fn with_display(mut self, display: Arc<DisplayLog>) -> Self {
        self.display = display;
        self
    }

    /// Share an existing statistics collector.
    pub fn with_stats(mut self, stats: Arc<DecoderStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Limit how long [`Decoder::run`] waits for one call file write.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn display(&self) -> &Arc<DisplayLog> {
        &self.display
    }

    pub fn stats(&self) -> &Arc<DecoderStats> {
        &self.stats
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Decode one frame, stamping its file name with the current local time.
    pub fn decode_frame(&self, frame: &Frame) -> CallRecord {
        self.decode_frame_at(frame, &Local::now())
    }

    /// Decode one frame, stamping its file name with `at`.
    ///
    /// The call file is written on the calling thread.
    pub fn decode_frame_at<Tz>(&self, frame: &Frame, at: &DateTime<Tz>) -> CallRecord
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let record = self.render_frame_at(frame, at);
        if let Some(file_name) = &record.file_name {
            let outcome = self.store.write_if_absent(file_name, &record.text);
            self.finish_write(outcome);
        }
        self.display.append_record(&record);
        record
    }

    /// Tokenize a frame, publish its positions and build its record.
    ///
    /// Nothing is written or logged for display.
    fn render_frame_at<Tz>(&self, frame: &Frame, at: &DateTime<Tz>) -> CallRecord
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let tokens = tokenize_frame(frame.as_str(), &self.tables);

        for raw in &tokens.positions {
            let receivers = self.bus.publish(PositionUpdate {
                source: self.source.clone(),
                raw_lat: raw.raw_lat.clone(),
                raw_long: raw.raw_long.clone(),
            });
            self.stats.record_position();
            debug!("Published position to {} subscribers", receivers);
        }
        for _ in 0..tokens.malformed_positions {
            self.stats.record_malformed_position();
        }

        let record = CallRecordBuilder::new().push_frame(&tokens).finish(at);
        self.stats
            .record_frame(frame.len(), record.call_type.as_deref());
        debug!(
            call_type = record.call_type.as_deref().unwrap_or("-"),
            "Decoded frame of {} bytes",
            frame.len()
        );
        record
    }

    fn finish_write(&self, outcome: Result<WriteOutcome, StorageError>) {
        if let Err(e) = &outcome {
            warn!("Could not persist call: {}", e);
        }
        self.stats.record_write(&outcome);
    }

    /// Write a record's file on the blocking pool, giving up after the
    /// write timeout.
    async fn persist(&self, record: &CallRecord) {
        let Some(file_name) = record.file_name.clone() else {
            return;
        };
        let path = self.store.dir().join(&file_name);
        let store = self.store.clone();
        let text = record.text.clone();

        let write = tokio::task::spawn_blocking(move || store.write_if_absent(&file_name, &text));
        let outcome = bounded_write(write, path, self.write_timeout).await;
        self.finish_write(outcome);
    }

    /// Drain and decode every complete frame in `buffer`.
    ///
    /// Files are written on the calling thread. Returns the number of
    /// frames decoded.
    pub fn decode_pending(&self, buffer: &SharedBuffer) -> usize {
        let frames = self.take_frames(buffer);
        for frame in &frames {
            self.decode_frame(frame);
        }
        frames.len()
    }

    /// Drain and decode every complete frame in `buffer`, writing files
    /// off the async runtime.
    pub async fn decode_pending_async(&self, buffer: &SharedBuffer) -> usize {
        let frames = self.take_frames(buffer);
        for frame in &frames {
            let record = self.render_frame_at(frame, &Local::now());
            self.persist(&record).await;
            self.display.append_record(&record);
        }
        frames.len()
    }

    fn take_frames(&self, buffer: &SharedBuffer) -> Vec<Frame> {
        let (frames, discarded) =
            buffer.with(|buf| (buf.drain_frames().collect::<Vec<_>>(), buf.discarded_bytes()));
        self.stats.set_discarded(discarded);
        frames
    }

    /// Decode on every tick until `shutdown` turns true or its sender is dropped.
    ///
    /// Buffered text is drained once more after the shutdown signal, so
    /// frames that arrived just before the link closed are not lost.
    pub async fn run(
        self,
        buffer: SharedBuffer,
        tick: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        info!("Decoder started, tick {} ms", tick.as_millis());

        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.decode_pending_async(&buffer).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let last = self.decode_pending_async(&buffer).await;
        info!("Decoder stopped after final drain of {} frames", last);
        self
    }
}

/// Await a blocking write for at most `timeout`.
///
/// A timeout or a panicked write task counts as a failed write. A timed-out
/// write may still complete in the background.
async fn bounded_write<F>(
    write: F,
    path: PathBuf,
    timeout: Duration,
) -> Result<WriteOutcome, StorageError>
where
    F: Future<Output = Result<Result<WriteOutcome, StorageError>, JoinError>>,
{
    match tokio::time::timeout(timeout, write).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join)) => Err(StorageError::Write {
            path,
            source: std::io::Error::other(join),
        }),
        Err(_) => Err(StorageError::Timeout { path, timeout }),
    }
}
