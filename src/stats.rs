//! Statistics tracking for the capture session.
//!
//! Counters are plain atomics updated from the link reader and the decode
//! loop; frame lengths are kept in an HDR histogram.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::storage::{StorageError, WriteOutcome};

/// Thread-safe statistics collector.
#[derive(Debug)]
pub struct DecoderStats {
    /// Raw bytes received from the link
    pub bytes_received: AtomicU64,

    /// Chunks delivered by the link
    pub chunks_received: AtomicU64,

    /// Frames extracted and decoded
    pub frames_decoded: AtomicU64,

    /// Call files created
    pub files_written: AtomicU64,

    /// Call files skipped because the name already existed
    pub duplicate_files: AtomicU64,

    /// Call file writes that failed
    pub write_failures: AtomicU64,

    /// Frames without a call type (not persisted)
    pub untyped_frames: AtomicU64,

    /// Position updates published
    pub positions_published: AtomicU64,

    /// `Pos` fields that did not split into a lat/long pair
    pub positions_malformed: AtomicU64,

    /// Bytes dropped by the trailing-text rule
    pub bytes_discarded: AtomicU64,

    /// Histogram of frame lengths in bytes
    frame_histogram: RwLock<Histogram<u64>>,

    /// Frames per call type
    calls_by_type: RwLock<HashMap<String, u64>>,

    /// When stats collection started
    start_time: Instant,
}

impl DecoderStats {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        Self {
            bytes_received: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            files_written: AtomicU64::new(0),
            duplicate_files: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            untyped_frames: AtomicU64::new(0),
            positions_published: AtomicU64::new(0),
            positions_malformed: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
            // Frame length: 1 byte to 64KB, 3 significant figures
            frame_histogram: RwLock::new(
                Histogram::new_with_bounds(1, 65_536, 3)
                    .expect("Failed to create frame histogram"),
            ),
            calls_by_type: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a chunk delivered by the link.
    pub fn record_chunk(&self, bytes: u64) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a decoded frame.
    pub fn record_frame(&self, frame_len: usize, call_type: Option<&str>) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut hist) = self.frame_histogram.write() {
            let _ = hist.record((frame_len as u64).clamp(1, 65_536));
        }

        match call_type {
            Some(call_type) => {
                if let Ok(mut map) = self.calls_by_type.write() {
                    *map.entry(call_type.to_string()).or_insert(0) += 1;
                }
            }
            None => {
                self.untyped_frames.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record the outcome of a call file write.
    pub fn record_write(&self, outcome: &Result<WriteOutcome, StorageError>) {
        let counter = match outcome {
            Ok(WriteOutcome::Written) => &self.files_written,
            Ok(WriteOutcome::AlreadyExists) => &self.duplicate_files,
            Err(_) => &self.write_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a published position update.
    pub fn record_position(&self) {
        self.positions_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a `Pos` field that could not be split.
    pub fn record_malformed_position(&self) {
        self.positions_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the discarded-bytes total from the buffer.
    pub fn set_discarded(&self, bytes: u64) {
        self.bytes_discarded.store(bytes, Ordering::Relaxed);
    }

    /// Get the elapsed time since stats collection started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Frames decoded per minute since start.
    pub fn frames_per_minute(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.frames_decoded.load(Ordering::Relaxed) as f64 * 60.0 / elapsed
        } else {
            0.0
        }
    }

    /// Generate a summary report.
    pub fn summary(&self) -> StatsSummary {
        let frame_percentiles = self
            .frame_histogram
            .read()
            .ok()
            .filter(|h| h.len() > 0)
            .map(|h| HistogramPercentiles {
                p50: h.value_at_quantile(0.50),
                p90: h.value_at_quantile(0.90),
                p99: h.value_at_quantile(0.99),
                min: h.min(),
                max: h.max(),
                mean: h.mean(),
            });

        let calls_by_type = self
            .calls_by_type
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            files_written: self.files_written.load(Ordering::Relaxed),
            duplicate_files: self.duplicate_files.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            untyped_frames: self.untyped_frames.load(Ordering::Relaxed),
            positions_published: self.positions_published.load(Ordering::Relaxed),
            positions_malformed: self.positions_malformed.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            frames_per_minute: self.frames_per_minute(),
            frame_percentiles,
            calls_by_type,
        }
    }
}

impl Default for DecoderStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from a histogram.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub bytes_received: u64,
    pub chunks_received: u64,
    pub frames_decoded: u64,
    pub files_written: u64,
    pub duplicate_files: u64,
    pub write_failures: u64,
    pub untyped_frames: u64,
    pub positions_published: u64,
    pub positions_malformed: u64,
    pub bytes_discarded: u64,
    pub frames_per_minute: f64,
    pub frame_percentiles: Option<HistogramPercentiles>,
    pub calls_by_type: HashMap<String, u64>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                  DSC CAPTURE STATISTICS")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(
            f,
            "Received: {} bytes in {} chunks",
            self.bytes_received, self.chunks_received
        )?;
        writeln!(f, "Frames decoded: {}", self.frames_decoded)?;
        writeln!(f, "Frames without call type: {}", self.untyped_frames)?;
        writeln!(
            f,
            "Files written: {} (duplicates skipped: {}, failures: {})",
            self.files_written, self.duplicate_files, self.write_failures
        )?;
        writeln!(
            f,
            "Positions published: {} (malformed: {})",
            self.positions_published, self.positions_malformed
        )?;
        writeln!(f, "Bytes discarded: {}", self.bytes_discarded)?;
        writeln!(f, "Rate: {:.2} frames/min", self.frames_per_minute)?;
        writeln!(f)?;

        if let Some(ref p) = self.frame_percentiles {
            writeln!(f, "Frame Length (bytes):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
            writeln!(f)?;
        }

        if !self.calls_by_type.is_empty() {
            writeln!(f, "Calls by Type:")?;
            let mut types: Vec<_> = self.calls_by_type.iter().collect();
            types.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (call_type, count) in types {
                writeln!(f, "  {}: {}", call_type, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_record_frame() {
        let stats = DecoderStats::new();

        stats.record_frame(40, Some("Distress"));
        stats.record_frame(60, Some("Distress"));
        stats.record_frame(20, None);

        let summary = stats.summary();
        assert_eq!(summary.frames_decoded, 3);
        assert_eq!(summary.untyped_frames, 1);
        assert_eq!(summary.calls_by_type.get("Distress"), Some(&2));
        let p = summary.frame_percentiles.unwrap();
        assert_eq!(p.min, 20);
        assert_eq!(p.max, 60);
    }

    #[test]
    fn test_record_write_outcomes() {
        let stats = DecoderStats::new();

        stats.record_write(&Ok(WriteOutcome::Written));
        stats.record_write(&Ok(WriteOutcome::AlreadyExists));
        stats.record_write(&Err(StorageError::Write {
            path: PathBuf::from("x"),
            source: std::io::Error::other("disk full"),
        }));

        let summary = stats.summary();
        assert_eq!(summary.files_written, 1);
        assert_eq!(summary.duplicate_files, 1);
        assert_eq!(summary.write_failures, 1);
    }

    #[test]
    fn test_empty_summary() {
        let stats = DecoderStats::new();
        stats.record_chunk(128);

        let summary = stats.summary();
        assert_eq!(summary.bytes_received, 128);
        assert_eq!(summary.chunks_received, 1);
        assert!(summary.frame_percentiles.is_none());
        assert!(summary.to_string().contains("Frames decoded: 0"));
    }
}
