//! DSC Capture - A Rust library and service for decoding Digital Selective
//! Calling text output from a marine radio's serial port.
//!
//! This crate provides:
//! - A shared stream buffer that cuts `Incoming ... > ?` frames out of raw serial text
//! - A tokenizer that resolves Nature, Eos and Cat codes into readable text
//! - One text file per decoded call, named by call type and timestamp
//! - Position updates on a broadcast bus, with a decoder for the coordinate tokens
//! - Statistics tracking with HDR histograms and an optional metrics endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use dsc_capture::{Decoder, EventBus, RecordStore, SharedBuffer, TrailingPolicy};
//!
//! let store = RecordStore::open("/tmp/dsc-calls").expect("Failed to create output dir");
//! let decoder = Decoder::new(store, EventBus::default(), "COM3");
//!
//! let buffer = SharedBuffer::new(TrailingPolicy::Discard);
//! buffer.append("Incoming Distress\r\nNature=112\r\n> ?");
//! decoder.decode_pending(&buffer);
//!
//! println!("{}", decoder.display().contents());
//! println!("{}", decoder.stats().summary());
//! ```

pub mod buffer;
pub mod config;
pub mod decoder;
pub mod events;
pub mod fields;
pub mod frame;
pub mod geo;
pub mod link;
pub mod metrics;
pub mod record;
pub mod stats;
pub mod storage;
pub mod tables;
pub mod track;

pub use buffer::{SharedBuffer, StreamBuffer};
pub use config::Config;
pub use decoder::Decoder;
pub use events::{EventBus, PositionUpdate};
pub use fields::{Line, TokenizedFrame, tokenize_frame};
pub use frame::{Frame, TrailingPolicy, find_frame};
pub use geo::{GeoError, GeoPosition, decode_latitude, decode_longitude};
pub use link::{LinkConfig, LinkError, LinkEvent, SerialLink};
pub use record::{CallRecord, DisplayLog};
pub use stats::{DecoderStats, StatsSummary};
pub use storage::{RecordStore, StorageError, WriteOutcome};
pub use tables::CodeTables;
pub use track::PositionTrack;
