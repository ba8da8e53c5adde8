//! Accumulator for link text awaiting frame extraction.
//!
//! [`StreamBuffer`] is a plain single-owner type. It is shared between the
//! link reader (appending) and the decode tick (draining) through
//! [`SharedBuffer`], which wraps it in one mutex: every append and every
//! drain runs under that lock, so a drain never sees half of a chunk.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::frame::{FRAME_START, Frame, TrailingPolicy, find_frame};

/// Default limit on text kept while no complete frame is buffered.
pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024;

/// Growable text buffer with frame extraction.
#[derive(Debug)]
pub struct StreamBuffer {
    /// Text not yet consumed by a drain.
    text: String,
    /// Bytes of an incomplete UTF-8 sequence from the previous chunk.
    pending: Vec<u8>,
    policy: TrailingPolicy,
    /// Most bytes of text kept after a drain finds no frame.
    max_len: usize,
    /// Bytes thrown away by the trailing-text rule or the size limit.
    discarded: u64,
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new(TrailingPolicy::default())
    }
}

impl StreamBuffer {
    pub fn new(policy: TrailingPolicy) -> Self {
        Self {
            text: String::new(),
            pending: Vec::new(),
            policy,
            max_len: DEFAULT_MAX_BUFFER,
            discarded: 0,
        }
    }

    /// Set the size limit for unmatched text.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(FRAME_START.len());
        self
    }

    /// Append text to the tail.
    pub fn append(&mut self, text: &str) {
        if !self.pending.is_empty() {
            // Text cannot complete a byte sequence; the partial char is lost.
            self.text.push(char::REPLACEMENT_CHARACTER);
            self.pending.clear();
        }
        self.text.push_str(text);
    }

    /// Append raw bytes from the link.
    ///
    /// A multi-byte character split across two chunks is held back until
    /// the rest of it arrives. Invalid bytes become U+FFFD.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let mut input = data.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    self.text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                        None => {
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Iterate over the complete frames currently buffered.
    ///
    /// Each frame is removed from the buffer as the iterator yields it.
    /// Text after the last complete frame stays for the next drain.
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { buffer: self }
    }

    /// Extract the next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<Frame> {
        let Some((start, end)) = find_frame(&self.text) else {
            self.enforce_limit();
            return None;
        };
        let frame = Frame::new(&self.text[start..end]);

        // The character right after the terminator belongs to the frame.
        let consumed = end
            + self.text[end..]
                .chars()
                .next()
                .map_or(0, char::len_utf8);

        match self.policy {
            TrailingPolicy::Discard if self.text.len() > consumed => {
                let dropped = self.text.len() - consumed;
                warn!(
                    "Discarding {} bytes buffered after frame of {} bytes",
                    dropped,
                    frame.len()
                );
                self.discarded += dropped as u64;
                self.text.clear();
            }
            _ => {
                self.text.drain(..consumed);
            }
        }

        trace!("Extracted frame, {} bytes remain buffered", self.text.len());
        Some(frame)
    }

    /// Trim unmatched text down to the size limit.
    ///
    /// The oldest text goes first. When an `Incoming` survives the cut,
    /// everything before it is dropped too.
    fn enforce_limit(&mut self) {
        if self.text.len() <= self.max_len {
            return;
        }

        let mut cut = self.text.len() - self.max_len;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        if let Some(start) = self.text[cut..].find(FRAME_START) {
            cut += start;
        }

        warn!(
            "No frame in {} buffered bytes, dropping the oldest {}",
            self.text.len(),
            cut
        );
        self.discarded += cut as u64;
        self.text.drain(..cut);
    }

    /// Buffered text not yet consumed.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.pending.is_empty()
    }

    /// Total bytes dropped by the trailing-text rule.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    pub fn policy(&self) -> TrailingPolicy {
        self.policy
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.text.clear();
        self.pending.clear();
    }
}

/// Lazy iterator returned by [`StreamBuffer::drain_frames`].
pub struct DrainFrames<'a> {
    buffer: &'a mut StreamBuffer,
}

impl Iterator for DrainFrames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.buffer.next_frame()
    }
}

/// A [`StreamBuffer`] shared between the link reader and the decode tick.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<StreamBuffer>>,
}

impl SharedBuffer {
    pub fn new(policy: TrailingPolicy) -> Self {
        Self::from_buffer(StreamBuffer::new(policy))
    }

    /// Share an already configured buffer.
    pub fn from_buffer(buffer: StreamBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a text chunk under the lock.
    pub fn append(&self, text: &str) {
        self.lock().append(text);
    }

    /// Append a raw byte chunk under the lock.
    pub fn append_bytes(&self, bytes: &[u8]) {
        self.lock().append_bytes(bytes);
    }

    /// Take every complete frame out of the buffer.
    ///
    /// The lock is held only while frames are cut out, not while they are
    /// decoded.
    pub fn drain_frames(&self) -> Vec<Frame> {
        self.lock().drain_frames().collect()
    }

    /// Run `f` with exclusive access to the buffer.
    pub fn with<R>(&self, f: impl FnOnce(&mut StreamBuffer) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn discarded_bytes(&self) -> u64 {
        self.lock().discarded_bytes()
    }
}
