//! Call records and the running display log.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, TimeZone};

use crate::fields::{Line, TokenizedFrame};

/// Separator appended to the display log after every record.
pub const RECORD_SEPARATOR: &str = "------------------------------";

/// Extension of persisted call files.
pub const RECORD_EXTENSION: &str = "txt";

/// Timestamp format used in call file names.
const FILE_TIMESTAMP_FORMAT: &str = "%d.%m.%Y - %H-%M-%S%.3f";

/// The decoded, human-readable rendering of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// One `Label: Value` line per field, each ending in a newline.
    pub text: String,
    /// Call type from the frame header.
    pub call_type: Option<String>,
    /// File name to persist under; present only when a call type was seen.
    pub file_name: Option<String>,
}

/// Make a call type safe to use as the start of a file name.
///
/// Path separators, characters reserved on Windows and control characters
/// become `_`, so the name always stays a single path component.
pub fn file_safe_call_type(call_type: &str) -> String {
    call_type
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Derive the file name for a call: `<type> <DD.MM.YYYY - HH-mm-ss.fff>.txt`.
pub fn record_file_name<Tz>(call_type: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{} {}.{}",
        file_safe_call_type(call_type),
        at.format(FILE_TIMESTAMP_FORMAT),
        RECORD_EXTENSION
    )
}

/// Accumulates rendered lines into a [`CallRecord`].
#[derive(Debug, Default)]
pub struct CallRecordBuilder {
    text: String,
    call_type: Option<String>,
}

impl CallRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one rendered line.
    pub fn push_line(&mut self, line: &Line) -> &mut Self {
        if let Line::CallType(call_type) = line
            && self.call_type.is_none()
        {
            self.call_type = Some(call_type.clone());
        }
        self.text.push_str(&line.to_string());
        self.text.push('\n');
        self
    }

    /// Append every line of a tokenized frame.
    pub fn push_frame(&mut self, frame: &TokenizedFrame) -> &mut Self {
        for line in &frame.lines {
            self.push_line(line);
        }
        if self.call_type.is_none() {
            self.call_type = frame.call_type.clone();
        }
        self
    }

    /// Finish the record, stamping the file name with `at`.
    ///
    /// The builder is reset and can be reused for the next frame.
    pub fn finish<Tz>(&mut self, at: &DateTime<Tz>) -> CallRecord
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let text = std::mem::take(&mut self.text);
        let call_type = self.call_type.take();
        let file_name = call_type
            .as_deref()
            .map(|call_type| record_file_name(call_type, at));
        CallRecord {
            text,
            call_type,
            file_name,
        }
    }
}

/// Append-only text log of every decoded call, for display.
#[derive(Debug, Default)]
pub struct DisplayLog {
    text: RwLock<String>,
}

impl DisplayLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record followed by the separator line.
    pub fn append_record(&self, record: &CallRecord) {
        let mut text = self.text.write().unwrap_or_else(PoisonError::into_inner);
        text.push_str(&record.text);
        text.push_str(RECORD_SEPARATOR);
        text.push('\n');
    }

    /// Copy of the whole log.
    pub fn contents(&self) -> String {
        self.text
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.text.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the log.
    pub fn clear(&self) {
        self.text
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
