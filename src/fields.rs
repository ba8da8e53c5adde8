//! Tokenizer for the lines of one frame.
//!
//! Each line of a frame is one of:
//!
//! - `Key=Value`: a keyed field. Spaces are removed before splitting.
//!   `Nature`, `Eos` and `Cat` values are resolved through the code tables;
//!   `Pos` values are also split into a latitude/longitude token pair.
//! - `Incoming <Type>`: the call header; `<Type>` becomes the call type.
//! - `<Label> <Value>`: a positional field.
//!
//! Empty lines and prompt lines (anything containing `>`) are skipped.
//! Keys and labels with no special meaning pass through unchanged.

use std::fmt;

use tracing::warn;

use crate::frame::FRAME_START;
use crate::tables::CodeTables;

/// One rendered line of a call record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// The call type from the `Incoming` header.
    CallType(String),
    /// A `(label, value)` pair from a keyed or positional line.
    Field { label: String, value: String },
    /// A single token with nothing to pair it with.
    Verbatim(String),
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::CallType(call_type) => write!(f, "Type: {}", call_type),
            Line::Field { label, value } => write!(f, "{}: {}", label, value),
            Line::Verbatim(text) => f.write_str(text),
        }
    }
}

/// A `Pos` field split into its two wire tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPosition {
    pub raw_lat: String,
    pub raw_long: String,
}

/// Result of tokenizing one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedFrame {
    /// Call type from the first `Incoming` line, if it had one.
    pub call_type: Option<String>,
    /// Rendered lines in frame order.
    pub lines: Vec<Line>,
    /// Positions found in `Pos` fields, in frame order.
    pub positions: Vec<RawPosition>,
    /// `Pos` fields that did not hold a `lat,long` pair.
    pub malformed_positions: usize,
}

/// Tokenize the text of one frame.
pub fn tokenize_frame(text: &str, tables: &CodeTables) -> TokenizedFrame {
    let mut out = TokenizedFrame::default();

    let cleaned = text.replace('\r', "");
    for line in cleaned.split('\n') {
        if line.is_empty() || line.contains('>') {
            continue;
        }

        if line.contains('=') {
            let (label, value, position) = tokenize_keyed(line, tables);
            match position {
                Some(position) => out.positions.push(position),
                None if label == "Pos" => out.malformed_positions += 1,
                None => {}
            }
            out.lines.push(Line::Field { label, value });
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => {}
            [only] => out.lines.push(Line::Verbatim(only.to_string())),
            [_, second, ..] if line.contains(FRAME_START) => {
                if out.call_type.is_none() {
                    out.call_type = Some(second.to_string());
                }
                out.lines.push(Line::CallType(second.to_string()));
            }
            [label, value, ..] => out.lines.push(Line::Field {
                label: label.to_string(),
                value: value.to_string(),
            }),
        }
    }

    out
}

/// Split a `Key=Value` line and resolve its value.
fn tokenize_keyed(line: &str, tables: &CodeTables) -> (String, String, Option<RawPosition>) {
    let compact: String = line.chars().filter(|c| *c != ' ').collect();
    let (key, value) = compact.split_once('=').unwrap_or((compact.as_str(), ""));

    let mut position = None;
    let resolved = match key {
        "Nature" => tables.nature.resolve(value),
        "Eos" => tables.end_of_sequence.resolve(value),
        "Cat" => tables.category.resolve(value),
        "Pos" => {
            let resolved = tables.category.resolve(value);
            position = split_position(resolved);
            if position.is_none() {
                warn!("Pos field without a lat,long pair: {:?}", resolved);
            }
            resolved
        }
        _ => value,
    };

    (key.to_string(), resolved.to_string(), position)
}

/// Split `lat,long` into two non-empty tokens.
fn split_position(value: &str) -> Option<RawPosition> {
    let mut parts = value.split(',');
    let raw_lat = parts.next().filter(|s| !s.is_empty())?;
    let raw_long = parts.next().filter(|s| !s.is_empty())?;
    Some(RawPosition {
        raw_lat: raw_lat.to_string(),
        raw_long: raw_long.to_string(),
    })
}

/// Render tokenized lines as record text, one line each with a trailing newline.
pub fn render_lines(lines: &[Line]) -> String {
    lines.iter().map(|line| format!("{}\n", line)).collect()
}
