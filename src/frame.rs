//! Frame detection in the accumulated link text.
//!
//! A frame is everything from the word `Incoming` up to and including the
//! first prompt terminator `> ?` that follows it, with at least one
//! character in between:
//!
//! ```text
//! Incoming Distress
//! Nature=112
//! Eos=127
//! > ?
//! ```
//!
//! Text before `Incoming` is noise and is never part of a frame.

use nom::{
    IResult, Parser,
    bytes::complete::{tag, take_until},
    character::complete::anychar,
    combinator::recognize,
};
use serde::Deserialize;

/// Word that opens every frame.
pub const FRAME_START: &str = "Incoming";

/// Prompt that closes every frame.
pub const FRAME_END: &str = "> ?";

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    text: String,
}

impl Frame {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// What to do with text that is already buffered after a matched frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingPolicy {
    /// If more than one character follows the frame, drop the whole buffer.
    #[default]
    Discard,
    /// Drop the frame and the single character after it; keep the rest.
    Retain,
}

/// Recognize a frame body starting exactly at `Incoming`.
fn parse_frame_body(input: &str) -> IResult<&str, &str> {
    recognize((tag(FRAME_START), anychar, take_until(FRAME_END), tag(FRAME_END))).parse(input)
}

/// Find the first complete frame in `text`.
///
/// Returns the byte range `(start, end)` of the frame, `end` exclusive.
pub fn find_frame(text: &str) -> Option<(usize, usize)> {
    let start = text.find(FRAME_START)?;
    let (rest, body) = parse_frame_body(&text[start..]).ok()?;
    debug_assert_eq!(start + body.len(), text.len() - rest.len());
    Some((start, start + body.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_simple_frame() {
        let text = "Incoming Distress\nNature=112\n> ?";
        assert_eq!(find_frame(text), Some((0, text.len())));
    }

    #[test]
    fn test_find_frame_after_noise() {
        let text = "garbage\r\nIncoming Urgency\r\nCat=110\r\n> ? tail";
        let (start, end) = find_frame(text).unwrap();
        assert_eq!(&text[start..end], "Incoming Urgency\r\nCat=110\r\n> ?");
    }

    #[test]
    fn test_incomplete_frame() {
        assert_eq!(find_frame("Incoming Distress\nNature=112\n"), None);
        assert_eq!(find_frame("Incoming Distress\nNature=112\n> "), None);
        assert_eq!(find_frame("Incom"), None);
        assert_eq!(find_frame(""), None);
    }

    #[test]
    fn test_terminator_without_start() {
        assert_eq!(find_frame("Nature=112\n> ?"), None);
    }

    #[test]
    fn test_needs_one_character_between_markers() {
        assert_eq!(find_frame("Incoming> ?"), None);
        assert_eq!(find_frame("Incoming > ?"), Some((0, 12)));
    }

    #[test]
    fn test_shortest_match_wins() {
        let text = "Incoming A\n> ?\nIncoming B\n> ?";
        let (start, end) = find_frame(text).unwrap();
        assert_eq!(&text[start..end], "Incoming A\n> ?");
    }

    #[test]
    fn test_multibyte_text() {
        let text = "§§ Incoming Ä\n> ?";
        let (start, end) = find_frame(text).unwrap();
        assert_eq!(&text[start..end], "Incoming Ä\n> ?");
    }
}
