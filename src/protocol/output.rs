//! Buffered gateway output.
//!
//! Output arrives in arbitrary chunks and may carry terminal escape
//! sequences around the prompt. The buffer strips those, keeps unmatched
//! text, and hands out the earliest match among a set of patterns.

use crate::protocol::gatttool::{Pattern, Response};

/// Buffered text is trimmed to this size once it grows past it.
const MAX_BUFFERED: usize = 64 * 1024;
/// Bytes kept after a trim.
const KEEP_AFTER_TRIM: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EscapeState {
    #[default]
    Text,
    Escape,
    ControlSequence,
}

/// Accumulates gateway output and matches response patterns against it.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    /// Unconsumed output with escape sequences removed.
    text: String,
    /// Escape parser state carried across chunks.
    escape: EscapeState,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw output.
    pub fn push(&mut self, chunk: &str) {
        for c in chunk.chars() {
            match self.escape {
                EscapeState::Text => match c {
                    '\x1b' => self.escape = EscapeState::Escape,
                    // readline's invisible-prompt markers
                    '\x01' | '\x02' => {}
                    _ => self.text.push(c),
                },
                EscapeState::Escape => {
                    self.escape = if c == '[' {
                        EscapeState::ControlSequence
                    } else {
                        EscapeState::Text
                    };
                }
                EscapeState::ControlSequence => {
                    if ('@'..='~').contains(&c) {
                        self.escape = EscapeState::Text;
                    }
                }
            }
        }

        if self.text.len() > MAX_BUFFERED {
            let mut cut = self.text.len() - KEEP_AFTER_TRIM;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    /// Remove and return the earliest match among `patterns`.
    ///
    /// Text up to the end of the match is consumed. When two patterns match
    /// at the same position the one listed first wins.
    pub fn take_match(&mut self, patterns: &[Pattern]) -> Option<Response> {
        let (range, response) = patterns
            .iter()
            .filter_map(|pattern| pattern.find(&self.text))
            .min_by_key(|(range, _)| range.start)?;

        self.text.drain(..range.end);
        Some(response)
    }

    /// The unconsumed text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.text.clear();
        self.escape = EscapeState::Text;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::gatttool::AttributeHandle;

    #[test]
    fn test_strips_color_codes() {
        let mut buffer = OutputBuffer::new();
        buffer.push("\x1b[0;94m[AA:BB:CC:DD:EE:FF]\x1b[0m[LE]> ");
        assert_eq!(buffer.as_str(), "[AA:BB:CC:DD:EE:FF][LE]> ");
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let mut buffer = OutputBuffer::new();
        buffer.push("[CON]\x1b[0");
        buffer.push(";94m[LE]>");
        assert_eq!(buffer.as_str(), "[CON][LE]>");
    }

    #[test]
    fn test_take_match_consumes_through_match() {
        let mut buffer = OutputBuffer::new();
        buffer.push("[LE]> connect\nAttempting to connect\n");
        assert_eq!(buffer.take_match(&[Pattern::Prompt]), Some(Response::Prompt));
        assert_eq!(buffer.as_str(), " connect\nAttempting to connect\n");
        assert_eq!(buffer.take_match(&[Pattern::Prompt]), None);
    }

    #[test]
    fn test_take_match_prefers_earliest() {
        let mut buffer = OutputBuffer::new();
        buffer.push("[CON][AA][LE]> \nConnection successful\n");
        let response =
            buffer.take_match(&[Pattern::ConnectionSuccessful, Pattern::LinkConnected]);
        assert_eq!(response, Some(Response::LinkConnected));
    }

    #[test]
    fn test_take_match_partial_line_then_complete() {
        let handle = AttributeHandle::new(0x0e);
        let mut buffer = OutputBuffer::new();
        buffer.push("Notification handle = 0x000e value: 00");
        assert!(buffer.take_match(&[Pattern::Notification(handle)]).is_none());
        buffer.push(" 48 \n");
        match buffer.take_match(&[Pattern::Notification(handle)]) {
            Some(Response::Notification(n)) => assert_eq!(n.value, "00 48"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut buffer = OutputBuffer::new();
        let line = "Characteristic value was written successfully\n";
        for _ in 0..(2 * MAX_BUFFERED / line.len()) {
            buffer.push(line);
        }
        assert!(buffer.len() <= MAX_BUFFERED);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
