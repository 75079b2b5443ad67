//! Source positions and position/offset conversions.
//!
//! ## Coordinate conventions
//!
//! - Lines are **1-indexed**, columns are **0-indexed** and count
//!   Unicode scalar values, not bytes.
//! - A `Span` is a half-open range `[start, end)` of positions within
//!   one file.
//! - Line endings `\n`, `\r`, and `\r\n` each advance the position by
//!   exactly one column unit before wrapping to the next line, so a
//!   `\r\n` pair occupies a single position. This is what lets the
//!   rewriter preserve the original line-ending style byte-for-byte in
//!   untouched regions.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Positions and Spans
// ============================================================================

/// A source position: 1-indexed line, 0-indexed character column.
///
/// Ordering is lexicographic on `(line, col)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(line: u32, col: u32) -> Self {
        Pos { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A half-open position range `[start, end)` within a single file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(start: Pos, end: Pos) -> Self {
        Span { start, end }
    }

    /// Span covering both input spans.
    pub fn join(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ============================================================================
// Character Stream
// ============================================================================

/// One unit yielded by [`char_stream`]: the position of the unit, the
/// byte offset where it starts, and its byte length (2 for `\r\n`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamUnit {
    pub pos: Pos,
    pub byte_offset: usize,
    pub byte_len: usize,
}

/// Iterate over a source text one position-advancing unit at a time.
///
/// `\r\n` is yielded as a single unit; every newline style wraps the
/// position to the start of the next line.
pub fn char_stream(source: &str) -> impl Iterator<Item = StreamUnit> + '_ {
    let mut chars = source.char_indices().peekable();
    let mut line = 1u32;
    let mut col = 0u32;
    std::iter::from_fn(move || {
        let (idx, c) = chars.next()?;
        let pos = Pos::new(line, col);
        let byte_len = if c == '\r' && matches!(chars.peek(), Some((_, '\n'))) {
            chars.next();
            2
        } else {
            c.len_utf8()
        };
        if c == '\r' || c == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
        Some(StreamUnit {
            pos,
            byte_offset: idx,
            byte_len,
        })
    })
}

// ============================================================================
// Position / Offset Conversions
// ============================================================================

/// Convert a position to a byte offset into `source`.
///
/// Positions past the end of the text (or past the end of their line)
/// clamp to the end of the text. Used for slicing node spans out of
/// source text, so clamping is the right failure mode.
pub fn pos_to_byte_offset(source: &str, pos: Pos) -> usize {
    for unit in char_stream(source) {
        if unit.pos >= pos {
            return unit.byte_offset;
        }
    }
    source.len()
}

/// Convert a byte offset into `source` to a position.
///
/// Offsets inside a multi-byte unit resolve to that unit's position;
/// offsets at or past the end of the text resolve to the position just
/// after the last unit.
pub fn byte_offset_to_pos(source: &str, offset: usize) -> Pos {
    let mut after_last = Pos::new(1, 0);
    for unit in char_stream(source) {
        if unit.byte_offset + unit.byte_len > offset {
            return unit.pos;
        }
        let first = source[unit.byte_offset..].chars().next();
        after_last = if matches!(first, Some('\n') | Some('\r')) {
            Pos::new(unit.pos.line + 1, 0)
        } else {
            Pos::new(unit.pos.line, unit.pos.col + 1)
        };
    }
    after_last
}

/// Extract the text covered by a span.
pub fn span_text<'a>(source: &'a str, span: &Span) -> &'a str {
    let start = pos_to_byte_offset(source, span.start);
    let end = pos_to_byte_offset(source, span.end);
    &source[start..end.max(start)]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod stream_tests {
        use super::*;

        #[test]
        fn lf_counts_one_unit_per_newline() {
            let units: Vec<_> = char_stream("ab\ncd").collect();
            assert_eq!(units.len(), 5);
            assert_eq!(units[2].pos, Pos::new(1, 2));
            assert_eq!(units[3].pos, Pos::new(2, 0));
        }

        #[test]
        fn crlf_is_a_single_unit() {
            let units: Vec<_> = char_stream("a\r\nb").collect();
            assert_eq!(units.len(), 3);
            assert_eq!(units[1].byte_len, 2);
            assert_eq!(units[2].pos, Pos::new(2, 0));
        }

        #[test]
        fn bare_cr_wraps_line() {
            let units: Vec<_> = char_stream("a\rb").collect();
            assert_eq!(units[2].pos, Pos::new(2, 0));
        }
    }

    mod conversion_tests {
        use super::*;

        #[test]
        fn roundtrip_positions() {
            let source = "let x = 1\nlet y = 2\n";
            for unit in char_stream(source) {
                assert_eq!(pos_to_byte_offset(source, unit.pos), unit.byte_offset);
                assert_eq!(byte_offset_to_pos(source, unit.byte_offset), unit.pos);
            }
        }

        #[test]
        fn span_text_slices() {
            let source = "let name = 1\n";
            let span = Span::new(Pos::new(1, 4), Pos::new(1, 8));
            assert_eq!(span_text(source, &span), "name");
        }

        #[test]
        fn span_text_multiline() {
            let source = "a\nbc\nd";
            let span = Span::new(Pos::new(1, 0), Pos::new(2, 1));
            assert_eq!(span_text(source, &span), "a\nb");
        }

        #[test]
        fn position_past_eof_clamps() {
            let source = "ab";
            assert_eq!(pos_to_byte_offset(source, Pos::new(9, 0)), 2);
        }

        #[test]
        fn unicode_columns_count_chars() {
            let source = "é = 1";
            // 'é' is 2 bytes but one column.
            assert_eq!(pos_to_byte_offset(source, Pos::new(1, 1)), 2);
            assert_eq!(byte_offset_to_pos(source, 2), Pos::new(1, 1));
        }
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn pos_orders_by_line_then_col() {
            assert!(Pos::new(1, 9) < Pos::new(2, 0));
            assert!(Pos::new(2, 1) < Pos::new(2, 2));
        }
    }
}
