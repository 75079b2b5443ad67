//! Source regeneration from a set of non-overlapping replacements.
//!
//! The rewriter streams the original text one position unit at a time
//! (see [`crate::text::char_stream`]) and splices replacement text in
//! at recorded boundaries. Everything outside the replaced ranges is
//! copied through byte-for-byte, so line-ending style and encoding of
//! untouched regions survive unchanged.

use crate::edit::Replacement;
use crate::error::RewriteError;
use crate::text::char_stream;
use std::path::Path;

/// Apply `replacements` to `original`, returning the new text.
///
/// Returns `Ok(None)` when there are no replacements. Validation runs
/// before any output is produced: every range must satisfy
/// `start < end`, and after sorting by `(start, end)` ranges must be
/// pairwise non-overlapping (`end[i] <= start[i+1]`). A violation is a
/// hard failure; producing corrupt source is never an option.
pub fn rewrite_text(
    file: &Path,
    original: &str,
    replacements: &[Replacement],
) -> Result<Option<String>, RewriteError> {
    if replacements.is_empty() {
        return Ok(None);
    }

    let mut sorted: Vec<&Replacement> = replacements.iter().collect();
    sorted.sort_by_key(|r| r.sort_key());

    for r in &sorted {
        if r.start >= r.end {
            return Err(RewriteError::InvertedRange {
                file: file.to_path_buf(),
                start: r.start,
                end: r.end,
            });
        }
    }
    for pair in sorted.windows(2) {
        if pair[0].end > pair[1].start {
            return Err(RewriteError::Overlap {
                file: file.to_path_buf(),
                first_end: pair[0].end,
                second_start: pair[1].start,
            });
        }
    }

    let mut out = String::with_capacity(original.len());
    let mut last_byte = 0usize;
    let mut idx = 0usize;
    let mut add_tail = true;

    'stream: for unit in char_stream(original) {
        // Adjacent replacements may share a boundary position, so after
        // one range closes the next one's start is checked against the
        // same unit.
        loop {
            let Some(r) = sorted.get(idx) else {
                break 'stream;
            };
            if unit.pos == r.start {
                out.push_str(&original[last_byte..unit.byte_offset]);
                out.push_str(&r.text);
                add_tail = false;
            }
            if unit.pos == r.end {
                last_byte = unit.byte_offset;
                add_tail = true;
                idx += 1;
                continue;
            }
            break;
        }
    }

    if add_tail {
        out.push_str(&original[last_byte..]);
    }

    Ok(Some(out))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{Pos, Span};

    fn repl(start: (u32, u32), end: (u32, u32), text: &str) -> Replacement {
        Replacement::new(
            Span::new(Pos::new(start.0, start.1), Pos::new(end.0, end.1)),
            text,
            0,
        )
    }

    fn apply(original: &str, replacements: &[Replacement]) -> String {
        rewrite_text(Path::new("test.dft"), original, replacements)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn no_replacements_is_none() {
        let out = rewrite_text(Path::new("t"), "abc", &[]).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn single_replacement() {
        let out = apply("let old = 1\n", &[repl((1, 4), (1, 7), "new")]);
        assert_eq!(out, "let new = 1\n");
    }

    #[test]
    fn multiple_replacements_on_one_line() {
        let out = apply(
            "a.old + b.old\n",
            &[repl((1, 2), (1, 5), "new"), repl((1, 10), (1, 13), "new")],
        );
        assert_eq!(out, "a.new + b.new\n");
    }

    #[test]
    fn adjacent_replacements_share_boundary() {
        let out = apply("abcd", &[repl((1, 0), (1, 2), "X"), repl((1, 2), (1, 4), "Y")]);
        assert_eq!(out, "XY");
    }

    #[test]
    fn replacement_across_lines() {
        let out = apply("aa\nbb\ncc\n", &[repl((1, 1), (3, 1), "-")]);
        assert_eq!(out, "a-c\n");
    }

    #[test]
    fn crlf_preserved_outside_edit() {
        let out = apply("old\r\nkeep\r\n", &[repl((1, 0), (1, 3), "new")]);
        assert_eq!(out, "new\r\nkeep\r\n");
    }

    #[test]
    fn bare_cr_preserved() {
        let out = apply("old\rkeep\r", &[repl((1, 0), (1, 3), "new")]);
        assert_eq!(out, "new\rkeep\r");
    }

    #[test]
    fn replacement_ending_at_eof() {
        let out = apply("keep old", &[repl((1, 5), (1, 8), "new")]);
        assert_eq!(out, "keep new");
    }

    #[test]
    fn inverted_range_rejected() {
        let err = rewrite_text(
            Path::new("t.dft"),
            "abc",
            &[repl((1, 2), (1, 2), "x")],
        )
        .unwrap_err();
        assert!(matches!(err, RewriteError::InvertedRange { .. }));
    }

    #[test]
    fn overlap_rejected_before_output() {
        let err = rewrite_text(
            Path::new("t.dft"),
            "abcdef",
            &[repl((1, 0), (1, 3), "x"), repl((1, 2), (1, 5), "y")],
        )
        .unwrap_err();
        assert!(matches!(err, RewriteError::Overlap { .. }));
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let out = apply(
            "aa bb cc",
            &[repl((1, 6), (1, 8), "C"), repl((1, 0), (1, 2), "A")],
        );
        assert_eq!(out, "A bb C");
    }
}
