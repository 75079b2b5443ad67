//! Replacement records: the unit of the edit ledger.

use crate::text::{Pos, Span};
use serde::{Deserialize, Serialize};

/// A single pending textual replacement within one file.
///
/// `change_id` groups replacements that belong to one logical rewrite
/// made by one descriptor invocation. It is used only for counting
/// distinct fixes, never for merge or ordering decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub start: Pos,
    pub end: Pos,
    pub text: String,
    pub change_id: u64,
}

impl Replacement {
    pub fn new(span: Span, text: impl Into<String>, change_id: u64) -> Self {
        Replacement {
            start: span.start,
            end: span.end,
            text: text.into(),
            change_id,
        }
    }

    /// Sort key: `(start, end)`, the order the rewriter consumes.
    pub fn sort_key(&self) -> (Pos, Pos) {
        (self.start, self.end)
    }
}

/// An edit as it appears in `--json` output: resolved against the
/// original text for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEdit {
    /// Path of the edited file (relative to the patch base directory
    /// when one applies).
    pub file: String,
    pub start: Pos,
    pub end: Pos,
    /// Original text covered by the range.
    pub old_text: String,
    /// Replacement text.
    pub new_text: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_orders_by_start_then_end() {
        let a = Replacement::new(
            Span::new(Pos::new(1, 0), Pos::new(1, 3)),
            "x",
            0,
        );
        let b = Replacement::new(
            Span::new(Pos::new(1, 0), Pos::new(1, 5)),
            "y",
            1,
        );
        let c = Replacement::new(
            Span::new(Pos::new(2, 0), Pos::new(2, 1)),
            "z",
            2,
        );
        let mut v = vec![c.clone(), b.clone(), a.clone()];
        v.sort_by_key(Replacement::sort_key);
        assert_eq!(v, vec![a, b, c]);
    }
}
