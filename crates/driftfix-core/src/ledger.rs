//! The edit ledger: per-file replacement lists, the change recorder,
//! and nested recorder activation.
//!
//! A `ChangeRecorder` is an append-only ledger of pending textual
//! replacements, grouped per file. Recorders are made "current" via an
//! explicit [`RecorderStack`] owned by the session: activation pushes,
//! deactivation restores the previous recorder, and only the innermost
//! active recorder receives new edits. Nested harness runs therefore
//! cannot leak edits into the wrong ledger.

use crate::edit::{OutputEdit, Replacement};
use crate::error::RewriteError;
use crate::rewrite::rewrite_text;
use crate::text::{byte_offset_to_pos, pos_to_byte_offset};
use crate::vcs::{self, VcsStatus};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

// ============================================================================
// Per-file Ledger
// ============================================================================

/// Pending replacements for a single source file.
#[derive(Debug, Clone, Default)]
pub struct SourceFileLedger {
    pub file: PathBuf,
    pub replacements: Vec<Replacement>,
}

impl SourceFileLedger {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        SourceFileLedger {
            file: file.into(),
            replacements: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    fn read_original(&self) -> Result<String, RewriteError> {
        std::fs::read_to_string(&self.file).map_err(|source| RewriteError::Io {
            file: self.file.clone(),
            source,
        })
    }

    /// Regenerate the file's text with all replacements applied.
    ///
    /// `None` when the ledger is empty.
    pub fn new_text(&self, original: &str) -> Result<Option<String>, RewriteError> {
        rewrite_text(&self.file, original, &self.replacements)
    }

    /// Rewrite the file on disk. Returns `true` if anything was written.
    ///
    /// Output is written as raw UTF-8 bytes so no platform newline
    /// translation can occur.
    pub fn rewrite(&self) -> Result<bool, RewriteError> {
        let original = self.read_original()?;
        match self.new_text(&original)? {
            Some(new) => {
                std::fs::write(&self.file, new.as_bytes()).map_err(|source| {
                    RewriteError::Io {
                        file: self.file.clone(),
                        source,
                    }
                })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unified diff between the file's current content and the
    /// rewritten text, with `display_path` in the headers.
    pub fn unified_diff(&self, display_path: &str) -> Result<Option<String>, RewriteError> {
        let original = self.read_original()?;
        Ok(self
            .new_text(&original)?
            .map(|new| crate::diff::unified_diff(&original, &new, display_path, display_path)))
    }

    /// Resolve replacements against `original` for JSON output.
    pub fn output_edits(&self, original: &str, display_path: &str) -> Vec<OutputEdit> {
        let mut sorted = self.replacements.clone();
        sorted.sort_by_key(Replacement::sort_key);
        sorted
            .iter()
            .map(|r| {
                let start = pos_to_byte_offset(original, r.start);
                let end = pos_to_byte_offset(original, r.end).max(start);
                // Re-derive the positions from the offsets so clamped
                // ranges stay consistent with old_text.
                OutputEdit {
                    file: display_path.to_string(),
                    start: byte_offset_to_pos(original, start),
                    end: byte_offset_to_pos(original, end),
                    old_text: original[start..end].to_string(),
                    new_text: r.text.clone(),
                }
            })
            .collect()
    }
}

// ============================================================================
// Change Recorder
// ============================================================================

/// Disposition of one file in a `fix_all` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixDisposition {
    /// File rewritten on disk.
    Fixed,
    /// Ledger had no edits; nothing written.
    NoEdits,
    /// Version-control safety check said no; file left untouched.
    Skipped(VcsStatus),
    /// Rewrite or probe failed; file left untouched.
    Failed(String),
}

/// Per-file report from a `fix_all` pass.
#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub file: PathBuf,
    pub disposition: FixDisposition,
}

/// An append-only ledger of textual replacements, grouped per file.
#[derive(Debug, Default)]
pub struct ChangeRecorder {
    files: BTreeMap<PathBuf, SourceFileLedger>,
}

impl ChangeRecorder {
    pub fn new() -> Self {
        ChangeRecorder::default()
    }

    /// Append a replacement to the ledger for `file`, creating the
    /// ledger lazily on first use.
    pub fn record(&mut self, file: &Path, replacement: Replacement) {
        self.files
            .entry(file.to_path_buf())
            .or_insert_with(|| SourceFileLedger::new(file))
            .replacements
            .push(replacement);
    }

    pub fn is_empty(&self) -> bool {
        self.files.values().all(SourceFileLedger::is_empty)
    }

    pub fn ledgers(&self) -> impl Iterator<Item = &SourceFileLedger> {
        self.files.values()
    }

    /// Number of distinct logical changes across all files.
    pub fn distinct_change_count(&self) -> usize {
        let ids: BTreeSet<u64> = self
            .files
            .values()
            .flat_map(|ledger| ledger.replacements.iter().map(|r| r.change_id))
            .collect();
        ids.len()
    }

    /// Rewrite every file with pending edits in place.
    ///
    /// With `check_vcs`, files that are untracked, modified, or ignored
    /// are skipped with a per-file reason; a failure on one file never
    /// aborts the rest of the pass.
    pub fn fix_all(&self, check_vcs: bool) -> Vec<FixOutcome> {
        let mut outcomes = Vec::new();
        for ledger in self.files.values() {
            let disposition = if ledger.is_empty() {
                FixDisposition::NoEdits
            } else if check_vcs {
                match vcs::check_file(&ledger.file) {
                    Ok(status) if !status.is_safe() => FixDisposition::Skipped(status),
                    Ok(_) => Self::apply(ledger),
                    Err(err) => FixDisposition::Failed(err.to_string()),
                }
            } else {
                Self::apply(ledger)
            };
            if let FixDisposition::Skipped(status) = &disposition {
                tracing::warn!(file = %ledger.file.display(), "skip fixing: {status}");
            }
            outcomes.push(FixOutcome {
                file: ledger.file.clone(),
                disposition,
            });
        }
        outcomes
    }

    fn apply(ledger: &SourceFileLedger) -> FixDisposition {
        match ledger.rewrite() {
            Ok(true) => FixDisposition::Fixed,
            Ok(false) => FixDisposition::NoEdits,
            Err(err) => FixDisposition::Failed(err.to_string()),
        }
    }

    /// Concatenated unified diff for every edited file under `basedir`.
    ///
    /// Files outside `basedir` are not part of the patch (matching the
    /// in-place path: a patch is applied relative to the script's
    /// directory).
    pub fn generate_patch(&self, basedir: &Path) -> Result<String, RewriteError> {
        let mut patch = String::new();
        for ledger in self.files.values() {
            let Ok(relative) = ledger.file.strip_prefix(basedir) else {
                continue;
            };
            if let Some(diff) = ledger.unified_diff(&relative.display().to_string())? {
                patch.push_str(&diff);
            }
        }
        Ok(patch)
    }
}

// ============================================================================
// Recorder Stack
// ============================================================================

/// Explicit nested-activation stack of change recorders.
///
/// The root recorder is always present and never popped. `activate`
/// pushes a recorder (making it current), `deactivate` restores the
/// previous one; enter/exit must stay symmetric at the call site.
#[derive(Debug, Default)]
pub struct RecorderStack {
    root: Rc<RefCell<ChangeRecorder>>,
    overrides: Vec<Rc<RefCell<ChangeRecorder>>>,
}

impl RecorderStack {
    pub fn new() -> Self {
        RecorderStack::default()
    }

    /// The innermost active recorder.
    pub fn current(&self) -> Rc<RefCell<ChangeRecorder>> {
        Rc::clone(self.overrides.last().unwrap_or(&self.root))
    }

    /// Make `recorder` current. The same recorder may be activated
    /// repeatedly (e.g. once per test case) and accumulates edits
    /// across activations.
    pub fn activate(&mut self, recorder: Rc<RefCell<ChangeRecorder>>) {
        self.overrides.push(recorder);
    }

    /// Restore the previously current recorder. The root recorder is
    /// never popped.
    pub fn deactivate(&mut self) {
        self.overrides.pop();
    }

    pub fn depth(&self) -> usize {
        self.overrides.len() + 1
    }
}

// ============================================================================
// Tests
// ============================================================================
