//! Error types for the edit/rewrite subsystem.
//!
//! Two families:
//! - `RewriteError`: a ledger could not be flushed safely. Inverted or
//!   overlapping ranges are fatal for the affected file; no byte is
//!   written once one is detected.
//! - `VcsError`: the version-control safety probe itself failed (git
//!   missing, IO error). A probe that *ran* and said "unsafe" is not an
//!   error; it is a per-file skip reported by the caller.

use crate::text::Pos;
use std::path::PathBuf;
use thiserror::Error;

/// Why a file's ledger could not be turned into new source text.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// A replacement with `start >= end`. Zero-width replacements are
    /// invalid; insertions must span the character they splice before.
    #[error("inverted replacement range {start}..{end} in {file}")]
    InvertedRange {
        file: PathBuf,
        start: Pos,
        end: Pos,
    },

    /// Two replacements overlap after sorting. There is no silent
    /// conflict resolution; the ledger for this file is not written.
    #[error("overlapping replacements in {file}: one ends at {first_end}, next starts at {second_start}")]
    Overlap {
        file: PathBuf,
        first_end: Pos,
        second_start: Pos,
    },

    #[error("failed to read or write {file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The git safety probe could not be executed.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to run git for {file}: {source}")]
    GitUnavailable {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} has no parent directory")]
    NoParentDir { file: PathBuf },
}

// ============================================================================
// Tests
// ============================================================================
