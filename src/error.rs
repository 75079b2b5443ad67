//! Unified error type for the driftfix front door.
//!
//! Subsystem errors from `driftfix-core` (rewriting, version control) and
//! `driftfix-lang` (parsing, compilation, execution) are bridged into a single
//! `DriftfixError` so the runner, harness, and CLI can report failures with one
//! type. Bridging happens through `#[from]` conversions; only I/O carries extra
//! context (the file that failed), because the raw `std::io::Error` message is
//! useless without it.

use std::path::PathBuf;

use thiserror::Error;

use driftfix_core::error::{RewriteError, VcsError};
use driftfix_lang::error::{CompileError, ParseError, VmError};

// ============================================================================
// Unified Error Type
// ============================================================================

/// Canonical error type for the runner, harness, and CLI.
#[derive(Debug, Error)]
pub enum DriftfixError {
    /// Source could not be tokenized or parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Source parsed but could not be compiled to bytecode.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Script raised an error during execution.
    #[error("script error: {0}")]
    Script(#[from] VmError),

    /// Recorded edits could not be applied to a source file.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// Version control probe failed.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// File system access failed.
    #[error("{}: {source}", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DriftfixError {
    /// Wrap an I/O error with the path that caused it.
    pub fn io(file: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriftfixError::Io {
            file: file.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriftfixError>;

// ============================================================================
// Tests
// ============================================================================
