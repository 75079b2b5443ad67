//! Version-control safety checks for in-place fixing.
//!
//! Before a file is rewritten on disk it must be provably recoverable:
//! tracked by git, free of uncommitted modifications, and not ignored.
//! A file failing any probe is skipped with a reason; the fix run
//! continues with the remaining files.

use crate::error::VcsError;
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};

/// Outcome of the three git probes for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsStatus {
    /// Safe to rewrite in place.
    Clean,
    /// Not tracked by git (or not inside a repository).
    NotTracked,
    /// Tracked but has uncommitted modifications.
    Modified,
    /// Matched by an ignore rule.
    Ignored,
}

impl VcsStatus {
    pub fn is_safe(&self) -> bool {
        matches!(self, VcsStatus::Clean)
    }
}

impl fmt::Display for VcsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcsStatus::Clean => write!(f, "clean"),
            VcsStatus::NotTracked => write!(f, "the file is not in a git repository"),
            VcsStatus::Modified => write!(f, "the file has uncommitted changes"),
            VcsStatus::Ignored => write!(f, "the file is ignored by git"),
        }
    }
}

fn git_probe(args: &[&str], cwd: &Path, file: &Path) -> Result<bool, VcsError> {
    let status = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| VcsError::GitUnavailable {
            file: file.to_path_buf(),
            source,
        })?;
    Ok(status.success())
}

/// Run the safety probes for one file.
pub fn check_file(file: &Path) -> Result<VcsStatus, VcsError> {
    let parent = file.parent().ok_or_else(|| VcsError::NoParentDir {
        file: file.to_path_buf(),
    })?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !git_probe(&["ls-files", "--error-unmatch", &name], parent, file)? {
        return Ok(VcsStatus::NotTracked);
    }
    if !git_probe(&["diff", "--quiet", &name], parent, file)? {
        return Ok(VcsStatus::Modified);
    }
    if git_probe(&["check-ignore", "--quiet", &name], parent, file)? {
        return Ok(VcsStatus::Ignored);
    }
    Ok(VcsStatus::Clean)
}

// ============================================================================
// Tests
// ============================================================================
