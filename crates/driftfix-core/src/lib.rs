//! Core text-rewriting machinery for driftfix.
//!
//! This crate owns everything that touches source text on disk:
//! position and span types over a newline-aware character stream,
//! replacement ledgers, the streaming rewriter, unified-diff
//! rendering, content hashing, and the git safety probes that gate
//! in-place fixes. It knows nothing about the drift language; the
//! compiler and interpreter live in `driftfix-lang` and the
//! deprecation descriptors in the `driftfix` crate proper.

pub mod diff;
pub mod edit;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod rewrite;
pub mod text;
pub mod vcs;

pub use edit::{OutputEdit, Replacement};
pub use error::{RewriteError, VcsError};
pub use hash::ContentHash;
pub use ledger::{ChangeRecorder, FixDisposition, FixOutcome, RecorderStack, SourceFileLedger};
pub use text::{Pos, Span};
