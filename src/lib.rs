//! driftfix: deprecation-aware evolution tooling for drift scripts.
//!
//! Library authors declare renames (`deprecated_alias` for attributes,
//! `argument_renamed` for keyword arguments); running scripts keeps
//! working through the old names while every deprecated call site is
//! resolved back to its exact source location via bytecode correlation
//! and recorded as a minimal text edit. Edits are emitted as a patch
//! file or applied in place behind version-control safety checks.
//!
//! The language pipeline (tokenizer, parser, compiler, interpreter,
//! correlator) lives in `driftfix-lang`; text rewriting, diffing, and
//! the edit ledger live in `driftfix-core`.

pub use driftfix_core::diff;
pub use driftfix_core::edit;
pub use driftfix_core::ledger;
pub use driftfix_core::rewrite;
pub use driftfix_core::text;
pub use driftfix_core::vcs;

// Deprecation machinery
pub mod arguments;
pub mod descriptor;
pub mod session;

// Front doors
pub mod cli;
pub mod harness;
pub mod runner;

pub mod error;

pub use error::{DriftfixError, Result};
pub use runner::{run_script, RunOutcome};
pub use session::{Session, SessionRef};
