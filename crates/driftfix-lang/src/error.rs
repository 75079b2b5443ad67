//! Error types for the drift language pipeline.

use driftfix_core::text::Pos;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Parse / Compile Errors
// ============================================================================

/// Tokenizer or parser failure, with the source position it occurred at.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{file}:{pos}: {message}")]
pub struct ParseError {
    pub file: PathBuf,
    pub pos: Pos,
    pub message: String,
}

impl ParseError {
    pub fn new(file: impl Into<PathBuf>, pos: Pos, message: impl Into<String>) -> Self {
        ParseError {
            file: file.into(),
            pos,
            message: message.into(),
        }
    }
}

/// Bytecode emission failure (e.g. an assignment target that is not
/// a name, attribute, or index expression).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{file}:{pos}: {message}")]
pub struct CompileError {
    pub file: PathBuf,
    pub pos: Pos,
    pub message: String,
}

impl CompileError {
    pub fn new(file: impl Into<PathBuf>, pos: Pos, message: impl Into<String>) -> Self {
        CompileError {
            file: file.into(),
            pos,
            message: message.into(),
        }
    }
}

// ============================================================================
// Runtime Errors
// ============================================================================

/// Runtime failure inside the interpreter.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("object has no attribute '{0}'")]
    UnknownAttribute(String),

    #[error("{0}")]
    TypeError(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in '{0}'")]
    IntegerOverflow(&'static str),

    #[error("list index {index} out of range (len {len})")]
    IndexOutOfRange { index: i64, len: usize },

    /// Interpreter invariant violation (stack underflow, bad const
    /// index). Indicates a compiler bug, not a user error.
    #[error("internal interpreter error: {0}")]
    Internal(&'static str),
}

// ============================================================================
// Structure Errors
// ============================================================================

/// The call-site resolver could not establish a bytecode-to-source
/// mapping. Never fatal to the running program; callers degrade to
/// warn-only behavior.
#[derive(Debug, Error)]
pub enum StructureError {
    /// No registered rewrite hook produced bytecode matching the
    /// frame's code object.
    #[error("no source correlation found for code object '{name}' in {file}")]
    UnmatchedBytecode { file: PathBuf, name: String },

    /// The frame's code object matched more than one candidate, or a
    /// correlation tie could not be broken.
    #[error("code object '{name}' in {file} is ambiguous (identical code on the same line)")]
    AmbiguousCodeObject { file: PathBuf, name: String },

    /// The instruction offset has no entry in the offset-to-node map.
    #[error("no source node recorded for instruction offset {offset} in '{name}'")]
    UnknownOffset { name: String, offset: usize },

    /// Re-parsing or re-compiling the source failed. The program is
    /// already running this source, so this indicates an internal
    /// inconsistency rather than a user error.
    #[error("correlation compile failed: {0}")]
    Compile(String),

    /// Fewer live frames than the requested depth.
    #[error("no frame at depth {depth} (stack height {height})")]
    MissingFrame { depth: usize, height: usize },

    /// Source text could not be loaded from the store or from disk.
    #[error("source for {file} is unavailable: {message}")]
    MissingSource { file: PathBuf, message: String },
}

impl From<ParseError> for StructureError {
    fn from(err: ParseError) -> Self {
        StructureError::Compile(err.to_string())
    }
}

impl From<CompileError> for StructureError {
    fn from(err: CompileError) -> Self {
        StructureError::Compile(err.to_string())
    }
}
