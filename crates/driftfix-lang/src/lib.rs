//! The drift language and its call-site resolution engine.
//!
//! Front half: tokenizer, parser, bytecode compiler, and stack VM for
//! drift (`.dft`) scripts. Back half: the machinery that maps a live
//! VM frame back to the exact source expression it is executing, by
//! compiling the source twice (once with real positions, once with
//! AST-index positions) and correlating the two instruction streams.

pub mod ast;
pub mod builtins;
pub mod code;
pub mod compiler;
pub mod correlate;
pub mod error;
pub mod hooks;
pub mod index;
pub mod parser;
pub mod resolve;
pub mod token;
pub mod vm;

pub use ast::{Expr, ExprKind, Module, Node, Stmt, StmtKind};
pub use code::{CodeObject, Fingerprint};
pub use error::{CompileError, ParseError, StructureError, VmError};
pub use hooks::{AssertRewriteHook, HookRegistry, IdentityHook, RewriteHook};
pub use resolve::{resolve_frame, CorrelationCache, LookupResult};
pub use vm::{Accessor, CallContext, Frame, Interpreter, ObjRef, SourceStore, Value};
