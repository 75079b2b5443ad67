//! Per-run deprecation session.
//!
//! A [`Session`] owns everything the rename machinery shares across a
//! script run: the recorder stack that collects source edits, the
//! correlation cache, the registry of rewrite hooks to try when
//! correlating, and the warnings emitted so far. The attribute
//! descriptor and the argument wrapper both hold an [`SessionRef`] and
//! report through it.
//!
//! [`install`] wires the session into an interpreter by registering
//! the two declaration builtins scripts use:
//!
//! - `deprecated_alias(obj, old, new)` keeps the attribute `old`
//!   working on `obj` as an alias for `new`, warning and recording a
//!   fix at every distinct call site.
//! - `argument_renamed(f, old, new)` returns a wrapper around the
//!   function `f` that accepts the keyword argument `old` as an alias
//!   for `new`, with the same warning and fix behavior.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use driftfix_core::edit::Replacement;
use driftfix_core::ledger::RecorderStack;
use driftfix_lang::error::VmError;
use driftfix_lang::resolve::CorrelationCache;
use driftfix_lang::vm::{type_name, Interpreter, Value};
use driftfix_lang::HookRegistry;

use crate::arguments::wrap_renamed_argument;
use crate::descriptor::RenamedAttribute;

// ============================================================================
// Session
// ============================================================================

pub type SessionRef = Rc<RefCell<Session>>;

pub struct Session {
    pub recorders: RecorderStack,
    pub cache: CorrelationCache,
    pub hooks: HookRegistry,
    pub warnings: Vec<String>,
    next_change_id: u64,
}

impl Session {
    pub fn new() -> SessionRef {
        Rc::new(RefCell::new(Session {
            recorders: RecorderStack::new(),
            cache: CorrelationCache::new(),
            hooks: HookRegistry::new(),
            warnings: Vec::new(),
            next_change_id: 0,
        }))
    }

    /// Emit a deprecation warning: logged immediately, kept for the
    /// end-of-run report.
    pub fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Fresh change id. Replacements that share an id count as one
    /// logical fix in summaries.
    pub fn next_change_id(&mut self) -> u64 {
        let id = self.next_change_id;
        self.next_change_id += 1;
        id
    }

    /// Record an edit against the innermost active recorder.
    pub fn record(&self, file: &Path, replacement: Replacement) {
        self.recorders.current().borrow_mut().record(file, replacement);
    }
}

// ============================================================================
// Builtin Registration
// ============================================================================

/// Register the deprecation declaration builtins against `interp`,
/// bound to `session`.
pub fn install(session: &SessionRef, interp: &mut Interpreter) {
    let alias_session = Rc::clone(session);
    interp.register_builtin("deprecated_alias", move |_cx, args, kwargs| {
        expect_arity("deprecated_alias", args, 3)?;
        no_kwargs("deprecated_alias", kwargs)?;
        let Value::Object(obj) = &args[0] else {
            return Err(VmError::TypeError(format!(
                "deprecated_alias() first argument must be an object, not '{}'",
                type_name(&args[0])
            )));
        };
        let old = name_arg("deprecated_alias", &args[1])?;
        let new = name_arg("deprecated_alias", &args[2])?;
        obj.borrow_mut().accessors.insert(
            old.clone(),
            Rc::new(RenamedAttribute::new(old, new, Rc::clone(&alias_session))),
        );
        Ok(Value::Nil)
    });

    let wrap_session = Rc::clone(session);
    interp.register_builtin("argument_renamed", move |_cx, args, kwargs| {
        expect_arity("argument_renamed", args, 3)?;
        no_kwargs("argument_renamed", kwargs)?;
        let Value::Function(func) = &args[0] else {
            return Err(VmError::TypeError(format!(
                "argument_renamed() first argument must be a function, not '{}'",
                type_name(&args[0])
            )));
        };
        let old = name_arg("argument_renamed", &args[1])?;
        let new = name_arg("argument_renamed", &args[2])?;
        wrap_renamed_argument(Rc::clone(func), old, new, Rc::clone(&wrap_session))
    });
}

fn expect_arity(name: &str, args: &[Value], count: usize) -> Result<(), VmError> {
    if args.len() != count {
        return Err(VmError::TypeError(format!(
            "{name}() takes {count} arguments but {} were given",
            args.len()
        )));
    }
    Ok(())
}

fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> Result<(), VmError> {
    match kwargs.first() {
        Some((kw, _)) => Err(VmError::TypeError(format!(
            "{name}() got an unexpected keyword argument '{kw}'"
        ))),
        None => Ok(()),
    }
}

fn name_arg(name: &str, value: &Value) -> Result<String, VmError> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(VmError::TypeError(format!(
            "{name}() name arguments must be strings, not '{}'",
            type_name(other)
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
