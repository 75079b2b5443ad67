//! Keyword-argument rename wrapper.
//!
//! [`wrap_renamed_argument`] wraps a script function so callers may
//! keep passing a keyword argument under its old name. The wrapper
//! remaps the keyword, warns, and records a source edit that renames
//! exactly the keyword name token at the call site; positional calls
//! and calls already using the new name pass through untouched.
//!
//! Wrapping itself is validated: a function that still declares the
//! old parameter (or both) is a mistake in the declaring code and
//! fails loudly at wrap time, not at some later call.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

use driftfix_core::edit::Replacement;
use driftfix_core::text::{Pos, Span};
use driftfix_lang::ast::ExprKind;
use driftfix_lang::error::VmError;
use driftfix_lang::resolve::{resolve_frame, LookupResult};
use driftfix_lang::token::TokenKind;
use driftfix_lang::vm::{CallContext, FunctionValue, NativeFunction, Value};

use crate::session::SessionRef;

// ============================================================================
// Wrapping
// ============================================================================

/// Wrap `inner` so the keyword `old` is accepted as an alias for
/// `new`. Returns the wrapper as a callable value.
pub fn wrap_renamed_argument(
    inner: Rc<FunctionValue>,
    old: String,
    new: String,
    session: SessionRef,
) -> Result<Value, VmError> {
    let has_old = inner.code.params.iter().any(|p| p == &old);
    let has_new = inner.code.params.iter().any(|p| p == &new);
    if has_old && has_new {
        return Err(VmError::TypeError(
            "parameter 'old' should be removed from signature if it is renamed to 'new'"
                .to_string(),
        ));
    }
    if has_old {
        return Err(VmError::TypeError(
            "parameter 'old' should be renamed to 'new' in the signature".to_string(),
        ));
    }
    let name = inner.code.name.clone();
    let state = RenamedArgument {
        inner,
        old,
        new,
        session,
        fixed_sites: RefCell::new(HashSet::new()),
    };
    Ok(Value::Native(Rc::new(NativeFunction {
        name,
        func: Box::new(move |cx, args, kwargs| state.call(cx, args, kwargs)),
    })))
}

struct RenamedArgument {
    inner: Rc<FunctionValue>,
    old: String,
    new: String,
    session: SessionRef,
    /// Call sites already warned about and fixed, as (file, node index).
    fixed_sites: RefCell<HashSet<(PathBuf, u32)>>,
}

impl RenamedArgument {
    fn call(
        &self,
        cx: &mut CallContext<'_>,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, VmError> {
        let has_old = kwargs.iter().any(|(k, _)| k == &self.old);
        let has_new = kwargs.iter().any(|(k, _)| k == &self.new);
        if has_old && has_new {
            return Err(VmError::TypeError(format!(
                "{}=... and {}=... can not be used at the same time",
                self.old, self.new
            )));
        }
        if has_old {
            self.note_call_site(cx);
        }
        let forwarded = kwargs
            .iter()
            .map(|(k, v)| {
                let key = if k == &self.old { &self.new } else { k };
                (key.clone(), v.clone())
            })
            .collect();
        cx.call(
            Value::Function(Rc::clone(&self.inner)),
            args.to_vec(),
            forwarded,
        )
    }

    fn plain_warning(&self) -> String {
        format!(
            "argument name \"{}=\" should be replaced with \"{}=\" (fixable with driftfix)",
            self.old, self.new
        )
    }

    fn note_call_site(&self, cx: &mut CallContext<'_>) {
        let resolved = {
            let session = self.session.borrow();
            resolve_frame(cx.frames(), 0, cx.sources(), &session.cache, &session.hooks)
        };
        match resolved {
            Ok(lookup) => self.note_resolved(&lookup),
            Err(err) => {
                tracing::debug!("call-site resolution failed: {err}");
                self.session.borrow_mut().warn(self.plain_warning());
            }
        }
    }

    fn note_resolved(&self, lookup: &LookupResult) {
        let site = (lookup.file.clone(), lookup.node_index);
        if !self.fixed_sites.borrow_mut().insert(site) {
            return;
        }
        let line = lookup.node.span().start.line;
        let edit = self
            .keyword_value_start(lookup)
            .and_then(|start| keyword_name_span(lookup, start, &self.old));
        let mut session = self.session.borrow_mut();
        session.warn(format!(
            "{}:{}: {}",
            lookup.file.display(),
            line,
            self.plain_warning()
        ));
        if let Some(span) = edit {
            let id = session.next_change_id();
            session.record(&lookup.file, Replacement::new(span, self.new.clone(), id));
        }
    }

    /// Start of the value expression passed under the old keyword.
    fn keyword_value_start(&self, lookup: &LookupResult) -> Option<Pos> {
        let expr = lookup.node.as_expr()?;
        let ExprKind::Call { keywords, .. } = &expr.kind else {
            return None;
        };
        keywords
            .iter()
            .find(|(name, _)| name == &self.old)
            .map(|(_, value)| value.span.start)
    }
}

/// Span of the keyword name token in `old=value`, found by scanning
/// raw tokens backwards from the value: of all name and `=` tokens
/// before the value, the last two must be the expected name followed
/// by `=`.
fn keyword_name_span(lookup: &LookupResult, value_start: Pos, old: &str) -> Option<Span> {
    let tokens = lookup.tokens();
    let relevant: Vec<&driftfix_lang::token::Token> = tokens
        .iter()
        .filter(|t| {
            t.span.start < value_start
                && matches!(t.kind, TokenKind::Name(_) | TokenKind::Assign)
        })
        .collect();
    let [.., name, assign] = relevant.as_slice() else {
        return None;
    };
    if assign.kind != TokenKind::Assign {
        return None;
    }
    match &name.kind {
        TokenKind::Name(n) if n == old => Some(name.span),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    use driftfix_lang::compiler::compile_module;
    use driftfix_lang::parser::parse;
    use driftfix_lang::vm::Interpreter;

    use crate::session::{install, Session};

    fn try_run(source: &str) -> (SessionRef, Interpreter, Result<Value, VmError>) {
        let session = Session::new();
        let mut interp = Interpreter::new();
        install(&session, &mut interp);
        let file = Path::new("t.dft");
        interp.sources.insert(file, source);
        let module = parse(source, file).expect("parse");
        let code = compile_module(&module, file).expect("compile");
        let result = interp.run_module(code);
        (session, interp, result)
    }

    fn run(source: &str) -> (SessionRef, Interpreter) {
        let (session, interp, result) = try_run(source);
        result.expect("run");
        (session, interp)
    }

    fn fixed(session: &SessionRef, source: &str) -> Option<String> {
        let recorder = session.borrow().recorders.current();
        let recorder = recorder.borrow();
        let ledger = recorder.ledgers().next()?;
        ledger.new_text(source).expect("rewrite")
    }

    const DECL: &str =
        "fn scale(value, factor) {\n  return value * factor\n}\nlet g = argument_renamed(scale, \"amount\", \"value\")\n";

    mod renaming {
        use super::*;

        #[test]
        fn old_keyword_is_remapped_and_warned() {
            let source = &format!("{DECL}let r = g(amount=6, factor=7)\n");
            let (session, interp) = run(source);
            assert!(matches!(interp.globals.get("r"), Some(Value::Int(42))));
            let warnings = &session.borrow().warnings;
            assert_eq!(warnings.len(), 1);
            assert_eq!(
                warnings[0],
                "t.dft:5: argument name \"amount=\" should be replaced with \"value=\" (fixable with driftfix)"
            );
        }

        #[test]
        fn edit_replaces_only_the_keyword_token() {
            let source = &format!("{DECL}let r = g(amount=6, factor=7)\n");
            let (session, _) = run(source);
            let new = fixed(&session, source).expect("edit recorded");
            assert_eq!(new, format!("{DECL}let r = g(value=6, factor=7)\n"));
        }

        #[test]
        fn new_keyword_passes_through_silently() {
            let source = &format!("{DECL}let r = g(value=6, factor=7)\n");
            let (session, interp) = run(source);
            assert!(matches!(interp.globals.get("r"), Some(Value::Int(42))));
            assert!(session.borrow().warnings.is_empty());
            assert!(fixed(&session, source).is_none());
        }

        #[test]
        fn positional_call_passes_through_silently() {
            let source = &format!("{DECL}let r = g(6, 7)\n");
            let (session, interp) = run(source);
            assert!(matches!(interp.globals.get("r"), Some(Value::Int(42))));
            assert!(session.borrow().warnings.is_empty());
        }

        #[test]
        fn repeated_site_warns_once() {
            let source = &format!("{DECL}for i in range(3) {{\n  g(amount=i, factor=2)\n}}\n");
            let (session, _) = run(source);
            assert_eq!(session.borrow().warnings.len(), 1);
        }
    }

    mod conflicts {
        use super::*;

        #[test]
        fn old_and_new_together_is_an_error() {
            let source = &format!("{DECL}g(amount=1, value=2, factor=3)\n");
            let (_, _, result) = try_run(source);
            let err = result.unwrap_err();
            assert!(matches!(err, VmError::TypeError(msg)
                if msg == "amount=... and value=... can not be used at the same time"));
        }
    }

    mod misuse {
        use super::*;

        #[test]
        fn old_parameter_still_in_signature() {
            let source =
                "fn f(amount) {\n  return amount\n}\nargument_renamed(f, \"amount\", \"value\")\n";
            let (_, _, result) = try_run(source);
            let err = result.unwrap_err();
            assert!(matches!(err, VmError::TypeError(msg)
                if msg == "parameter 'old' should be renamed to 'new' in the signature"));
        }

        #[test]
        fn both_parameters_in_signature() {
            let source = "fn f(amount, value) {\n  return value\n}\nargument_renamed(f, \"amount\", \"value\")\n";
            let (_, _, result) = try_run(source);
            let err = result.unwrap_err();
            assert!(matches!(err, VmError::TypeError(msg)
                if msg == "parameter 'old' should be removed from signature if it is renamed to 'new'"));
        }
    }
}
