//! Attribute rename descriptor.
//!
//! [`RenamedAttribute`] is installed on an object under the old
//! attribute name. Every access delegates to the new name so existing
//! scripts keep working, but first the descriptor resolves its own
//! call site through the bytecode correlator and reports it: a
//! deprecation warning always, plus a minimal source edit when the
//! site is mechanically fixable.
//!
//! A site is fixable when it is either plain attribute syntax
//! (`obj.old`) or a `getattr`-family builtin call with a literal
//! attribute string (`getattr(obj, "old")`). A builtin call whose
//! attribute argument is a variable can only be flagged for manual
//! attention. Sites that cannot be resolved at all (ambiguous
//! bytecode, missing source) degrade to a location-less warning and
//! never abort the running script.
//!
//! Each distinct call site warns and records its edit once, no matter
//! how often it executes.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

use driftfix_core::edit::Replacement;
use driftfix_core::text::{Pos, Span};
use driftfix_lang::ast::{Expr, ExprKind};
use driftfix_lang::error::VmError;
use driftfix_lang::resolve::{resolve_frame, LookupResult};
use driftfix_lang::token::TokenKind;
use driftfix_lang::vm::{attr_delete, attr_get, attr_set, Accessor, CallContext, ObjRef, Value};

use crate::session::SessionRef;

const ACCESSOR_BUILTINS: [&str; 4] = ["getattr", "setattr", "hasattr", "delattr"];

// ============================================================================
// Descriptor
// ============================================================================

pub struct RenamedAttribute {
    old: String,
    new: String,
    session: SessionRef,
    /// Call sites already warned about and fixed, as (file, node index).
    fixed_sites: RefCell<HashSet<(PathBuf, u32)>>,
}

impl RenamedAttribute {
    pub fn new(old: String, new: String, session: SessionRef) -> Self {
        RenamedAttribute {
            old,
            new,
            session,
            fixed_sites: RefCell::new(HashSet::new()),
        }
    }

    /// Warning text used when the call site could not be resolved.
    fn plain_warning(&self) -> String {
        format!(
            "\".{}\" should be replaced with \".{}\" (fixable with driftfix)",
            self.old, self.new
        )
    }

    /// Resolve the frame that triggered this access and report it.
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
        let (message, edit) = self.classify(lookup);
        let mut session = self.session.borrow_mut();
        session.warn(format!("{}:{}: {}", lookup.file.display(), line, message));
        if let Some((span, text)) = edit {
            let id = session.next_change_id();
            session.record(&lookup.file, Replacement::new(span, text, id));
        }
    }

    /// Decide warning text and, when fixable, the edit for this site.
    fn classify(&self, lookup: &LookupResult) -> (String, Option<(Span, String)>) {
        let Some(expr) = lookup.node.as_expr() else {
            return (self.plain_warning(), None);
        };
        match &expr.kind {
            ExprKind::Attribute { value, .. } => self.attribute_site(lookup, value.span.end),
            ExprKind::Call { func, args, .. } => match &func.kind {
                ExprKind::Name(id) if ACCESSOR_BUILTINS.contains(&id.as_str()) => {
                    self.builtin_site(id, args)
                }
                ExprKind::Attribute { value, .. } => self.attribute_site(lookup, value.span.end),
                _ => (self.plain_warning(), None),
            },
            _ => (self.plain_warning(), None),
        }
    }

    /// Plain `obj.old` syntax: the edit replaces exactly the name
    /// token after the dot.
    fn attribute_site(
        &self,
        lookup: &LookupResult,
        value_end: Pos,
    ) -> (String, Option<(Span, String)>) {
        let edit = attribute_name_span(lookup, value_end, &self.old)
            .map(|span| (span, self.new.clone()));
        (self.plain_warning(), edit)
    }

    /// `getattr(obj, "old")` and friends: a literal attribute string
    /// is replaced in place; anything else needs a human.
    fn builtin_site(&self, id: &str, args: &[Expr]) -> (String, Option<(Span, String)>) {
        let Some(attr_arg) = args.get(1) else {
            return (self.plain_warning(), None);
        };
        match &attr_arg.kind {
            ExprKind::Str(s) if *s == self.old => (
                format!(
                    "{id}(..., \"{}\") should be replaced with {id}(..., \"{}\") (fixable with driftfix)",
                    self.old, self.new
                ),
                Some((attr_arg.span, format!("\"{}\"", self.new))),
            ),
            _ => (
                format!(
                    "{id}(..., attr) is called with attr=\"{}\" but should be called with \"{}\" (please fix manual)",
                    self.old, self.new
                ),
                None,
            ),
        }
    }
}

impl Accessor for RenamedAttribute {
    fn get(&self, cx: &mut CallContext<'_>, obj: &ObjRef) -> Result<Value, VmError> {
        self.note_call_site(cx);
        attr_get(cx, &Value::Object(Rc::clone(obj)), &self.new)
    }

    fn set(&self, cx: &mut CallContext<'_>, obj: &ObjRef, value: Value) -> Result<(), VmError> {
        self.note_call_site(cx);
        attr_set(cx, &Value::Object(Rc::clone(obj)), &self.new, value)
    }

    fn delete(&self, cx: &mut CallContext<'_>, obj: &ObjRef) -> Result<(), VmError> {
        self.note_call_site(cx);
        attr_delete(cx, &Value::Object(Rc::clone(obj)), &self.new)
    }
}

/// Span of the `old` name token in `obj.old`, found by scanning raw
/// tokens so the edit never touches surrounding formatting. The first
/// two tokens at or after the end of the value expression must be a
/// dot and the expected name; anything else (parenthesized values,
/// line continuations splitting the access) is not mechanically
/// fixable.
fn attribute_name_span(lookup: &LookupResult, value_end: Pos, old: &str) -> Option<Span> {
    let tokens = lookup.tokens();
    let mut after = tokens.iter().filter(|t| t.span.start >= value_end);
    let dot = after.next()?;
    if dot.kind != TokenKind::Dot {
        return None;
    }
    let name = after.next()?;
    match &name.kind {
        TokenKind::Name(n) if n == old => Some(name.span),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
