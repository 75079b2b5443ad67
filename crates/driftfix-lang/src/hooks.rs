//! Source rewrite hooks.
//!
//! A test harness may transform modules before compiling them (for
//! example turning `assert` statements into calls that carry their
//! source text). The resolver has to re-apply the same transformation
//! to its own parse, or the correlated bytecode will not match the
//! frame's code. Hooks are registered once and tried in order, the
//! identity hook first.

use crate::ast::{Expr, ExprKind, Module, Stmt, StmtKind};
use driftfix_core::text::{span_text, Span};
use std::rc::Rc;

pub trait RewriteHook {
    fn name(&self) -> &str;
    /// Transform `module` in place. Must be deterministic: the same
    /// source always yields the same tree.
    fn apply(&self, module: &mut Module, source: &str);
}

/// No transformation; matches code compiled straight from source.
pub struct IdentityHook;

impl RewriteHook for IdentityHook {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&self, _module: &mut Module, _source: &str) {}
}

// ============================================================================
// Assert Rewriting
// ============================================================================

/// Rewrites `assert cond` into `__assert__(cond, "cond source")` so
/// failures report the asserted expression text.
pub struct AssertRewriteHook;

impl RewriteHook for AssertRewriteHook {
    fn name(&self) -> &str {
        "assert"
    }

    fn apply(&self, module: &mut Module, source: &str) {
        for stmt in &mut module.body {
            rewrite_stmt(stmt, source);
        }
    }
}

fn rewrite_stmt(stmt: &mut Stmt, source: &str) {
    match &mut stmt.kind {
        StmtKind::Assert { cond } => {
            let snippet = span_text(source, &cond.span).to_string();
            let cond = std::mem::replace(
                cond,
                Expr {
                    kind: ExprKind::Nil,
                    span: stmt.span,
                    index: 0,
                },
            );
            let func = Expr {
                kind: ExprKind::Name("__assert__".to_string()),
                span: Span::new(stmt.span.start, stmt.span.start),
                index: 0,
            };
            let text = Expr {
                kind: ExprKind::Str(snippet),
                span: cond.span,
                index: 0,
            };
            let call = Expr {
                kind: ExprKind::Call {
                    func: Box::new(func),
                    args: vec![cond, text],
                    keywords: Vec::new(),
                },
                span: stmt.span,
                index: 0,
            };
            stmt.kind = StmtKind::Expr(call);
        }
        StmtKind::FnDef { body, .. }
        | StmtKind::While { body, .. }
        | StmtKind::For { body, .. } => {
            for s in body {
                rewrite_stmt(s, source);
            }
        }
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => {
            for s in then_body.iter_mut().chain(else_body.iter_mut()) {
                rewrite_stmt(s, source);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct HookRegistry {
    hooks: Vec<Rc<dyn RewriteHook>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        HookRegistry {
            hooks: vec![Rc::new(IdentityHook)],
        }
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    pub fn register(&mut self, hook: Rc<dyn RewriteHook>) {
        self.hooks.push(hook);
    }

    /// Hooks in trial order, identity first.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn RewriteHook>> {
        self.hooks.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::path::Path;

    #[test]
    fn assert_becomes_assert_call_with_source_text() {
        let source = "assert x == 1\n";
        let mut module = parse(source, Path::new("t.dft")).expect("parse");
        AssertRewriteHook.apply(&mut module, source);
        let StmtKind::Expr(expr) = &module.body[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { func, args, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert!(matches!(&func.kind, ExprKind::Name(n) if n == "__assert__"));
        assert!(matches!(&args[1].kind, ExprKind::Str(s) if s == "x == 1"));
    }

    #[test]
    fn asserts_inside_functions_are_rewritten() {
        let source = "fn check(x) {\n  assert x\n}\n";
        let mut module = parse(source, Path::new("t.dft")).expect("parse");
        AssertRewriteHook.apply(&mut module, source);
        let StmtKind::FnDef { body, .. } = &module.body[0].kind else {
            panic!("expected fn def");
        };
        assert!(matches!(&body[0].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn identity_hook_is_registered_first() {
        let registry = HookRegistry::new();
        let names: Vec<&str> = registry.iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["identity"]);
    }
}
