//! Index-tagged double compilation.
//!
//! The same module is compiled twice through the identical pipeline:
//! once with its real source positions ("plain", byte-for-byte what
//! the interpreter runs) and once from a deep copy whose node
//! positions are overwritten with the node's own pre-order index
//! ("tagged"). In the tagged compile the line table stops mapping
//! instructions to lines and starts mapping them to AST nodes.
//!
//! One position is tagged specially: the callee child of a call gets
//! the call's index as its end line. The compiler attributes `Call`
//! instructions to the callee's end, so this pins every call
//! instruction to the call expression node rather than the callee.

use crate::ast::{assign_indices, Expr, ExprKind, Module, Stmt, StmtKind};
use crate::code::CodeObject;
use crate::compiler::compile_module;
use crate::error::StructureError;
use crate::hooks::RewriteHook;
use crate::parser::parse;
use driftfix_core::text::{Pos, Span};
use std::path::Path;
use std::rc::Rc;

pub struct IndexedProgram {
    /// Indexed module with original positions intact.
    pub module: Module,
    pub tagged: Rc<CodeObject>,
    pub plain: Rc<CodeObject>,
}

/// Parse `source`, apply `hook`, and compile both position variants.
pub fn compile_with_index(
    source: &str,
    file: &Path,
    hook: &dyn RewriteHook,
) -> Result<IndexedProgram, StructureError> {
    let mut module = parse(source, file)?;
    hook.apply(&mut module, source);
    assign_indices(&mut module);
    let plain = compile_module(&module, file)?;
    let mut tagged_tree = module.clone();
    tag_positions(&mut tagged_tree);
    let tagged = compile_module(&tagged_tree, file)?;
    Ok(IndexedProgram {
        module,
        tagged,
        plain,
    })
}

// ============================================================================
// Position Tagging
// ============================================================================

fn tag_span(index: u32) -> Span {
    Span::new(Pos::new(index, 0), Pos::new(index, 1))
}

fn tag_positions(module: &mut Module) {
    for stmt in &mut module.body {
        tag_stmt(stmt);
    }
}

fn tag_stmt(stmt: &mut Stmt) {
    stmt.span = tag_span(stmt.index);
    match &mut stmt.kind {
        StmtKind::Let { value, .. } => tag_expr(value),
        StmtKind::Assign { target, value } => {
            tag_expr(target);
            tag_expr(value);
        }
        StmtKind::Del { target } => tag_expr(target),
        StmtKind::Expr(expr) => tag_expr(expr),
        StmtKind::FnDef { body, .. } => {
            for s in body {
                tag_stmt(s);
            }
        }
        StmtKind::Return(value) => {
            if let Some(expr) = value {
                tag_expr(expr);
            }
        }
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            tag_expr(cond);
            for s in then_body.iter_mut().chain(else_body.iter_mut()) {
                tag_stmt(s);
            }
        }
        StmtKind::While { cond, body } => {
            tag_expr(cond);
            for s in body {
                tag_stmt(s);
            }
        }
        StmtKind::For { iter, body, .. } => {
            tag_expr(iter);
            for s in body {
                tag_stmt(s);
            }
        }
        StmtKind::Assert { cond } => tag_expr(cond),
    }
}

fn tag_expr(expr: &mut Expr) {
    expr.span = tag_span(expr.index);
    let own_index = expr.index;
    match &mut expr.kind {
        ExprKind::Nil
        | ExprKind::True
        | ExprKind::False
        | ExprKind::Int(_)
        | ExprKind::Str(_)
        | ExprKind::Name(_) => {}
        ExprKind::List(items) => {
            for item in items {
                tag_expr(item);
            }
        }
        ExprKind::Attribute { value, .. } => tag_expr(value),
        ExprKind::Index { value, index } => {
            tag_expr(value);
            tag_expr(index);
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            tag_expr(func);
            for arg in args {
                tag_expr(arg);
            }
            for (_, value) in keywords {
                tag_expr(value);
            }
            // pin the call instruction to the call node itself
            func.span.end.line = own_index;
        }
        ExprKind::Binary { left, right, .. } => {
            tag_expr(left);
            tag_expr(right);
        }
        ExprKind::Unary { operand, .. } => tag_expr(operand),
        ExprKind::Lambda { body, .. } => tag_expr(body),
        ExprKind::Comprehension { element, iter, .. } => {
            tag_expr(element);
            tag_expr(iter);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{find_node, Node};
    use crate::code::Op;
    use crate::hooks::IdentityHook;

    fn program(source: &str) -> IndexedProgram {
        compile_with_index(source, Path::new("t.dft"), &IdentityHook).expect("compile")
    }

    #[test]
    fn plain_compile_matches_direct_compile() {
        let source = "let x = 1\nprint(x)\n";
        let prog = program(source);
        let module = parse(source, Path::new("t.dft")).expect("parse");
        let direct = compile_module(&module, Path::new("t.dft")).expect("compile");
        assert_eq!(*prog.plain, *direct);
    }

    #[test]
    fn tagged_load_attr_maps_to_attribute_node() {
        let prog = program("let v = s.value\n");
        let offset = prog
            .tagged
            .instrs
            .iter()
            .position(|i| i.op == Op::LoadAttr)
            .expect("LoadAttr instr");
        let index = prog.tagged.line_at(offset).expect("tagged line");
        let node = find_node(&prog.module, index).expect("node");
        let Node::Expr(expr) = node else {
            panic!("expected expression node");
        };
        assert!(matches!(&expr.kind, ExprKind::Attribute { attr, .. } if attr == "value"));
    }

    #[test]
    fn tagged_call_maps_to_call_node_not_callee() {
        let prog = program("getattr(s, \"value\")\n");
        let offset = prog
            .tagged
            .instrs
            .iter()
            .position(|i| i.op == Op::Call)
            .expect("Call instr");
        let index = prog.tagged.line_at(offset).expect("tagged line");
        let Some(Node::Expr(expr)) = find_node(&prog.module, index) else {
            panic!("expected expression node");
        };
        assert!(matches!(&expr.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn nested_calls_map_to_their_own_nodes() {
        let prog = program("f(g(1))\n");
        let call_offsets: Vec<usize> = prog
            .tagged
            .instrs
            .iter()
            .enumerate()
            .filter(|(_, i)| i.op == Op::Call)
            .map(|(o, _)| o)
            .collect();
        assert_eq!(call_offsets.len(), 2);
        let indices: Vec<u32> = call_offsets
            .iter()
            .map(|&o| prog.tagged.line_at(o).expect("line"))
            .collect();
        assert_ne!(indices[0], indices[1]);
        for index in indices {
            let Some(Node::Expr(expr)) = find_node(&prog.module, index) else {
                panic!("expected expression node");
            };
            assert!(matches!(&expr.kind, ExprKind::Call { .. }));
        }
    }

    #[test]
    fn module_keeps_original_positions() {
        let prog = program("let v = s.value\n");
        assert_eq!(prog.module.body[0].span.start, Pos::new(1, 0));
    }
}
