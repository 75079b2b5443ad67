//! Bytecode compiler.
//!
//! Every function, lambda, and comprehension body compiles to its own
//! nested code object in the enclosing constant pool. Instructions
//! carry the line of their node's start position, with one deliberate
//! exception: `Call` and `CallKw` carry the line of the callee
//! expression's end position. The constant pool is deduplicated by
//! structural equality, nested code objects included.
//!
//! A small peephole pass replaces unconditional jumps to the next
//! instruction with `Nop` without re-offsetting, so the instruction
//! stream stays positionally stable.

use crate::ast::{BinOp, Expr, ExprKind, Module, Stmt, StmtKind};
use crate::code::{CodeObject, Const, Instr, Op};
use crate::error::CompileError;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Compile a module to its top-level code object.
pub fn compile_module(module: &Module, file: &Path) -> Result<Rc<CodeObject>, CompileError> {
    let mut builder = CodeBuilder::new("<module>", file, Vec::new());
    for stmt in &module.body {
        builder.stmt(stmt)?;
    }
    Ok(Rc::new(builder.finish()))
}

// ============================================================================
// Code Builder
// ============================================================================

struct CodeBuilder {
    name: String,
    file: PathBuf,
    params: Vec<String>,
    instrs: Vec<Instr>,
    consts: Vec<Const>,
    names: Vec<String>,
    lines: Vec<(u32, u32)>,
    last_line: Option<u32>,
}

impl CodeBuilder {
    fn new(name: &str, file: &Path, params: Vec<String>) -> Self {
        CodeBuilder {
            name: name.to_string(),
            file: file.to_path_buf(),
            params,
            instrs: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            lines: Vec::new(),
            last_line: None,
        }
    }

    fn emit(&mut self, op: Op, arg: u32, line: u32) -> usize {
        let offset = self.instrs.len();
        if self.last_line != Some(line) {
            self.lines.push((offset as u32, line));
            self.last_line = Some(line);
        }
        self.instrs.push(Instr { op, arg });
        offset
    }

    fn emit_jump(&mut self, op: Op, line: u32) -> usize {
        self.emit(op, u32::MAX, line)
    }

    fn patch_jump(&mut self, at: usize) {
        self.instrs[at].arg = self.instrs.len() as u32;
    }

    fn add_const(&mut self, value: Const) -> u32 {
        if let Some(idx) = self.consts.iter().position(|c| c == &value) {
            return idx as u32;
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    fn add_name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            return idx as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    fn finish(mut self) -> CodeObject {
        // jump-to-next is a no-op; keep offsets stable
        let count = self.instrs.len();
        for (offset, instr) in self.instrs.iter_mut().enumerate() {
            if instr.op == Op::Jump && instr.arg as usize == offset + 1 && offset + 1 <= count {
                *instr = Instr { op: Op::Nop, arg: 0 };
            }
        }
        CodeObject {
            name: self.name,
            file: self.file,
            params: self.params,
            instrs: self.instrs,
            consts: self.consts,
            names: self.names,
            lines: self.lines,
        }
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        let line = stmt.span.start.line;
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                self.expr(value)?;
                let idx = self.add_name(name);
                self.emit(Op::StoreName, idx, line);
            }
            StmtKind::Assign { target, value } => {
                self.expr(value)?;
                match &target.kind {
                    ExprKind::Name(name) => {
                        let idx = self.add_name(name);
                        self.emit(Op::StoreName, idx, line);
                    }
                    ExprKind::Attribute { value: obj, attr } => {
                        self.expr(obj)?;
                        let idx = self.add_name(attr);
                        self.emit(Op::StoreAttr, idx, target.span.start.line);
                    }
                    ExprKind::Index { value: obj, index } => {
                        self.expr(obj)?;
                        self.expr(index)?;
                        self.emit(Op::StoreIndex, 0, target.span.start.line);
                    }
                    _ => {
                        return Err(CompileError::new(
                            &self.file,
                            target.span.start,
                            "invalid assignment target",
                        ))
                    }
                }
            }
            StmtKind::Del { target } => match &target.kind {
                ExprKind::Attribute { value: obj, attr } => {
                    self.expr(obj)?;
                    let idx = self.add_name(attr);
                    self.emit(Op::DeleteAttr, idx, target.span.start.line);
                }
                _ => {
                    return Err(CompileError::new(
                        &self.file,
                        target.span.start,
                        "'del' target must be an attribute",
                    ))
                }
            },
            StmtKind::Expr(expr) => {
                self.expr(expr)?;
                self.emit(Op::Pop, 0, line);
            }
            StmtKind::FnDef { name, params, body } => {
                let mut inner = CodeBuilder::new(name, &self.file, params.clone());
                for s in body {
                    inner.stmt(s)?;
                }
                let nil_idx = inner.add_const(Const::Nil);
                inner.emit(Op::LoadConst, nil_idx, line);
                inner.emit(Op::Return, 0, line);
                let code_idx = self.add_const(Const::Code(Rc::new(inner.finish())));
                self.emit(Op::LoadConst, code_idx, line);
                self.emit(Op::MakeFunction, 0, line);
                let name_idx = self.add_name(name);
                self.emit(Op::StoreName, name_idx, line);
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.expr(expr)?,
                    None => {
                        let idx = self.add_const(Const::Nil);
                        self.emit(Op::LoadConst, idx, line);
                    }
                }
                self.emit(Op::Return, 0, line);
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.expr(cond)?;
                let to_else = self.emit_jump(Op::JumpIfFalse, line);
                for s in then_body {
                    self.stmt(s)?;
                }
                let to_end = self.emit_jump(Op::Jump, line);
                self.patch_jump(to_else);
                for s in else_body {
                    self.stmt(s)?;
                }
                self.patch_jump(to_end);
            }
            StmtKind::While { cond, body } => {
                let top = self.instrs.len();
                self.expr(cond)?;
                let to_end = self.emit_jump(Op::JumpIfFalse, line);
                for s in body {
                    self.stmt(s)?;
                }
                self.emit(Op::Jump, top as u32, line);
                self.patch_jump(to_end);
            }
            StmtKind::For { var, iter, body } => {
                self.expr(iter)?;
                self.emit(Op::GetIter, 0, line);
                let top = self.instrs.len();
                let to_end = self.emit_jump(Op::ForIter, line);
                let var_idx = self.add_name(var);
                self.emit(Op::StoreName, var_idx, line);
                for s in body {
                    self.stmt(s)?;
                }
                self.emit(Op::Jump, top as u32, line);
                self.patch_jump(to_end);
            }
            StmtKind::Assert { cond } => {
                self.expr(cond)?;
                let to_end = self.emit_jump(Op::JumpIfTrue, line);
                self.emit(Op::AssertFail, 0, line);
                self.patch_jump(to_end);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let line = expr.span.start.line;
        match &expr.kind {
            ExprKind::Nil => {
                let idx = self.add_const(Const::Nil);
                self.emit(Op::LoadConst, idx, line);
            }
            ExprKind::True => {
                let idx = self.add_const(Const::Bool(true));
                self.emit(Op::LoadConst, idx, line);
            }
            ExprKind::False => {
                let idx = self.add_const(Const::Bool(false));
                self.emit(Op::LoadConst, idx, line);
            }
            ExprKind::Int(value) => {
                let idx = self.add_const(Const::Int(*value));
                self.emit(Op::LoadConst, idx, line);
            }
            ExprKind::Str(text) => {
                let idx = self.add_const(Const::Str(text.clone()));
                self.emit(Op::LoadConst, idx, line);
            }
            ExprKind::Name(name) => {
                let idx = self.add_name(name);
                self.emit(Op::LoadName, idx, line);
            }
            ExprKind::List(items) => {
                for item in items {
                    self.expr(item)?;
                }
                self.emit(Op::BuildList, items.len() as u32, line);
            }
            ExprKind::Attribute { value, attr } => {
                self.expr(value)?;
                let idx = self.add_name(attr);
                self.emit(Op::LoadAttr, idx, line);
            }
            ExprKind::Index { value, index } => {
                self.expr(value)?;
                self.expr(index)?;
                self.emit(Op::LoadIndex, 0, line);
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func)?;
                for arg in args {
                    self.expr(arg)?;
                }
                // the call itself is attributed to the callee's end,
                // which pins the instruction to the call expression
                let call_line = func.span.end.line;
                if keywords.is_empty() {
                    self.emit(Op::Call, args.len() as u32, call_line);
                } else {
                    for (_, value) in keywords {
                        self.expr(value)?;
                    }
                    let names: Vec<String> =
                        keywords.iter().map(|(name, _)| name.clone()).collect();
                    let names_idx = self.add_const(Const::Names(names));
                    self.emit(Op::LoadConst, names_idx, call_line);
                    self.emit(Op::CallKw, args.len() as u32, call_line);
                }
            }
            ExprKind::Binary { op, left, right } => match op {
                BinOp::And => {
                    self.expr(left)?;
                    let to_end = self.emit_jump(Op::JumpIfFalseOrPop, line);
                    self.expr(right)?;
                    self.patch_jump(to_end);
                }
                BinOp::Or => {
                    self.expr(left)?;
                    let to_end = self.emit_jump(Op::JumpIfTrueOrPop, line);
                    self.expr(right)?;
                    self.patch_jump(to_end);
                }
                _ => {
                    self.expr(left)?;
                    self.expr(right)?;
                    self.emit(Op::BinaryOp, op.code(), line);
                }
            },
            ExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                self.emit(Op::UnaryOp, op.code(), line);
            }
            ExprKind::Lambda { params, body } => {
                let mut inner = CodeBuilder::new("<lambda>", &self.file, params.clone());
                inner.expr(body)?;
                inner.emit(Op::Return, 0, body.span.end.line);
                let code_idx = self.add_const(Const::Code(Rc::new(inner.finish())));
                self.emit(Op::LoadConst, code_idx, line);
                self.emit(Op::MakeFunction, 0, line);
            }
            ExprKind::Comprehension {
                element,
                var,
                iter,
            } => {
                let mut inner =
                    CodeBuilder::new("<listcomp>", &self.file, vec!["__iter__".to_string()]);
                inner.emit(Op::BuildList, 0, line);
                let iter_idx = inner.add_name("__iter__");
                inner.emit(Op::LoadName, iter_idx, line);
                inner.emit(Op::GetIter, 0, line);
                let top = inner.instrs.len();
                let to_end = inner.emit_jump(Op::ForIter, line);
                let var_idx = inner.add_name(var);
                inner.emit(Op::StoreName, var_idx, line);
                inner.expr(element)?;
                inner.emit(Op::ListAppend, 2, element.span.start.line);
                inner.emit(Op::Jump, top as u32, line);
                inner.patch_jump(to_end);
                inner.emit(Op::Return, 0, line);
                let code_idx = self.add_const(Const::Code(Rc::new(inner.finish())));
                self.emit(Op::LoadConst, code_idx, line);
                self.emit(Op::MakeFunction, 0, line);
                self.expr(iter)?;
                self.emit(Op::Call, 1, line);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile(source: &str) -> Rc<CodeObject> {
        let module = parse(source, Path::new("t.dft")).expect("parse");
        compile_module(&module, Path::new("t.dft")).expect("compile")
    }

    fn ops(code: &CodeObject) -> Vec<Op> {
        code.instrs.iter().map(|i| i.op).collect()
    }

    mod emission {
        use super::*;

        #[test]
        fn let_compiles_to_store() {
            let code = compile("let x = 1\n");
            assert_eq!(ops(&code), vec![Op::LoadConst, Op::StoreName]);
            assert_eq!(code.names, vec!["x"]);
            assert_eq!(code.consts, vec![Const::Int(1)]);
        }

        #[test]
        fn constants_are_deduplicated() {
            let code = compile("f(1, 1, 1)\n");
            assert_eq!(
                code.consts.iter().filter(|c| **c == Const::Int(1)).count(),
                1
            );
        }

        #[test]
        fn keyword_call_loads_name_list() {
            let code = compile("f(1, old=2)\n");
            assert!(code
                .consts
                .contains(&Const::Names(vec!["old".to_string()])));
            assert!(ops(&code).contains(&Op::CallKw));
        }

        #[test]
        fn nested_function_is_a_code_const() {
            let code = compile("fn f(x) {\n  return x\n}\n");
            let nested = code.code_consts();
            assert_eq!(nested.len(), 1);
            assert_eq!(nested[0].name, "f");
            assert_eq!(nested[0].params, vec!["x"]);
        }

        #[test]
        fn comprehension_compiles_to_called_nested_code() {
            let code = compile("[x + 1 for x in xs]\n");
            let nested = code.code_consts();
            assert_eq!(nested.len(), 1);
            assert_eq!(nested[0].name, "<listcomp>");
            assert!(ops(&code).contains(&Op::Call));
        }
    }

    mod lines {
        use super::*;

        #[test]
        fn call_carries_callee_end_line() {
            // args on line 2, but the call is pinned to the callee's end
            let code = compile("f(\n  1)\n");
            let call_offset = code
                .instrs
                .iter()
                .position(|i| i.op == Op::Call)
                .expect("call instr");
            assert_eq!(code.line_at(call_offset), Some(1));
        }

        #[test]
        fn line_table_only_records_changes() {
            let code = compile("let a = 1\nlet b = 2\n");
            assert_eq!(code.lines, vec![(0, 1), (2, 2)]);
        }
    }

    mod peephole {
        use super::*;

        #[test]
        fn if_without_else_leaves_a_nop() {
            let code = compile("if x {\n  y\n}\n");
            assert!(ops(&code).contains(&Op::Nop));
            assert!(!ops(&code).contains(&Op::Jump));
        }

        #[test]
        fn loop_back_edge_survives() {
            let code = compile("while x {\n  y\n}\n");
            assert!(ops(&code).contains(&Op::Jump));
        }
    }

    mod dedup {
        use super::*;

        #[test]
        fn identical_lambdas_on_one_line_share_a_code_const() {
            let code = compile("let fs = [fn(x) => x, fn(x) => x]\n");
            assert_eq!(code.code_consts().len(), 1);
        }

        #[test]
        fn identical_lambdas_on_different_lines_stay_distinct() {
            let code = compile("let fs = [fn(x) => x,\n  fn(x) => x]\n");
            assert_eq!(code.code_consts().len(), 2);
        }
    }
}
