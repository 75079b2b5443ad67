//! Abstract syntax tree for drift.
//!
//! Every statement and expression carries its source span plus an
//! `index` slot. Indices are 0 until [`assign_indices`] numbers the
//! tree in a deterministic pre-order walk; the numbered tree is what
//! the correlator keeps, and [`find_node`] recovers a node from its
//! index without re-walking in any particular order.

use driftfix_core::text::Span;

// ============================================================================
// Node Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl BinOp {
    /// Stable encoding used as the `BinaryOp` instruction argument.
    pub fn code(self) -> u32 {
        match self {
            BinOp::Add => 0,
            BinOp::Sub => 1,
            BinOp::Mul => 2,
            BinOp::Div => 3,
            BinOp::Mod => 4,
            BinOp::Eq => 5,
            BinOp::Ne => 6,
            BinOp::Lt => 7,
            BinOp::Le => 8,
            BinOp::Gt => 9,
            BinOp::Ge => 10,
            // short-circuit ops compile to jumps, never to BinaryOp
            BinOp::And => 11,
            BinOp::Or => 12,
        }
    }

    pub fn from_code(code: u32) -> Option<BinOp> {
        Some(match code {
            0 => BinOp::Add,
            1 => BinOp::Sub,
            2 => BinOp::Mul,
            3 => BinOp::Div,
            4 => BinOp::Mod,
            5 => BinOp::Eq,
            6 => BinOp::Ne,
            7 => BinOp::Lt,
            8 => BinOp::Le,
            9 => BinOp::Gt,
            10 => BinOp::Ge,
            _ => return None,
        })
    }
}

impl UnOp {
    pub fn code(self) -> u32 {
        match self {
            UnOp::Neg => 0,
            UnOp::Not => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<UnOp> {
        Some(match code {
            0 => UnOp::Neg,
            1 => UnOp::Not,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Int(i64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Comprehension {
        element: Box<Expr>,
        var: String,
        iter: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Let {
        name: String,
        value: Expr,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Del {
        target: Expr,
    },
    Expr(Expr),
    FnDef {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Assert {
        cond: Expr,
    },
}

/// A deep-copied statement or expression recovered by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Stmt(Stmt),
    Expr(Expr),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Stmt(s) => s.span,
            Node::Expr(e) => e.span,
        }
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            Node::Expr(e) => Some(e),
            Node::Stmt(_) => None,
        }
    }
}

// ============================================================================
// Index Assignment
// ============================================================================

/// Number every statement and expression in pre-order. Returns the
/// node count.
pub fn assign_indices(module: &mut Module) -> u32 {
    let mut next = 0;
    for stmt in &mut module.body {
        index_stmt(stmt, &mut next);
    }
    next
}

fn index_stmt(stmt: &mut Stmt, next: &mut u32) {
    stmt.index = *next;
    *next += 1;
    match &mut stmt.kind {
        StmtKind::Let { value, .. } => index_expr(value, next),
        StmtKind::Assign { target, value } => {
            index_expr(target, next);
            index_expr(value, next);
        }
        StmtKind::Del { target } => index_expr(target, next),
        StmtKind::Expr(expr) => index_expr(expr, next),
        StmtKind::FnDef { body, .. } => {
            for s in body {
                index_stmt(s, next);
            }
        }
        StmtKind::Return(value) => {
            if let Some(expr) = value {
                index_expr(expr, next);
            }
        }
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            index_expr(cond, next);
            for s in then_body {
                index_stmt(s, next);
            }
            for s in else_body {
                index_stmt(s, next);
            }
        }
        StmtKind::While { cond, body } => {
            index_expr(cond, next);
            for s in body {
                index_stmt(s, next);
            }
        }
        StmtKind::For { iter, body, .. } => {
            index_expr(iter, next);
            for s in body {
                index_stmt(s, next);
            }
        }
        StmtKind::Assert { cond } => index_expr(cond, next),
    }
}

fn index_expr(expr: &mut Expr, next: &mut u32) {
    expr.index = *next;
    *next += 1;
    match &mut expr.kind {
        ExprKind::Nil
        | ExprKind::True
        | ExprKind::False
        | ExprKind::Int(_)
        | ExprKind::Str(_)
        | ExprKind::Name(_) => {}
        ExprKind::List(items) => {
            for item in items {
                index_expr(item, next);
            }
        }
        ExprKind::Attribute { value, .. } => index_expr(value, next),
        ExprKind::Index { value, index } => {
            index_expr(value, next);
            index_expr(index, next);
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            index_expr(func, next);
            for arg in args {
                index_expr(arg, next);
            }
            for (_, value) in keywords {
                index_expr(value, next);
            }
        }
        ExprKind::Binary { left, right, .. } => {
            index_expr(left, next);
            index_expr(right, next);
        }
        ExprKind::Unary { operand, .. } => index_expr(operand, next),
        ExprKind::Lambda { body, .. } => index_expr(body, next),
        ExprKind::Comprehension { element, iter, .. } => {
            index_expr(element, next);
            index_expr(iter, next);
        }
    }
}

// ============================================================================
// Node Lookup
// ============================================================================

/// Deep-copy the node carrying `index` out of an indexed module.
pub fn find_node(module: &Module, index: u32) -> Option<Node> {
    for stmt in &module.body {
        if let Some(node) = find_in_stmt(stmt, index) {
            return Some(node);
        }
    }
    None
}

fn find_in_stmt(stmt: &Stmt, index: u32) -> Option<Node> {
    if stmt.index == index {
        return Some(Node::Stmt(stmt.clone()));
    }
    let from_exprs = |exprs: &[&Expr]| {
        exprs
            .iter()
            .find_map(|e| find_in_expr(e, index))
    };
    let from_body = |body: &[Stmt]| body.iter().find_map(|s| find_in_stmt(s, index));
    match &stmt.kind {
        StmtKind::Let { value, .. } => from_exprs(&[value]),
        StmtKind::Assign { target, value } => from_exprs(&[target, value]),
        StmtKind::Del { target } => from_exprs(&[target]),
        StmtKind::Expr(expr) => from_exprs(&[expr]),
        StmtKind::FnDef { body, .. } => from_body(body),
        StmtKind::Return(value) => value.as_ref().and_then(|e| find_in_expr(e, index)),
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => from_exprs(&[cond])
            .or_else(|| from_body(then_body))
            .or_else(|| from_body(else_body)),
        StmtKind::While { cond, body } => from_exprs(&[cond]).or_else(|| from_body(body)),
        StmtKind::For { iter, body, .. } => from_exprs(&[iter]).or_else(|| from_body(body)),
        StmtKind::Assert { cond } => from_exprs(&[cond]),
    }
}

fn find_in_expr(expr: &Expr, index: u32) -> Option<Node> {
    if expr.index == index {
        return Some(Node::Expr(expr.clone()));
    }
    match &expr.kind {
        ExprKind::Nil
        | ExprKind::True
        | ExprKind::False
        | ExprKind::Int(_)
        | ExprKind::Str(_)
        | ExprKind::Name(_) => None,
        ExprKind::List(items) => items.iter().find_map(|e| find_in_expr(e, index)),
        ExprKind::Attribute { value, .. } => find_in_expr(value, index),
        ExprKind::Index {
            value,
            index: idx_expr,
        } => find_in_expr(value, index).or_else(|| find_in_expr(idx_expr, index)),
        ExprKind::Call {
            func,
            args,
            keywords,
        } => find_in_expr(func, index)
            .or_else(|| args.iter().find_map(|e| find_in_expr(e, index)))
            .or_else(|| keywords.iter().find_map(|(_, e)| find_in_expr(e, index))),
        ExprKind::Binary { left, right, .. } => {
            find_in_expr(left, index).or_else(|| find_in_expr(right, index))
        }
        ExprKind::Unary { operand, .. } => find_in_expr(operand, index),
        ExprKind::Lambda { body, .. } => find_in_expr(body, index),
        ExprKind::Comprehension { element, iter, .. } => {
            find_in_expr(element, index).or_else(|| find_in_expr(iter, index))
        }
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

    fn indexed(source: &str) -> (Module, u32) {
        let mut module = parse(source, Path::new("t.dft")).expect("parse");
        let count = assign_indices(&mut module);
        (module, count)
    }

    #[test]
    fn indices_are_dense_and_start_at_zero() {
        let (module, count) = indexed("let x = 1 + 2\nprint(x)\n");
        for idx in 0..count {
            assert!(find_node(&module, idx).is_some(), "missing index {idx}");
        }
        assert!(find_node(&module, count).is_none());
        assert_eq!(module.body[0].index, 0);
    }

    #[test]
    fn find_node_recovers_nested_call() {
        let (module, count) = indexed("f(g(1))\n");
        let call = (0..count)
            .filter_map(|i| find_node(&module, i))
            .filter_map(|n| match n {
                Node::Expr(e) => Some(e),
                Node::Stmt(_) => None,
            })
            .find(|e| {
                matches!(&e.kind, ExprKind::Call { func, .. }
                    if matches!(&func.kind, ExprKind::Name(n) if n == "g"))
            })
            .expect("inner call");
        assert!(matches!(&call.kind, ExprKind::Call { args, .. } if args.len() == 1));
    }

    #[test]
    fn indices_cover_function_bodies() {
        let (module, _) = indexed("fn f(x) {\n  return x\n}\n");
        let StmtKind::FnDef { body, .. } = &module.body[0].kind else {
            panic!("expected fn def");
        };
        assert!(body[0].index > module.body[0].index);
    }
}
