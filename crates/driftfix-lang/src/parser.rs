//! Recursive-descent parser for drift.
//!
//! Grammar sketch (statements are newline-terminated, blocks are
//! brace-delimited):
//!
//! ```text
//! stmt    := "let" NAME "=" expr
//!          | "fn" NAME "(" params ")" block
//!          | "return" [expr] | "del" postfix | "assert" expr
//!          | "if" expr block ["else" (block | if-stmt)]
//!          | "while" expr block | "for" NAME "in" expr block
//!          | expr ["=" expr]
//! expr    := or
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | cmp
//! cmp     := add (("=="|"!="|"<"|"<="|">"|">=") add)?
//! add     := mul (("+"|"-") mul)*
//! mul     := unary (("*"|"/"|"%") unary)*
//! unary   := "-" unary | postfix
//! postfix := primary ("." NAME | "[" expr "]" | "(" args ")")*
//! primary := literal | NAME | "(" expr ")" | list-or-comprehension
//!          | "fn" "(" params ")" "=>" expr
//! ```

use crate::ast::{BinOp, Expr, ExprKind, Module, Stmt, StmtKind, UnOp};
use crate::error::ParseError;
use crate::token::{tokenize, Token, TokenKind};
use driftfix_core::text::{Pos, Span};
use std::path::{Path, PathBuf};

/// Parse a whole source file into a module.
pub fn parse(source: &str, file: &Path) -> Result<Module, ParseError> {
    let tokens = tokenize(source, file)?;
    Parser {
        file: file.to_path_buf(),
        tokens,
        pos: 0,
    }
    .module()
}

struct Parser {
    file: PathBuf,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    // ------------------------------------------------------------------
    // token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<(String, Span), ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                let token = self.bump();
                Ok((name, token.span))
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(&self.file, self.peek().span.start, message)
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn end_of_stmt(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::Newline => {
                self.bump();
                Ok(())
            }
            TokenKind::Eof | TokenKind::RBrace => Ok(()),
            _ => Err(self.error("expected end of statement")),
        }
    }

    fn expr_node(kind: ExprKind, span: Span) -> Expr {
        Expr {
            kind,
            span,
            index: 0,
        }
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn module(mut self) -> Result<Module, ParseError> {
        let mut body = Vec::new();
        self.skip_newlines();
        while !self.at(&TokenKind::Eof) {
            body.push(self.statement()?);
            self.skip_newlines();
        }
        Ok(Module { body })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.skip_newlines();
        let mut body = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            if self.at(&TokenKind::Eof) {
                return Err(self.error("expected '}'"));
            }
            body.push(self.statement()?);
            self.skip_newlines();
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(body)
    }

    fn params(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let (name, _) = self.expect_name("parameter name")?;
                params.push(name);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek().span.start;
        let kind = match self.peek_kind() {
            TokenKind::Let => {
                self.bump();
                let (name, _) = self.expect_name("name after 'let'")?;
                self.expect(&TokenKind::Assign, "'=' in let statement")?;
                let value = self.expression()?;
                self.end_of_stmt()?;
                StmtKind::Let { name, value }
            }
            // `fn` starts a definition only when a name follows;
            // otherwise it is a lambda expression statement
            TokenKind::Fn if matches!(self.tokens[self.pos + 1].kind, TokenKind::Name(_)) => {
                self.bump();
                let (name, _) = self.expect_name("function name")?;
                let params = self.params()?;
                let body = self.block()?;
                self.end_of_stmt()?;
                StmtKind::FnDef { name, params, body }
            }
            TokenKind::Return => {
                self.bump();
                let value = if matches!(
                    self.peek_kind(),
                    TokenKind::Newline | TokenKind::Eof | TokenKind::RBrace
                ) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_of_stmt()?;
                StmtKind::Return(value)
            }
            TokenKind::Del => {
                self.bump();
                let target = self.expression()?;
                if !matches!(target.kind, ExprKind::Attribute { .. }) {
                    return Err(ParseError::new(
                        &self.file,
                        target.span.start,
                        "'del' target must be an attribute",
                    ));
                }
                self.end_of_stmt()?;
                StmtKind::Del { target }
            }
            TokenKind::Assert => {
                self.bump();
                let cond = self.expression()?;
                self.end_of_stmt()?;
                StmtKind::Assert { cond }
            }
            TokenKind::If => {
                return self.if_statement(start);
            }
            TokenKind::While => {
                self.bump();
                let cond = self.expression()?;
                let body = self.block()?;
                self.end_of_stmt()?;
                StmtKind::While { cond, body }
            }
            TokenKind::For => {
                self.bump();
                let (var, _) = self.expect_name("loop variable")?;
                self.expect(&TokenKind::In, "'in'")?;
                let iter = self.expression()?;
                let body = self.block()?;
                self.end_of_stmt()?;
                StmtKind::For { var, iter, body }
            }
            _ => {
                let expr = self.expression()?;
                if self.eat(&TokenKind::Assign) {
                    if !matches!(
                        expr.kind,
                        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Index { .. }
                    ) {
                        return Err(ParseError::new(
                            &self.file,
                            expr.span.start,
                            "invalid assignment target",
                        ));
                    }
                    let value = self.expression()?;
                    self.end_of_stmt()?;
                    StmtKind::Assign {
                        target: expr,
                        value,
                    }
                } else {
                    self.end_of_stmt()?;
                    StmtKind::Expr(expr)
                }
            }
        };
        let end = self.span_end(start);
        Ok(Stmt {
            kind,
            span: Span::new(start, end),
            index: 0,
        })
    }

    fn if_statement(&mut self, start: Pos) -> Result<Stmt, ParseError> {
        self.bump(); // 'if'
        let cond = self.expression()?;
        let then_body = self.block()?;
        let else_body = if self.eat(&TokenKind::Else) {
            if self.at(&TokenKind::If) {
                let nested_start = self.peek().span.start;
                vec![self.if_statement(nested_start)?]
            } else {
                let body = self.block()?;
                self.end_of_stmt()?;
                body
            }
        } else {
            self.end_of_stmt()?;
            Vec::new()
        };
        let end = self.span_end(start);
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            span: Span::new(start, end),
            index: 0,
        })
    }

    /// End position of everything consumed since `start`: the end of
    /// the previous non-newline token.
    fn span_end(&self, start: Pos) -> Pos {
        let mut idx = self.pos;
        while idx > 0 {
            idx -= 1;
            let token = &self.tokens[idx];
            if !matches!(token.kind, TokenKind::Newline | TokenKind::Eof) {
                return token.span.end;
            }
        }
        start
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and_expr()?;
            let span = left.span.join(&right.span);
            left = Self::expr_node(
                ExprKind::Binary {
                    op: BinOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            let right = self.not_expr()?;
            let span = left.span.join(&right.span);
            left = Self::expr_node(
                ExprKind::Binary {
                    op: BinOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.at(&TokenKind::Not) {
            let start = self.bump().span.start;
            let operand = self.not_expr()?;
            let span = Span::new(start, operand.span.end);
            return Ok(Self::expr_node(
                ExprKind::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.additive()?;
        let op = match self.peek_kind() {
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            _ => return Ok(left),
        };
        self.bump();
        let right = self.additive()?;
        let span = left.span.join(&right.span);
        Ok(Self::expr_node(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        ))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.multiplicative()?;
            let span = left.span.join(&right.span);
            left = Self::expr_node(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.unary()?;
            let span = left.span.join(&right.span);
            left = Self::expr_node(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.at(&TokenKind::Minus) {
            let start = self.bump().span.start;
            let operand = self.unary()?;
            let span = Span::new(start, operand.span.end);
            return Ok(Self::expr_node(
                ExprKind::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.bump();
                    let (attr, name_span) = self.expect_name("attribute name")?;
                    let span = Span::new(expr.span.start, name_span.end);
                    expr = Self::expr_node(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.expression()?;
                    let close = self.expect(&TokenKind::RBracket, "']'")?;
                    let span = Span::new(expr.span.start, close.span.end);
                    expr = Self::expr_node(
                        ExprKind::Index {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.bump();
                    let (args, keywords) = self.call_arguments()?;
                    let close = self.expect(&TokenKind::RParen, "')'")?;
                    let span = Span::new(expr.span.start, close.span.end);
                    expr = Self::expr_node(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut keywords: Vec<(String, Expr)> = Vec::new();
        if self.at(&TokenKind::RParen) {
            return Ok((args, keywords));
        }
        loop {
            // `name =` starts a keyword argument (but `name ==` does not)
            let is_keyword = matches!(self.peek_kind(), TokenKind::Name(_))
                && self.tokens[self.pos + 1].kind == TokenKind::Assign;
            if is_keyword {
                let (name, _) = self.expect_name("keyword name")?;
                self.bump(); // '='
                let value = self.expression()?;
                keywords.push((name, value));
            } else {
                if !keywords.is_empty() {
                    return Err(self.error("positional argument after keyword argument"));
                }
                args.push(self.expression()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Nil => {
                self.bump();
                Ok(Self::expr_node(ExprKind::Nil, token.span))
            }
            TokenKind::True => {
                self.bump();
                Ok(Self::expr_node(ExprKind::True, token.span))
            }
            TokenKind::False => {
                self.bump();
                Ok(Self::expr_node(ExprKind::False, token.span))
            }
            TokenKind::Int(value) => {
                self.bump();
                Ok(Self::expr_node(ExprKind::Int(value), token.span))
            }
            TokenKind::Str(ref text) => {
                let text = text.clone();
                self.bump();
                Ok(Self::expr_node(ExprKind::Str(text), token.span))
            }
            TokenKind::Name(ref name) => {
                let name = name.clone();
                self.bump();
                Ok(Self::expr_node(ExprKind::Name(name), token.span))
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.list_or_comprehension(),
            TokenKind::Fn => {
                self.bump();
                let params = self.params()?;
                self.expect(&TokenKind::Arrow, "'=>' in lambda")?;
                let body = self.expression()?;
                let span = Span::new(token.span.start, body.span.end);
                Ok(Self::expr_node(
                    ExprKind::Lambda {
                        params,
                        body: Box::new(body),
                    },
                    span,
                ))
            }
            _ => Err(self.error("expected expression")),
        }
    }

    fn list_or_comprehension(&mut self) -> Result<Expr, ParseError> {
        let open = self.bump(); // '['
        if self.at(&TokenKind::RBracket) {
            let close = self.bump();
            return Ok(Self::expr_node(
                ExprKind::List(Vec::new()),
                Span::new(open.span.start, close.span.end),
            ));
        }
        let first = self.expression()?;
        if self.eat(&TokenKind::For) {
            let (var, _) = self.expect_name("comprehension variable")?;
            self.expect(&TokenKind::In, "'in'")?;
            let iter = self.expression()?;
            let close = self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Self::expr_node(
                ExprKind::Comprehension {
                    element: Box::new(first),
                    var,
                    iter: Box::new(iter),
                },
                Span::new(open.span.start, close.span.end),
            ));
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at(&TokenKind::RBracket) {
                break;
            }
            items.push(self.expression()?);
        }
        let close = self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Self::expr_node(
            ExprKind::List(items),
            Span::new(open.span.start, close.span.end),
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
