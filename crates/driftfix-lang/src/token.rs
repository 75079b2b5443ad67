//! Tokenizer for drift source.
//!
//! Positions are 1-indexed lines and 0-indexed character columns, and a
//! `\r\n` pair advances exactly one line like a lone `\n` or `\r`, so
//! token spans line up with the positions produced by the core text
//! stream. Newlines separate statements; inside parentheses or
//! brackets they are suppressed.

use crate::error::ParseError;
use driftfix_core::text::{Pos, Span};
use std::path::Path;

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Str(String),

    // keywords
    Let,
    Fn,
    Return,
    If,
    Else,
    While,
    For,
    In,
    Del,
    Assert,
    Nil,
    True,
    False,
    Not,
    And,
    Or,

    // punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Assign,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    Newline,
    Eof,
}

impl TokenKind {
    /// Name token text, if this is a name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            TokenKind::Name(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "let" => TokenKind::Let,
        "fn" => TokenKind::Fn,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "del" => TokenKind::Del,
        "assert" => TokenKind::Assert,
        "nil" => TokenKind::Nil,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "not" => TokenKind::Not,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        _ => return None,
    })
}

// ============================================================================
// Tokenizer
// ============================================================================

struct Tokenizer<'a> {
    file: &'a Path,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
    paren_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        match ch {
            '\r' => {
                // \r\n counts as a single newline unit
                if self.chars.peek() == Some(&'\n') {
                    self.chars.next();
                }
                self.line += 1;
                self.col = 0;
            }
            '\n' => {
                self.line += 1;
                self.col = 0;
            }
            _ => self.col += 1,
        }
        Some(ch)
    }

    fn push(&mut self, kind: TokenKind, start: Pos) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, self.pos()),
        });
    }

    fn push_newline(&mut self, start: Pos) {
        // collapse runs and suppress inside ( ) [ ]
        if self.paren_depth == 0
            && !matches!(
                self.tokens.last().map(|t| &t.kind),
                Some(TokenKind::Newline) | None
            )
        {
            self.tokens.push(Token {
                kind: TokenKind::Newline,
                span: Span::new(start, self.pos()),
            });
        }
    }

    fn string(&mut self, start: Pos) -> Result<(), ParseError> {
        let mut text = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(ParseError::new(self.file, start, "unterminated string"));
            };
            match ch {
                '"' => break,
                '\\' => {
                    let Some(esc) = self.bump() else {
                        return Err(ParseError::new(self.file, start, "unterminated string"));
                    };
                    match esc {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '\\' => text.push('\\'),
                        '"' => text.push('"'),
                        other => {
                            return Err(ParseError::new(
                                self.file,
                                start,
                                format!("unknown escape '\\{other}'"),
                            ))
                        }
                    }
                }
                '\n' | '\r' => {
                    return Err(ParseError::new(self.file, start, "unterminated string"));
                }
                other => text.push(other),
            }
        }
        self.push(TokenKind::Str(text), start);
        Ok(())
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(&ch) = self.chars.peek() {
            let start = self.pos();
            match ch {
                ' ' | '\t' => {
                    self.bump();
                }
                '\n' | '\r' => {
                    self.bump();
                    self.push_newline(start);
                }
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        self.bump();
                    }
                }
                '"' => {
                    self.bump();
                    self.string(start)?;
                }
                '0'..='9' => {
                    let mut digits = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if !c.is_ascii_digit() {
                            break;
                        }
                        digits.push(c);
                        self.bump();
                    }
                    let value: i64 = digits.parse().map_err(|_| {
                        ParseError::new(self.file, start, format!("integer '{digits}' too large"))
                    })?;
                    self.push(TokenKind::Int(value), start);
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut word = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if !c.is_ascii_alphanumeric() && c != '_' {
                            break;
                        }
                        word.push(c);
                        self.bump();
                    }
                    let kind = keyword(&word).unwrap_or(TokenKind::Name(word));
                    self.push(kind, start);
                }
                _ => {
                    self.bump();
                    let kind = match ch {
                        '(' => {
                            self.paren_depth += 1;
                            TokenKind::LParen
                        }
                        ')' => {
                            self.paren_depth = self.paren_depth.saturating_sub(1);
                            TokenKind::RParen
                        }
                        '[' => {
                            self.paren_depth += 1;
                            TokenKind::LBracket
                        }
                        ']' => {
                            self.paren_depth = self.paren_depth.saturating_sub(1);
                            TokenKind::RBracket
                        }
                        '{' => TokenKind::LBrace,
                        '}' => TokenKind::RBrace,
                        ',' => TokenKind::Comma,
                        '.' => TokenKind::Dot,
                        '+' => TokenKind::Plus,
                        '-' => TokenKind::Minus,
                        '*' => TokenKind::Star,
                        '/' => TokenKind::Slash,
                        '%' => TokenKind::Percent,
                        '=' => match self.chars.peek() {
                            Some('=') => {
                                self.bump();
                                TokenKind::EqEq
                            }
                            Some('>') => {
                                self.bump();
                                TokenKind::Arrow
                            }
                            _ => TokenKind::Assign,
                        },
                        '!' => {
                            if self.chars.peek() == Some(&'=') {
                                self.bump();
                                TokenKind::NotEq
                            } else {
                                return Err(ParseError::new(
                                    self.file,
                                    start,
                                    "unexpected character '!'",
                                ));
                            }
                        }
                        '<' => {
                            if self.chars.peek() == Some(&'=') {
                                self.bump();
                                TokenKind::Le
                            } else {
                                TokenKind::Lt
                            }
                        }
                        '>' => {
                            if self.chars.peek() == Some(&'=') {
                                self.bump();
                                TokenKind::Ge
                            } else {
                                TokenKind::Gt
                            }
                        }
                        other => {
                            return Err(ParseError::new(
                                self.file,
                                start,
                                format!("unexpected character '{other}'"),
                            ));
                        }
                    };
                    self.push(kind, start);
                }
            }
        }
        let end = self.pos();
        // terminate the last statement even without a trailing newline
        self.push_newline(end);
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(end, end),
        });
        Ok(self.tokens)
    }
}

/// Tokenize `source`, producing a flat token list ending in `Eof`.
pub fn tokenize(source: &str, file: &Path) -> Result<Vec<Token>, ParseError> {
    Tokenizer {
        file,
        chars: source.chars().peekable(),
        line: 1,
        col: 0,
        paren_depth: 0,
        tokens: Vec::new(),
    }
    .run()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, Path::new("t.dft"))
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    mod basic {
        use super::*;

        #[test]
        fn statement_with_keyword_and_operator() {
            assert_eq!(
                kinds("let x = 1 + 2"),
                vec![
                    TokenKind::Let,
                    TokenKind::Name("x".into()),
                    TokenKind::Assign,
                    TokenKind::Int(1),
                    TokenKind::Plus,
                    TokenKind::Int(2),
                    TokenKind::Newline,
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn arrow_vs_assign_vs_eqeq() {
            assert_eq!(
                kinds("= == =>"),
                vec![
                    TokenKind::Assign,
                    TokenKind::EqEq,
                    TokenKind::Arrow,
                    TokenKind::Newline,
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn comments_are_skipped() {
            assert_eq!(
                kinds("x # trailing\n# whole line\ny"),
                vec![
                    TokenKind::Name("x".into()),
                    TokenKind::Newline,
                    TokenKind::Name("y".into()),
                    TokenKind::Newline,
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn string_escapes() {
            assert_eq!(
                kinds(r#""a\n\"b""#),
                vec![
                    TokenKind::Str("a\n\"b".into()),
                    TokenKind::Newline,
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn unterminated_string_errors() {
            let err = tokenize("\"abc", Path::new("t.dft")).unwrap_err();
            assert!(err.message.contains("unterminated"));
        }
    }

    mod newlines {
        use super::*;

        #[test]
        fn suppressed_inside_parens() {
            assert_eq!(
                kinds("f(1,\n2)"),
                vec![
                    TokenKind::Name("f".into()),
                    TokenKind::LParen,
                    TokenKind::Int(1),
                    TokenKind::Comma,
                    TokenKind::Int(2),
                    TokenKind::RParen,
                    TokenKind::Newline,
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn runs_collapse_and_leading_skipped() {
            assert_eq!(
                kinds("\n\nx\n\n\ny"),
                vec![
                    TokenKind::Name("x".into()),
                    TokenKind::Newline,
                    TokenKind::Name("y".into()),
                    TokenKind::Newline,
                    TokenKind::Eof,
                ]
            );
        }
    }

    mod positions {
        use super::*;

        #[test]
        fn crlf_advances_one_line() {
            let tokens = tokenize("a\r\nb", Path::new("t.dft")).expect("tokenize");
            let b = tokens
                .iter()
                .find(|t| t.kind == TokenKind::Name("b".into()))
                .expect("b token");
            assert_eq!(b.span.start, Pos::new(2, 0));
            assert_eq!(b.span.end, Pos::new(2, 1));
        }

        #[test]
        fn columns_are_zero_indexed() {
            let tokens = tokenize("ab.cd", Path::new("t.dft")).expect("tokenize");
            assert_eq!(tokens[0].span, Span::new(Pos::new(1, 0), Pos::new(1, 2)));
            assert_eq!(tokens[1].span, Span::new(Pos::new(1, 2), Pos::new(1, 3)));
            assert_eq!(tokens[2].span, Span::new(Pos::new(1, 3), Pos::new(1, 5)));
        }
    }
}
