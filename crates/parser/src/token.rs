// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Token types for the pipesql lexer

use pipesql_diagnostics::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A token in the pipesql token stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The raw text of the token
    pub text: String,
    /// Position information
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.text)
    }
}

/// All token kinds produced by the lexer
///
/// Unknown characters are tagged as [`TokenKind::Error`] so the parser can
/// attempt recovery instead of the lexer halting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    // Names and keywords
    Ident,
    KwLet,

    // Literals
    Integer,
    Float,
    String,
    Date,
    True,
    False,
    Null,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    DotDot,
    Colon,
    Pipe,
    Arrow,
    NewLine,

    // Operators
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,
    And,
    Or,
    Bang,

    // Sentinels
    Error,
    Eof,
}

impl TokenKind {
    /// Whether a token of this kind can begin an expression atom
    pub fn starts_atom(self) -> bool {
        matches!(
            self,
            TokenKind::Ident
                | TokenKind::Integer
                | TokenKind::Float
                | TokenKind::String
                | TokenKind::Date
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::DotDot
        )
    }

    /// Human-readable name used in syntax error messages
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::KwLet => "`let`",
            TokenKind::Integer => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::String => "string literal",
            TokenKind::Date => "date literal",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::Null => "`null`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Comma => "`,`",
            TokenKind::Dot => "`.`",
            TokenKind::DotDot => "`..`",
            TokenKind::Colon => "`:`",
            TokenKind::Pipe => "`|`",
            TokenKind::Arrow => "`->`",
            TokenKind::NewLine => "end of line",
            TokenKind::Assign => "`=`",
            TokenKind::Eq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::LtEq => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::GtEq => "`>=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Concat => "`++`",
            TokenKind::And => "`&&`",
            TokenKind::Or => "`||`",
            TokenKind::Bang => "`!`",
            TokenKind::Error => "unrecognized character",
            TokenKind::Eof => "end of input",
        }
    }
}
