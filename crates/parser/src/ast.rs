// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Abstract Syntax Tree
//!
//! The parser's direct structural output. Every node owns its children and
//! carries a [`Span`] for diagnostics. The tree is consumed read-only by the
//! resolver and discarded after resolution.
//!
//! ## Shape
//!
//! A source document is a [`Module`]: an optional query header followed by
//! statements. A statement is either a `let` definition or a main pipeline.
//! Pipelines are sequences of transform-call expressions:
//!
//! ```text
//! from employees
//! filter department == "eng"
//! select {name, salary}
//! ```

use pipesql_diagnostics::Span;
use serde::{Deserialize, Serialize};

/// A parsed source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Optional `pipesql version:".." target:..` header
    pub header: Option<QueryHeader>,

    /// Top-level statements in source order
    pub stmts: Vec<Stmt>,
}

impl Module {
    /// A module with no statements (used for fully-failed parses)
    pub fn empty() -> Self {
        Self {
            header: None,
            stmts: Vec::new(),
        }
    }
}

/// Query header declaring compiler version and target dialect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHeader {
    /// Declared source-language version, if any
    pub version: Option<String>,

    /// Declared target dialect identifier, if any
    pub target: Option<String>,

    pub span: Span,
}

/// A top-level statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// Statement variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `let name = value` — a function when the value is a lambda, a table
    /// binding when the value is a pipeline
    Let { name: String, value: Expr },

    /// A main pipeline producing an output relation
    Main(Expr),
}

/// An expression node with its source span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ExprKind {
    /// Identifier reference, possibly qualified (`employees.name`)
    Ident(Vec<String>),

    /// Literal value
    Literal(Literal),

    /// Sequence of pipeline steps (`a | b | c`)
    Pipeline(Vec<Expr>),

    /// Transform or function call by juxtaposition
    /// (`filter x > 1`, `join orders side:left (id == order_id)`)
    Call {
        name: Box<Expr>,
        args: Vec<Expr>,
        named_args: Vec<(String, Expr)>,
    },

    /// Binary operation
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },

    /// Unary operation
    Unary { op: UnOp, expr: Box<Expr> },

    /// Tuple / struct literal (`{name, gross = salary + bonus}`)
    Tuple(Vec<TupleField>),

    /// Array literal (`[1, 2, 3]`)
    Array(Vec<Expr>),

    /// Range (`1..10`, `..10`, `5..`)
    Range {
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },

    /// Lambda (`a b:1 -> a + b`), the value form of a function definition
    Lambda {
        params: Vec<FuncParam>,
        body: Box<Expr>,
    },
}

/// A field of a tuple literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleField {
    /// Explicit field name (`gross = ...`); unnamed fields take the name of
    /// the expression when it is a plain column reference
    pub name: Option<String>,
    pub expr: Expr,
}

/// A parameter of a function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncParam {
    pub name: String,
    /// Present for named (defaulted) parameters
    pub default: Option<Expr>,
    pub span: Span,
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// ISO date/timestamp text, as written after `@`
    Date(String),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

impl ExprKind {
    /// The plain name when this is an unqualified identifier
    pub fn as_plain_ident(&self) -> Option<&str> {
        match self {
            ExprKind::Ident(parts) if parts.len() == 1 => Some(&parts[0]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_plain_ident() {
        let plain = ExprKind::Ident(vec!["salary".to_string()]);
        assert_eq!(plain.as_plain_ident(), Some("salary"));

        let qualified = ExprKind::Ident(vec!["e".to_string(), "salary".to_string()]);
        assert_eq!(qualified.as_plain_ident(), None);
    }

    #[test]
    fn test_module_serialization_round_trip() {
        let module = Module {
            header: Some(QueryHeader {
                version: Some("0.1".to_string()),
                target: Some("duckdb".to_string()),
                span: Span::default(),
            }),
            stmts: vec![Stmt {
                kind: StmtKind::Main(Expr::new(
                    ExprKind::Ident(vec!["employees".to_string()]),
                    Span::new(0, 9, 1, 1),
                )),
                span: Span::new(0, 9, 1, 1),
            }],
        };

        let json = serde_json::to_string(&module).unwrap();
        let back: Module = serde_json::from_str(&json).unwrap();
        assert_eq!(module, back);
    }
}
