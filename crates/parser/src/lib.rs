// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # pipesql - Parser
//!
//! Lexing and parsing of the pipesql source language.
//!
//! The crate turns source text into an [`ast::Module`] in two steps:
//!
//! 1. [`lexer::tokenize`] — source text to a token stream with source
//!    spans; unknown characters become error tokens rather than halting
//! 2. [`parser::parse`] — token stream to an AST, accumulating multiple
//!    syntax errors with statement-level recovery
//!
//! Both steps are pure functions of their input; the token stream and the
//! AST are serializable for external tooling.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    BinOp, Expr, ExprKind, FuncParam, Literal, Module, QueryHeader, Stmt, StmtKind, TupleField,
    UnOp,
};
pub use lexer::tokenize;
pub use parser::{MAX_EXPR_DEPTH, parse};
pub use token::{Token, TokenKind};
