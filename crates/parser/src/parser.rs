// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Parser
//!
//! Recursive-descent parser from the token stream to the AST.
//!
//! ## Error policy
//!
//! The parser accumulates diagnostics instead of failing fast. On a
//! malformed construct it records a syntax error at the offending span and
//! resynchronizes at the next statement boundary (blank line, `let`, or end
//! of input), so later statements in the same document are still checked.
//! A fully-failed parse returns a module with zero statements plus at least
//! one diagnostic.
//!
//! ## Newlines
//!
//! Newlines separate pipeline steps; a blank line ends a statement. Inside
//! parentheses, brackets, and braces newlines are transparent, so grouped
//! arguments may span lines. Nested pipelines inside parentheses use `|`
//! between steps.
//!
//! ## Nesting
//!
//! Expression recursion is bounded by an explicit depth counter; exceeding
//! it reports a dedicated too-deeply-nested diagnostic instead of
//! overflowing the call stack.

use crate::ast::{
    BinOp, Expr, ExprKind, FuncParam, Literal, Module, QueryHeader, Stmt, StmtKind, TupleField,
    UnOp,
};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};
use pipesql_diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Span};

/// Maximum expression nesting depth before the parser gives up
pub const MAX_EXPR_DEPTH: usize = 128;

/// Parse source text into `(Module, Diagnostics)`
///
/// The module is usable only when the diagnostics carry no errors.
pub fn parse(source: &str) -> (Module, Diagnostics) {
    let tokens = tokenize(source);
    tracing::debug!(tokens = tokens.len(), bytes = source.len(), "lexed source");
    let mut parser = Parser::new(tokens);
    let module = parser.parse_module();
    let mut diagnostics = parser.diagnostics;
    diagnostics.sort_by_span();
    tracing::debug!(
        stmts = module.stmts.len(),
        diagnostics = diagnostics.len(),
        "parsed module"
    );
    (module, diagnostics)
}

type ParseResult<T> = Result<T, Diagnostic>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Nesting inside `(` `[` `{`; newlines are transparent when > 0
    group_depth: usize,
    expr_depth: usize,
    diagnostics: Diagnostics,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            group_depth: 0,
            expr_depth: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    // ------------------------------------------------------------------
    // Token access

    fn skip_transparent(&mut self) {
        while self.group_depth > 0 && self.tokens[self.pos].kind == TokenKind::NewLine {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> &Token {
        self.skip_transparent();
        &self.tokens[self.pos]
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.peek().kind
    }

    /// Kind of the n-th upcoming token, skipping newlines inside groups
    fn peek_nth_kind(&mut self, n: usize) -> TokenKind {
        self.skip_transparent();
        let mut seen = 0;
        let mut i = self.pos;
        loop {
            let kind = self.tokens[i].kind;
            if self.group_depth > 0 && kind == TokenKind::NewLine {
                i += 1;
                continue;
            }
            if seen == n {
                return kind;
            }
            if kind == TokenKind::Eof {
                return TokenKind::Eof;
            }
            seen += 1;
            i += 1;
        }
    }

    fn advance(&mut self) -> Token {
        self.skip_transparent();
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            let found = self.peek().clone();
            Err(self.syntax_error(
                format!("expected {}, found {}", kind.describe(), found.kind.describe()),
                found.span,
            ))
        }
    }

    fn syntax_error(&self, message: String, span: Span) -> Diagnostic {
        Diagnostic::error(DiagnosticKind::SyntaxError { message }, span)
    }

    /// Skip to the next statement boundary after an error
    fn recover_to_stmt_boundary(&mut self) {
        self.group_depth = 0;
        self.expr_depth = 0;
        loop {
            match self.tokens[self.pos].kind {
                TokenKind::Eof => return,
                TokenKind::KwLet => return,
                TokenKind::NewLine => {
                    self.pos += 1;
                    if self.tokens[self.pos].kind == TokenKind::NewLine {
                        return;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements

    fn parse_module(&mut self) -> Module {
        let mut module = Module::empty();

        self.skip_blank_lines();
        if self.peek_kind() == TokenKind::Ident && self.peek().text == "pipesql" {
            match self.parse_header() {
                Ok(header) => module.header = Some(header),
                Err(d) => {
                    self.diagnostics.push(d);
                    self.recover_to_stmt_boundary();
                }
            }
        }

        loop {
            self.skip_blank_lines();
            if self.peek_kind() == TokenKind::Eof {
                break;
            }
            match self.parse_stmt() {
                Ok(stmt) => module.stmts.push(stmt),
                Err(d) => {
                    self.diagnostics.push(d);
                    self.recover_to_stmt_boundary();
                }
            }
        }

        if module.stmts.is_empty() && !self.diagnostics.has_errors() {
            let span = self
                .tokens
                .last()
                .map(|t| t.span)
                .unwrap_or_default();
            self.diagnostics.push(self.syntax_error(
                "source contains no statements".to_string(),
                span,
            ));
        }

        module
    }

    fn skip_blank_lines(&mut self) {
        while self.tokens[self.pos].kind == TokenKind::NewLine {
            self.pos += 1;
        }
    }

    fn parse_header(&mut self) -> ParseResult<QueryHeader> {
        let keyword = self.advance();
        let mut header = QueryHeader {
            version: None,
            target: None,
            span: keyword.span,
        };

        while self.peek_kind() == TokenKind::Ident {
            let key = self.advance();
            self.expect(TokenKind::Colon)?;
            let value = self.advance();
            header.span = header.span.merge(value.span);
            match (key.text.as_str(), value.kind) {
                ("version", TokenKind::String | TokenKind::Float | TokenKind::Integer) => {
                    header.version = Some(value.text);
                }
                ("target", TokenKind::Ident | TokenKind::String) => {
                    header.target = Some(value.text);
                }
                (other, _) => {
                    return Err(self.syntax_error(
                        format!("unknown query header option '{}'", other),
                        key.span,
                    ));
                }
            }
        }

        if !matches!(self.peek_kind(), TokenKind::NewLine | TokenKind::Eof) {
            let found = self.peek().clone();
            return Err(self.syntax_error(
                format!("expected end of header line, found {}", found.kind.describe()),
                found.span,
            ));
        }
        Ok(header)
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        if self.peek_kind() == TokenKind::KwLet {
            self.parse_let()
        } else {
            let pipeline = self.parse_pipeline()?;
            let span = pipeline.span;
            Ok(Stmt {
                kind: StmtKind::Main(pipeline),
                span,
            })
        }
    }

    fn parse_let(&mut self) -> ParseResult<Stmt> {
        let kw = self.advance();
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::Assign)?;

        let mut value = if let Some(lambda) = self.try_parse_lambda()? {
            lambda
        } else {
            self.parse_call_or_expr()?
        };

        // `let name = from a | sort {...} | take n` binds a pipeline
        if self.peek_kind() == TokenKind::Pipe {
            let mut steps = vec![value];
            while self.eat(TokenKind::Pipe) {
                // a trailing `|` may continue on the next line
                while self.tokens[self.pos].kind == TokenKind::NewLine {
                    self.pos += 1;
                }
                steps.push(self.parse_call_or_expr()?);
            }
            let span = steps[0].span.merge(steps[steps.len() - 1].span);
            value = Expr::new(ExprKind::Pipeline(steps), span);
        }

        if !matches!(self.peek_kind(), TokenKind::NewLine | TokenKind::Eof) {
            let found = self.peek().clone();
            return Err(self.syntax_error(
                format!(
                    "expected end of `let` statement, found {}",
                    found.kind.describe()
                ),
                found.span,
            ));
        }

        let span = kw.span.merge(value.span);
        Ok(Stmt {
            kind: StmtKind::Let {
                name: name.text,
                value,
            },
            span,
        })
    }

    /// Try to parse `a b:1 -> body`; rewinds and returns `None` when the
    /// upcoming tokens are not a lambda head.
    fn try_parse_lambda(&mut self) -> ParseResult<Option<Expr>> {
        let saved = self.pos;
        let mut params = Vec::new();
        let start = self.peek().span;

        while self.peek_kind() == TokenKind::Ident {
            let name = self.advance();
            let default = if self.eat(TokenKind::Colon) {
                Some(self.parse_atom()?)
            } else {
                None
            };
            params.push(FuncParam {
                name: name.text,
                default,
                span: name.span,
            });
        }

        if params.is_empty() || self.peek_kind() != TokenKind::Arrow {
            self.pos = saved;
            return Ok(None);
        }
        self.advance();

        let body = self.parse_call_or_expr()?;
        let span = start.merge(body.span);
        Ok(Some(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        )))
    }

    // ------------------------------------------------------------------
    // Pipelines

    /// Parse a top-level pipeline: steps separated by `|` or newlines,
    /// terminated by a blank line, `let`, or end of input.
    fn parse_pipeline(&mut self) -> ParseResult<Expr> {
        let mut steps = vec![self.parse_call_or_expr()?];

        loop {
            match self.peek_kind() {
                TokenKind::Pipe => {
                    self.advance();
                    // a trailing `|` may continue on the next line
                    while self.tokens[self.pos].kind == TokenKind::NewLine {
                        self.pos += 1;
                    }
                    steps.push(self.parse_call_or_expr()?);
                }
                TokenKind::NewLine => {
                    let mut newlines = 0;
                    while self.tokens[self.pos].kind == TokenKind::NewLine {
                        self.pos += 1;
                        newlines += 1;
                    }
                    let next = self.tokens[self.pos].kind;
                    if newlines >= 2 || matches!(next, TokenKind::KwLet | TokenKind::Eof) {
                        break;
                    }
                    steps.push(self.parse_call_or_expr()?);
                }
                TokenKind::Eof => break,
                _ => {
                    let found = self.peek().clone();
                    return Err(self.syntax_error(
                        format!(
                            "expected `|` or end of line after pipeline step, found {}",
                            found.kind.describe()
                        ),
                        found.span,
                    ));
                }
            }
        }

        if steps.len() == 1 {
            Ok(steps.pop().unwrap_or_else(|| unreachable!()))
        } else {
            let span = steps[0].span.merge(steps[steps.len() - 1].span);
            Ok(Expr::new(ExprKind::Pipeline(steps), span))
        }
    }

    // ------------------------------------------------------------------
    // Expressions

    /// Parse a pipeline step: a call by juxtaposition (`filter x > 1`),
    /// or a plain expression when no arguments follow.
    fn parse_call_or_expr(&mut self) -> ParseResult<Expr> {
        let first = self.parse_expr()?;

        let is_callee = first.kind.as_plain_ident().is_some();
        let next_is_arg = self.peek_kind().starts_atom()
            || (self.peek_kind() == TokenKind::Ident
                && self.peek_nth_kind(1) == TokenKind::Colon);
        if !is_callee || !next_is_arg {
            return Ok(first);
        }

        let mut args = Vec::new();
        let mut named_args: Vec<(String, Expr)> = Vec::new();
        let mut span = first.span;

        loop {
            if self.peek_kind() == TokenKind::Ident && self.peek_nth_kind(1) == TokenKind::Colon
            {
                let name = self.advance();
                self.advance(); // `:`
                let value = self.parse_expr()?;
                span = span.merge(value.span);
                named_args.push((name.text, value));
            } else if self.peek_kind().starts_atom() {
                let arg = self.parse_expr()?;
                span = span.merge(arg.span);
                args.push(arg);
            } else {
                break;
            }
        }

        Ok(Expr::new(
            ExprKind::Call {
                name: Box::new(first),
                args,
                named_args,
            },
            span,
        ))
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPR_DEPTH {
            let span = self.peek().span;
            self.expr_depth -= 1;
            return Err(Diagnostic::error(
                DiagnosticKind::DepthLimitExceeded {
                    depth: MAX_EXPR_DEPTH + 1,
                    limit: MAX_EXPR_DEPTH,
                },
                span,
            ));
        }
        let result = self.parse_range();
        self.expr_depth -= 1;
        result
    }

    fn parse_range(&mut self) -> ParseResult<Expr> {
        if self.peek_kind() == TokenKind::DotDot {
            let dots = self.advance();
            let end = self.parse_or()?;
            let span = dots.span.merge(end.span);
            return Ok(Expr::new(
                ExprKind::Range {
                    start: None,
                    end: Some(Box::new(end)),
                },
                span,
            ));
        }

        let lhs = self.parse_or()?;
        if self.peek_kind() != TokenKind::DotDot {
            return Ok(lhs);
        }
        let dots = self.advance();
        let (end, span) = if self.peek_kind().starts_atom() {
            let end = self.parse_or()?;
            let span = lhs.span.merge(end.span);
            (Some(Box::new(end)), span)
        } else {
            (None, lhs.span.merge(dots.span))
        };
        Ok(Expr::new(
            ExprKind::Range {
                start: Some(Box::new(lhs)),
                end,
            },
            span,
        ))
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_kind() == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            left = binary(left, BinOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.peek_kind() == TokenKind::And {
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(left, BinOp::And, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_concat()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_concat()?;
            left = binary(left, op, right);
        }
    }

    fn parse_concat(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        while self.peek_kind() == TokenKind::Concat {
            self.advance();
            let right = self.parse_additive()?;
            left = binary(left, BinOp::Concat, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Bang => UnOp::Not,
            _ => return self.parse_atom(),
        };
        let token = self.advance();
        let expr = self.parse_unary()?;
        let span = token.span.merge(expr.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
            span,
        ))
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPR_DEPTH {
            let span = self.peek().span;
            self.expr_depth -= 1;
            return Err(Diagnostic::error(
                DiagnosticKind::DepthLimitExceeded {
                    depth: MAX_EXPR_DEPTH + 1,
                    limit: MAX_EXPR_DEPTH,
                },
                span,
            ));
        }
        let result = self.parse_atom_inner();
        self.expr_depth -= 1;
        result
    }

    fn parse_atom_inner(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident => {
                self.advance();
                let mut parts = vec![token.text];
                let mut span = token.span;
                while self.peek_kind() == TokenKind::Dot
                    && self.peek_nth_kind(1) == TokenKind::Ident
                {
                    self.advance(); // `.`
                    let part = self.advance();
                    span = span.merge(part.span);
                    parts.push(part.text);
                }
                Ok(Expr::new(ExprKind::Ident(parts), span))
            }
            TokenKind::Integer => {
                self.advance();
                let digits: String = token.text.chars().filter(|c| *c != '_').collect();
                let value = digits.parse::<i64>().map_err(|_| {
                    self.syntax_error(
                        format!("integer literal '{}' out of range", token.text),
                        token.span,
                    )
                })?;
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Integer(value)),
                    token.span,
                ))
            }
            TokenKind::Float => {
                self.advance();
                let digits: String = token.text.chars().filter(|c| *c != '_').collect();
                let value = digits.parse::<f64>().map_err(|_| {
                    self.syntax_error(
                        format!("invalid float literal '{}'", token.text),
                        token.span,
                    )
                })?;
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Float(value)),
                    token.span,
                ))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Literal(Literal::String(token.text)),
                    token.span,
                ))
            }
            TokenKind::Date => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Date(token.text)),
                    token.span,
                ))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Boolean(token.kind == TokenKind::True)),
                    token.span,
                ))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Null), token.span))
            }
            TokenKind::LParen => self.parse_paren(),
            TokenKind::LBrace => self.parse_tuple(),
            TokenKind::LBracket => self.parse_array(),
            TokenKind::Error => {
                self.advance();
                Err(self.syntax_error(
                    format!("unrecognized character '{}'", token.text),
                    token.span,
                ))
            }
            other => Err(self.syntax_error(
                format!("expected an expression, found {}", other.describe()),
                token.span,
            )),
        }
    }

    /// `( ... )`: a parenthesized expression or a nested pipeline with `|`
    fn parse_paren(&mut self) -> ParseResult<Expr> {
        let open = self.advance();
        self.group_depth += 1;

        let result = (|| {
            let mut steps = vec![self.parse_call_or_expr()?];
            while self.eat(TokenKind::Pipe) {
                steps.push(self.parse_call_or_expr()?);
            }
            Ok(steps)
        })();

        let steps = match result {
            Ok(steps) => steps,
            Err(e) => {
                self.group_depth -= 1;
                return Err(e);
            }
        };
        self.group_depth -= 1;

        // Consume `)` outside the group so a stray newline before it was
        // already skipped while the group was open
        self.skip_blank_close_paren();
        let close = self.expect(TokenKind::RParen)?;
        let span = open.span.merge(close.span);

        if steps.len() == 1 {
            let mut inner = steps.into_iter().next().unwrap_or_else(|| unreachable!());
            inner.span = span;
            Ok(inner)
        } else {
            Ok(Expr::new(ExprKind::Pipeline(steps), span))
        }
    }

    fn skip_blank_close_paren(&mut self) {
        while self.tokens[self.pos].kind == TokenKind::NewLine {
            self.pos += 1;
        }
    }

    fn parse_tuple(&mut self) -> ParseResult<Expr> {
        let open = self.advance();
        self.group_depth += 1;

        let result = (|| {
            let mut fields = Vec::new();
            while self.peek_kind() != TokenKind::RBrace {
                let field = if self.peek_kind() == TokenKind::Ident
                    && self.peek_nth_kind(1) == TokenKind::Assign
                {
                    let name = self.advance();
                    self.advance(); // `=`
                    let expr = self.parse_call_or_expr()?;
                    TupleField {
                        name: Some(name.text),
                        expr,
                    }
                } else {
                    TupleField {
                        name: None,
                        expr: self.parse_call_or_expr()?,
                    }
                };
                fields.push(field);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            Ok(fields)
        })();

        self.group_depth -= 1;
        let fields = result?;
        self.skip_blank_close_brace();
        let close = self.expect(TokenKind::RBrace)?;
        Ok(Expr::new(
            ExprKind::Tuple(fields),
            open.span.merge(close.span),
        ))
    }

    fn skip_blank_close_brace(&mut self) {
        while self.tokens[self.pos].kind == TokenKind::NewLine {
            self.pos += 1;
        }
    }

    fn parse_array(&mut self) -> ParseResult<Expr> {
        let open = self.advance();
        self.group_depth += 1;

        let result = (|| {
            let mut items = Vec::new();
            while self.peek_kind() != TokenKind::RBracket {
                items.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            Ok(items)
        })();

        self.group_depth -= 1;
        let items = result?;
        self.skip_blank_close_brace();
        let close = self.expect(TokenKind::RBracket)?;
        Ok(Expr::new(
            ExprKind::Array(items),
            open.span.merge(close.span),
        ))
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Module {
        let (module, diagnostics) = parse(source);
        assert!(
            !diagnostics.has_errors(),
            "unexpected diagnostics: {}",
            diagnostics
        );
        module
    }

    fn main_pipeline(module: &Module) -> &Expr {
        match &module.stmts[0].kind {
            StmtKind::Main(expr) => expr,
            other => panic!("expected main pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_single_line_pipeline() {
        let module = parse_ok(r#"from employees | filter department == "eng" | select {name, salary}"#);
        let pipeline = main_pipeline(&module);
        match &pipeline.kind {
            ExprKind::Pipeline(steps) => assert_eq!(steps.len(), 3),
            other => panic!("expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_multiline_pipeline_continues_on_newline() {
        let module = parse_ok("from employees\nfilter active == true\ntake 10");
        match &main_pipeline(&module).kind {
            ExprKind::Pipeline(steps) => assert_eq!(steps.len(), 3),
            other => panic!("expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_line_separates_statements() {
        let module = parse_ok("from a\ntake 1\n\nfrom b\ntake 2");
        assert_eq!(module.stmts.len(), 2);
    }

    #[test]
    fn test_call_with_named_args() {
        let module = parse_ok("from orders\njoin customers side:left (customer_id == id)");
        let pipeline = main_pipeline(&module);
        let steps = match &pipeline.kind {
            ExprKind::Pipeline(steps) => steps,
            other => panic!("expected pipeline, got {:?}", other),
        };
        match &steps[1].kind {
            ExprKind::Call {
                name,
                args,
                named_args,
            } => {
                assert_eq!(name.kind.as_plain_ident(), Some("join"));
                assert_eq!(args.len(), 2);
                assert_eq!(named_args.len(), 1);
                assert_eq!(named_args[0].0, "side");
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_header() {
        let module = parse_ok("pipesql version:\"0.1\" target:duckdb\n\nfrom t\ntake 1");
        let header = module.header.expect("header");
        assert_eq!(header.version.as_deref(), Some("0.1"));
        assert_eq!(header.target.as_deref(), Some("duckdb"));
    }

    #[test]
    fn test_let_lambda() {
        let module = parse_ok("let cheap = c -> c < 100\n\nfrom products\nfilter (cheap price)");
        match &module.stmts[0].kind {
            StmtKind::Let { name, value } => {
                assert_eq!(name, "cheap");
                assert!(matches!(value.kind, ExprKind::Lambda { .. }));
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_let_table_binding() {
        let module = parse_ok("let eng = (from employees | filter dept == \"eng\")\n\nfrom eng\ntake 5");
        match &module.stmts[0].kind {
            StmtKind::Let { name, value } => {
                assert_eq!(name, "eng");
                assert!(matches!(value.kind, ExprKind::Pipeline(_)));
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_let_pipeline_binding_without_parens() {
        let module = parse_ok(
            "let top_earners = from employees | sort {-salary} | take 10\n\nfrom top_earners\nselect {name}",
        );
        match &module.stmts[0].kind {
            StmtKind::Let { name, value } => {
                assert_eq!(name, "top_earners");
                match &value.kind {
                    ExprKind::Pipeline(steps) => assert_eq!(steps.len(), 3),
                    other => panic!("expected pipeline, got {:?}", other),
                }
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_grouped_arguments_span_lines() {
        let module = parse_ok(
            "from employees\ngroup {department} (\n  aggregate {n = count this}\n)",
        );
        let steps = match &main_pipeline(&module).kind {
            ExprKind::Pipeline(steps) => steps,
            other => panic!("expected pipeline, got {:?}", other),
        };
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_operator_precedence() {
        let module = parse_ok("from t\nfilter a + b * c == d");
        let steps = match &main_pipeline(&module).kind {
            ExprKind::Pipeline(steps) => steps,
            other => panic!("expected pipeline, got {:?}", other),
        };
        let arg = match &steps[1].kind {
            ExprKind::Call { args, .. } => &args[0],
            other => panic!("expected call, got {:?}", other),
        };
        // Comparison binds loosest: (a + (b * c)) == d
        match &arg.kind {
            ExprKind::Binary { op, left, .. } => {
                assert_eq!(*op, BinOp::Eq);
                match &left.kind {
                    ExprKind::Binary { op, right, .. } => {
                        assert_eq!(*op, BinOp::Add);
                        assert!(matches!(
                            right.kind,
                            ExprKind::Binary { op: BinOp::Mul, .. }
                        ));
                    }
                    other => panic!("expected addition, got {:?}", other),
                }
            }
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_range_argument() {
        let module = parse_ok("from t\ntake 5..20");
        let steps = match &main_pipeline(&module).kind {
            ExprKind::Pipeline(steps) => steps,
            other => panic!("expected pipeline, got {:?}", other),
        };
        let arg = match &steps[1].kind {
            ExprKind::Call { args, .. } => &args[0],
            other => panic!("expected call, got {:?}", other),
        };
        assert!(matches!(
            arg.kind,
            ExprKind::Range {
                start: Some(_),
                end: Some(_)
            }
        ));
    }

    #[test]
    fn test_sort_descending_tuple() {
        let module = parse_ok("from t\nsort {-salary}");
        let steps = match &main_pipeline(&module).kind {
            ExprKind::Pipeline(steps) => steps,
            other => panic!("expected pipeline, got {:?}", other),
        };
        let arg = match &steps[1].kind {
            ExprKind::Call { args, .. } => &args[0],
            other => panic!("expected call, got {:?}", other),
        };
        match &arg.kind {
            ExprKind::Tuple(fields) => {
                assert!(matches!(
                    fields[0].expr.kind,
                    ExprKind::Unary { op: UnOp::Neg, .. }
                ));
            }
            other => panic!("expected tuple, got {:?}", other),
        }
    }

    #[test]
    fn test_error_recovery_reports_multiple_statements() {
        let (_module, diagnostics) = parse("from t\nfilter ==\n\nfrom u\nselect ]");
        assert!(diagnostics.has_errors());
        // Both statements report their own error
        assert!(diagnostics.len() >= 2);
    }

    #[test]
    fn test_empty_source_yields_diagnostic() {
        let (module, diagnostics) = parse("");
        assert!(module.stmts.is_empty());
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_deep_nesting_reports_depth_limit() {
        let mut source = String::from("from t\nfilter ");
        source.push_str(&"(".repeat(200));
        source.push('x');
        source.push_str(&")".repeat(200));
        let (_module, diagnostics) = parse(&source);
        assert!(diagnostics.iter().any(|d| matches!(
            d.kind,
            DiagnosticKind::DepthLimitExceeded { .. }
        )));
    }

    #[test]
    fn test_qualified_identifier() {
        let module = parse_ok("from e\nfilter e.salary > 100");
        let steps = match &main_pipeline(&module).kind {
            ExprKind::Pipeline(steps) => steps,
            other => panic!("expected pipeline, got {:?}", other),
        };
        let arg = match &steps[1].kind {
            ExprKind::Call { args, .. } => &args[0],
            other => panic!("expected call, got {:?}", other),
        };
        match &arg.kind {
            ExprKind::Binary { left, .. } => match &left.kind {
                ExprKind::Ident(parts) => assert_eq!(parts, &vec!["e".to_string(), "salary".to_string()]),
                other => panic!("expected qualified ident, got {:?}", other),
            },
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_diagnostics_are_span_ordered() {
        let (_module, diagnostics) = parse("from t\nselect ]\n\nfrom u\nfilter ==");
        let starts: Vec<usize> = diagnostics.iter().map(|d| d.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }
}
