// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Expression rendering
//!
//! Renders [`RqExpr`] trees to SQL text. Column identities are resolved
//! through a name table owned by the generator; everything else (literals,
//! operators, calls) renders locally, with quoting and concatenation
//! syntax taken from the dialect capability record.

use std::collections::HashMap;

use pipesql_ir::{Capabilities, Cid, ConcatStyle, QuoteStyle, RqBinOp, RqExpr, RqLiteral, RqUnOp};

/// Identifiers that must be quoted even when lexically plain
const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "cast", "desc", "distinct", "else", "end",
    "exists", "from", "full", "group", "having", "in", "inner", "is", "join", "left", "like",
    "limit", "not", "null", "offset", "on", "or", "order", "outer", "right", "select", "set",
    "table", "then", "union", "user", "when", "where", "with",
];

/// Quote an identifier when it is not a plain lowercase name
pub(crate) fn quote_ident(caps: &Capabilities, ident: &str) -> String {
    if needs_quoting(ident) {
        let style = caps.quote_style;
        match style {
            QuoteStyle::Double => format!("\"{}\"", ident.replace('"', "\"\"")),
            QuoteStyle::Backtick => format!("`{}`", ident.replace('`', "``")),
            QuoteStyle::Bracket => format!("[{}]", ident.replace(']', "]]")),
        }
    } else {
        ident.to_string()
    }
}

fn needs_quoting(ident: &str) -> bool {
    let plain = !ident.is_empty()
        && ident
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    !plain || RESERVED.contains(&ident)
}

pub(crate) fn render_literal(literal: &RqLiteral) -> String {
    match literal {
        RqLiteral::Null => "NULL".to_string(),
        RqLiteral::Boolean(true) => "TRUE".to_string(),
        RqLiteral::Boolean(false) => "FALSE".to_string(),
        RqLiteral::Integer(value) => value.to_string(),
        RqLiteral::Float(value) => {
            let text = value.to_string();
            if text.contains('.') || text.contains('e') || text.contains("inf") {
                text
            } else {
                format!("{text}.0")
            }
        }
        RqLiteral::String(value) => format!("'{}'", value.replace('\'', "''")),
        RqLiteral::Date(value) => format!("DATE '{}'", value.replace('\'', "''")),
    }
}

/// Renders expressions against a fixed column-name table
pub(crate) struct ExprRenderer<'a> {
    pub caps: &'a Capabilities,

    /// How each visible identity is referred to in the current `SELECT`
    pub names: &'a HashMap<Cid, String>,

    /// Defining text of identities computed in the current `SELECT`; these
    /// re-render inline since SQL forbids referring to a projection alias
    /// from a sibling clause
    pub computed: &'a HashMap<Cid, String>,
}

impl ExprRenderer<'_> {
    pub fn render(&self, expr: &RqExpr) -> String {
        self.render_prec(expr, 0)
    }

    fn render_prec(&self, expr: &RqExpr, parent: u8) -> String {
        match expr {
            RqExpr::Column(cid) => self.render_cid(*cid),
            RqExpr::Literal(literal) => render_literal(literal),
            RqExpr::Binary { left, op, right } => {
                if *op == RqBinOp::Concat {
                    return self.render_concat(left, right, parent);
                }
                let prec = bin_prec(*op);
                let text = format!(
                    "{} {} {}",
                    self.render_prec(left, prec),
                    bin_op_text(*op),
                    self.render_prec(right, prec + 1)
                );
                parenthesize(text, prec, parent)
            }
            RqExpr::Unary { op, expr } => match op {
                RqUnOp::Neg => format!("-{}", self.render_prec(expr, u8::MAX)),
                RqUnOp::Not => parenthesize(
                    format!("NOT {}", self.render_prec(expr, 3)),
                    2,
                    parent,
                ),
            },
            RqExpr::Call { function, args } => {
                let rendered: Vec<String> = args.iter().map(|a| self.render(a)).collect();
                format!("{}({})", function.to_uppercase(), rendered.join(", "))
            }
            RqExpr::CountAll => "COUNT(*)".to_string(),
        }
    }

    fn render_cid(&self, cid: Cid) -> String {
        if let Some(text) = self.computed.get(&cid) {
            return text.clone();
        }
        if let Some(name) = self.names.get(&cid) {
            return name.clone();
        }
        // Lowering guarantees no forward references; an unmapped identity
        // would be a lowering bug, so render something greppable rather
        // than panic
        format!("__cid{}", cid.0)
    }

    fn render_concat(&self, left: &RqExpr, right: &RqExpr, parent: u8) -> String {
        match self.caps.string_concat {
            ConcatStyle::Operator => parenthesize(
                format!(
                    "{} || {}",
                    self.render_prec(left, 5),
                    self.render_prec(right, 6)
                ),
                5,
                parent,
            ),
            ConcatStyle::Function => format!(
                "CONCAT({}, {})",
                self.render(left),
                self.render(right)
            ),
            ConcatStyle::PlusOperator => parenthesize(
                format!(
                    "{} + {}",
                    self.render_prec(left, 5),
                    self.render_prec(right, 6)
                ),
                5,
                parent,
            ),
        }
    }
}

fn parenthesize(text: String, prec: u8, parent: u8) -> String {
    if prec < parent {
        format!("({text})")
    } else {
        text
    }
}

/// Binding strength; higher binds tighter
fn bin_prec(op: RqBinOp) -> u8 {
    match op {
        RqBinOp::Or => 1,
        RqBinOp::And => 2,
        RqBinOp::Eq
        | RqBinOp::NotEq
        | RqBinOp::Lt
        | RqBinOp::LtEq
        | RqBinOp::Gt
        | RqBinOp::GtEq => 4,
        RqBinOp::Add | RqBinOp::Sub | RqBinOp::Concat => 5,
        RqBinOp::Mul | RqBinOp::Div | RqBinOp::Mod => 6,
    }
}

pub(crate) fn bin_op_text(op: RqBinOp) -> &'static str {
    match op {
        RqBinOp::Add => "+",
        RqBinOp::Sub => "-",
        RqBinOp::Mul => "*",
        RqBinOp::Div => "/",
        RqBinOp::Mod => "%",
        RqBinOp::Concat => "||",
        RqBinOp::Eq => "=",
        RqBinOp::NotEq => "<>",
        RqBinOp::Lt => "<",
        RqBinOp::LtEq => "<=",
        RqBinOp::Gt => ">",
        RqBinOp::GtEq => ">=",
        RqBinOp::And => "AND",
        RqBinOp::Or => "OR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesql_ir::Dialect;

    fn renderer<'a>(
        caps: &'a Capabilities,
        names: &'a HashMap<Cid, String>,
        computed: &'a HashMap<Cid, String>,
    ) -> ExprRenderer<'a> {
        ExprRenderer {
            caps,
            names,
            computed,
        }
    }

    #[test]
    fn test_plain_identifiers_stay_unquoted() {
        let caps = Capabilities::default();
        assert_eq!(quote_ident(&caps, "salary"), "salary");
        assert_eq!(quote_ident(&caps, "employee_id2"), "employee_id2");
    }

    #[test]
    fn test_reserved_and_mixed_case_identifiers_quote() {
        let caps = Capabilities::default();
        assert_eq!(quote_ident(&caps, "order"), "\"order\"");
        assert_eq!(quote_ident(&caps, "firstName"), "\"firstName\"");
        assert_eq!(quote_ident(&caps, "with space"), "\"with space\"");
    }

    #[test]
    fn test_quote_styles() {
        assert_eq!(
            quote_ident(&Dialect::MySql.capabilities(), "group"),
            "`group`"
        );
        assert_eq!(
            quote_ident(&Dialect::MsSql.capabilities(), "group"),
            "[group]"
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(render_literal(&RqLiteral::Null), "NULL");
        assert_eq!(render_literal(&RqLiteral::Boolean(true)), "TRUE");
        assert_eq!(render_literal(&RqLiteral::Integer(-3)), "-3");
        assert_eq!(render_literal(&RqLiteral::Float(2.0)), "2.0");
        assert_eq!(
            render_literal(&RqLiteral::String("it's".to_string())),
            "'it''s'"
        );
        assert_eq!(
            render_literal(&RqLiteral::Date("2023-01-01".to_string())),
            "DATE '2023-01-01'"
        );
    }

    #[test]
    fn test_precedence_parentheses() {
        let caps = Capabilities::default();
        let mut names = HashMap::new();
        names.insert(Cid(0), "a".to_string());
        names.insert(Cid(1), "b".to_string());
        names.insert(Cid(2), "c".to_string());
        let computed = HashMap::new();
        let r = renderer(&caps, &names, &computed);

        // (a + b) * c keeps its parentheses, a + b * c does not add any
        let sum = RqExpr::Binary {
            left: Box::new(RqExpr::Column(Cid(0))),
            op: RqBinOp::Add,
            right: Box::new(RqExpr::Column(Cid(1))),
        };
        let scaled = RqExpr::Binary {
            left: Box::new(sum.clone()),
            op: RqBinOp::Mul,
            right: Box::new(RqExpr::Column(Cid(2))),
        };
        assert_eq!(r.render(&scaled), "(a + b) * c");

        let product = RqExpr::Binary {
            left: Box::new(RqExpr::Column(Cid(1))),
            op: RqBinOp::Mul,
            right: Box::new(RqExpr::Column(Cid(2))),
        };
        let flat = RqExpr::Binary {
            left: Box::new(RqExpr::Column(Cid(0))),
            op: RqBinOp::Add,
            right: Box::new(product),
        };
        assert_eq!(r.render(&flat), "a + b * c");
    }

    #[test]
    fn test_concat_styles() {
        let mut names = HashMap::new();
        names.insert(Cid(0), "first".to_string());
        names.insert(Cid(1), "last".to_string());
        let computed = HashMap::new();
        let expr = RqExpr::Binary {
            left: Box::new(RqExpr::Column(Cid(0))),
            op: RqBinOp::Concat,
            right: Box::new(RqExpr::Column(Cid(1))),
        };

        let ansi = Capabilities::default();
        assert_eq!(renderer(&ansi, &names, &computed).render(&expr), "first || last");

        let mysql = Dialect::MySql.capabilities();
        assert_eq!(
            renderer(&mysql, &names, &computed).render(&expr),
            "CONCAT(first, last)"
        );

        let mssql = Dialect::MsSql.capabilities();
        assert_eq!(
            renderer(&mssql, &names, &computed).render(&expr),
            "first + last"
        );
    }

    #[test]
    fn test_computed_identities_render_inline() {
        let caps = Capabilities::default();
        let names = HashMap::new();
        let mut computed = HashMap::new();
        computed.insert(Cid(5), "SUM(amount)".to_string());
        let r = renderer(&caps, &names, &computed);
        let expr = RqExpr::Binary {
            left: Box::new(RqExpr::Column(Cid(5))),
            op: RqBinOp::Gt,
            right: Box::new(RqExpr::Literal(RqLiteral::Integer(100))),
        };
        assert_eq!(r.render(&expr), "SUM(amount) > 100");
    }
}
