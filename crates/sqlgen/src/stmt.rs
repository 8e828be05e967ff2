// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Structured SQL statements
//!
//! The generator produces these clause trees rather than flat text; the
//! formatter decides layout. A statement is a body `SELECT` with optional
//! common table expressions; on dialects without CTE support the same
//! chain nests as subqueries inside `FROM` / `JOIN` instead.

/// One output SQL statement
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// `WITH name AS (...)` entries, in dependency order
    pub ctes: Vec<(String, SqlSelect)>,
    pub body: SqlSelect,
}

/// One `SELECT` with its clauses
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlSelect {
    /// `SELECT TOP n` (row-window style of some dialects)
    pub top: Option<i64>,

    /// Projection; empty means `*`
    pub projection: Vec<SqlColumn>,

    /// `*` entries preceding the explicit projection (multi-source
    /// wildcards render as `alias.*`)
    pub wildcards: Vec<String>,

    pub from: Option<SqlFrom>,
    pub joins: Vec<SqlJoin>,

    /// Conjoined `WHERE` conditions
    pub where_: Vec<String>,

    pub group_by: Vec<String>,

    /// Conjoined `HAVING` conditions
    pub having: Vec<String>,

    /// `UNION ALL` sources, rendered as `SELECT * FROM <source>`
    pub unions: Vec<SqlFrom>,

    pub order_by: Vec<String>,

    pub limit: Option<i64>,
    pub offset: i64,

    /// Render the row window as `OFFSET ... FETCH` instead of
    /// `LIMIT ... OFFSET`
    pub offset_fetch: bool,
}

/// One projected column
#[derive(Debug, Clone, PartialEq)]
pub struct SqlColumn {
    pub expr: String,
    /// `AS alias`, when the output name differs from the expression
    pub alias: Option<String>,
}

/// The `FROM` source
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFrom {
    /// Rendered table or CTE name; the subquery alias when nested
    pub name: String,
    /// Nested subquery replacing the named source (no-CTE dialects)
    pub subquery: Option<Box<SqlSelect>>,
}

/// One join clause
#[derive(Debug, Clone, PartialEq)]
pub struct SqlJoin {
    /// `JOIN`, `LEFT JOIN`, `RIGHT JOIN`, `FULL JOIN`
    pub keyword: &'static str,
    pub name: String,
    pub subquery: Option<Box<SqlSelect>>,
    pub on: String,
}

impl SqlSelect {
    /// The projection list as rendered text fragments
    pub fn projection_items(&self) -> Vec<String> {
        let mut items: Vec<String> = self.wildcards.clone();
        for column in &self.projection {
            match &column.alias {
                Some(alias) => items.push(format!("{} AS {}", column.expr, alias)),
                None => items.push(column.expr.clone()),
            }
        }
        if items.is_empty() {
            items.push("*".to_string());
        }
        items
    }
}
