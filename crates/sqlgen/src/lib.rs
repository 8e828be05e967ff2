// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # pipesql - SQL generation
//!
//! Turns the relational IR into SQL text for a chosen target dialect.
//!
//! Generation is split in two: [`generate`] produces structured
//! [`SqlStatement`]s (clause trees with CTEs), and [`render`] lays them out
//! as text, either pretty-printed or on a single line. [`generate_sql`]
//! composes the two.
//!
//! Dialect differences are driven entirely by the capability record from
//! [`pipesql_ir::Dialect::capabilities`]: quoting, string concatenation,
//! row-window syntax, CTE availability, and window-function support. A
//! feature the dialect cannot express is reported as a capability
//! diagnostic rather than silently emitting invalid SQL.

mod codegen;
mod expr;
mod format;
mod stmt;

pub use codegen::generate;
pub use format::render;
pub use stmt::{SqlColumn, SqlFrom, SqlJoin, SqlSelect, SqlStatement};

use pipesql_diagnostics::StageResult;
use pipesql_ir::{Dialect, RelationalModule};

/// Generate SQL text for a module in one step
pub fn generate_sql(
    module: &RelationalModule,
    dialect: Dialect,
    pretty: bool,
) -> StageResult<String> {
    let statements = generate(module, dialect)?;
    Ok(render(&statements, pretty))
}
