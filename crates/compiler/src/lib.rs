// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # pipesql
//!
//! Compiler for the pipesql pipeline query language, targeting SQL.
//!
//! A query is a sequence of `from`-led pipelines; each main pipeline
//! compiles to one SQL statement for the chosen target dialect. The
//! compiler runs in four stages — parse, resolve, lower, generate — and
//! every stage either succeeds or returns span-ordered diagnostics, never
//! both. No SQL is returned alongside errors.
//!
//! [`compile`] runs all four stages; [`parse_to_resolved`],
//! [`resolved_to_relational`], and [`relational_to_sql`] expose the stage
//! boundaries as versioned JSON documents so external tooling can inspect
//! or replay an individual stage.
//!
//! ```
//! use pipesql::{compile, Options};
//!
//! let source = "from employees\nfilter department == \"eng\"\nselect {name, salary}";
//! let sql = compile(source, &Options::default()).unwrap();
//! assert!(sql.starts_with("SELECT name, salary"));
//! ```
//!
//! Compilation is a pure function of source text and options: there are no
//! process-wide caches or singletons, so independent compilations may run
//! concurrently.

use pipesql_diagnostics::{Diagnostics, StageResult};
use pipesql_function_registry::Registry;
use pipesql_ir::{from_document_json, to_document_json, RelationalModule};
use pipesql_lowering::lower;
use pipesql_parser::parse;
use pipesql_semantic::{resolve, ResolvedModule};
use pipesql_sqlgen::{generate, render};
use tracing::debug;

pub use pipesql_diagnostics::{Diagnostic, DiagnosticKind, Severity, Span};
pub use pipesql_ir::{Capabilities, Dialect, DialectDescriptor, FORMAT_VERSION};

/// Compilation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Pretty-print the output: one clause per line, wrapped projections
    pub format: bool,

    /// Append a trailing `-- Generated by pipesql <version>` comment
    pub signature_comment: bool,

    /// Target dialect selection
    pub target: Target,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            format: true,
            signature_comment: true,
            target: Target::Any,
        }
    }
}

/// How the target dialect is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Use the source header's `target:` option, falling back to ANSI
    #[default]
    Any,

    /// Compile for this dialect regardless of the source header
    Dialect(Dialect),
}

/// Compile pipesql source text to SQL
pub fn compile(source: &str, options: &Options) -> StageResult<String> {
    let (ast, diagnostics) = parse(source);
    let ast = diagnostics.into_result(ast)?;

    let registry = Registry::new();
    let (resolved, diagnostics) = resolve(&ast, &registry);
    let resolved = diagnostics.into_result(resolved)?;

    let dialect = choose_dialect(options, resolved.target.as_deref());
    debug!(%dialect, pipelines = resolved.pipelines.len(), "compiling");

    let relational = lower(&resolved)?;
    let statements = generate(&relational, dialect)?;

    let mut sql = render(&statements, options.format);
    if options.signature_comment && !sql.is_empty() {
        sql.push_str(&format!(
            "\n-- Generated by pipesql {}",
            env!("CARGO_PKG_VERSION")
        ));
    }
    Ok(sql)
}

/// Parse and resolve source text, returning the resolved module as a
/// versioned JSON document
pub fn parse_to_resolved(source: &str) -> StageResult<String> {
    let (ast, diagnostics) = parse(source);
    let ast = diagnostics.into_result(ast)?;

    let registry = Registry::new();
    let (resolved, diagnostics) = resolve(&ast, &registry);
    let resolved = diagnostics.into_result(resolved)?;

    to_document_json(&resolved).map_err(Diagnostics::single)
}

/// Lower a resolved-module document to a relational-module document
pub fn resolved_to_relational(json: &str) -> StageResult<String> {
    let resolved: ResolvedModule = from_document_json(json).map_err(Diagnostics::single)?;
    let relational = lower(&resolved)?;
    to_document_json(&relational).map_err(Diagnostics::single)
}

/// Generate SQL from a relational-module document
///
/// When no dialect is given, the module's recorded header target is used,
/// falling back to ANSI. Output is pretty-printed without a signature
/// comment; use [`compile`] for option control.
pub fn relational_to_sql(json: &str, dialect: Option<Dialect>) -> StageResult<String> {
    let relational: RelationalModule = from_document_json(json).map_err(Diagnostics::single)?;
    let dialect = dialect
        .or_else(|| {
            relational
                .target
                .as_deref()
                .and_then(Dialect::from_name)
        })
        .unwrap_or(Dialect::Ansi);
    let statements = generate(&relational, dialect)?;
    Ok(render(&statements, true))
}

/// All supported dialects, in stable registry order
pub fn list_dialects() -> Vec<DialectDescriptor> {
    Dialect::all().iter().map(|d| d.descriptor()).collect()
}

fn choose_dialect(options: &Options, header: Option<&str>) -> Dialect {
    match options.target {
        Target::Dialect(dialect) => dialect,
        // The resolver has already validated the header target, so an
        // unknown name cannot reach this point on the success path
        Target::Any => header
            .and_then(Dialect::from_name)
            .unwrap_or(Dialect::Ansi),
    }
}
