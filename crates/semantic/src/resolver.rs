// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Resolver
//!
//! Walks the AST, resolves every identifier against lexical scopes, matches
//! transform and function calls against their signatures, and rewrites
//! pipelines into the explicit [`crate::pl`] tree.
//!
//! ## Scope effects
//!
//! Each pipeline opens a fresh [`Scope`] seeded from its `from` source.
//! Transforms then narrow, extend, or replace the visible column set:
//! `select` and `aggregate` replace it, `derive` and `window` extend it,
//! `filter` / `sort` / `take` preserve it, `join` merges another source in.
//!
//! ## Failure semantics
//!
//! Errors accumulate; a pipeline stops attaching further steps after the
//! first unrecoverable error inside it, but independent top-level pipelines
//! keep resolving so one broken query does not hide diagnostics in another.
//! All collected diagnostics are reported together, span-ordered.
//!
//! ## User-defined functions
//!
//! `let f = a b:1 -> ...` defines a function; calls are inlined during
//! resolution by substituting resolved argument expressions for parameters,
//! so the resolved tree only ever contains builtin calls. Inlining depth is
//! bounded so runaway recursion surfaces as a diagnostic instead of a
//! stack overflow.

use crate::pl::{
    BindingKind, Decl, DeclId, FrameKind, JoinSide, NamedExpr, PlExpr, PlFrame, PlSortKey,
    RelationSource, ResolvedModule, ResolvedPipeline, ResolvedTransform, TransformCall,
};
use crate::scope::{Lookup, Scope};
use pipesql_diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Span};
use pipesql_function_registry::{FunctionClass, Registry, TransformKind};
use pipesql_ir::Dialect;
use pipesql_parser::ast::{Expr, ExprKind, FuncParam, Literal, Module, StmtKind, UnOp};
use std::collections::HashMap;

/// Maximum function-inlining depth before resolution gives up
pub const MAX_INLINE_DEPTH: usize = 128;

/// Resolve a parsed module against the builtin registry
///
/// Returns the resolved tree together with all accumulated diagnostics,
/// span-ordered. The tree is only meaningful when the diagnostics contain
/// no errors.
pub fn resolve(module: &Module, registry: &Registry) -> (ResolvedModule, Diagnostics) {
    let mut resolver = Resolver::new(registry);

    let (version, target) = module
        .header
        .as_ref()
        .map(|h| (h.version.clone(), h.target.clone()))
        .unwrap_or((None, None));

    if let Some(header) = &module.header
        && let Some(declared) = &header.target
        && Dialect::from_name(declared).is_none()
    {
        let supported: Vec<&str> = Dialect::all().iter().map(|d| d.name()).collect();
        resolver.diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::NameResolutionError {
                    message: format!("unknown target dialect '{}'", declared),
                },
                header.span,
            )
            .with_hint(format!("supported dialects: {}", supported.join(", "))),
        );
    }

    for stmt in &module.stmts {
        match &stmt.kind {
            StmtKind::Let { name, value } => resolver.resolve_let(name, value, stmt.span),
            StmtKind::Main(expr) => resolver.resolve_pipeline(None, expr),
        }
    }

    resolver.diagnostics.sort_by_span();
    tracing::debug!(
        pipelines = resolver.pipelines.len(),
        diagnostics = resolver.diagnostics.len(),
        "resolution finished"
    );

    (
        ResolvedModule {
            decls: resolver.decls,
            pipelines: resolver.pipelines,
            version,
            target,
        },
        resolver.diagnostics,
    )
}

/// Expression position, deciding which function classes are admissible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprCtx {
    /// Row-level position: `filter`, `select`, `derive`, sort keys
    Plain,
    /// Inside `aggregate` / `group (aggregate ...)` fields
    Aggregate,
    /// Inside `window (derive ...)` / `group (derive ...)` fields
    Window,
}

/// A user-defined function awaiting inlining
#[derive(Debug, Clone)]
struct FuncDef {
    params: Vec<FuncParam>,
    body: Expr,
}

/// Final visible columns of a resolved pipeline, used to seed the scope of
/// pipelines that consume it
#[derive(Debug, Clone, Default)]
struct PipelineOutput {
    /// `select` or `aggregate` fixed the column set
    narrowed: bool,
    columns: Vec<(Option<String>, DeclId)>,
}

struct Resolver<'a> {
    registry: &'a Registry,
    decls: Vec<Decl>,
    pipelines: Vec<ResolvedPipeline>,
    pipeline_outputs: Vec<PipelineOutput>,
    diagnostics: Diagnostics,

    /// `let`-bound functions
    functions: HashMap<String, FuncDef>,
    /// `let`-bound scalar values, pre-resolved
    values: HashMap<String, PlExpr>,
    /// `let`-bound relations; `None` marks one whose resolution failed, so
    /// references to it do not cascade into fresh diagnostics
    relations: HashMap<String, Option<usize>>,

    /// Parameter substitution frames for function inlining; only the
    /// innermost frame is visible (no lexical capture between functions)
    param_frames: Vec<HashMap<String, PlExpr>>,
    inline_depth: usize,
}

impl<'a> Resolver<'a> {
    fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            decls: Vec::new(),
            pipelines: Vec::new(),
            pipeline_outputs: Vec::new(),
            diagnostics: Diagnostics::new(),
            functions: HashMap::new(),
            values: HashMap::new(),
            relations: HashMap::new(),
            param_frames: Vec::new(),
            inline_depth: 0,
        }
    }

    fn push_decl(&mut self, name: Option<String>, kind: BindingKind, span: Span) -> DeclId {
        let id = DeclId(self.decls.len());
        self.decls.push(Decl { name, kind, span });
        id
    }

    fn error(&mut self, kind: DiagnosticKind, span: Span) {
        self.diagnostics.push(Diagnostic::error(kind, span));
    }

    fn error_with_hint(&mut self, kind: DiagnosticKind, span: Span, hint: String) {
        self.diagnostics
            .push(Diagnostic::error(kind, span).with_hint(hint));
    }

    fn name_error(&mut self, message: String, span: Span) {
        self.error(DiagnosticKind::NameResolutionError { message }, span);
    }

    fn type_error(&mut self, expected: &str, found: String, span: Span) {
        self.error(
            DiagnosticKind::TypeMismatchError {
                expected: expected.to_string(),
                found,
            },
            span,
        );
    }

    fn is_defined(&self, name: &str) -> bool {
        self.functions.contains_key(name)
            || self.values.contains_key(name)
            || self.relations.contains_key(name)
    }

    // ------------------------------------------------------------------
    // Statements

    fn resolve_let(&mut self, name: &str, value: &Expr, span: Span) {
        if self.is_defined(name) {
            self.name_error(format!("name '{}' is already defined", name), span);
            return;
        }

        match &value.kind {
            ExprKind::Lambda { params, body } => {
                let mut seen: Vec<&str> = Vec::new();
                for param in params {
                    if seen.contains(&param.name.as_str()) {
                        self.name_error(
                            format!("duplicate parameter '{}'", param.name),
                            param.span,
                        );
                        return;
                    }
                    seen.push(&param.name);
                }
                self.push_decl(Some(name.to_string()), BindingKind::Function, span);
                self.functions.insert(
                    name.to_string(),
                    FuncDef {
                        params: params.clone(),
                        body: (**body).clone(),
                    },
                );
            }
            _ if is_relation_expr(value) => {
                self.push_decl(Some(name.to_string()), BindingKind::Relation, span);
                self.resolve_pipeline(Some(name), value);
            }
            _ => {
                // A scalar value binding, resolved against an empty scope
                let mut scope = Scope::new();
                if let Some(resolved) = self.resolve_expr(value, &mut scope, ExprCtx::Plain) {
                    self.push_decl(Some(name.to_string()), BindingKind::Value, span);
                    self.values.insert(name.to_string(), resolved);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Pipelines

    fn resolve_pipeline(&mut self, name: Option<&str>, expr: &Expr) {
        let steps: Vec<&Expr> = match &expr.kind {
            ExprKind::Pipeline(steps) => steps.iter().collect(),
            _ => vec![expr],
        };

        match self.resolve_pipeline_steps(name, &steps) {
            Some((pipeline, output)) => {
                let index = self.pipelines.len();
                self.pipelines.push(pipeline);
                self.pipeline_outputs.push(output);
                if let Some(n) = name {
                    self.relations.insert(n.to_string(), Some(index));
                }
            }
            None => {
                if let Some(n) = name {
                    self.relations.insert(n.to_string(), None);
                }
            }
        }
    }

    fn resolve_pipeline_steps(
        &mut self,
        name: Option<&str>,
        steps: &[&Expr],
    ) -> Option<(ResolvedPipeline, PipelineOutput)> {
        let first = steps.first()?;
        let (source, alias, source_span) = self.pipeline_from_source(first)?;

        let mut scope = Scope::new();
        self.seed_source_scope(&mut scope, &source, &alias);

        let mut resolved = Vec::new();
        let mut output = PipelineOutput::default();
        for step in &steps[1..] {
            if !self.resolve_step(step, &mut scope, &mut resolved, &mut output) {
                // Stop attaching steps to this pipeline; other top-level
                // pipelines still resolve independently
                return None;
            }
        }

        Some((
            ResolvedPipeline {
                name: name.map(str::to_string),
                source,
                source_span,
                steps: resolved,
            },
            output,
        ))
    }

    /// The first pipeline step, which must be a `from` call
    fn pipeline_from_source(&mut self, first: &Expr) -> Option<(RelationSource, String, Span)> {
        match &first.kind {
            ExprKind::Call {
                name, args, named_args,
            } if name.kind.as_plain_ident() == Some("from") => {
                if let Some((bad, _)) = named_args.first() {
                    self.name_error(
                        format!("transform 'from' has no named parameter '{}'", bad),
                        first.span,
                    );
                    return None;
                }
                if args.len() != 1 {
                    self.type_error(
                        "'from' with 1 argument(s)",
                        format!("{} argument(s)", args.len()),
                        first.span,
                    );
                    return None;
                }
                self.resolve_relation_ref(&args[0])
            }
            _ => {
                self.error_with_hint(
                    DiagnosticKind::NameResolutionError {
                        message: "a pipeline must start with 'from'".to_string(),
                    },
                    first.span,
                    "begin the pipeline with: from <table>".to_string(),
                );
                None
            }
        }
    }

    /// Resolve a table or `let`-bound relation reference
    fn resolve_relation_ref(&mut self, expr: &Expr) -> Option<(RelationSource, String, Span)> {
        let ExprKind::Ident(parts) = &expr.kind else {
            self.name_error("expected a table or relation name".to_string(), expr.span);
            return None;
        };

        if parts.len() == 1 {
            let name = &parts[0];
            if let Some(entry) = self.relations.get(name) {
                return match entry {
                    Some(index) => Some((
                        RelationSource::Pipeline { index: *index },
                        name.clone(),
                        expr.span,
                    )),
                    // The referenced relation already failed to resolve;
                    // suppress cascading diagnostics
                    None => None,
                };
            }
            if self.functions.contains_key(name) || self.values.contains_key(name) {
                self.name_error(format!("'{}' is not a relation", name), expr.span);
                return None;
            }
        }

        let table = parts.join(".");
        let alias = parts.last().cloned().unwrap_or_default();
        Some((RelationSource::Table { name: table }, alias, expr.span))
    }

    /// Bring a `from` or `join` source's columns into scope
    ///
    /// Physical tables come in open (columns discovered from use). A
    /// `let`-bound relation contributes the declarations of its output
    /// columns, so provenance carries across the relation boundary; it is
    /// closed when its column set was fixed by `select` or `aggregate`.
    fn seed_source_scope(&mut self, scope: &mut Scope, source: &RelationSource, alias: &str) -> bool {
        match source {
            RelationSource::Table { name } => scope.add_table(alias, name, true),
            RelationSource::Pipeline { index } => {
                let out = self.pipeline_outputs[*index].clone();
                let added = scope.add_table(alias, alias, !out.narrowed);
                if added {
                    for (name, decl) in &out.columns {
                        if let Some(n) = name {
                            scope.record_discovered(alias, n, *decl);
                            scope.bind_column(n, *decl);
                        }
                    }
                }
                added
            }
        }
    }

    // ------------------------------------------------------------------
    // Transform steps

    fn resolve_step(
        &mut self,
        step: &Expr,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
        output: &mut PipelineOutput,
    ) -> bool {
        let (name_expr, args, named_args): (&Expr, &[Expr], &[(String, Expr)]) = match &step.kind
        {
            ExprKind::Call {
                name, args, named_args,
            } => (name, args, named_args),
            ExprKind::Ident(_) => (step, &[], &[]),
            _ => {
                self.type_error("a transform call", "an expression".to_string(), step.span);
                return false;
            }
        };

        let Some(name) = name_expr.kind.as_plain_ident() else {
            self.name_error("expected a transform name".to_string(), name_expr.span);
            return false;
        };

        let Some(spec) = self.registry.transform(name).cloned() else {
            if self.registry.is_function(name) || self.functions.contains_key(name) {
                self.name_error(
                    format!("function '{}' cannot be used as a pipeline step", name),
                    step.span,
                );
            } else {
                self.name_error(format!("unknown transform '{}'", name), step.span);
            }
            return false;
        };

        if args.len() < spec.min_args || args.len() > spec.max_args {
            self.type_error(
                &format!("'{}' with {}", name, spec.arity_description()),
                format!("{} argument(s)", args.len()),
                step.span,
            );
            return false;
        }

        for (param, _) in named_args {
            if !spec.named_params.contains(&param.as_str()) {
                let hint = if spec.named_params.is_empty() {
                    format!("'{}' accepts no named parameters", name)
                } else {
                    format!("accepted: {}", spec.named_params.join(", "))
                };
                self.error_with_hint(
                    DiagnosticKind::NameResolutionError {
                        message: format!(
                            "transform '{}' has no named parameter '{}'",
                            name, param
                        ),
                    },
                    step.span,
                    hint,
                );
                return false;
            }
        }

        match spec.kind {
            TransformKind::From => {
                self.name_error(
                    "'from' may only appear as the first step of a pipeline".to_string(),
                    step.span,
                );
                false
            }
            TransformKind::Select => self.resolve_select(&args[0], step.span, scope, out, output),
            TransformKind::Derive => self.resolve_derive(&args[0], step.span, scope, out, output),
            TransformKind::Filter => self.resolve_filter(&args[0], step.span, scope, out),
            TransformKind::Aggregate => {
                let Some(computed) = self.resolve_aggregate_fields(&args[0], scope) else {
                    return false;
                };
                self.apply_aggregate(Vec::new(), Vec::new(), computed, step.span, scope, out, output);
                true
            }
            TransformKind::Group => self.resolve_group(args, step.span, scope, out, output),
            TransformKind::Sort => self.resolve_sort(&args[0], step.span, scope, out),
            TransformKind::Take => self.resolve_take(&args[0], step.span, out),
            TransformKind::Join => self.resolve_join(args, named_args, step.span, scope, out),
            TransformKind::Window => {
                self.resolve_window(&args[0], named_args, step.span, scope, out, output)
            }
            TransformKind::Append => {
                let Some((source, _alias, source_span)) = self.resolve_relation_ref(&args[0])
                else {
                    return false;
                };
                out.push(ResolvedTransform {
                    kind: TransformCall::Append {
                        source,
                        source_span,
                    },
                    span: step.span,
                });
                true
            }
        }
    }

    fn resolve_select(
        &mut self,
        arg: &Expr,
        span: Span,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
        output: &mut PipelineOutput,
    ) -> bool {
        let Some(columns) = self.resolve_row_fields(arg, scope) else {
            return false;
        };

        let visible: Vec<(String, DeclId)> = columns
            .iter()
            .filter_map(|c| self.decls[c.decl.0].name.clone().map(|n| (n, c.decl)))
            .collect();
        scope.replace_columns(visible);

        output.narrowed = true;
        output.columns = columns
            .iter()
            .map(|c| (self.decls[c.decl.0].name.clone(), c.decl))
            .collect();

        out.push(ResolvedTransform {
            kind: TransformCall::Select { columns },
            span,
        });
        true
    }

    fn resolve_derive(
        &mut self,
        arg: &Expr,
        span: Span,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
        output: &mut PipelineOutput,
    ) -> bool {
        let Some(columns) = self.resolve_row_fields(arg, scope) else {
            return false;
        };

        for column in &columns {
            if let Some(n) = self.decls[column.decl.0].name.clone() {
                scope.bind_column(&n, column.decl);
            }
            output
                .columns
                .push((self.decls[column.decl.0].name.clone(), column.decl));
        }

        out.push(ResolvedTransform {
            kind: TransformCall::Derive { columns },
            span,
        });
        true
    }

    /// Resolve the tuple argument of `select` / `derive`: row-level fields,
    /// reusing the declaration of plain passthrough references
    fn resolve_row_fields(&mut self, arg: &Expr, scope: &mut Scope) -> Option<Vec<NamedExpr>> {
        let fields = tuple_fields(arg);
        let mut resolved = Vec::new();
        let mut ok = true;

        for field in &fields {
            let Some(expr) = self.resolve_expr(&field.expr, scope, ExprCtx::Plain) else {
                ok = false;
                continue;
            };
            if expr.contains_aggregation() {
                self.error_with_hint(
                    DiagnosticKind::TypeMismatchError {
                        expected: "a row-level expression".to_string(),
                        found: "an aggregate expression".to_string(),
                    },
                    field.expr.span,
                    "compute grouped values with aggregate {...} or window (...)".to_string(),
                );
                ok = false;
                continue;
            }

            let decl = match (&field.name, &expr) {
                // Plain passthrough keeps the column's identity
                (None, PlExpr::Binding { decl, .. }) => *decl,
                _ => {
                    let name = field_name(field);
                    self.push_decl(name, BindingKind::Column { table: None }, field.expr.span)
                }
            };
            resolved.push(NamedExpr {
                decl,
                expr,
                span: field.expr.span,
            });
        }

        ok.then_some(resolved)
    }

    fn resolve_filter(
        &mut self,
        arg: &Expr,
        span: Span,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
    ) -> bool {
        let Some(condition) = self.resolve_expr(arg, scope, ExprCtx::Plain) else {
            return false;
        };
        if condition.contains_aggregation() {
            self.error_with_hint(
                DiagnosticKind::TypeMismatchError {
                    expected: "a row-level condition".to_string(),
                    found: "an aggregate expression".to_string(),
                },
                arg.span,
                "aggregate first, then filter on the aggregated column".to_string(),
            );
            return false;
        }
        out.push(ResolvedTransform {
            kind: TransformCall::Filter { condition },
            span,
        });
        true
    }

    /// Resolve the tuple argument of `aggregate`: each field must compute
    /// an aggregated value
    fn resolve_aggregate_fields(&mut self, arg: &Expr, scope: &mut Scope) -> Option<Vec<NamedExpr>> {
        let fields = tuple_fields(arg);
        let mut resolved = Vec::new();
        let mut ok = true;

        for field in &fields {
            let Some(expr) = self.resolve_expr(&field.expr, scope, ExprCtx::Aggregate) else {
                ok = false;
                continue;
            };
            if !expr.contains_aggregation() {
                self.error_with_hint(
                    DiagnosticKind::TypeMismatchError {
                        expected: "an aggregate expression".to_string(),
                        found: "a row-level expression".to_string(),
                    },
                    field.expr.span,
                    "wrap the value in an aggregate function such as sum or count".to_string(),
                );
                ok = false;
                continue;
            }
            let name = field_name(field);
            let decl =
                self.push_decl(name, BindingKind::Column { table: None }, field.expr.span);
            resolved.push(NamedExpr {
                decl,
                expr,
                span: field.expr.span,
            });
        }

        ok.then_some(resolved)
    }

    /// Push an aggregate step and apply its scope effect: the visible
    /// column set becomes the group keys plus the computed columns
    #[allow(clippy::too_many_arguments)]
    fn apply_aggregate(
        &mut self,
        group_by: Vec<PlExpr>,
        key_columns: Vec<(Option<String>, DeclId)>,
        computed: Vec<NamedExpr>,
        span: Span,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
        output: &mut PipelineOutput,
    ) {
        let mut columns = key_columns;
        for c in &computed {
            columns.push((self.decls[c.decl.0].name.clone(), c.decl));
        }

        let visible: Vec<(String, DeclId)> = columns
            .iter()
            .filter_map(|(n, d)| n.clone().map(|n| (n, *d)))
            .collect();
        scope.replace_columns(visible);

        output.narrowed = true;
        output.columns = columns;

        out.push(ResolvedTransform {
            kind: TransformCall::Aggregate { group_by, computed },
            span,
        });
    }

    /// `group {keys} (sub-pipeline)`: aggregate sub-steps become grouped
    /// aggregations, derive sub-steps become windows partitioned by the
    /// group keys
    fn resolve_group(
        &mut self,
        args: &[Expr],
        span: Span,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
        output: &mut PipelineOutput,
    ) -> bool {
        let key_fields = tuple_fields(&args[0]);
        let mut keys = Vec::new();
        let mut key_columns = Vec::new();
        for field in &key_fields {
            let Some(expr) = self.resolve_expr(&field.expr, scope, ExprCtx::Plain) else {
                return false;
            };
            let PlExpr::Binding { decl, .. } = expr else {
                self.type_error(
                    "a column reference",
                    "an expression".to_string(),
                    field.expr.span,
                );
                return false;
            };
            key_columns.push((self.decls[decl.0].name.clone(), decl));
            keys.push(expr);
        }

        let sub_steps: Vec<&Expr> = match &args[1].kind {
            ExprKind::Pipeline(steps) => steps.iter().collect(),
            _ => vec![&args[1]],
        };

        for sub in sub_steps {
            let ExprKind::Call {
                name, args: sub_args, ..
            } = &sub.kind
            else {
                self.type_error(
                    "an aggregate or derive step inside group",
                    "an expression".to_string(),
                    sub.span,
                );
                return false;
            };
            match name.kind.as_plain_ident() {
                Some("aggregate") if sub_args.len() == 1 => {
                    let Some(computed) = self.resolve_aggregate_fields(&sub_args[0], scope)
                    else {
                        return false;
                    };
                    self.apply_aggregate(
                        keys.clone(),
                        key_columns.clone(),
                        computed,
                        span,
                        scope,
                        out,
                        output,
                    );
                }
                Some("derive") if sub_args.len() == 1 => {
                    let Some(computed) = self.resolve_window_fields(&sub_args[0], scope) else {
                        return false;
                    };
                    for c in &computed {
                        if let Some(n) = self.decls[c.decl.0].name.clone() {
                            scope.bind_column(&n, c.decl);
                        }
                        output
                            .columns
                            .push((self.decls[c.decl.0].name.clone(), c.decl));
                    }
                    out.push(ResolvedTransform {
                        kind: TransformCall::Window {
                            partition: keys.clone(),
                            sort: Vec::new(),
                            frame: None,
                            computed,
                        },
                        span,
                    });
                }
                Some(other) => {
                    self.type_error(
                        "an aggregate or derive step inside group",
                        format!("'{}'", other),
                        sub.span,
                    );
                    return false;
                }
                None => {
                    self.name_error("expected a transform name".to_string(), sub.span);
                    return false;
                }
            }
        }
        true
    }

    fn resolve_sort(
        &mut self,
        arg: &Expr,
        span: Span,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
    ) -> bool {
        let Some(keys) = self.resolve_sort_keys(arg, scope) else {
            return false;
        };
        out.push(ResolvedTransform {
            kind: TransformCall::Sort { keys },
            span,
        });
        true
    }

    /// Sort keys: `sort {-salary, name}` — a leading minus means descending
    fn resolve_sort_keys(&mut self, arg: &Expr, scope: &mut Scope) -> Option<Vec<PlSortKey>> {
        let fields = tuple_fields(arg);
        let mut keys = Vec::new();
        let mut ok = true;

        for field in &fields {
            let (desc, key_expr) = match &field.expr.kind {
                ExprKind::Unary {
                    op: UnOp::Neg,
                    expr,
                } => (true, expr.as_ref()),
                _ => (false, &field.expr),
            };
            let Some(expr) = self.resolve_expr(key_expr, scope, ExprCtx::Plain) else {
                ok = false;
                continue;
            };
            if expr.contains_aggregation() {
                self.type_error(
                    "a row-level sort key",
                    "an aggregate expression".to_string(),
                    key_expr.span,
                );
                ok = false;
                continue;
            }
            keys.push(PlSortKey { expr, desc });
        }

        ok.then_some(keys)
    }

    /// `take n` or `take lo..hi` (1-based, inclusive)
    fn resolve_take(&mut self, arg: &Expr, span: Span, out: &mut Vec<ResolvedTransform>) -> bool {
        let window = match &arg.kind {
            ExprKind::Literal(Literal::Integer(n)) => {
                if *n < 1 {
                    self.type_error("a positive row count", n.to_string(), arg.span);
                    return false;
                }
                Some((Some(*n), 0))
            }
            ExprKind::Range { start, end } => {
                let lo = match start {
                    Some(e) => match self.take_bound(e) {
                        Some(v) => v,
                        None => return false,
                    },
                    None => 1,
                };
                if lo < 1 {
                    self.type_error("a positive start row", lo.to_string(), arg.span);
                    return false;
                }
                match end {
                    Some(e) => {
                        let hi = match self.take_bound(e) {
                            Some(v) => v,
                            None => return false,
                        };
                        if hi < lo {
                            self.type_error(
                                "an ascending row range",
                                format!("{}..{}", lo, hi),
                                arg.span,
                            );
                            return false;
                        }
                        Some((Some(hi - lo + 1), lo - 1))
                    }
                    None => Some((None, lo - 1)),
                }
            }
            _ => None,
        };

        let Some((limit, offset)) = window else {
            self.type_error(
                "an integer or integer range",
                "an expression".to_string(),
                arg.span,
            );
            return false;
        };

        out.push(ResolvedTransform {
            kind: TransformCall::Take { limit, offset },
            span,
        });
        true
    }

    fn take_bound(&mut self, expr: &Expr) -> Option<i64> {
        match &expr.kind {
            ExprKind::Literal(Literal::Integer(n)) => Some(*n),
            _ => {
                self.type_error("an integer bound", "an expression".to_string(), expr.span);
                None
            }
        }
    }

    fn resolve_join(
        &mut self,
        args: &[Expr],
        named_args: &[(String, Expr)],
        span: Span,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
    ) -> bool {
        let Some((source, alias, source_span)) = self.resolve_relation_ref(&args[0]) else {
            return false;
        };

        let side = match named_args.iter().find(|(n, _)| n == "side") {
            Some((_, value)) => match value.kind.as_plain_ident() {
                Some("inner") => JoinSide::Inner,
                Some("left") => JoinSide::Left,
                Some("right") => JoinSide::Right,
                Some("full") => JoinSide::Full,
                _ => {
                    self.type_error(
                        "one of inner, left, right, full",
                        "an expression".to_string(),
                        value.span,
                    );
                    return false;
                }
            },
            None => JoinSide::Inner,
        };

        if !self.seed_source_scope(scope, &source, &alias) {
            self.name_error(
                format!("relation '{}' is already in scope", alias),
                source_span,
            );
            return false;
        }

        let Some(on) = self.resolve_expr(&args[1], scope, ExprCtx::Plain) else {
            return false;
        };
        if on.contains_aggregation() {
            self.type_error(
                "a row-level join condition",
                "an aggregate expression".to_string(),
                args[1].span,
            );
            return false;
        }

        out.push(ResolvedTransform {
            kind: TransformCall::Join {
                side,
                source,
                alias,
                on,
                source_span,
            },
            span,
        });
        true
    }

    /// `window (derive {...}) partition:{...} sort_by:{...} rows:a..b`
    fn resolve_window(
        &mut self,
        arg: &Expr,
        named_args: &[(String, Expr)],
        span: Span,
        scope: &mut Scope,
        out: &mut Vec<ResolvedTransform>,
        output: &mut PipelineOutput,
    ) -> bool {
        let mut partition = Vec::new();
        let mut sort = Vec::new();
        let mut frame: Option<PlFrame> = None;

        for (param, value) in named_args {
            match param.as_str() {
                "partition" => {
                    for field in tuple_fields(value) {
                        let Some(expr) = self.resolve_expr(&field.expr, scope, ExprCtx::Plain)
                        else {
                            return false;
                        };
                        partition.push(expr);
                    }
                }
                "sort_by" => {
                    let Some(keys) = self.resolve_sort_keys(value, scope) else {
                        return false;
                    };
                    sort = keys;
                }
                "rows" | "range" => {
                    if frame.is_some() {
                        self.type_error(
                            "at most one frame parameter",
                            "both rows: and range:".to_string(),
                            value.span,
                        );
                        return false;
                    }
                    let Some(bounds) = self.frame_bounds(value) else {
                        return false;
                    };
                    frame = Some(PlFrame {
                        kind: if param == "rows" {
                            FrameKind::Rows
                        } else {
                            FrameKind::Range
                        },
                        start: bounds.0,
                        end: bounds.1,
                    });
                }
                _ => unreachable!("named parameters validated against the transform signature"),
            }
        }

        let sub_steps: Vec<&Expr> = match &arg.kind {
            ExprKind::Pipeline(steps) => steps.iter().collect(),
            _ => vec![arg],
        };

        let mut computed = Vec::new();
        for sub in sub_steps {
            let ExprKind::Call {
                name, args: sub_args, ..
            } = &sub.kind
            else {
                self.type_error(
                    "a derive step inside window",
                    "an expression".to_string(),
                    sub.span,
                );
                return false;
            };
            if name.kind.as_plain_ident() != Some("derive") || sub_args.len() != 1 {
                self.type_error(
                    "a derive step inside window",
                    format!("'{}'", name.kind.as_plain_ident().unwrap_or("?")),
                    sub.span,
                );
                return false;
            }
            let Some(fields) = self.resolve_window_fields(&sub_args[0], scope) else {
                return false;
            };
            computed.extend(fields);
        }

        if computed.is_empty() {
            self.type_error(
                "a derive step inside window",
                "an empty window body".to_string(),
                arg.span,
            );
            return false;
        }

        for c in &computed {
            if let Some(n) = self.decls[c.decl.0].name.clone() {
                scope.bind_column(&n, c.decl);
            }
            output
                .columns
                .push((self.decls[c.decl.0].name.clone(), c.decl));
        }

        out.push(ResolvedTransform {
            kind: TransformCall::Window {
                partition,
                sort,
                frame,
                computed,
            },
            span,
        });
        true
    }

    /// Resolve derive fields in window context: each must compute a
    /// windowed or aggregated value
    fn resolve_window_fields(&mut self, arg: &Expr, scope: &mut Scope) -> Option<Vec<NamedExpr>> {
        let fields = tuple_fields(arg);
        let mut resolved = Vec::new();
        let mut ok = true;

        for field in &fields {
            let Some(expr) = self.resolve_expr(&field.expr, scope, ExprCtx::Window) else {
                ok = false;
                continue;
            };
            if !expr.contains_aggregation() {
                self.error_with_hint(
                    DiagnosticKind::TypeMismatchError {
                        expected: "a windowed or aggregate expression".to_string(),
                        found: "a row-level expression".to_string(),
                    },
                    field.expr.span,
                    "row-level computations belong in a plain derive".to_string(),
                );
                ok = false;
                continue;
            }
            let name = field_name(field);
            let decl =
                self.push_decl(name, BindingKind::Column { table: None }, field.expr.span);
            resolved.push(NamedExpr {
                decl,
                expr,
                span: field.expr.span,
            });
        }

        ok.then_some(resolved)
    }

    /// Frame bounds from a range literal; negative offsets look back
    fn frame_bounds(&mut self, expr: &Expr) -> Option<(Option<i64>, Option<i64>)> {
        let ExprKind::Range { start, end } = &expr.kind else {
            self.type_error("an offset range", "an expression".to_string(), expr.span);
            return None;
        };
        let eval = |this: &mut Self, e: &Expr| -> Option<i64> {
            match &e.kind {
                ExprKind::Literal(Literal::Integer(n)) => Some(*n),
                ExprKind::Unary {
                    op: UnOp::Neg,
                    expr: inner,
                } => match &inner.kind {
                    ExprKind::Literal(Literal::Integer(n)) => Some(-n),
                    _ => {
                        this.type_error(
                            "an integer offset",
                            "an expression".to_string(),
                            e.span,
                        );
                        None
                    }
                },
                _ => {
                    this.type_error("an integer offset", "an expression".to_string(), e.span);
                    None
                }
            }
        };
        let lo = match start {
            Some(e) => Some(eval(self, e)?),
            None => None,
        };
        let hi = match end {
            Some(e) => Some(eval(self, e)?),
            None => None,
        };
        Some((lo, hi))
    }

    // ------------------------------------------------------------------
    // Expressions

    fn resolve_expr(&mut self, expr: &Expr, scope: &mut Scope, ctx: ExprCtx) -> Option<PlExpr> {
        match &expr.kind {
            ExprKind::Ident(parts) => self.resolve_ident(parts, expr.span, scope, ctx),
            ExprKind::Literal(value) => Some(PlExpr::Literal {
                value: value.clone(),
                span: expr.span,
            }),
            ExprKind::Binary { left, op, right } => {
                let l = self.resolve_expr(left, scope, ctx);
                let r = self.resolve_expr(right, scope, ctx);
                Some(PlExpr::Binary {
                    left: Box::new(l?),
                    op: *op,
                    right: Box::new(r?),
                    span: expr.span,
                })
            }
            ExprKind::Unary { op, expr: inner } => Some(PlExpr::Unary {
                op: *op,
                expr: Box::new(self.resolve_expr(inner, scope, ctx)?),
                span: expr.span,
            }),
            ExprKind::Call {
                name, args, named_args,
            } => self.resolve_call(name, args, named_args, expr.span, scope, ctx),
            ExprKind::Array(items) => {
                let mut resolved = Vec::new();
                let mut ok = true;
                for item in items {
                    match self.resolve_expr(item, scope, ctx) {
                        Some(e) => resolved.push(e),
                        None => ok = false,
                    }
                }
                ok.then_some(PlExpr::Array {
                    items: resolved,
                    span: expr.span,
                })
            }
            ExprKind::Range { .. } => {
                self.type_error("a scalar expression", "a range".to_string(), expr.span);
                None
            }
            ExprKind::Tuple(_) => {
                self.type_error(
                    "a scalar expression",
                    "a tuple literal".to_string(),
                    expr.span,
                );
                None
            }
            ExprKind::Lambda { .. } => {
                self.error_with_hint(
                    DiagnosticKind::TypeMismatchError {
                        expected: "a scalar expression".to_string(),
                        found: "a function definition".to_string(),
                    },
                    expr.span,
                    "bind functions with let: let f = x -> ...".to_string(),
                );
                None
            }
            ExprKind::Pipeline(_) => {
                self.type_error("a scalar expression", "a pipeline".to_string(), expr.span);
                None
            }
            _ => {
                self.error(
                    DiagnosticKind::UnsupportedConstructError {
                        construct: "expression".to_string(),
                    },
                    expr.span,
                );
                None
            }
        }
    }

    fn resolve_ident(
        &mut self,
        parts: &[String],
        span: Span,
        scope: &mut Scope,
        ctx: ExprCtx,
    ) -> Option<PlExpr> {
        match parts {
            [single] if single == "this" => Some(PlExpr::AllRows { span }),
            [single] => {
                if let Some(frame) = self.param_frames.last()
                    && let Some(substituted) = frame.get(single)
                {
                    return Some(substituted.clone());
                }
                if let Some(value) = self.values.get(single) {
                    return Some(value.clone());
                }

                match scope.lookup(single) {
                    Lookup::Found(decl) => Some(PlExpr::Binding { decl, span }),
                    Lookup::NewColumn { table, alias } => {
                        // `count` in an aggregation position is the row
                        // count, not a column discovery
                        if single == "count" && ctx != ExprCtx::Plain {
                            return self.materialize_count(span);
                        }
                        let decl = self.push_decl(
                            Some(single.clone()),
                            BindingKind::Column { table: Some(table) },
                            span,
                        );
                        scope.record_discovered(&alias, single, decl);
                        Some(PlExpr::Binding { decl, span })
                    }
                    Lookup::Ambiguous { candidates } => {
                        let qualified: Vec<String> = candidates
                            .iter()
                            .map(|c| format!("{}.{}", c, single))
                            .collect();
                        self.error_with_hint(
                            DiagnosticKind::NameResolutionError {
                                message: format!("ambiguous column '{}'", single),
                            },
                            span,
                            format!("qualify it: {}", qualified.join(" or ")),
                        );
                        None
                    }
                    Lookup::Unknown => {
                        if single == "count" && ctx != ExprCtx::Plain {
                            return self.materialize_count(span);
                        }
                        if self.registry.is_function(single)
                            || self.functions.contains_key(single)
                        {
                            self.name_error(
                                format!("function '{}' requires arguments", single),
                                span,
                            );
                            return None;
                        }
                        let visible = scope.visible_names();
                        let diagnostic = Diagnostic::error(
                            DiagnosticKind::NameResolutionError {
                                message: format!("unknown column '{}'", single),
                            },
                            span,
                        );
                        self.diagnostics.push(if visible.is_empty() {
                            diagnostic
                        } else {
                            diagnostic
                                .with_hint(format!("visible columns: {}", visible.join(", ")))
                        });
                        None
                    }
                    Lookup::UnknownQualifier { .. } => unreachable!("unqualified lookup"),
                }
            }
            [qualifier, name] => match scope.lookup_qualified(qualifier, name) {
                Lookup::Found(decl) => Some(PlExpr::Binding { decl, span }),
                Lookup::NewColumn { table, alias } => {
                    let decl = self.push_decl(
                        Some(name.clone()),
                        BindingKind::Column { table: Some(table) },
                        span,
                    );
                    scope.record_discovered_qualified(&alias, name, decl);
                    Some(PlExpr::Binding { decl, span })
                }
                Lookup::UnknownQualifier { qualifier } => {
                    let aliases = scope.table_aliases();
                    let diagnostic = Diagnostic::error(
                        DiagnosticKind::NameResolutionError {
                            message: format!("unknown relation '{}'", qualifier),
                        },
                        span,
                    );
                    self.diagnostics.push(if aliases.is_empty() {
                        diagnostic
                    } else {
                        diagnostic
                            .with_hint(format!("relations in scope: {}", aliases.join(", ")))
                    });
                    None
                }
                Lookup::Unknown => {
                    self.name_error(
                        format!("relation '{}' has no column '{}' in scope", qualifier, name),
                        span,
                    );
                    None
                }
                Lookup::Ambiguous { .. } => unreachable!("qualified lookup"),
            },
            _ => {
                self.name_error("nested qualification is not supported".to_string(), span);
                None
            }
        }
    }

    fn materialize_count(&mut self, span: Span) -> Option<PlExpr> {
        Some(PlExpr::Call {
            function: "count".to_string(),
            class: crate::pl::FunctionClass::Aggregate,
            args: vec![PlExpr::AllRows { span }],
            span,
        })
    }

    fn resolve_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        named_args: &[(String, Expr)],
        span: Span,
        scope: &mut Scope,
        ctx: ExprCtx,
    ) -> Option<PlExpr> {
        let Some(name) = callee.kind.as_plain_ident() else {
            self.name_error("expected a function name".to_string(), callee.span);
            return None;
        };

        if self.functions.contains_key(name) {
            return self.inline_function(name, args, named_args, span, scope, ctx);
        }

        let Some(spec) = self.registry.function(name).cloned() else {
            if self.registry.is_transform(name) {
                self.type_error("a function", format!("transform '{}'", name), span);
            } else {
                self.name_error(format!("unknown function '{}'", name), span);
            }
            return None;
        };

        if !named_args.is_empty() {
            self.name_error(
                format!("function '{}' takes no named arguments", name),
                span,
            );
            return None;
        }
        if args.len() < spec.min_args || args.len() > spec.max_args {
            self.type_error(
                &format!("'{}' with {}", name, spec.arity_description()),
                format!("{} argument(s)", args.len()),
                span,
            );
            return None;
        }
        if !self.check_function_ctx(name, spec.class, ctx, span) {
            return None;
        }

        // Aggregate and window functions consume row-level arguments;
        // scalar functions stay in the enclosing context so e.g.
        // `round (sum x) 2` works inside aggregate
        let arg_ctx = if spec.class == FunctionClass::Scalar {
            ctx
        } else {
            ExprCtx::Plain
        };

        let mut resolved = Vec::new();
        let mut ok = true;
        for arg in args {
            match self.resolve_expr(arg, scope, arg_ctx) {
                Some(e) => resolved.push(e),
                None => ok = false,
            }
        }

        ok.then_some(PlExpr::Call {
            function: name.to_string(),
            class: pl_class(spec.class),
            args: resolved,
            span,
        })
    }

    fn check_function_ctx(
        &mut self,
        name: &str,
        class: FunctionClass,
        ctx: ExprCtx,
        span: Span,
    ) -> bool {
        match (class, ctx) {
            (FunctionClass::Scalar, _) => true,
            (FunctionClass::Aggregate, ExprCtx::Aggregate | ExprCtx::Window) => true,
            (FunctionClass::Aggregate, ExprCtx::Plain) => {
                self.error_with_hint(
                    DiagnosticKind::TypeMismatchError {
                        expected: "a row-level expression".to_string(),
                        found: format!("aggregate function '{}'", name),
                    },
                    span,
                    "compute grouped values with aggregate {...}".to_string(),
                );
                false
            }
            (FunctionClass::Window, ExprCtx::Window) => true,
            (FunctionClass::Window, ExprCtx::Aggregate) => {
                self.type_error(
                    "an aggregate function",
                    format!("window function '{}'", name),
                    span,
                );
                false
            }
            (FunctionClass::Window, ExprCtx::Plain) => {
                self.error_with_hint(
                    DiagnosticKind::TypeMismatchError {
                        expected: "a row-level expression".to_string(),
                        found: format!("window function '{}'", name),
                    },
                    span,
                    "compute windowed values with window (derive {...})".to_string(),
                );
                false
            }
        }
    }

    /// Inline a user-defined function call by parameter substitution
    fn inline_function(
        &mut self,
        name: &str,
        args: &[Expr],
        named_args: &[(String, Expr)],
        span: Span,
        scope: &mut Scope,
        ctx: ExprCtx,
    ) -> Option<PlExpr> {
        let def = self
            .functions
            .get(name)
            .cloned()
            .unwrap_or_else(|| unreachable!("caller checked the function table"));

        let positional: Vec<&FuncParam> =
            def.params.iter().filter(|p| p.default.is_none()).collect();
        if args.len() != positional.len() {
            self.type_error(
                &format!("'{}' with {} argument(s)", name, positional.len()),
                format!("{} argument(s)", args.len()),
                span,
            );
            return None;
        }
        for (param, _) in named_args {
            let known = def
                .params
                .iter()
                .any(|p| p.default.is_some() && &p.name == param);
            if !known {
                self.name_error(
                    format!("function '{}' has no named parameter '{}'", name, param),
                    span,
                );
                return None;
            }
        }

        // Arguments and defaults resolve in the caller's scope, before the
        // substitution frame is pushed
        let mut frame = HashMap::new();
        for (param, arg) in positional.iter().zip(args) {
            frame.insert(param.name.clone(), self.resolve_expr(arg, scope, ctx)?);
        }
        for param in def.params.iter().filter(|p| p.default.is_some()) {
            let value = match named_args.iter().find(|(n, _)| n == &param.name) {
                Some((_, supplied)) => self.resolve_expr(supplied, scope, ctx)?,
                None => {
                    let default = param
                        .default
                        .as_ref()
                        .unwrap_or_else(|| unreachable!("filtered on default presence"));
                    self.resolve_expr(default, scope, ctx)?
                }
            };
            frame.insert(param.name.clone(), value);
        }

        self.inline_depth += 1;
        if self.inline_depth > MAX_INLINE_DEPTH {
            self.error(
                DiagnosticKind::DepthLimitExceeded {
                    depth: self.inline_depth,
                    limit: MAX_INLINE_DEPTH,
                },
                span,
            );
            self.inline_depth -= 1;
            return None;
        }

        self.param_frames.push(frame);
        let result = self.resolve_expr(&def.body, scope, ctx);
        self.param_frames.pop();
        self.inline_depth -= 1;
        result
    }
}

// ----------------------------------------------------------------------
// Helpers

/// A `let` value is a relation when it is a pipeline or a bare `from` call
fn is_relation_expr(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Pipeline(_) => true,
        ExprKind::Call { name, .. } => name.kind.as_plain_ident() == Some("from"),
        _ => false,
    }
}

/// View any expression as tuple fields; a non-tuple argument is a single
/// unnamed field
fn tuple_fields(expr: &Expr) -> Vec<pipesql_parser::ast::TupleField> {
    match &expr.kind {
        ExprKind::Tuple(fields) => fields.clone(),
        _ => vec![pipesql_parser::ast::TupleField {
            name: None,
            expr: expr.clone(),
        }],
    }
}

/// The output name of a tuple field: explicit, or the trailing ident part
fn field_name(field: &pipesql_parser::ast::TupleField) -> Option<String> {
    field.name.clone().or_else(|| match &field.expr.kind {
        ExprKind::Ident(parts) => parts.last().cloned(),
        _ => None,
    })
}

fn pl_class(class: FunctionClass) -> crate::pl::FunctionClass {
    match class {
        FunctionClass::Scalar => crate::pl::FunctionClass::Scalar,
        FunctionClass::Aggregate => crate::pl::FunctionClass::Aggregate,
        FunctionClass::Window => crate::pl::FunctionClass::Window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesql_parser::parse;

    fn resolve_source(source: &str) -> (ResolvedModule, Diagnostics) {
        let (module, parse_diags) = parse(source);
        assert!(
            parse_diags.is_empty(),
            "unexpected parse diagnostics: {}",
            parse_diags
        );
        resolve(&module, &Registry::new())
    }

    fn errors(diags: &Diagnostics) -> Vec<&Diagnostic> {
        diags.iter().collect()
    }

    #[test]
    fn test_simple_pipeline_resolves() {
        let (module, diags) = resolve_source(
            "from employees\nfilter department == \"eng\"\nselect {name, salary}",
        );
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);
        assert_eq!(module.pipelines.len(), 1);

        let pipeline = &module.pipelines[0];
        assert_eq!(
            pipeline.source,
            RelationSource::Table {
                name: "employees".to_string()
            }
        );
        assert_eq!(pipeline.steps.len(), 2);

        // Selected columns keep their source-table provenance
        let TransformCall::Select { columns } = &pipeline.steps[1].kind else {
            panic!("expected select step");
        };
        let decl = module.decl(columns[0].decl).unwrap();
        assert_eq!(decl.name.as_deref(), Some("name"));
        assert_eq!(
            decl.kind,
            BindingKind::Column {
                table: Some("employees".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_column_is_single_name_error() {
        let (_, diags) =
            resolve_source("from employees\nselect {name}\nderive {x = missing_col}");
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert!(matches!(
            errs[0].kind,
            DiagnosticKind::NameResolutionError { .. }
        ));
        assert!(errs[0].message().contains("missing_col"));
    }

    #[test]
    fn test_ambiguous_column_after_join() {
        let (_, diags) = resolve_source(
            "from employees\njoin orders (employees.id == orders.employee_id)\nderive {x = orders.amount + id}",
        );
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1, "diagnostics: {}", diags);
        assert!(errs[0].message().contains("ambiguous column 'id'"));
        assert!(errs[0].hint.as_deref().unwrap_or("").contains("employees.id"));
    }

    #[test]
    fn test_column_discovered_before_join_stays_unambiguous() {
        let (_, diags) = resolve_source(
            "from employees\nderive {double_id = id * 2}\njoin orders (employees.id == orders.employee_id)\nfilter id > 0",
        );
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);
    }

    #[test]
    fn test_aggregate_in_filter_rejected() {
        let (_, diags) = resolve_source("from employees\nfilter (sum salary) > 100");
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert!(matches!(
            errs[0].kind,
            DiagnosticKind::TypeMismatchError { .. }
        ));
    }

    #[test]
    fn test_aggregate_requires_aggregation() {
        let (_, diags) = resolve_source("from employees\naggregate {x = salary}");
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert!(matches!(
            &errs[0].kind,
            DiagnosticKind::TypeMismatchError { expected, .. }
                if expected.contains("aggregate expression")
        ));
    }

    #[test]
    fn test_group_aggregate_with_implicit_count() {
        let (module, diags) = resolve_source(
            "from employees\ngroup {department} (aggregate {n = count this, total = sum salary})",
        );
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);

        let TransformCall::Aggregate { group_by, computed } =
            &module.pipelines[0].steps[0].kind
        else {
            panic!("expected aggregate step");
        };
        assert_eq!(group_by.len(), 1);
        assert_eq!(computed.len(), 2);
        assert!(matches!(
            &computed[0].expr,
            PlExpr::Call { function, args, .. }
                if function == "count" && matches!(args[0], PlExpr::AllRows { .. })
        ));
    }

    #[test]
    fn test_window_function_outside_window_rejected() {
        let (_, diags) = resolve_source("from employees\nderive {r = row_number this}");
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message().contains("row_number"));
    }

    #[test]
    fn test_window_transform_resolves() {
        let (module, diags) = resolve_source(
            "from employees\nwindow partition:{department} sort_by:{-salary} (derive {r = rank this})",
        );
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);

        let TransformCall::Window {
            partition,
            sort,
            computed,
            ..
        } = &module.pipelines[0].steps[0].kind
        else {
            panic!("expected window step");
        };
        assert_eq!(partition.len(), 1);
        assert_eq!(sort.len(), 1);
        assert!(sort[0].desc);
        assert_eq!(computed.len(), 1);
    }

    #[test]
    fn test_take_range() {
        let (module, diags) = resolve_source("from employees\ntake 5..20");
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);
        assert_eq!(
            module.pipelines[0].steps[0].kind,
            TransformCall::Take {
                limit: Some(16),
                offset: 4
            }
        );
    }

    #[test]
    fn test_take_rejects_zero() {
        let (_, diags) = resolve_source("from employees\ntake 0");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_let_bound_relation() {
        let (module, diags) = resolve_source(
            "let adults = (from people | filter age >= 18)\n\nfrom adults\nselect {name}",
        );
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);
        assert_eq!(module.pipelines.len(), 2);
        assert_eq!(module.pipelines[0].name.as_deref(), Some("adults"));
        assert_eq!(
            module.pipelines[1].source,
            RelationSource::Pipeline { index: 0 }
        );
    }

    #[test]
    fn test_narrowed_let_relation_hides_other_columns() {
        let (_, diags) = resolve_source(
            "let names = (from people | select {name})\n\nfrom names\nfilter age > 18",
        );
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1, "diagnostics: {}", diags);
        assert!(errs[0].message().contains("unknown column 'age'"));
    }

    #[test]
    fn test_user_function_inlining() {
        let (module, diags) = resolve_source(
            "let tax = amount rate:25 -> amount * rate / 100\n\nfrom employees\nderive {due = tax salary}",
        );
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);

        let TransformCall::Derive { columns } = &module.pipelines[0].steps[0].kind else {
            panic!("expected derive step");
        };
        // Inlined body: (salary * 25) / 100 — no function calls remain
        assert!(!matches!(columns[0].expr, PlExpr::Call { .. }));
        assert!(matches!(columns[0].expr, PlExpr::Binary { .. }));
    }

    #[test]
    fn test_recursive_function_hits_depth_limit() {
        let (_, diags) =
            resolve_source("let f = x -> f x\n\nfrom employees\nderive {y = f 1}");
        assert!(
            diags
                .iter()
                .any(|d| matches!(d.kind, DiagnosticKind::DepthLimitExceeded { .. })),
            "diagnostics: {}",
            diags
        );
    }

    #[test]
    fn test_independent_pipelines_fail_independently() {
        let (module, diags) =
            resolve_source("from employees\nfilter bogus_fn x\n\nfrom orders\ntake 5");
        assert!(diags.has_errors());
        // The second pipeline still resolved
        assert_eq!(module.pipelines.len(), 1);
        assert_eq!(
            module.pipelines[0].source,
            RelationSource::Table {
                name: "orders".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_target_dialect() {
        let (_, diags) = resolve_source("pipesql target:oracle\n\nfrom employees\ntake 5");
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message().contains("oracle"));
        assert!(errs[0].hint.as_deref().unwrap_or("").contains("postgres"));
    }

    #[test]
    fn test_let_value_binding_inlines() {
        let (module, diags) =
            resolve_source("let cutoff = 100\n\nfrom employees\nfilter salary > cutoff");
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);
        let TransformCall::Filter { condition } = &module.pipelines[0].steps[0].kind else {
            panic!("expected filter step");
        };
        let PlExpr::Binary { right, .. } = condition else {
            panic!("expected comparison");
        };
        assert!(matches!(
            **right,
            PlExpr::Literal {
                value: Literal::Integer(100),
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_let_name() {
        let (_, diags) = resolve_source("let x = 1\nlet x = 2\n\nfrom t\ntake 1");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message().contains("already defined")));
    }

    #[test]
    fn test_sort_after_take_preserves_scope() {
        let (module, diags) =
            resolve_source("from employees\nsort {-salary}\ntake 10\nsort {name}");
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);
        assert_eq!(module.pipelines[0].steps.len(), 3);
    }
}
