// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Resolved pipeline tree (PL)
//!
//! The resolver's output. Shaped like the AST's pipelines, but every
//! identifier has been replaced by a binding into the declaration arena and
//! every transform call has been matched against its signature, so the
//! lowering stage never consults names again.
//!
//! Bindings are referenced by [`DeclId`] — an index into
//! [`ResolvedModule::decls`]. A column binding keeps its declaration
//! identity across transforms that merely pass it through, which is what
//! lets lowering preserve column provenance.

use pipesql_diagnostics::Span;
use pipesql_parser::ast::Literal;
use serde::{Deserialize, Serialize};

/// Index into the module's declaration arena
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct DeclId(pub usize);

/// A fully resolved module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedModule {
    /// Declaration arena indexed by [`DeclId`]
    pub decls: Vec<Decl>,

    /// `let`-bound and main pipelines, in source order
    pub pipelines: Vec<ResolvedPipeline>,

    /// Declared source-language version from the query header, if any
    pub version: Option<String>,

    /// Declared target dialect from the query header, if any
    pub target: Option<String>,
}

impl ResolvedModule {
    pub fn decl(&self, id: DeclId) -> Option<&Decl> {
        self.decls.get(id.0)
    }
}

/// One declaration: a name bound to a column, relation, function, or value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    /// Declared name; `None` for anonymous computed columns
    pub name: Option<String>,
    pub kind: BindingKind,
    pub span: Span,
}

/// What a declaration names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// A relation column; `table` is set for columns read directly from a
    /// source table, `None` for computed columns
    Column { table: Option<String> },

    /// A `let`-bound relation
    Relation,

    /// A `let`-bound function
    Function,

    /// A `let`-bound scalar value
    Value,
}

/// One resolved pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPipeline {
    /// The `let`-bound name; `None` for a main pipeline
    pub name: Option<String>,

    /// The `from` source
    pub source: RelationSource,
    pub source_span: Span,

    /// Transform steps after `from`, in application order
    pub steps: Vec<ResolvedTransform>,
}

/// Source feeding a `from`, `join`, or `append`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationSource {
    /// A physical table referenced by name
    Table { name: String },

    /// An earlier `let`-bound pipeline, by index into
    /// [`ResolvedModule::pipelines`]
    Pipeline { index: usize },
}

/// One resolved transform step with its source span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTransform {
    pub kind: TransformCall,
    pub span: Span,
}

/// A resolved transform application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransformCall {
    /// Replace the visible column set
    Select { columns: Vec<NamedExpr> },

    /// Extend the visible column set
    Derive { columns: Vec<NamedExpr> },

    /// Keep rows matching a boolean condition
    Filter { condition: PlExpr },

    /// Group by key bindings and compute aggregates; the keys are empty for
    /// a whole-relation `aggregate`
    Aggregate {
        group_by: Vec<PlExpr>,
        computed: Vec<NamedExpr>,
    },

    /// Establish output ordering
    Sort { keys: Vec<PlSortKey> },

    /// Keep a row window; `offset` rows skipped, then up to `limit` rows
    Take { limit: Option<i64>, offset: i64 },

    /// Merge another relation's columns into scope
    Join {
        side: JoinSide,
        source: RelationSource,
        /// The name the joined relation is qualified by in expressions
        alias: String,
        on: PlExpr,
        source_span: Span,
    },

    /// Compute windowed columns over a partition of the input
    Window {
        partition: Vec<PlExpr>,
        sort: Vec<PlSortKey>,
        frame: Option<PlFrame>,
        computed: Vec<NamedExpr>,
    },

    /// Union-all with another relation of the same shape
    Append {
        source: RelationSource,
        source_span: Span,
    },
}

/// Which side of a join preserves unmatched rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinSide {
    Inner,
    Left,
    Right,
    Full,
}

/// A named (or passthrough) expression in `select` / `derive` / `aggregate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedExpr {
    /// The declaration this expression defines or passes through
    pub decl: DeclId,
    pub expr: PlExpr,
    pub span: Span,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlSortKey {
    pub expr: PlExpr,
    pub desc: bool,
}

/// Window frame specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlFrame {
    pub kind: FrameKind,
    /// Frame start offset relative to the current row; `None` means
    /// unbounded preceding
    pub start: Option<i64>,
    /// Frame end offset; `None` means unbounded following
    pub end: Option<i64>,
}

/// Window frame units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Rows,
    Range,
}

/// A resolved expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PlExpr {
    /// Reference to a declaration
    Binding { decl: DeclId, span: Span },

    /// Literal value
    Literal { value: Literal, span: Span },

    /// Binary operation
    Binary {
        left: Box<PlExpr>,
        op: pipesql_parser::ast::BinOp,
        right: Box<PlExpr>,
        span: Span,
    },

    /// Unary operation
    Unary {
        op: pipesql_parser::ast::UnOp,
        expr: Box<PlExpr>,
        span: Span,
    },

    /// Call of a builtin function; user functions are inlined at resolution
    /// and never appear here
    Call {
        function: String,
        class: FunctionClass,
        args: Vec<PlExpr>,
        span: Span,
    },

    /// The whole-group argument (`this`), materialized for bare aggregate
    /// references like `count`
    AllRows { span: Span },

    /// Array literal; resolved but rejected by lowering outside the
    /// positions that consume it
    Array { items: Vec<PlExpr>, span: Span },
}

/// Where a builtin function may appear, mirrored into PL so lowering does
/// not need the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionClass {
    Scalar,
    Aggregate,
    Window,
}

impl PlExpr {
    pub fn span(&self) -> Span {
        match self {
            PlExpr::Binding { span, .. }
            | PlExpr::Literal { span, .. }
            | PlExpr::Binary { span, .. }
            | PlExpr::Unary { span, .. }
            | PlExpr::Call { span, .. }
            | PlExpr::AllRows { span }
            | PlExpr::Array { span, .. } => *span,
        }
    }

    /// Walk the expression tree, visiting every node
    pub fn walk(&self, visit: &mut impl FnMut(&PlExpr)) {
        visit(self);
        match self {
            PlExpr::Binding { .. } | PlExpr::Literal { .. } | PlExpr::AllRows { .. } => {}
            PlExpr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            PlExpr::Unary { expr, .. } => expr.walk(visit),
            PlExpr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            PlExpr::Array { items, .. } => {
                for item in items {
                    item.walk(visit);
                }
            }
        }
    }

    /// True if the expression contains an aggregate or window function call
    pub fn contains_aggregation(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if let PlExpr::Call { class, .. } = e
                && matches!(class, FunctionClass::Aggregate | FunctionClass::Window)
            {
                found = true;
            }
        });
        found
    }
}
