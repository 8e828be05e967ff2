// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Relational-Query IR
//!
//! ## Design
//!
//! A [`RelationalModule`] holds one [`Relation`] per resolved pipeline plus
//! a module-wide column arena. Each relation is an ordered operator
//! sequence; data flows top to bottom through the sequence, starting at a
//! [`RqOp::From`].
//!
//! ## Column identities
//!
//! Columns are referenced by [`Cid`] — an index into the module's column
//! arena — never by name. Invariants:
//!
//! - every identity referenced by an operator was produced by an earlier
//!   operator in the same relation or is an input column of the relation
//!   (no forward references)
//! - an identity is never reused with different provenance
//!
//! The arena entry keeps the originally declared name as a rendering hint;
//! the SQL generator maps identities back to names (with deterministic
//! disambiguation) as its final step.

use pipesql_diagnostics::Span;
use serde::{Deserialize, Serialize};

/// Stable column identity assigned during lowering
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Cid(pub usize);

/// Identity of a relation within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationId(pub usize);

/// A complete lowered module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationalModule {
    /// All relations: `let`-bound relations first, then main pipelines,
    /// in source order
    pub relations: Vec<Relation>,

    /// Column arena indexed by [`Cid`]
    pub columns: Vec<ColumnDecl>,

    /// Target dialect declared in the query header, if any
    pub target: Option<String>,
}

impl RelationalModule {
    pub fn column(&self, cid: Cid) -> Option<&ColumnDecl> {
        self.columns.get(cid.0)
    }

    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id.0)
    }

    /// Relations that produce output SQL statements, in source order
    pub fn main_relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(|r| r.name.is_none())
    }
}

/// One relation: an ordered operator sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,

    /// The `let`-bound name; `None` for a main pipeline
    pub name: Option<String>,

    /// Operator sequence, starting with [`RqOp::From`]
    pub ops: Vec<RqOp>,

    /// The final visible column set, in output order
    pub columns: Vec<Cid>,
}

/// Declaration of one column identity in the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDecl {
    /// Originally declared source name, used only for final rendering;
    /// `None` for anonymous computed columns
    pub name: Option<String>,

    /// Where the identity came from
    pub origin: ColumnOrigin,
}

/// Provenance of a column identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOrigin {
    /// A named column of a source table
    Table { table: String, column: String },

    /// All remaining columns of a source table (`table.*`)
    Wildcard { table: String },

    /// Produced by `derive`, `aggregate`, or `window`
    Computed,

    /// Re-tagged copy of another identity (join column-set merge)
    Retagged { of: Cid },
}

/// A table or relation feeding a `from`, `join`, or `append`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    /// A physical table referenced by name
    Table { name: String },

    /// A `let`-bound relation in the same module
    Relation { id: RelationId },
}

impl TableSource {
    /// The name this source is referred to by in rendered SQL, given the
    /// module for relation lookups
    pub fn display_name<'a>(&'a self, module: &'a RelationalModule) -> &'a str {
        match self {
            TableSource::Table { name } => name,
            TableSource::Relation { id } => module
                .relation(*id)
                .and_then(|r| r.name.as_deref())
                .unwrap_or("?"),
        }
    }
}

/// A relational operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RqOp {
    /// Source of the relation; always first in the sequence
    From {
        source: TableSource,
        /// Identities of the input columns referenced by later operators
        columns: Vec<Cid>,
        /// Identity standing for all unreferenced input columns, when the
        /// pipeline never narrows the column set
        wildcard: Option<Cid>,
    },

    /// Replace the visible column set
    Select { columns: Vec<(Cid, RqExpr)> },

    /// Extend the visible column set with computed columns (`derive`)
    Compute { columns: Vec<(Cid, RqExpr)> },

    /// Keep rows matching the condition
    Filter { condition: RqExpr },

    /// Group and aggregate; replaces the visible column set with
    /// `group_by ++ computed`
    Aggregate {
        group_by: Vec<Cid>,
        computed: Vec<(Cid, RqExpr)>,
    },

    /// Merge another source's column set into this relation
    Join {
        side: JoinSide,
        source: TableSource,
        /// Identities of the joined source's referenced columns
        columns: Vec<Cid>,
        /// Wildcard identity for the joined source
        wildcard: Option<Cid>,
        on: RqExpr,
    },

    /// Establish output ordering
    Sort { keys: Vec<SortKey> },

    /// Keep a row window
    Take { limit: Option<i64>, offset: i64 },

    /// Union-all with another source of the same shape
    Append { source: TableSource },

    /// Compute window-function columns; extends the visible column set
    Window {
        partition: Vec<RqExpr>,
        sort: Vec<SortKey>,
        frame: Option<WindowFrame>,
        computed: Vec<(Cid, RqExpr)>,
        /// Source position of the window step, carried so dialect
        /// capability diagnostics point at the offending construct
        span: Span,
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

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: RqExpr,
    pub desc: bool,
}

/// Window frame specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFrame {
    pub kind: WindowFrameKind,
    /// Offset of the frame start relative to the current row; `None` means
    /// unbounded preceding
    pub start: Option<i64>,
    /// Offset of the frame end; `None` means unbounded following
    pub end: Option<i64>,
}

/// Window frame units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFrameKind {
    Rows,
    Range,
}

/// An expression over column identities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RqExpr {
    /// Reference to a column identity
    Column(Cid),

    /// Literal value
    Literal(RqLiteral),

    /// Binary operation
    Binary {
        left: Box<RqExpr>,
        op: RqBinOp,
        right: Box<RqExpr>,
    },

    /// Unary operation
    Unary { op: RqUnOp, expr: Box<RqExpr> },

    /// Function call; `function` is already the SQL-level name
    Call { function: String, args: Vec<RqExpr> },

    /// `COUNT(*)` — counting rows rather than a column
    CountAll,
}

/// Literal values at the IR level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RqLiteral {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(String),
}

/// Binary operators at the IR level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RqBinOp {
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

/// Unary operators at the IR level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RqUnOp {
    Neg,
    Not,
}

impl RqExpr {
    /// Collect every column identity referenced by this expression
    pub fn referenced_cids(&self, out: &mut Vec<Cid>) {
        match self {
            RqExpr::Column(cid) => out.push(*cid),
            RqExpr::Literal(_) | RqExpr::CountAll => {}
            RqExpr::Binary { left, right, .. } => {
                left.referenced_cids(out);
                right.referenced_cids(out);
            }
            RqExpr::Unary { expr, .. } => expr.referenced_cids(out),
            RqExpr::Call { args, .. } => {
                for arg in args {
                    arg.referenced_cids(out);
                }
            }
        }
    }
}
