// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! PL-to-RQ lowering
//!
//! One relation is produced per resolved pipeline, in order, so a
//! pipeline's index doubles as its [`RelationId`]. Within a relation every
//! column reference is assigned a [`Cid`] on first use; the `from` source
//! and each join source own a *slot* that collects the identities read
//! from it, backfilled into the corresponding operator at the end.
//!
//! When a pipeline consumes a `let`-bound relation, references to the
//! producer's output columns get fresh identities tagged
//! [`ColumnOrigin::Retagged`], keeping provenance across the relation
//! boundary without ever sharing an identity between two relations.

use pipesql_diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Span, StageResult};
use pipesql_function_registry::Registry;
use pipesql_ir::{
    Cid, ColumnDecl, ColumnOrigin, Relation, RelationId, RelationalModule, RqBinOp, RqExpr,
    RqLiteral, RqOp, RqUnOp, SortKey, TableSource, WindowFrame, WindowFrameKind,
};
use pipesql_parser::ast::{BinOp, Literal, UnOp};
use pipesql_semantic::{
    BindingKind, DeclId, FrameKind, JoinSide, NamedExpr, PlExpr, PlFrame, PlSortKey,
    RelationSource, ResolvedModule, ResolvedPipeline, TransformCall,
};
use std::collections::HashMap;

/// Lower a resolved module into the relational IR
pub fn lower(module: &ResolvedModule) -> StageResult<RelationalModule> {
    let registry = Registry::new();
    let mut columns = Vec::new();
    let mut relations = Vec::new();
    let mut outputs: Vec<HashMap<DeclId, Cid>> = Vec::new();
    let mut diagnostics = Diagnostics::new();

    for (index, pipeline) in module.pipelines.iter().enumerate() {
        let lowerer = RelationLowerer {
            module,
            registry: &registry,
            columns: &mut columns,
            outputs: &outputs,
            diagnostics: &mut diagnostics,
            decl_to_cid: HashMap::new(),
            slots: Vec::new(),
            ops: Vec::new(),
            visible: Vec::new(),
            narrowed: false,
        };
        match lowerer.run(pipeline, RelationId(index)) {
            Some((relation, out_map)) => {
                relations.push(relation);
                outputs.push(out_map);
            }
            None => {
                // Keep positions aligned with pipeline indexes; the module
                // is discarded anyway once diagnostics carry an error
                relations.push(Relation {
                    id: RelationId(index),
                    name: pipeline.name.clone(),
                    ops: Vec::new(),
                    columns: Vec::new(),
                });
                outputs.push(HashMap::new());
            }
        }
    }

    tracing::debug!(
        relations = relations.len(),
        columns = columns.len(),
        diagnostics = diagnostics.len(),
        "lowering finished"
    );

    diagnostics.into_result(RelationalModule {
        relations,
        columns,
        target: module.target.clone(),
    })
}

/// One `from` or `join` source and the column identities read from it
struct Slot {
    /// The name column declarations are matched against (the table name,
    /// or the alias of a `let`-bound relation)
    table_key: String,

    /// Producing pipeline index for `let`-bound relation sources
    producer: Option<usize>,

    /// Index of the owning `Join` op; `None` for the `from` source
    op_index: Option<usize>,

    cids: Vec<Cid>,
    wildcard: Option<Cid>,
}

struct RelationLowerer<'a> {
    module: &'a ResolvedModule,
    registry: &'a Registry,
    columns: &'a mut Vec<ColumnDecl>,
    /// Decl-to-identity maps of already-lowered pipelines
    outputs: &'a [HashMap<DeclId, Cid>],
    diagnostics: &'a mut Diagnostics,

    decl_to_cid: HashMap<DeclId, Cid>,
    slots: Vec<Slot>,
    ops: Vec<RqOp>,
    /// Computed columns while un-narrowed; the full visible set once
    /// `select` or `aggregate` fixed it
    visible: Vec<Cid>,
    narrowed: bool,
}

impl RelationLowerer<'_> {
    fn run(
        mut self,
        pipeline: &ResolvedPipeline,
        id: RelationId,
    ) -> Option<(Relation, HashMap<DeclId, Cid>)> {
        let source = self.table_source(&pipeline.source);
        self.slots.push(Slot {
            table_key: source_key(&pipeline.source, self.module),
            producer: pipeline_index(&pipeline.source),
            op_index: None,
            cids: Vec::new(),
            wildcard: None,
        });
        self.ops.push(RqOp::From {
            source,
            columns: Vec::new(),
            wildcard: None,
        });

        for step in &pipeline.steps {
            if !self.lower_step(&step.kind, step.span) {
                return None;
            }
        }

        // Un-narrowed relations keep every source column: one wildcard
        // identity per source, followed by the computed columns
        let mut final_columns = Vec::new();
        if !self.narrowed {
            for slot in &mut self.slots {
                let cid = Cid(self.columns.len());
                self.columns.push(ColumnDecl {
                    name: None,
                    origin: ColumnOrigin::Wildcard {
                        table: slot.table_key.clone(),
                    },
                });
                slot.wildcard = Some(cid);
                final_columns.push(cid);
            }
        }
        final_columns.extend(self.visible.iter().copied());

        // Backfill the per-source column lists discovered along the way
        for slot in &self.slots {
            match slot.op_index {
                None => {
                    if let RqOp::From {
                        columns, wildcard, ..
                    } = &mut self.ops[0]
                    {
                        *columns = slot.cids.clone();
                        *wildcard = slot.wildcard;
                    }
                }
                Some(i) => {
                    if let RqOp::Join {
                        columns, wildcard, ..
                    } = &mut self.ops[i]
                    {
                        *columns = slot.cids.clone();
                        *wildcard = slot.wildcard;
                    }
                }
            }
        }

        Some((
            Relation {
                id,
                name: pipeline.name.clone(),
                ops: self.ops,
                columns: final_columns,
            },
            self.decl_to_cid,
        ))
    }

    fn lower_step(&mut self, step: &TransformCall, span: Span) -> bool {
        match step {
            TransformCall::Select { columns } => {
                let Some(lowered) = self.lower_projection(columns) else {
                    return false;
                };
                self.visible = lowered.iter().map(|(cid, _)| *cid).collect();
                self.narrowed = true;
                self.ops.push(RqOp::Select { columns: lowered });
                true
            }
            TransformCall::Derive { columns } => {
                let Some(lowered) = self.lower_projection(columns) else {
                    return false;
                };
                self.visible.extend(lowered.iter().map(|(cid, _)| *cid));
                self.ops.push(RqOp::Compute { columns: lowered });
                true
            }
            TransformCall::Filter { condition } => {
                let Some(condition) = self.lower_expr(condition) else {
                    return false;
                };
                self.ops.push(RqOp::Filter { condition });
                true
            }
            TransformCall::Aggregate { group_by, computed } => {
                let mut keys = Vec::new();
                for key in group_by {
                    let Some(RqExpr::Column(cid)) = self.lower_expr(key) else {
                        self.unsupported("group key that is not a column", key.span());
                        return false;
                    };
                    keys.push(cid);
                }
                let Some(lowered) = self.lower_computed(computed) else {
                    return false;
                };
                self.visible = keys
                    .iter()
                    .copied()
                    .chain(lowered.iter().map(|(cid, _)| *cid))
                    .collect();
                self.narrowed = true;
                self.ops.push(RqOp::Aggregate {
                    group_by: keys,
                    computed: lowered,
                });
                true
            }
            TransformCall::Sort { keys } => {
                let Some(keys) = self.lower_sort_keys(keys) else {
                    return false;
                };
                self.ops.push(RqOp::Sort { keys });
                true
            }
            TransformCall::Take { limit, offset } => {
                self.ops.push(RqOp::Take {
                    limit: *limit,
                    offset: *offset,
                });
                true
            }
            TransformCall::Join {
                side,
                source,
                alias,
                on,
                ..
            } => {
                let table_source = self.table_source(source);
                self.slots.push(Slot {
                    table_key: alias.clone(),
                    producer: pipeline_index(source),
                    op_index: Some(self.ops.len()),
                    cids: Vec::new(),
                    wildcard: None,
                });
                let Some(on) = self.lower_expr(on) else {
                    return false;
                };
                self.ops.push(RqOp::Join {
                    side: join_side(*side),
                    source: table_source,
                    columns: Vec::new(),
                    wildcard: None,
                    on,
                });
                true
            }
            TransformCall::Window {
                partition,
                sort,
                frame,
                computed,
            } => {
                let mut lowered_partition = Vec::new();
                for expr in partition {
                    let Some(e) = self.lower_expr(expr) else {
                        return false;
                    };
                    lowered_partition.push(e);
                }
                let Some(lowered_sort) = self.lower_sort_keys(sort) else {
                    return false;
                };
                let Some(lowered) = self.lower_computed(computed) else {
                    return false;
                };
                self.visible.extend(lowered.iter().map(|(cid, _)| *cid));
                self.ops.push(RqOp::Window {
                    partition: lowered_partition,
                    sort: lowered_sort,
                    frame: frame.as_ref().map(window_frame),
                    computed: lowered,
                    span,
                });
                true
            }
            TransformCall::Append { source, .. } => {
                let source = self.table_source(source);
                self.ops.push(RqOp::Append { source });
                true
            }
            _ => {
                self.unsupported("transform", span);
                false
            }
        }
    }

    /// Lower `select` / `derive` fields: passthrough references keep their
    /// identity, everything else becomes a computed column
    fn lower_projection(&mut self, columns: &[NamedExpr]) -> Option<Vec<(Cid, RqExpr)>> {
        let mut lowered = Vec::new();
        for named in columns {
            let expr = self.lower_expr(&named.expr)?;
            // Passthrough references were mapped while lowering the
            // expression; anything unmapped is a fresh computed column
            let cid = match self.decl_to_cid.get(&named.decl).copied() {
                Some(existing) => existing,
                None => self.new_computed(named.decl),
            };
            lowered.push((cid, expr));
        }
        Some(lowered)
    }

    /// Lower `aggregate` / `window` computed fields; always fresh identities
    fn lower_computed(&mut self, computed: &[NamedExpr]) -> Option<Vec<(Cid, RqExpr)>> {
        let mut lowered = Vec::new();
        for named in computed {
            let expr = self.lower_expr(&named.expr)?;
            let cid = self.new_computed(named.decl);
            lowered.push((cid, expr));
        }
        Some(lowered)
    }

    fn lower_sort_keys(&mut self, keys: &[PlSortKey]) -> Option<Vec<SortKey>> {
        let mut lowered = Vec::new();
        for key in keys {
            lowered.push(SortKey {
                expr: self.lower_expr(&key.expr)?,
                desc: key.desc,
            });
        }
        Some(lowered)
    }

    fn lower_expr(&mut self, expr: &PlExpr) -> Option<RqExpr> {
        match expr {
            PlExpr::Binding { decl, span } => {
                Some(RqExpr::Column(self.column_cid(*decl, *span)?))
            }
            PlExpr::Literal { value, .. } => Some(RqExpr::Literal(literal(value))),
            PlExpr::Binary {
                left, op, right, ..
            } => {
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                Some(RqExpr::Binary {
                    left: Box::new(l),
                    op: bin_op(*op),
                    right: Box::new(r),
                })
            }
            PlExpr::Unary { op, expr, .. } => Some(RqExpr::Unary {
                op: un_op(*op),
                expr: Box::new(self.lower_expr(expr)?),
            }),
            PlExpr::Call {
                function,
                args,
                span,
                ..
            } => {
                if function == "count" && matches!(args.as_slice(), [PlExpr::AllRows { .. }]) {
                    return Some(RqExpr::CountAll);
                }
                if args.iter().any(|a| matches!(a, PlExpr::AllRows { .. })) {
                    self.unsupported(
                        &format!("'this' as an argument of '{}'", function),
                        *span,
                    );
                    return None;
                }
                let mut lowered = Vec::new();
                for arg in args {
                    lowered.push(self.lower_expr(arg)?);
                }
                let sql_name = self
                    .registry
                    .function(function)
                    .map(|f| f.sql_name().to_string())
                    .unwrap_or_else(|| function.clone());
                Some(RqExpr::Call {
                    function: sql_name,
                    args: lowered,
                })
            }
            PlExpr::AllRows { span } => {
                self.unsupported("whole-group reference outside 'count'", *span);
                None
            }
            PlExpr::Array { span, .. } => {
                self.unsupported("array literal in a scalar position", *span);
                None
            }
            _ => {
                self.unsupported("expression", expr.span());
                None
            }
        }
    }

    /// The identity of a column declaration within this relation
    fn column_cid(&mut self, decl: DeclId, span: Span) -> Option<Cid> {
        if let Some(cid) = self.decl_to_cid.get(&decl) {
            return Some(*cid);
        }

        // A column produced by a consumed relation gets a re-tagged copy
        let producer_hit = self.slots.iter().enumerate().find_map(|(i, slot)| {
            slot.producer
                .and_then(|p| self.outputs[p].get(&decl).copied())
                .map(|of| (i, of))
        });
        if let Some((slot_index, of)) = producer_hit {
            let name = self.module.decl(decl).and_then(|d| d.name.clone());
            let cid = Cid(self.columns.len());
            self.columns.push(ColumnDecl {
                name,
                origin: ColumnOrigin::Retagged { of },
            });
            self.slots[slot_index].cids.push(cid);
            self.decl_to_cid.insert(decl, cid);
            return Some(cid);
        }

        let Some(declaration) = self.module.decl(decl) else {
            self.unsupported("column reference outside its source relation", span);
            return None;
        };
        let BindingKind::Column { table: Some(table) } = &declaration.kind else {
            self.unsupported("column reference outside its source relation", span);
            return None;
        };
        let Some(slot_index) = self.slots.iter().position(|s| &s.table_key == table) else {
            self.unsupported("column reference outside its source relation", span);
            return None;
        };

        let column = declaration.name.clone().unwrap_or_default();
        let cid = Cid(self.columns.len());
        self.columns.push(ColumnDecl {
            name: declaration.name.clone(),
            origin: ColumnOrigin::Table {
                table: table.clone(),
                column,
            },
        });
        self.slots[slot_index].cids.push(cid);
        self.decl_to_cid.insert(decl, cid);
        Some(cid)
    }

    fn new_computed(&mut self, decl: DeclId) -> Cid {
        let cid = Cid(self.columns.len());
        self.columns.push(ColumnDecl {
            name: self.module.decl(decl).and_then(|d| d.name.clone()),
            origin: ColumnOrigin::Computed,
        });
        self.decl_to_cid.insert(decl, cid);
        cid
    }

    fn table_source(&self, source: &RelationSource) -> TableSource {
        match source {
            RelationSource::Table { name } => TableSource::Table { name: name.clone() },
            RelationSource::Pipeline { index } => TableSource::Relation {
                id: RelationId(*index),
            },
        }
    }

    fn unsupported(&mut self, construct: &str, span: Span) {
        self.diagnostics.push(Diagnostic::error(
            DiagnosticKind::UnsupportedConstructError {
                construct: construct.to_string(),
            },
            span,
        ));
    }
}

fn source_key(source: &RelationSource, module: &ResolvedModule) -> String {
    match source {
        RelationSource::Table { name } => name
            .rsplit('.')
            .next()
            .unwrap_or(name.as_str())
            .to_string(),
        RelationSource::Pipeline { index } => module
            .pipelines
            .get(*index)
            .and_then(|p| p.name.clone())
            .unwrap_or_default(),
    }
}

fn pipeline_index(source: &RelationSource) -> Option<usize> {
    match source {
        RelationSource::Pipeline { index } => Some(*index),
        RelationSource::Table { .. } => None,
    }
}

fn literal(value: &Literal) -> RqLiteral {
    match value {
        Literal::Null => RqLiteral::Null,
        Literal::Boolean(b) => RqLiteral::Boolean(*b),
        Literal::Integer(n) => RqLiteral::Integer(*n),
        Literal::Float(f) => RqLiteral::Float(*f),
        Literal::String(s) => RqLiteral::String(s.clone()),
        Literal::Date(d) => RqLiteral::Date(d.clone()),
        _ => RqLiteral::Null,
    }
}

fn bin_op(op: BinOp) -> RqBinOp {
    match op {
        BinOp::Add => RqBinOp::Add,
        BinOp::Sub => RqBinOp::Sub,
        BinOp::Mul => RqBinOp::Mul,
        BinOp::Div => RqBinOp::Div,
        BinOp::Mod => RqBinOp::Mod,
        BinOp::Concat => RqBinOp::Concat,
        BinOp::Eq => RqBinOp::Eq,
        BinOp::NotEq => RqBinOp::NotEq,
        BinOp::Lt => RqBinOp::Lt,
        BinOp::LtEq => RqBinOp::LtEq,
        BinOp::Gt => RqBinOp::Gt,
        BinOp::GtEq => RqBinOp::GtEq,
        BinOp::And => RqBinOp::And,
        BinOp::Or => RqBinOp::Or,
    }
}

fn un_op(op: UnOp) -> RqUnOp {
    match op {
        UnOp::Neg => RqUnOp::Neg,
        UnOp::Not => RqUnOp::Not,
    }
}

fn join_side(side: JoinSide) -> pipesql_ir::JoinSide {
    match side {
        JoinSide::Inner => pipesql_ir::JoinSide::Inner,
        JoinSide::Left => pipesql_ir::JoinSide::Left,
        JoinSide::Right => pipesql_ir::JoinSide::Right,
        JoinSide::Full => pipesql_ir::JoinSide::Full,
    }
}

fn window_frame(frame: &PlFrame) -> WindowFrame {
    WindowFrame {
        kind: match frame.kind {
            FrameKind::Rows => WindowFrameKind::Rows,
            FrameKind::Range => WindowFrameKind::Range,
        },
        start: frame.start,
        end: frame.end,
    }
}
