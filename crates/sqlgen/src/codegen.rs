// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Relational IR to structured SQL
//!
//! Each relation lowers to a chain of `SELECT`s: operators accumulate into
//! clause slots of the current `SELECT` until an operator arrives that SQL
//! cannot express in the clauses already occupied (a breakpoint), at which
//! point the current `SELECT` becomes a common table expression and a fresh
//! one starts reading from it. Dialects without CTE support nest the chain
//! as subqueries instead.
//!
//! Everything dialect-specific flows through the capability record; the
//! generator never matches on a dialect name.

use std::collections::{BTreeSet, HashMap};

use pipesql_diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, StageResult};
use pipesql_ir::{
    Capabilities, Cid, ConcatStyle, Dialect, JoinSide, LimitStyle, Relation, RelationalModule,
    RqBinOp, RqExpr, RqOp, RqUnOp, SortKey, TableSource, WindowFrame, WindowFrameKind,
};
use tracing::debug;

use crate::expr::{bin_op_text, quote_ident, ExprRenderer};
use crate::stmt::{SqlColumn, SqlFrom, SqlJoin, SqlSelect, SqlStatement};

/// Window functions rendered without arguments; ordering comes from the
/// `OVER` clause
const NO_ARG_WINDOW: &[&str] = &["row_number", "rank", "dense_rank"];

/// Functions that carry an `OVER` clause inside a window operator
const OVER_FUNCTIONS: &[&str] = &[
    "row_number",
    "rank",
    "dense_rank",
    "lag",
    "lead",
    "count",
    "sum",
    "avg",
    "min",
    "max",
    "stddev",
];

/// Generate one SQL statement per main pipeline
pub fn generate(module: &RelationalModule, dialect: Dialect) -> StageResult<Vec<SqlStatement>> {
    let caps = dialect.capabilities();
    let mut diagnostics = Diagnostics::new();
    let mut statements = Vec::new();

    for relation in module.relations.iter().filter(|r| r.name.is_none()) {
        let mut generator = StatementGen {
            module,
            dialect,
            caps: &caps,
            ctes: Vec::new(),
            cte_counter: 0,
            expr_counter: 0,
            rel_subqueries: HashMap::new(),
            diagnostics: Diagnostics::new(),
        };
        let statement = generator.build(relation);
        if generator.diagnostics.has_errors() {
            diagnostics.extend(generator.diagnostics);
        } else {
            statements.push(statement);
        }
    }

    debug!(statements = statements.len(), dialect = %dialect, "generated sql");
    diagnostics.into_result(statements)
}

/// Builds one statement: the main relation plus every `let`-bound relation
/// it transitively reads
struct StatementGen<'a> {
    module: &'a RelationalModule,
    dialect: Dialect,
    caps: &'a Capabilities,

    ctes: Vec<(String, SqlSelect)>,
    cte_counter: usize,
    expr_counter: usize,

    /// Rendered named relations, kept for inlining when the dialect has no
    /// CTE support
    rel_subqueries: HashMap<usize, SqlSelect>,

    diagnostics: Diagnostics,
}

impl StatementGen<'_> {
    fn build(&mut self, relation: &Relation) -> SqlStatement {
        let mut deps = BTreeSet::new();
        self.collect_deps(relation, &mut deps);

        // Producers always precede consumers in the relation list, so
        // ascending index order is dependency order
        for index in deps {
            let dep = &self.module.relations[index];
            let name = dep.name.clone().unwrap_or_else(|| format!("_{index}"));
            let select = self.render_chain(dep);
            if self.caps.ctes {
                self.ctes.push((name, select));
            } else {
                self.rel_subqueries.insert(index, select);
            }
        }

        let body = self.render_chain(relation);
        SqlStatement {
            ctes: std::mem::take(&mut self.ctes),
            body,
        }
    }

    fn collect_deps(&self, relation: &Relation, out: &mut BTreeSet<usize>) {
        for op in &relation.ops {
            let source = match op {
                RqOp::From { source, .. }
                | RqOp::Join { source, .. }
                | RqOp::Append { source } => source,
                _ => continue,
            };
            if let TableSource::Relation { id } = source {
                if out.insert(id.0) {
                    self.collect_deps(&self.module.relations[id.0], out);
                }
            }
        }
    }

    /// Render a relation's operator chain; intermediate segments become
    /// CTEs (or nested subqueries), the final segment is returned
    fn render_chain(&mut self, relation: &Relation) -> SqlSelect {
        let segments = segment_ops(&relation.ops);
        let mut carried: Option<(SqlFrom, HashMap<Cid, String>)> = None;
        let mut result = SqlSelect::default();

        let count = segments.len();
        for (index, segment) in segments.into_iter().enumerate() {
            let (select, outputs) = self.render_segment(&segment, carried.take());
            if index + 1 == count {
                result = select;
            } else {
                let name = format!("table_{}", self.cte_counter);
                self.cte_counter += 1;
                let from = if self.caps.ctes {
                    self.ctes.push((name.clone(), select));
                    SqlFrom {
                        name,
                        subquery: None,
                    }
                } else {
                    SqlFrom {
                        name,
                        subquery: Some(Box::new(select)),
                    }
                };
                carried = Some((from, outputs));
            }
        }
        result
    }

    /// Render one segment into a single `SELECT`; returns it together with
    /// the map from column identity to output name, for the next segment
    fn render_segment(
        &mut self,
        ops: &[&RqOp],
        carried: Option<(SqlFrom, HashMap<Cid, String>)>,
    ) -> (SqlSelect, HashMap<Cid, String>) {
        let mut select = SqlSelect::default();
        let mut names: HashMap<Cid, String> = HashMap::new();
        let mut computed: HashMap<Cid, String> = HashMap::new();

        // Explicit projection set by select/aggregate; None renders `*`
        // plus any appended computed columns
        let mut projection: Option<Vec<(Cid, String)>> = None;
        let mut extras: Vec<(Cid, String)> = Vec::new();
        let mut wildcard_sources: Vec<String> = Vec::new();
        let mut grouped = false;

        // Column references qualify only when more than one source feeds
        // this select, so count sources before registering any name
        let qualify = ops.iter().any(|op| matches!(op, RqOp::Join { .. }));

        if let Some((from, carried_names)) = carried {
            for (cid, name) in carried_names {
                let base = name.rsplit('.').next().unwrap_or(name.as_str()).to_string();
                let text = if qualify {
                    format!("{}.{base}", from.name)
                } else {
                    base
                };
                names.insert(cid, text);
            }
            if qualify {
                wildcard_sources.push(format!("{}.*", from.name));
            }
            select.from = Some(from);
        }

        for op in ops {
            match op {
                RqOp::From {
                    source,
                    columns,
                    wildcard,
                } => {
                    let alias = self.source_alias(source);
                    self.register_columns(&mut names, &alias, columns, qualify);
                    if wildcard.is_some() && qualify {
                        wildcard_sources.push(format!("{alias}.*"));
                    }
                    select.from = Some(self.source_from(source, &alias));
                }
                RqOp::Join {
                    side,
                    source,
                    columns,
                    wildcard,
                    on,
                } => {
                    let alias = self.source_alias(source);
                    self.register_columns(&mut names, &alias, columns, qualify);
                    if wildcard.is_some() && qualify {
                        wildcard_sources.push(format!("{alias}.*"));
                    }
                    let condition = self.renderer(&names, &computed).render(on);
                    let from = self.source_from(source, &alias);
                    select.joins.push(SqlJoin {
                        keyword: join_keyword(*side),
                        name: from.name,
                        subquery: from.subquery,
                        on: condition,
                    });
                }
                RqOp::Select { columns } => {
                    let mut rendered = Vec::with_capacity(columns.len());
                    for (cid, expr) in columns {
                        let text = self.renderer(&names, &computed).render(expr);
                        computed.insert(*cid, text.clone());
                        rendered.push((*cid, text));
                    }
                    projection = Some(rendered);
                    extras.clear();
                }
                RqOp::Compute { columns } => {
                    for (cid, expr) in columns {
                        let text = self.renderer(&names, &computed).render(expr);
                        computed.insert(*cid, text.clone());
                        match &mut projection {
                            Some(list) => list.push((*cid, text)),
                            None => extras.push((*cid, text)),
                        }
                    }
                }
                RqOp::Filter { condition } => {
                    let text = self.renderer(&names, &computed).render(condition);
                    if grouped {
                        select.having.push(text);
                    } else {
                        select.where_.push(text);
                    }
                }
                RqOp::Aggregate {
                    group_by,
                    computed: aggs,
                } => {
                    grouped = true;
                    let mut rendered = Vec::new();
                    for cid in group_by {
                        let key = self
                            .renderer(&names, &computed)
                            .render(&RqExpr::Column(*cid));
                        select.group_by.push(key.clone());
                        rendered.push((*cid, key));
                    }
                    for (cid, expr) in aggs {
                        let text = self.renderer(&names, &computed).render(expr);
                        computed.insert(*cid, text.clone());
                        rendered.push((*cid, text));
                    }
                    projection = Some(rendered);
                    extras.clear();
                }
                RqOp::Sort { keys } => {
                    select.order_by = self.render_sort_keys(keys, &names, &computed);
                }
                RqOp::Take { limit, offset } => {
                    select.limit = *limit;
                    select.offset = *offset;
                }
                RqOp::Append { source } => {
                    let alias = self.source_alias(source);
                    select.unions.push(self.source_from(source, &alias));
                }
                RqOp::Window {
                    partition,
                    sort,
                    frame,
                    computed: windows,
                    span,
                } => {
                    if !self.caps.window_functions {
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticKind::DialectCapabilityError {
                                dialect: self.dialect.name().to_string(),
                                feature: "window functions".to_string(),
                            },
                            *span,
                        ));
                    }
                    let over = self.render_over(partition, sort, frame, &names, &computed);
                    for (cid, expr) in windows {
                        let text = self.render_windowed(expr, &over, &names, &computed);
                        computed.insert(*cid, text.clone());
                        match &mut projection {
                            Some(list) => list.push((*cid, text)),
                            None => extras.push((*cid, text)),
                        }
                    }
                }
            }
        }

        // Finalize the projection and the output-name map
        let mut outputs = HashMap::new();
        match projection {
            Some(list) => {
                let mut used: HashMap<String, usize> = HashMap::new();
                for (cid, expr) in list {
                    let name = self.output_name(cid, &mut used);
                    let quoted = quote_ident(self.caps, &name);
                    let natural = expr.rsplit('.').next().unwrap_or(expr.as_str());
                    let alias = if natural == quoted {
                        None
                    } else {
                        Some(quoted.clone())
                    };
                    select.projection.push(SqlColumn { expr, alias });
                    outputs.insert(cid, quoted);
                }
            }
            None => {
                select.wildcards = if wildcard_sources.is_empty() {
                    vec!["*".to_string()]
                } else {
                    wildcard_sources
                };
                for (cid, name) in &names {
                    let base = name.rsplit('.').next().unwrap_or(name.as_str());
                    outputs.insert(*cid, base.to_string());
                }
                let mut used: HashMap<String, usize> = HashMap::new();
                for (cid, expr) in extras {
                    let name = self.output_name(cid, &mut used);
                    let quoted = quote_ident(self.caps, &name);
                    select.projection.push(SqlColumn {
                        expr,
                        alias: Some(quoted.clone()),
                    });
                    outputs.insert(cid, quoted);
                }
            }
        }

        self.apply_limit_style(&mut select);
        (select, outputs)
    }

    fn register_columns(
        &self,
        names: &mut HashMap<Cid, String>,
        alias: &str,
        columns: &[Cid],
        qualify: bool,
    ) {
        for cid in columns {
            let base = match self.module.column(*cid).and_then(|c| c.name.clone()) {
                Some(name) => quote_ident(self.caps, &name),
                None => format!("__cid{}", cid.0),
            };
            let text = if qualify {
                format!("{alias}.{base}")
            } else {
                base
            };
            names.insert(*cid, text);
        }
    }

    /// The alias other clauses use to qualify this source's columns
    fn source_alias(&self, source: &TableSource) -> String {
        let display = source.display_name(self.module);
        let last = display.rsplit('.').next().unwrap_or(display);
        quote_ident(self.caps, last)
    }

    fn source_from(&self, source: &TableSource, alias: &str) -> SqlFrom {
        match source {
            TableSource::Table { name } => {
                let rendered = name
                    .split('.')
                    .map(|part| quote_ident(self.caps, part))
                    .collect::<Vec<_>>()
                    .join(".");
                SqlFrom {
                    name: rendered,
                    subquery: None,
                }
            }
            TableSource::Relation { id } => SqlFrom {
                name: alias.to_string(),
                subquery: self.rel_subqueries.get(&id.0).map(|s| Box::new(s.clone())),
            },
        }
    }

    fn renderer<'n>(
        &'n self,
        names: &'n HashMap<Cid, String>,
        computed: &'n HashMap<Cid, String>,
    ) -> ExprRenderer<'n> {
        ExprRenderer {
            caps: self.caps,
            names,
            computed,
        }
    }

    fn render_sort_keys(
        &self,
        keys: &[SortKey],
        names: &HashMap<Cid, String>,
        computed: &HashMap<Cid, String>,
    ) -> Vec<String> {
        keys.iter()
            .map(|key| {
                let text = self.renderer(names, computed).render(&key.expr);
                if key.desc {
                    format!("{text} DESC")
                } else {
                    text
                }
            })
            .collect()
    }

    fn render_over(
        &self,
        partition: &[RqExpr],
        sort: &[SortKey],
        frame: &Option<WindowFrame>,
        names: &HashMap<Cid, String>,
        computed: &HashMap<Cid, String>,
    ) -> String {
        let mut parts = Vec::new();
        if !partition.is_empty() {
            let keys: Vec<String> = partition
                .iter()
                .map(|e| self.renderer(names, computed).render(e))
                .collect();
            parts.push(format!("PARTITION BY {}", keys.join(", ")));
        }
        if !sort.is_empty() {
            parts.push(format!(
                "ORDER BY {}",
                self.render_sort_keys(sort, names, computed).join(", ")
            ));
        }
        if let Some(frame) = frame {
            parts.push(render_frame(frame));
        }
        format!("OVER ({})", parts.join(" "))
    }

    /// Render a window-computed expression, attaching the `OVER` clause to
    /// every aggregate or window call inside it
    fn render_windowed(
        &self,
        expr: &RqExpr,
        over: &str,
        names: &HashMap<Cid, String>,
        computed: &HashMap<Cid, String>,
    ) -> String {
        if !contains_over_call(expr) {
            return self.renderer(names, computed).render(expr);
        }
        match expr {
            RqExpr::CountAll => format!("COUNT(*) {over}"),
            RqExpr::Call { function, args } => {
                if OVER_FUNCTIONS.contains(&function.as_str()) {
                    let base = if NO_ARG_WINDOW.contains(&function.as_str()) {
                        format!("{}()", function.to_uppercase())
                    } else {
                        let rendered: Vec<String> = args
                            .iter()
                            .map(|a| self.renderer(names, computed).render(a))
                            .collect();
                        format!("{}({})", function.to_uppercase(), rendered.join(", "))
                    };
                    format!("{base} {over}")
                } else {
                    let rendered: Vec<String> = args
                        .iter()
                        .map(|a| self.render_windowed(a, over, names, computed))
                        .collect();
                    format!("{}({})", function.to_uppercase(), rendered.join(", "))
                }
            }
            RqExpr::Binary { left, op, right } => {
                let lhs = self.windowed_operand(left, over, names, computed);
                let rhs = self.windowed_operand(right, over, names, computed);
                if *op == RqBinOp::Concat && self.caps.string_concat == ConcatStyle::Function {
                    return format!("CONCAT({lhs}, {rhs})");
                }
                let text = if *op == RqBinOp::Concat
                    && self.caps.string_concat == ConcatStyle::PlusOperator
                {
                    "+"
                } else {
                    bin_op_text(*op)
                };
                format!("{lhs} {text} {rhs}")
            }
            RqExpr::Unary { op, expr } => {
                let inner = self.windowed_operand(expr, over, names, computed);
                match op {
                    RqUnOp::Neg => format!("-{inner}"),
                    RqUnOp::Not => format!("NOT {inner}"),
                }
            }
            RqExpr::Column(_) | RqExpr::Literal(_) => self.renderer(names, computed).render(expr),
        }
    }

    fn windowed_operand(
        &self,
        expr: &RqExpr,
        over: &str,
        names: &HashMap<Cid, String>,
        computed: &HashMap<Cid, String>,
    ) -> String {
        let text = self.render_windowed(expr, over, names, computed);
        if matches!(expr, RqExpr::Binary { .. }) {
            format!("({text})")
        } else {
            text
        }
    }

    fn output_name(&mut self, cid: Cid, used: &mut HashMap<String, usize>) -> String {
        let base = match self.module.column(cid).and_then(|c| c.name.clone()) {
            Some(name) => name,
            None => {
                let name = format!("_expr_{}", self.expr_counter);
                self.expr_counter += 1;
                name
            }
        };
        match used.get_mut(&base) {
            Some(count) => {
                *count += 1;
                format!("{base}_{count}")
            }
            None => {
                used.insert(base.clone(), 0);
                base
            }
        }
    }

    fn apply_limit_style(&self, select: &mut SqlSelect) {
        if select.limit.is_none() && select.offset == 0 {
            return;
        }
        if self.caps.limit_style == LimitStyle::Top {
            if select.offset == 0 {
                select.top = select.limit.take();
            } else {
                select.offset_fetch = true;
                if select.order_by.is_empty() {
                    select.order_by.push("(SELECT NULL)".to_string());
                }
            }
        }
    }
}

fn contains_over_call(expr: &RqExpr) -> bool {
    match expr {
        RqExpr::CountAll => true,
        RqExpr::Call { function, args } => {
            OVER_FUNCTIONS.contains(&function.as_str()) || args.iter().any(contains_over_call)
        }
        RqExpr::Binary { left, right, .. } => {
            contains_over_call(left) || contains_over_call(right)
        }
        RqExpr::Unary { expr, .. } => contains_over_call(expr),
        RqExpr::Column(_) | RqExpr::Literal(_) => false,
    }
}

fn join_keyword(side: JoinSide) -> &'static str {
    match side {
        JoinSide::Inner => "JOIN",
        JoinSide::Left => "LEFT JOIN",
        JoinSide::Right => "RIGHT JOIN",
        JoinSide::Full => "FULL JOIN",
    }
}

fn render_frame(frame: &WindowFrame) -> String {
    let unit = match frame.kind {
        WindowFrameKind::Rows => "ROWS",
        WindowFrameKind::Range => "RANGE",
    };
    format!(
        "{unit} BETWEEN {} AND {}",
        frame_bound(frame.start, true),
        frame_bound(frame.end, false)
    )
}

fn frame_bound(offset: Option<i64>, start: bool) -> String {
    match offset {
        None if start => "UNBOUNDED PRECEDING".to_string(),
        None => "UNBOUNDED FOLLOWING".to_string(),
        Some(0) => "CURRENT ROW".to_string(),
        Some(n) if n < 0 => format!("{} PRECEDING", -n),
        Some(n) => format!("{n} FOLLOWING"),
    }
}

/// Track what the current `SELECT` already holds, to decide breakpoints
#[derive(Default)]
struct SegState {
    has_aggregate: bool,
    has_window: bool,
    has_limit: bool,
    has_order: bool,
    has_union: bool,
}

impl SegState {
    fn absorb(&mut self, op: &RqOp) {
        match op {
            RqOp::Aggregate { .. } => self.has_aggregate = true,
            RqOp::Window { .. } => self.has_window = true,
            RqOp::Take { .. } => self.has_limit = true,
            RqOp::Sort { .. } => self.has_order = true,
            RqOp::Append { .. } => self.has_union = true,
            _ => {}
        }
    }

    /// An operator that cannot share the current `SELECT`
    fn breaks(&self, op: &RqOp) -> bool {
        match op {
            RqOp::From { .. } => false,
            RqOp::Select { .. } | RqOp::Compute { .. } => self.has_union,
            // WHERE runs before window functions and before the row
            // window, so a filter after either needs a fresh scope
            RqOp::Filter { .. } => self.has_window || self.has_limit || self.has_union,
            RqOp::Aggregate { .. } | RqOp::Join { .. } => {
                self.has_aggregate || self.has_window || self.has_limit || self.has_union
            }
            RqOp::Sort { .. } => self.has_limit,
            RqOp::Take { .. } => self.has_limit,
            RqOp::Append { .. } => self.has_order || self.has_limit,
            RqOp::Window { .. } => self.has_window || self.has_limit || self.has_union,
        }
    }
}

fn segment_ops(ops: &[RqOp]) -> Vec<Vec<&RqOp>> {
    let mut segments = Vec::new();
    let mut current: Vec<&RqOp> = Vec::new();
    let mut state = SegState::default();
    for op in ops {
        if state.breaks(op) && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
            state = SegState::default();
        }
        state.absorb(op);
        current.push(op);
    }
    segments.push(current);
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesql_function_registry::Registry;
    use pipesql_lowering::lower;
    use pipesql_parser::parse;
    use pipesql_semantic::resolve;

    fn sql_for(source: &str, dialect: Dialect) -> StageResult<String> {
        let (module, parse_diags) = parse(source);
        assert!(
            parse_diags.is_empty(),
            "unexpected parse diagnostics: {}",
            parse_diags
        );
        let (resolved, diags) = resolve(&module, &Registry::new());
        assert!(!diags.has_errors(), "unexpected diagnostics: {}", diags);
        let relational = lower(&resolved)?;
        crate::generate_sql(&relational, dialect, false)
    }

    fn sql(source: &str) -> String {
        sql_for(source, Dialect::Ansi).expect("generation failed")
    }

    #[test]
    fn test_filter_then_select() {
        assert_eq!(
            sql("from employees\nfilter department == \"eng\"\nselect {name, salary}"),
            "SELECT name, salary FROM employees WHERE department = 'eng'"
        );
    }

    #[test]
    fn test_unnarrowed_pipeline_selects_star() {
        assert_eq!(
            sql("from products\nsort {-price}\ntake 5"),
            "SELECT * FROM products ORDER BY price DESC LIMIT 5"
        );
    }

    #[test]
    fn test_derive_extends_star() {
        assert_eq!(
            sql("from employees\nderive {gross = salary * 1.2}"),
            "SELECT *, salary * 1.2 AS gross FROM employees"
        );
    }

    #[test]
    fn test_group_aggregate() {
        assert_eq!(
            sql("from orders\ngroup {customer_id} (aggregate {n = count this})"),
            "SELECT customer_id, COUNT(*) AS n FROM orders GROUP BY customer_id"
        );
    }

    #[test]
    fn test_filter_after_aggregate_becomes_having() {
        assert_eq!(
            sql("from orders\ngroup {customer_id} (aggregate {total = sum amount})\nfilter total > 100"),
            "SELECT customer_id, SUM(amount) AS total FROM orders GROUP BY customer_id HAVING SUM(amount) > 100"
        );
    }

    #[test]
    fn test_take_range_is_one_based_inclusive() {
        assert_eq!(
            sql("from items\ntake 5..20"),
            "SELECT * FROM items LIMIT 16 OFFSET 4"
        );
    }

    #[test]
    fn test_filter_after_take_breaks_into_cte() {
        assert_eq!(
            sql("from items\ntake 10\nfilter price > 100"),
            "WITH table_0 AS (SELECT * FROM items LIMIT 10) SELECT * FROM table_0 WHERE price > 100"
        );
    }

    #[test]
    fn test_sort_after_take_breaks_into_cte() {
        assert_eq!(
            sql("from items\ntake 10\nsort {price}"),
            "WITH table_0 AS (SELECT * FROM items LIMIT 10) SELECT * FROM table_0 ORDER BY price"
        );
    }

    #[test]
    fn test_join_qualifies_columns() {
        assert_eq!(
            sql("from employees\njoin salaries (employees.id == salaries.emp_id)\nselect {employees.name, salaries.amount}"),
            "SELECT employees.name, salaries.amount FROM employees JOIN salaries ON employees.id = salaries.emp_id"
        );
    }

    #[test]
    fn test_left_join_keyword() {
        let text = sql(
            "from employees\njoin salaries (employees.id == salaries.emp_id) side:left\nselect {employees.name, salaries.amount}",
        );
        assert!(text.contains("LEFT JOIN salaries ON"), "got: {text}");
    }

    #[test]
    fn test_colliding_output_names_disambiguate() {
        assert_eq!(
            sql("from employees\njoin salaries (employees.id == salaries.id)\nselect {employees.id, salaries.id}"),
            "SELECT employees.id, salaries.id AS id_1 FROM employees JOIN salaries ON employees.id = salaries.id"
        );
    }

    #[test]
    fn test_window_function_rendering() {
        assert_eq!(
            sql("from employees\nwindow sort_by:{-salary} (derive {r = rank salary})"),
            "SELECT *, RANK() OVER (ORDER BY salary DESC) AS r FROM employees"
        );
    }

    #[test]
    fn test_window_frame_rendering() {
        let text = sql(
            "from readings\nwindow sort_by:{day} rows:-2..0 (derive {avg3 = average value})",
        );
        assert!(
            text.contains("AVG(value) OVER (ORDER BY day ROWS BETWEEN 2 PRECEDING AND CURRENT ROW) AS avg3"),
            "got: {text}"
        );
    }

    #[test]
    fn test_sqlite_rejects_window_functions() {
        let source = "from employees\nwindow sort_by:{-salary} (derive {r = rank salary})";
        let err = sql_for(source, Dialect::Sqlite).unwrap_err();
        assert_eq!(err.len(), 1);
        let diagnostic = err.iter().next().unwrap();
        assert!(matches!(
            &diagnostic.kind,
            DiagnosticKind::DialectCapabilityError { dialect, feature }
                if dialect == "sqlite" && feature == "window functions"
        ));
        // The diagnostic points at the window step, not the start of the
        // source
        assert_eq!(diagnostic.span.line, 2);
        assert!(source[diagnostic.span.start..diagnostic.span.end].starts_with("window"));

        // The same pipeline is fine on a dialect with window support
        assert!(sql_for(source, Dialect::DuckDb).is_ok());
    }

    #[test]
    fn test_let_relation_becomes_cte() {
        let source = "let top_earners = from employees | sort {-salary} | take 10\n\nfrom top_earners\nselect {name}";
        assert_eq!(
            sql(source),
            "WITH top_earners AS (SELECT * FROM employees ORDER BY salary DESC LIMIT 10) SELECT name FROM top_earners"
        );
    }

    #[test]
    fn test_append_renders_union_all() {
        assert_eq!(
            sql("from current_orders\nappend archived_orders"),
            "SELECT * FROM current_orders UNION ALL SELECT * FROM archived_orders"
        );
    }

    #[test]
    fn test_mssql_take_renders_top() {
        assert_eq!(
            sql_for("from products\nsort {-price}\ntake 5", Dialect::MsSql).unwrap(),
            "SELECT TOP 5 * FROM products ORDER BY price DESC"
        );
    }

    #[test]
    fn test_mysql_quotes_reserved_names_with_backticks() {
        assert_eq!(
            sql_for("from orders\nselect {order}", Dialect::MySql).unwrap(),
            "SELECT `order` FROM orders"
        );
    }

    #[test]
    fn test_multiple_pipelines_emit_multiple_statements() {
        let text = sql("from employees\nselect {name}\n\nfrom orders\nselect {total}");
        assert_eq!(
            text,
            "SELECT name FROM employees;\n\nSELECT total FROM orders"
        );
    }

    #[test]
    fn test_generation_is_deterministic() {
        let source = "from employees\njoin salaries (employees.id == salaries.emp_id)\nselect {employees.name, salaries.amount}";
        assert_eq!(sql(source), sql(source));
    }

    fn sql_without_ctes(source: &str) -> String {
        let (module, parse_diags) = parse(source);
        assert!(
            parse_diags.is_empty(),
            "unexpected parse diagnostics: {}",
            parse_diags
        );
        let (resolved, diags) = resolve(&module, &Registry::new());
        assert!(!diags.has_errors(), "unexpected diagnostics: {}", diags);
        let relational = lower(&resolved).expect("lowering failed");
        let caps = Capabilities {
            ctes: false,
            ..Capabilities::default()
        };
        let relation = relational
            .relations
            .iter()
            .find(|r| r.name.is_none())
            .expect("main relation");
        let mut generator = StatementGen {
            module: &relational,
            dialect: Dialect::Ansi,
            caps: &caps,
            ctes: Vec::new(),
            cte_counter: 0,
            expr_counter: 0,
            rel_subqueries: HashMap::new(),
            diagnostics: Diagnostics::new(),
        };
        let statement = generator.build(relation);
        assert!(
            !generator.diagnostics.has_errors(),
            "unexpected diagnostics: {}",
            generator.diagnostics
        );
        assert!(statement.ctes.is_empty());
        crate::format::render(&[statement], false)
    }

    #[test]
    fn test_breakpoint_without_ctes_nests_subqueries() {
        assert_eq!(
            sql_without_ctes("from employees\ntake 10\nfilter salary > 100"),
            "SELECT * FROM (SELECT * FROM employees LIMIT 10) AS table_0 WHERE salary > 100"
        );
    }

    #[test]
    fn test_let_relation_without_ctes_inlines_subquery() {
        let source = "let top = from employees | take 10\n\nfrom top\nfilter salary > 100";
        assert_eq!(
            sql_without_ctes(source),
            "SELECT * FROM (SELECT * FROM employees LIMIT 10) AS top WHERE salary > 100"
        );
    }
}
