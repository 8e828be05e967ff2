// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! SQL layout
//!
//! Renders structured statements to text. Pretty mode puts one clause per
//! line, indents CTE and subquery bodies, and wraps long projection lists;
//! compact mode emits a single line per statement. Both modes produce the
//! same SQL token stream, so they are interchangeable semantically.

use crate::stmt::{SqlFrom, SqlSelect, SqlStatement};

const MAX_WIDTH: usize = 79;
const INDENT: &str = "  ";

/// Render statements to final SQL text
pub fn render(statements: &[SqlStatement], pretty: bool) -> String {
    statements
        .iter()
        .map(|statement| render_statement(statement, pretty))
        .collect::<Vec<_>>()
        .join(";\n\n")
}

fn render_statement(statement: &SqlStatement, pretty: bool) -> String {
    if statement.ctes.is_empty() {
        return render_select(&statement.body, pretty, 0);
    }

    if pretty {
        let mut out = String::new();
        for (index, (name, select)) in statement.ctes.iter().enumerate() {
            let lead = if index == 0 { "WITH" } else { "," };
            let separator = if index == 0 { " " } else { "\n" };
            out.push_str(&format!(
                "{lead}{separator}{name} AS (\n{}\n)",
                render_select(select, true, 1)
            ));
        }
        out.push('\n');
        out.push_str(&render_select(&statement.body, true, 0));
        out
    } else {
        let ctes: Vec<String> = statement
            .ctes
            .iter()
            .map(|(name, select)| format!("{name} AS ({})", render_select(select, false, 0)))
            .collect();
        format!(
            "WITH {} {}",
            ctes.join(", "),
            render_select(&statement.body, false, 0)
        )
    }
}

fn render_select(select: &SqlSelect, pretty: bool, indent: usize) -> String {
    let clauses = clauses(select, pretty, indent);
    if pretty {
        let prefix = INDENT.repeat(indent);
        clauses
            .iter()
            .map(|clause| {
                clause
                    .lines()
                    .map(|line| format!("{prefix}{line}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        clauses.join(" ")
    }
}

fn clauses(select: &SqlSelect, pretty: bool, indent: usize) -> Vec<String> {
    let mut out = Vec::new();

    let keyword = match select.top {
        Some(top) => format!("SELECT TOP {top}"),
        None => "SELECT".to_string(),
    };
    let items = select.projection_items();
    let flat = format!("{keyword} {}", items.join(", "));
    let width = MAX_WIDTH.saturating_sub(indent * INDENT.len());
    if pretty && flat.len() > width {
        let mut lines = vec![keyword];
        for (index, item) in items.iter().enumerate() {
            let comma = if index + 1 == items.len() { "" } else { "," };
            lines.push(format!("{INDENT}{item}{comma}"));
        }
        out.push(lines.join("\n"));
    } else {
        out.push(flat);
    }

    if let Some(from) = &select.from {
        out.push(render_source("FROM", from, pretty, indent));
    }
    for join in &select.joins {
        let source = SqlFrom {
            name: join.name.clone(),
            subquery: join.subquery.clone(),
        };
        let rendered = render_source(join.keyword, &source, pretty, indent);
        out.push(format!("{rendered} ON {}", join.on));
    }
    if !select.where_.is_empty() {
        out.push(format!("WHERE {}", select.where_.join(" AND ")));
    }
    if !select.group_by.is_empty() {
        out.push(format!("GROUP BY {}", select.group_by.join(", ")));
    }
    if !select.having.is_empty() {
        out.push(format!("HAVING {}", select.having.join(" AND ")));
    }
    for union in &select.unions {
        let rendered = render_source("UNION ALL SELECT * FROM", union, pretty, indent);
        out.push(rendered);
    }
    if !select.order_by.is_empty() {
        out.push(format!("ORDER BY {}", select.order_by.join(", ")));
    }
    if let Some(window) = row_window(select) {
        out.push(window);
    }
    out
}

fn render_source(keyword: &str, from: &SqlFrom, pretty: bool, indent: usize) -> String {
    match &from.subquery {
        None => format!("{keyword} {}", from.name),
        Some(subquery) => {
            if pretty {
                let body = render_select(subquery, true, 1);
                format!("{keyword} (\n{body}\n) AS {}", from.name)
            } else {
                let body = render_select(subquery, false, indent);
                format!("{keyword} ({body}) AS {}", from.name)
            }
        }
    }
}

fn row_window(select: &SqlSelect) -> Option<String> {
    if select.offset_fetch {
        let mut text = format!("OFFSET {} ROWS", select.offset);
        if let Some(limit) = select.limit {
            text.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
        }
        return Some(text);
    }
    match (select.limit, select.offset) {
        (Some(limit), 0) => Some(format!("LIMIT {limit}")),
        (Some(limit), offset) => Some(format!("LIMIT {limit} OFFSET {offset}")),
        (None, 0) => None,
        (None, offset) => Some(format!("OFFSET {offset}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stmt::SqlColumn;

    fn column(expr: &str) -> SqlColumn {
        SqlColumn {
            expr: expr.to_string(),
            alias: None,
        }
    }

    fn basic_select() -> SqlSelect {
        SqlSelect {
            projection: vec![column("name"), column("salary")],
            from: Some(SqlFrom {
                name: "employees".to_string(),
                subquery: None,
            }),
            where_: vec!["department = 'eng'".to_string()],
            ..SqlSelect::default()
        }
    }

    #[test]
    fn test_compact_single_line() {
        let statement = SqlStatement {
            ctes: Vec::new(),
            body: basic_select(),
        };
        assert_eq!(
            render(&[statement], false),
            "SELECT name, salary FROM employees WHERE department = 'eng'"
        );
    }

    #[test]
    fn test_pretty_one_clause_per_line() {
        let statement = SqlStatement {
            ctes: Vec::new(),
            body: basic_select(),
        };
        assert_eq!(
            render(&[statement], true),
            "SELECT name, salary\nFROM employees\nWHERE department = 'eng'"
        );
    }

    #[test]
    fn test_pretty_cte_layout() {
        let cte = SqlSelect {
            from: Some(SqlFrom {
                name: "employees".to_string(),
                subquery: None,
            }),
            order_by: vec!["salary DESC".to_string()],
            limit: Some(10),
            ..SqlSelect::default()
        };
        let body = SqlSelect {
            projection: vec![column("name")],
            from: Some(SqlFrom {
                name: "top_earners".to_string(),
                subquery: None,
            }),
            ..SqlSelect::default()
        };
        let statement = SqlStatement {
            ctes: vec![("top_earners".to_string(), cte)],
            body,
        };
        assert_eq!(
            render(&[statement], true),
            "WITH top_earners AS (\n  SELECT *\n  FROM employees\n  ORDER BY salary DESC\n  LIMIT 10\n)\nSELECT name\nFROM top_earners"
        );
    }

    #[test]
    fn test_long_projection_wraps() {
        let names: Vec<SqlColumn> = (0..12)
            .map(|i| column(&format!("some_long_column_name_{i}")))
            .collect();
        let select = SqlSelect {
            projection: names,
            from: Some(SqlFrom {
                name: "wide_table".to_string(),
                subquery: None,
            }),
            ..SqlSelect::default()
        };
        let statement = SqlStatement {
            ctes: Vec::new(),
            body: select,
        };
        let text = render(&[statement.clone()], true);
        assert!(text.starts_with("SELECT\n  some_long_column_name_0,\n"));
        assert!(text.contains("\n  some_long_column_name_11\nFROM wide_table"));

        // Compact mode never wraps
        let compact = render(&[statement], false);
        assert!(!compact.contains('\n'));
    }

    #[test]
    fn test_offset_without_limit() {
        let select = SqlSelect {
            from: Some(SqlFrom {
                name: "t".to_string(),
                subquery: None,
            }),
            offset: 4,
            ..SqlSelect::default()
        };
        let statement = SqlStatement {
            ctes: Vec::new(),
            body: select,
        };
        assert_eq!(render(&[statement], false), "SELECT * FROM t OFFSET 4");
    }

    #[test]
    fn test_offset_fetch_rendering() {
        let select = SqlSelect {
            from: Some(SqlFrom {
                name: "t".to_string(),
                subquery: None,
            }),
            order_by: vec!["x".to_string()],
            limit: Some(16),
            offset: 4,
            offset_fetch: true,
            ..SqlSelect::default()
        };
        let statement = SqlStatement {
            ctes: Vec::new(),
            body: select,
        };
        assert_eq!(
            render(&[statement], false),
            "SELECT * FROM t ORDER BY x OFFSET 4 ROWS FETCH NEXT 16 ROWS ONLY"
        );
    }

    #[test]
    fn test_statements_separated_by_semicolons() {
        let statement = SqlStatement {
            ctes: Vec::new(),
            body: basic_select(),
        };
        let text = render(&[statement.clone(), statement], false);
        assert_eq!(text.matches(';').count(), 1);
        assert!(text.contains(";\n\n"));
    }

    #[test]
    fn test_formatting_is_stable() {
        let statement = SqlStatement {
            ctes: Vec::new(),
            body: basic_select(),
        };
        let once = render(std::slice::from_ref(&statement), true);
        let twice = render(std::slice::from_ref(&statement), true);
        assert_eq!(once, twice);
    }
}
