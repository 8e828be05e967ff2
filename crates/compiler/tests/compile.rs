// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! End-to-end compilation tests

use pipesql::{
    compile, list_dialects, parse_to_resolved, relational_to_sql, resolved_to_relational,
    Dialect, DiagnosticKind, Options, Target,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn plain_options() -> Options {
    Options {
        signature_comment: false,
        ..Options::default()
    }
}

#[test]
fn test_employees_example_with_default_options() {
    init_tracing();
    let source = "from employees\nfilter department == \"eng\"\nselect {name, salary}";
    let sql = compile(source, &Options::default()).unwrap();
    assert_eq!(
        sql,
        "SELECT name, salary\nFROM employees\nWHERE department = 'eng'\n-- Generated by pipesql 0.1.0"
    );
}

#[test]
fn test_pipe_separated_steps_compile_identically() {
    let newline = "from employees\nfilter department == \"eng\"\nselect {name, salary}";
    let piped = "from employees | filter department == \"eng\" | select {name, salary}";
    assert_eq!(
        compile(newline, &Options::default()).unwrap(),
        compile(piped, &Options::default()).unwrap()
    );
}

#[test]
fn test_compact_output_without_signature() {
    let source = "from employees\nfilter department == \"eng\"\nselect {name, salary}";
    let options = Options {
        format: false,
        signature_comment: false,
        target: Target::Any,
    };
    assert_eq!(
        compile(source, &options).unwrap(),
        "SELECT name, salary FROM employees WHERE department = 'eng'"
    );
}

#[test]
fn test_unknown_column_fails_closed() {
    let source = "from employees\nselect {name}\nselect {missing_col}";
    let err = compile(source, &Options::default()).unwrap_err();
    assert_eq!(err.len(), 1, "expected exactly one diagnostic: {err}");
    let diagnostic = err.iter().next().unwrap();
    assert!(matches!(
        diagnostic.kind,
        DiagnosticKind::NameResolutionError { .. }
    ));
    assert_eq!(&source[diagnostic.span.start..diagnostic.span.end], "missing_col");
}

#[test]
fn test_sqlite_window_capability_error() {
    let source = "from employees\nwindow sort_by:{-salary} (derive {r = rank salary})";
    let options = Options {
        target: Target::Dialect(Dialect::Sqlite),
        ..Options::default()
    };
    let err = compile(source, &options).unwrap_err();
    assert!(err.iter().any(|d| matches!(
        &d.kind,
        DiagnosticKind::DialectCapabilityError { dialect, .. } if dialect == "sqlite"
    )));

    // Same query succeeds on a dialect with window support
    let options = Options {
        target: Target::Dialect(Dialect::Postgres),
        ..Options::default()
    };
    assert!(compile(source, &options).is_ok());
}

#[test]
fn test_header_target_selects_dialect() {
    let source = "pipesql version:\"0.1\" target:mssql\n\nfrom products\nsort {-price}\ntake 5";
    let sql = compile(source, &plain_options()).unwrap();
    assert!(sql.starts_with("SELECT TOP 5"), "got: {sql}");
}

#[test]
fn test_explicit_target_overrides_header() {
    let source = "pipesql version:\"0.1\" target:mssql\n\nfrom products\nsort {-price}\ntake 5";
    let options = Options {
        signature_comment: false,
        target: Target::Dialect(Dialect::Postgres),
        ..Options::default()
    };
    let sql = compile(source, &options).unwrap();
    assert!(sql.contains("LIMIT 5"), "got: {sql}");
}

#[test]
fn test_unknown_header_target_is_rejected() {
    let source = "pipesql target:oracle\n\nfrom t\nselect {x}";
    let err = compile(source, &Options::default()).unwrap_err();
    assert!(err.iter().any(|d| matches!(
        &d.kind,
        DiagnosticKind::NameResolutionError { .. }
    )));
}

#[test]
fn test_let_relation_compiles_to_cte() {
    let source = "let top_earners = from employees | sort {-salary} | take 10\n\nfrom top_earners\nselect {name}";
    let sql = compile(source, &plain_options()).unwrap();
    assert_eq!(
        sql,
        "WITH top_earners AS (\n  SELECT *\n  FROM employees\n  ORDER BY salary DESC\n  LIMIT 10\n)\nSELECT name\nFROM top_earners"
    );
}

#[test]
fn test_multiple_pipelines_emit_separate_statements() {
    let source = "from employees\nselect {name}\n\nfrom orders\nselect {total}";
    let sql = compile(source, &plain_options()).unwrap();
    assert_eq!(sql, "SELECT name\nFROM employees;\n\nSELECT total\nFROM orders");
}

#[test]
fn test_compilation_is_deterministic() {
    let source = "from employees\njoin salaries (employees.id == salaries.emp_id)\nderive {gross = salaries.amount * 1.2}\nsort {-gross}\ntake 3";
    let first = compile(source, &Options::default()).unwrap();
    let second = compile(source, &Options::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_stage_boundaries_round_trip() {
    let source = "from employees\nfilter department == \"eng\"\nselect {name, salary}";
    let resolved = parse_to_resolved(source).unwrap();
    let relational = resolved_to_relational(&resolved).unwrap();
    let sql = relational_to_sql(&relational, None).unwrap();
    assert_eq!(sql, compile(source, &plain_options()).unwrap());
}

#[test]
fn test_stage_documents_carry_format_version() {
    let source = "from t\nselect {x}";
    let resolved = parse_to_resolved(source).unwrap();
    let value: serde_json::Value = serde_json::from_str(&resolved).unwrap();
    assert_eq!(value["format_version"], 1);
}

#[test]
fn test_version_mismatch_is_rejected() {
    let source = "from t\nselect {x}";
    let resolved = parse_to_resolved(source).unwrap();
    let doctored = resolved.replacen("\"format_version\":1", "\"format_version\":99", 1);
    assert_ne!(resolved, doctored, "replacement should have applied");
    let err = resolved_to_relational(&doctored).unwrap_err();
    assert!(err.iter().any(|d| matches!(
        d.kind,
        DiagnosticKind::FormatVersionMismatch {
            expected: 1,
            found: 99
        }
    )));
}

#[test]
fn test_list_dialects_is_stable_and_starts_with_ansi() {
    let first: Vec<String> = list_dialects().into_iter().map(|d| d.name).collect();
    let second: Vec<String> = list_dialects().into_iter().map(|d| d.name).collect();
    assert_eq!(first, second);
    assert_eq!(first[0], "ansi");
    assert_eq!(first.len(), 9);
}

#[test]
fn test_no_sql_on_any_error() {
    // A failing second pipeline fails the whole compilation even though
    // the first would generate fine. The second pipeline narrows its
    // column set first, so `nope` cannot be discovered from use.
    let source = "from employees\nselect {name}\n\nfrom orders\nselect {total}\nselect {nope}";
    let err = compile(source, &Options::default()).unwrap_err();
    assert!(err.iter().any(|d| matches!(
        d.kind,
        DiagnosticKind::NameResolutionError { .. }
    )));
}
