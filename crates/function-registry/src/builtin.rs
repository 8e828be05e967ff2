// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Built-in transform and function tables

use crate::{FunctionClass, FunctionSpec, TransformKind, TransformSpec};

/// All built-in transforms, in documentation order
pub fn builtin_transforms() -> Vec<TransformSpec> {
    vec![
        TransformSpec {
            name: "from",
            kind: TransformKind::From,
            min_args: 1,
            max_args: 1,
            named_params: &[],
        },
        TransformSpec {
            name: "select",
            kind: TransformKind::Select,
            min_args: 1,
            max_args: 1,
            named_params: &[],
        },
        TransformSpec {
            name: "derive",
            kind: TransformKind::Derive,
            min_args: 1,
            max_args: 1,
            named_params: &[],
        },
        TransformSpec {
            name: "filter",
            kind: TransformKind::Filter,
            min_args: 1,
            max_args: 1,
            named_params: &[],
        },
        TransformSpec {
            name: "aggregate",
            kind: TransformKind::Aggregate,
            min_args: 1,
            max_args: 1,
            named_params: &[],
        },
        // group {keys} (sub-pipeline)
        TransformSpec {
            name: "group",
            kind: TransformKind::Group,
            min_args: 2,
            max_args: 2,
            named_params: &[],
        },
        TransformSpec {
            name: "sort",
            kind: TransformKind::Sort,
            min_args: 1,
            max_args: 1,
            named_params: &[],
        },
        TransformSpec {
            name: "take",
            kind: TransformKind::Take,
            min_args: 1,
            max_args: 1,
            named_params: &[],
        },
        // join <relation> <condition> side:inner|left|right|full
        TransformSpec {
            name: "join",
            kind: TransformKind::Join,
            min_args: 2,
            max_args: 2,
            named_params: &["side"],
        },
        // window (sub-pipeline) partition:{..} sort_by:{..} rows:a..b range:a..b
        TransformSpec {
            name: "window",
            kind: TransformKind::Window,
            min_args: 1,
            max_args: 1,
            named_params: &["partition", "sort_by", "rows", "range"],
        },
        TransformSpec {
            name: "append",
            kind: TransformKind::Append,
            min_args: 1,
            max_args: 1,
            named_params: &[],
        },
    ]
}

/// All built-in functions, in documentation order
pub fn builtin_functions() -> Vec<FunctionSpec> {
    vec![
        // Aggregates
        FunctionSpec {
            name: "count",
            class: FunctionClass::Aggregate,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "sum",
            class: FunctionClass::Aggregate,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "average",
            class: FunctionClass::Aggregate,
            min_args: 1,
            max_args: 1,
            sql_name: Some("avg"),
        },
        FunctionSpec {
            name: "min",
            class: FunctionClass::Aggregate,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "max",
            class: FunctionClass::Aggregate,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "stddev",
            class: FunctionClass::Aggregate,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        // Window functions
        FunctionSpec {
            name: "row_number",
            class: FunctionClass::Window,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "rank",
            class: FunctionClass::Window,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "dense_rank",
            class: FunctionClass::Window,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "lag",
            class: FunctionClass::Window,
            min_args: 2,
            max_args: 2,
            sql_name: None,
        },
        FunctionSpec {
            name: "lead",
            class: FunctionClass::Window,
            min_args: 2,
            max_args: 2,
            sql_name: None,
        },
        // Scalar functions
        FunctionSpec {
            name: "abs",
            class: FunctionClass::Scalar,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "round",
            class: FunctionClass::Scalar,
            min_args: 1,
            max_args: 2,
            sql_name: None,
        },
        FunctionSpec {
            name: "lower",
            class: FunctionClass::Scalar,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "upper",
            class: FunctionClass::Scalar,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "length",
            class: FunctionClass::Scalar,
            min_args: 1,
            max_args: 1,
            sql_name: None,
        },
        FunctionSpec {
            name: "coalesce",
            class: FunctionClass::Scalar,
            min_args: 2,
            max_args: 8,
            sql_name: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_names_are_unique() {
        let transforms = builtin_transforms();
        let mut names: Vec<&str> = transforms.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), transforms.len());
    }

    #[test]
    fn test_function_names_are_unique() {
        let functions = builtin_functions();
        let mut names: Vec<&str> = functions.iter().map(|f| f.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), functions.len());
    }

    #[test]
    fn test_average_renders_as_avg() {
        let functions = builtin_functions();
        let average = functions.iter().find(|f| f.name == "average").unwrap();
        assert_eq!(average.sql_name(), "avg");
        let sum = functions.iter().find(|f| f.name == "sum").unwrap();
        assert_eq!(sum.sql_name(), "sum");
    }
}
