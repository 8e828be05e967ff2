// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # pipesql - Function Registry
//!
//! The standard-library table of built-in transforms and functions that the
//! resolver matches calls against.
//!
//! Two kinds of entries:
//!
//! - **Transforms** shape relations inside a pipeline (`from`, `filter`,
//!   `select`, ...). Each carries its positional arity and the named
//!   parameters it accepts.
//! - **Functions** compute values inside expressions (`sum`, `lower`,
//!   `row_number`, ...). Each carries a [`FunctionClass`] deciding where it
//!   may appear: scalar anywhere, aggregates inside `aggregate`, window
//!   functions inside `window`.
//!
//! The registry is a pure lookup table with no per-dialect variation;
//! dialect capability checks happen at SQL generation, not at resolution.

pub mod builtin;
pub mod registry;

pub use builtin::{builtin_functions, builtin_transforms};
pub use registry::Registry;

use serde::{Deserialize, Serialize};

/// Which relational transform a call names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    From,
    Select,
    Derive,
    Filter,
    Aggregate,
    Group,
    Sort,
    Take,
    Join,
    Window,
    Append,
}

/// Signature of a built-in transform
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformSpec {
    pub name: &'static str,
    pub kind: TransformKind,
    /// Minimum number of positional arguments
    pub min_args: usize,
    /// Maximum number of positional arguments
    pub max_args: usize,
    /// Accepted named parameters
    pub named_params: &'static [&'static str],
}

impl TransformSpec {
    /// Render the accepted positional arity for error messages
    pub fn arity_description(&self) -> String {
        if self.min_args == self.max_args {
            format!("{} argument(s)", self.min_args)
        } else {
            format!("{} to {} arguments", self.min_args, self.max_args)
        }
    }
}

/// Where a built-in function may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionClass {
    /// Row-level function, usable in any expression
    Scalar,
    /// Aggregation over a group (`sum`, `count`, ...)
    Aggregate,
    /// Window function (`row_number`, `lag`, ...)
    Window,
}

/// Signature of a built-in function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub class: FunctionClass,
    pub min_args: usize,
    pub max_args: usize,
    /// The SQL function name, when it differs from the pipesql name
    pub sql_name: Option<&'static str>,
}

impl FunctionSpec {
    /// The name to emit in generated SQL (upper-cased by the generator)
    pub fn sql_name(&self) -> &'static str {
        self.sql_name.unwrap_or(self.name)
    }

    pub fn arity_description(&self) -> String {
        if self.min_args == self.max_args {
            format!("{} argument(s)", self.min_args)
        } else {
            format!("{} to {} arguments", self.min_args, self.max_args)
        }
    }
}
