// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Diagnostics
//!
//! Shared error reporting for every compiler stage.
//!
//! ## Design
//!
//! Each stage of the pipeline returns either a successful artifact or a
//! non-empty, ordered collection of diagnostics — never both. A
//! [`Diagnostic`] carries:
//!
//! - a [`DiagnosticKind`] identifying which stage rejected the input
//! - a [`Severity`] (error or warning)
//! - a [`Span`] pointing at the offending source substring
//! - an optional hint with a suggested fix
//!
//! Diagnostics within one stage are sorted by ascending span start before
//! being returned, so output is deterministic and reproducible.

pub mod report;
pub mod span;

pub use report::render_report;
pub use span::{SourceLocation, Span};

use serde::{Deserialize, Serialize};

/// Result type alias used at every stage boundary
///
/// `Err` always holds a non-empty [`Diagnostics`] collection.
pub type StageResult<T> = Result<T, Diagnostics>;

/// Severity of a reported diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// The stage-level taxonomy of compiler diagnostics
#[derive(Debug, thiserror::Error, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// Lexer or parser rejected the construct
    #[error("syntax error: {message}")]
    SyntaxError { message: String },

    /// An identifier could not be resolved, or resolved ambiguously
    #[error("name resolution error: {message}")]
    NameResolutionError { message: String },

    /// A call did not match any known signature
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatchError { expected: String, found: String },

    /// Resolved construct has no lowering rule
    #[error("unsupported construct: {construct}")]
    UnsupportedConstructError { construct: String },

    /// The chosen dialect cannot express a required feature
    #[error("dialect '{dialect}' does not support {feature}")]
    DialectCapabilityError { dialect: String, feature: String },

    /// Expression nesting exceeded the recursion limit
    #[error("expression is too deeply nested (depth {depth}, limit {limit})")]
    DepthLimitExceeded { depth: usize, limit: usize },

    /// A serialized intermediate document came from an incompatible build
    #[error("interchange format version mismatch: expected {expected}, found {found}")]
    FormatVersionMismatch { expected: u16, found: u16 },
}

/// A single reported error or warning with source position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// What went wrong and at which stage
    pub kind: DiagnosticKind,

    /// Error or warning
    pub severity: Severity,

    /// The offending source range
    pub span: Span,

    /// Optional suggestion shown below the message
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create an error-severity diagnostic
    pub fn error(kind: DiagnosticKind, span: Span) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            span,
            hint: None,
        }
    }

    /// Create a warning-severity diagnostic
    pub fn warning(kind: DiagnosticKind, span: Span) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            span,
            hint: None,
        }
    }

    /// Attach a hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// The rendered one-line message for this diagnostic
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

/// Ordered accumulation of diagnostics across one unit of work
///
/// Stages push diagnostics as they walk the input, then call
/// [`Diagnostics::into_result`] to turn the collected state into the
/// success-or-diagnostics value required at the stage boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Wrap a single diagnostic
    pub fn single(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// True if any collected diagnostic is an error (not just a warning)
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    /// Sort by ascending span start, keeping insertion order for ties
    pub fn sort_by_span(&mut self) {
        self.0.sort_by_key(|d| d.span.start);
    }

    /// Convert accumulated state into the stage-boundary result
    ///
    /// Returns `Ok(artifact)` when no errors were collected, otherwise the
    /// span-ordered diagnostics. Warnings alone do not fail the stage but
    /// are dropped with the successful artifact at this boundary; callers
    /// that need warnings inspect the collection before conversion.
    pub fn into_result<T>(mut self, artifact: T) -> StageResult<T> {
        if self.has_errors() {
            self.sort_by_span();
            Err(self)
        } else {
            Ok(artifact)
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", d.message())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        Span::new(start, end, 1, start + 1)
    }

    #[test]
    fn test_diagnostic_message_syntax_error() {
        let d = Diagnostic::error(
            DiagnosticKind::SyntaxError {
                message: "expected expression".to_string(),
            },
            span(3, 5),
        );
        assert!(d.message().contains("syntax error"));
        assert!(d.message().contains("expected expression"));
    }

    #[test]
    fn test_diagnostic_message_dialect_capability() {
        let d = Diagnostic::error(
            DiagnosticKind::DialectCapabilityError {
                dialect: "sqlite".to_string(),
                feature: "window functions".to_string(),
            },
            span(0, 4),
        );
        assert!(d.message().contains("sqlite"));
        assert!(d.message().contains("window functions"));
    }

    #[test]
    fn test_into_result_success() {
        let diagnostics = Diagnostics::new();
        let result = diagnostics.into_result(42);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_into_result_failure_is_span_ordered() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::SyntaxError {
                message: "later".to_string(),
            },
            span(10, 12),
        ));
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::SyntaxError {
                message: "earlier".to_string(),
            },
            span(2, 4),
        ));

        let err = diagnostics.into_result(()).unwrap_err();
        let starts: Vec<usize> = err.iter().map(|d| d.span.start).collect();
        assert_eq!(starts, vec![2, 10]);
    }

    #[test]
    fn test_warnings_do_not_fail_stage() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::SyntaxError {
                message: "trailing pipe".to_string(),
            },
            span(0, 1),
        ));
        assert!(!diagnostics.has_errors());
        assert!(diagnostics.into_result(()).is_ok());
    }

    #[test]
    fn test_diagnostic_serialization_round_trip() {
        let d = Diagnostic::error(
            DiagnosticKind::FormatVersionMismatch {
                expected: 1,
                found: 2,
            },
            span(0, 0),
        )
        .with_hint("recompile the producing side");

        let json = serde_json::to_string(&d).unwrap();
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
