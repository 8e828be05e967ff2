// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Versioned interchange documents
//!
//! The intermediate representations (resolved AST and RQ) cross the stage
//! boundary as serialized JSON documents so that external tooling can
//! inspect and replay individual stages. Every document is wrapped with a
//! format version; consuming a document produced by an incompatible build
//! is reported as a distinct version-mismatch diagnostic, never a silent
//! misparse.

use pipesql_diagnostics::{Diagnostic, DiagnosticKind, Span};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Version of the serialized interchange format
pub const FORMAT_VERSION: u16 = 1;

/// Envelope for a serialized intermediate representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
    pub format_version: u16,
    pub payload: T,
}

impl<T> Document<T> {
    pub fn new(payload: T) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            payload,
        }
    }
}

/// Serialize a payload into a versioned JSON document
pub fn to_document_json<T: Serialize>(payload: &T) -> Result<String, Diagnostic> {
    let document = Document {
        format_version: FORMAT_VERSION,
        payload,
    };
    serde_json::to_string(&document).map_err(|e| {
        Diagnostic::error(
            DiagnosticKind::SyntaxError {
                message: format!("failed to serialize intermediate document: {}", e),
            },
            Span::default(),
        )
    })
}

/// Parse a versioned JSON document, checking the format version first
pub fn from_document_json<T: DeserializeOwned>(json: &str) -> Result<T, Diagnostic> {
    // Check the version before deserializing the payload, so a payload
    // shape change in a newer format is not misreported as corrupt JSON
    #[derive(Deserialize)]
    struct VersionOnly {
        format_version: u16,
    }

    let version: VersionOnly = serde_json::from_str(json).map_err(|e| {
        Diagnostic::error(
            DiagnosticKind::SyntaxError {
                message: format!("malformed intermediate document: {}", e),
            },
            Span::default(),
        )
    })?;

    if version.format_version != FORMAT_VERSION {
        return Err(Diagnostic::error(
            DiagnosticKind::FormatVersionMismatch {
                expected: FORMAT_VERSION,
                found: version.format_version,
            },
            Span::default(),
        ));
    }

    let document: Document<T> = serde_json::from_str(json).map_err(|e| {
        Diagnostic::error(
            DiagnosticKind::SyntaxError {
                message: format!("malformed intermediate document: {}", e),
            },
            Span::default(),
        )
    })?;
    Ok(document.payload)
}
