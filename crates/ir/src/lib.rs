// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # pipesql - Relational IR
//!
//! The Relational-Query IR (RQ): a normalized, per-relation sequence of
//! relational operators with identity-tagged columns.
//!
//! Names are resolved once, before lowering; in RQ every column is
//! referenced by a stable numeric identity ([`rq::Cid`]) assigned during
//! lowering, so the SQL generator never needs a symbol table. Declared
//! source names are kept only as rendering hints on the column arena.
//!
//! This crate also owns:
//!
//! - the [`dialect`] registry: supported target dialects and their
//!   capability records, in a stable enumeration order
//! - the [`document`] wrapper: the versioned serialized form used to pass
//!   intermediate representations across the stage boundary

pub mod dialect;
pub mod document;
pub mod rq;

pub use dialect::{Capabilities, ConcatStyle, Dialect, DialectDescriptor, LimitStyle, QuoteStyle};
pub use document::{Document, FORMAT_VERSION, from_document_json, to_document_json};
pub use rq::{
    Cid, ColumnDecl, ColumnOrigin, JoinSide, Relation, RelationId, RelationalModule, RqBinOp,
    RqExpr, RqLiteral, RqOp, RqUnOp, SortKey, TableSource, WindowFrame, WindowFrameKind,
};
