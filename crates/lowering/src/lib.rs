// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # pipesql - Lowering
//!
//! Converts the resolved pipeline tree into the relational IR.
//!
//! Lowering assigns every referenced column a stable identity ([`Cid`])
//! in the module-wide arena, so downstream stages never resolve names.
//! Column identities carry provenance: a source-table column, a computed
//! value, a table wildcard, or a re-tagged copy of a column produced by
//! another relation (the `let`-bound relation boundary).
//!
//! Constructs that resolved successfully but have no relational rendering
//! (array literals in scalar positions, `this` outside `count`) are
//! rejected here with an unsupported-construct diagnostic.

mod lower;

pub use lower::lower;

#[doc(inline)]
pub use pipesql_ir::Cid;
