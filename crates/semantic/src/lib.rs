// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # pipesql - Semantic analysis
//!
//! Name resolution: turns the parser's AST into the resolved pipeline tree
//! ([`pl`]) consumed by lowering.
//!
//! The resolver walks each pipeline with a lexical [`scope::Scope`] seeded
//! from the `from` source, resolves column and relation references into
//! declaration bindings, matches transform and function calls against the
//! builtin registry, inlines user-defined functions, and materializes
//! implicit arguments. After this stage no name lookup happens anywhere in
//! the compiler.

pub mod pl;
pub mod resolver;
pub mod scope;

pub use pl::{
    BindingKind, Decl, DeclId, FrameKind, JoinSide, NamedExpr, PlExpr, PlFrame, PlSortKey,
    RelationSource, ResolvedModule, ResolvedPipeline, ResolvedTransform, TransformCall,
};
pub use resolver::{MAX_INLINE_DEPTH, resolve};
pub use scope::{Lookup, Scope};
