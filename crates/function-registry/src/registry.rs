// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

use crate::{FunctionSpec, TransformSpec, builtin};
use std::collections::HashMap;

/// Lookup table for builtin transforms and functions
///
/// Constructed once per compilation; lookups are by exact (case-sensitive)
/// name, matching the source language's lowercase convention.
#[derive(Debug, Clone)]
pub struct Registry {
    transforms: HashMap<&'static str, TransformSpec>,
    functions: HashMap<&'static str, FunctionSpec>,
}

impl Registry {
    /// Create a registry with all builtin entries loaded
    pub fn new() -> Self {
        Self {
            transforms: builtin::builtin_transforms()
                .into_iter()
                .map(|t| (t.name, t))
                .collect(),
            functions: builtin::builtin_functions()
                .into_iter()
                .map(|f| (f.name, f))
                .collect(),
        }
    }

    pub fn transform(&self, name: &str) -> Option<&TransformSpec> {
        self.transforms.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    pub fn is_transform(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FunctionClass, TransformKind};

    #[test]
    fn test_lookup_transform() {
        let registry = Registry::new();
        let filter = registry.transform("filter").unwrap();
        assert_eq!(filter.kind, TransformKind::Filter);
        assert_eq!(filter.min_args, 1);
    }

    #[test]
    fn test_lookup_function() {
        let registry = Registry::new();
        let sum = registry.function("sum").unwrap();
        assert_eq!(sum.class, FunctionClass::Aggregate);
    }

    #[test]
    fn test_unknown_names() {
        let registry = Registry::new();
        assert!(registry.transform("explode").is_none());
        assert!(registry.function("median").is_none());
        assert!(!registry.is_transform("sum"));
        assert!(!registry.is_function("filter"));
    }
}
