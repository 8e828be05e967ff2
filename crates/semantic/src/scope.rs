// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Pipeline scope
//!
//! Tracks which column names are visible at each step of a pipeline and
//! which table each unqualified name resolves against.
//!
//! A scope holds two layers:
//!
//! - **tables**: the source tables brought in by `from` and `join`. While a
//!   table is *open*, any not-yet-seen unqualified name may resolve to a
//!   fresh column of that table (schemas are not declared, so columns are
//!   discovered from use). `select` and `aggregate` close all tables.
//! - **columns**: names made explicitly visible by `select`, `derive`,
//!   `aggregate`, or `window`. Later bindings shadow earlier ones.
//!
//! Lookup failures return structured outcomes so the resolver can attach
//! its own diagnostics and hints.

use crate::pl::DeclId;
use std::collections::{HashMap, HashSet};

/// A source table visible in a pipeline scope
#[derive(Debug, Clone)]
pub struct TableBinding {
    /// The name the table is qualified by (`e.salary`); for plain sources
    /// this is the table name itself
    pub alias: String,

    /// The underlying physical table or relation name
    pub table: String,

    /// Open tables still admit undiscovered columns
    pub open: bool,
}

/// Outcome of a name lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The name resolved to an existing declaration
    Found(DeclId),

    /// The name is a fresh column of exactly one open table
    NewColumn { table: String, alias: String },

    /// The name could belong to more than one open table
    Ambiguous { candidates: Vec<String> },

    /// No visible column or open table matches
    Unknown,

    /// The qualifier names no visible table
    UnknownQualifier { qualifier: String },
}

/// Visible names at one step of a pipeline
#[derive(Debug, Clone, Default)]
pub struct Scope {
    tables: Vec<TableBinding>,

    /// Explicitly visible columns, latest binding shadowing earlier ones
    columns: Vec<(String, DeclId)>,

    /// Cache of discovered source-table columns, keyed by (alias, column),
    /// so repeated references share one declaration
    discovered: HashMap<(String, String), DeclId>,

    /// Keys of `discovered` entries first referenced without a qualifier.
    /// Only these keep a bare name resolvable once several tables are open;
    /// a qualified reference in a join condition must not legitimize later
    /// bare uses of the same name.
    unqualified: HashSet<(String, String)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a source table into scope under an alias
    ///
    /// `open` tables admit column discovery; a `let`-bound relation whose
    /// column set was narrowed by `select` or `aggregate` comes in closed,
    /// with its known columns pre-registered by the resolver. Returns
    /// `false` when the alias collides with a table already in scope.
    pub fn add_table(&mut self, alias: &str, table: &str, open: bool) -> bool {
        if self.tables.iter().any(|t| t.alias == alias) {
            return false;
        }
        self.tables.push(TableBinding {
            alias: alias.to_string(),
            table: table.to_string(),
            open,
        });
        true
    }

    /// Close every table: after `select` or `aggregate`, no further columns
    /// can be discovered from the sources
    pub fn close_tables(&mut self) {
        for table in &mut self.tables {
            table.open = false;
        }
    }

    /// Make a named column explicitly visible
    pub fn bind_column(&mut self, name: &str, decl: DeclId) {
        self.columns.push((name.to_string(), decl));
    }

    /// Replace the visible column set (effect of `select` / `aggregate`)
    ///
    /// Also forgets discovered source columns: after the column set is
    /// replaced, the sources' columns are no longer addressable, qualified
    /// or not.
    pub fn replace_columns(&mut self, columns: Vec<(String, DeclId)>) {
        self.columns = columns;
        self.close_tables();
        self.discovered.clear();
        self.unqualified.clear();
    }

    /// Record a column discovered from an unqualified reference so later
    /// references reuse the same declaration
    pub fn record_discovered(&mut self, alias: &str, column: &str, decl: DeclId) {
        let key = (alias.to_string(), column.to_string());
        self.unqualified.insert(key.clone());
        self.discovered.insert(key, decl);
    }

    /// Record a column discovered from a qualified reference; later
    /// references to it must stay qualified while several tables are open
    pub fn record_discovered_qualified(&mut self, alias: &str, column: &str, decl: DeclId) {
        self.discovered
            .insert((alias.to_string(), column.to_string()), decl);
    }

    /// Resolve an unqualified name
    pub fn lookup(&self, name: &str) -> Lookup {
        // Explicit bindings win; latest shadows earliest
        if let Some((_, decl)) = self.columns.iter().rev().find(|(n, _)| n == name) {
            return Lookup::Found(*decl);
        }

        let open: Vec<&TableBinding> = self.tables.iter().filter(|t| t.open).collect();
        match open.len() {
            0 => Lookup::Unknown,
            1 => {
                let table = open[0];
                if let Some(decl) = self
                    .discovered
                    .get(&(table.alias.clone(), name.to_string()))
                {
                    Lookup::Found(*decl)
                } else {
                    Lookup::NewColumn {
                        table: table.table.clone(),
                        alias: table.alias.clone(),
                    }
                }
            }
            _ => {
                // A column discovered from an earlier unqualified reference
                // under exactly one alias stays unambiguous; qualified
                // discoveries do not count here
                let known: Vec<DeclId> = open
                    .iter()
                    .filter(|t| {
                        self.unqualified
                            .contains(&(t.alias.clone(), name.to_string()))
                    })
                    .filter_map(|t| self.discovered.get(&(t.alias.clone(), name.to_string())))
                    .copied()
                    .collect();
                if known.len() == 1 {
                    return Lookup::Found(known[0]);
                }
                Lookup::Ambiguous {
                    candidates: open.iter().map(|t| t.alias.clone()).collect(),
                }
            }
        }
    }

    /// Resolve a qualified name (`alias.column`)
    pub fn lookup_qualified(&self, qualifier: &str, name: &str) -> Lookup {
        let Some(table) = self.tables.iter().find(|t| t.alias == qualifier) else {
            return Lookup::UnknownQualifier {
                qualifier: qualifier.to_string(),
            };
        };
        if let Some(decl) = self
            .discovered
            .get(&(qualifier.to_string(), name.to_string()))
        {
            return Lookup::Found(*decl);
        }
        if !table.open {
            return Lookup::Unknown;
        }
        Lookup::NewColumn {
            table: table.table.clone(),
            alias: table.alias.clone(),
        }
    }

    /// Aliases of all tables currently in scope
    pub fn table_aliases(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.alias.clone()).collect()
    }

    /// Currently visible explicit column names, for hints
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.columns.iter().map(|(n, _)| n.clone()).collect();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_open_table_discovers_columns() {
        let mut scope = Scope::new();
        assert!(scope.add_table("employees", "employees", true));

        match scope.lookup("salary") {
            Lookup::NewColumn { table, alias } => {
                assert_eq!(table, "employees");
                assert_eq!(alias, "employees");
            }
            other => panic!("unexpected lookup outcome: {:?}", other),
        }

        scope.record_discovered("employees", "salary", DeclId(7));
        assert_eq!(scope.lookup("salary"), Lookup::Found(DeclId(7)));
    }

    #[test]
    fn test_two_open_tables_are_ambiguous() {
        let mut scope = Scope::new();
        scope.add_table("employees", "employees", true);
        scope.add_table("orders", "orders", true);

        match scope.lookup("id") {
            Lookup::Ambiguous { candidates } => {
                assert_eq!(candidates, vec!["employees", "orders"]);
            }
            other => panic!("unexpected lookup outcome: {:?}", other),
        }

        // Qualification disambiguates
        assert!(matches!(
            scope.lookup_qualified("orders", "id"),
            Lookup::NewColumn { .. }
        ));
    }

    #[test]
    fn test_discovered_column_stays_unambiguous_after_join() {
        let mut scope = Scope::new();
        scope.add_table("employees", "employees", true);
        scope.record_discovered("employees", "salary", DeclId(1));
        scope.add_table("orders", "orders", true);

        assert_eq!(scope.lookup("salary"), Lookup::Found(DeclId(1)));
    }

    #[test]
    fn test_qualified_discovery_keeps_bare_name_ambiguous() {
        let mut scope = Scope::new();
        scope.add_table("employees", "employees", true);
        scope.add_table("orders", "orders", true);
        scope.record_discovered_qualified("employees", "id", DeclId(1));

        match scope.lookup("id") {
            Lookup::Ambiguous { candidates } => {
                assert_eq!(candidates, vec!["employees", "orders"]);
            }
            other => panic!("unexpected lookup outcome: {:?}", other),
        }

        // The qualified path still reuses the declaration
        assert_eq!(
            scope.lookup_qualified("employees", "id"),
            Lookup::Found(DeclId(1))
        );
    }

    #[test]
    fn test_select_closes_tables() {
        let mut scope = Scope::new();
        scope.add_table("employees", "employees", true);
        scope.replace_columns(vec![("name".to_string(), DeclId(0))]);

        assert_eq!(scope.lookup("name"), Lookup::Found(DeclId(0)));
        assert_eq!(scope.lookup("salary"), Lookup::Unknown);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let mut scope = Scope::new();
        assert!(scope.add_table("t", "employees", true));
        assert!(!scope.add_table("t", "orders", false));
    }

    #[test]
    fn test_shadowing_prefers_latest_binding() {
        let mut scope = Scope::new();
        scope.bind_column("x", DeclId(0));
        scope.bind_column("x", DeclId(1));
        assert_eq!(scope.lookup("x"), Lookup::Found(DeclId(1)));
    }
}
