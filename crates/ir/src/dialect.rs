// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Dialect registry
//!
//! Supported target SQL dialects and their capability records.
//!
//! ## Design
//!
//! The SQL generator is a single implementation driven by the capability
//! record returned from [`Dialect::capabilities`]; it never matches on a
//! dialect name directly. Adding a dialect means adding one enum variant
//! and one capability record here.
//!
//! [`Dialect::all`] enumerates dialects in a fixed order, so the externally
//! observable dialect listing is stable and deterministic across calls.

use serde::{Deserialize, Serialize};

/// Supported target SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Dialect {
    /// Generic ANSI SQL, the default target
    Ansi,
    Postgres,
    MySql,
    /// SQLite at the version targeted here, which predates window functions
    Sqlite,
    DuckDb,
    ClickHouse,
    BigQuery,
    Snowflake,
    MsSql,
}

impl Dialect {
    /// All dialects in the stable registry order
    pub fn all() -> &'static [Dialect] {
        &[
            Dialect::Ansi,
            Dialect::Postgres,
            Dialect::MySql,
            Dialect::Sqlite,
            Dialect::DuckDb,
            Dialect::ClickHouse,
            Dialect::BigQuery,
            Dialect::Snowflake,
            Dialect::MsSql,
        ]
    }

    /// The identifier used in query headers and the external interface
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Ansi => "ansi",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::DuckDb => "duckdb",
            Dialect::ClickHouse => "clickhouse",
            Dialect::BigQuery => "bigquery",
            Dialect::Snowflake => "snowflake",
            Dialect::MsSql => "mssql",
        }
    }

    /// Look a dialect up by its external identifier
    pub fn from_name(name: &str) -> Option<Dialect> {
        Dialect::all()
            .iter()
            .copied()
            .find(|d| d.name() == name)
    }

    /// The capability record consumed by the SQL generator
    pub fn capabilities(self) -> Capabilities {
        match self {
            Dialect::Ansi => Capabilities::default(),
            Dialect::Postgres | Dialect::DuckDb => Capabilities::default(),
            Dialect::MySql => Capabilities {
                quote_style: QuoteStyle::Backtick,
                string_concat: ConcatStyle::Function,
                ..Capabilities::default()
            },
            Dialect::Sqlite => Capabilities {
                window_functions: false,
                ..Capabilities::default()
            },
            Dialect::ClickHouse => Capabilities {
                quote_style: QuoteStyle::Backtick,
                ..Capabilities::default()
            },
            Dialect::BigQuery => Capabilities {
                quote_style: QuoteStyle::Backtick,
                ..Capabilities::default()
            },
            Dialect::Snowflake => Capabilities::default(),
            Dialect::MsSql => Capabilities {
                limit_style: LimitStyle::Top,
                quote_style: QuoteStyle::Bracket,
                string_concat: ConcatStyle::PlusOperator,
                ..Capabilities::default()
            },
        }
    }

    /// Descriptor exposed through the external dialect listing
    pub fn descriptor(self) -> DialectDescriptor {
        DialectDescriptor {
            name: self.name().to_string(),
            capabilities: self.capabilities(),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability flags consumed by the SQL generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Window functions (`OVER (...)`) are available
    pub window_functions: bool,

    /// Common table expressions (`WITH ...`) are available; without them,
    /// pipeline breakpoints nest subqueries instead
    pub ctes: bool,

    /// How a row window is written
    pub limit_style: LimitStyle,

    /// Identifier quoting characters
    pub quote_style: QuoteStyle,

    /// How string concatenation is written
    pub string_concat: ConcatStyle,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            window_functions: true,
            ctes: true,
            limit_style: LimitStyle::LimitOffset,
            quote_style: QuoteStyle::Double,
            string_concat: ConcatStyle::Operator,
        }
    }
}

/// Row-window clause syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `SELECT TOP n ...` with `OFFSET ... FETCH` for offsets
    Top,
}

/// Identifier quoting style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// `"identifier"`
    Double,
    /// `` `identifier` ``
    Backtick,
    /// `[identifier]`
    Bracket,
}

impl QuoteStyle {
    pub fn open(self) -> char {
        match self {
            QuoteStyle::Double => '"',
            QuoteStyle::Backtick => '`',
            QuoteStyle::Bracket => '[',
        }
    }

    pub fn close(self) -> char {
        match self {
            QuoteStyle::Double => '"',
            QuoteStyle::Backtick => '`',
            QuoteStyle::Bracket => ']',
        }
    }
}

/// String concatenation syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatStyle {
    /// `a || b`
    Operator,
    /// `CONCAT(a, b)`
    Function,
    /// `a + b`
    PlusOperator,
}

/// Externally visible description of one dialect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialectDescriptor {
    pub name: String,
    pub capabilities: Capabilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_is_stable() {
        let first: Vec<&str> = Dialect::all().iter().map(|d| d.name()).collect();
        let second: Vec<&str> = Dialect::all().iter().map(|d| d.name()).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], "ansi");
    }

    #[test]
    fn test_from_name_round_trip() {
        for dialect in Dialect::all() {
            assert_eq!(Dialect::from_name(dialect.name()), Some(*dialect));
        }
        assert_eq!(Dialect::from_name("oracle"), None);
    }

    #[test]
    fn test_sqlite_lacks_window_functions() {
        assert!(!Dialect::Sqlite.capabilities().window_functions);
        assert!(Dialect::Postgres.capabilities().window_functions);
        assert!(Dialect::DuckDb.capabilities().window_functions);
    }

    #[test]
    fn test_mssql_uses_top_and_brackets() {
        let caps = Dialect::MsSql.capabilities();
        assert_eq!(caps.limit_style, LimitStyle::Top);
        assert_eq!(caps.quote_style.open(), '[');
        assert_eq!(caps.quote_style.close(), ']');
    }

    #[test]
    fn test_descriptor_serializes() {
        let json = serde_json::to_string(&Dialect::Postgres.descriptor()).unwrap();
        assert!(json.contains("postgres"));
        assert!(json.contains("window_functions"));
    }
}
