// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Source positions attached to tokens, AST nodes, and diagnostics

use serde::{Deserialize, Serialize};

/// A range in the original source text
///
/// Byte offsets identify the exact substring; line and column of the start
/// position are carried alongside so reports never need to re-scan the
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Starting byte offset
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    /// Line number of `start` (1-based)
    pub line: usize,
    /// Column number of `start` (1-based, bytes)
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// The smallest span covering both `self` and `other`
    pub fn merge(self, other: Span) -> Span {
        let (first, _) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: first.line,
            column: first.column,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The start position as a standalone location
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            byte_offset: self.start,
            line: self.line,
            column: self.column,
        }
    }
}

/// A single position in the original source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Byte offset in the source (0-based)
    pub byte_offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, bytes)
    pub column: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_earliest_position() {
        let a = Span::new(10, 14, 2, 3);
        let b = Span::new(20, 25, 3, 1);

        let merged = a.merge(b);
        assert_eq!(merged.start, 10);
        assert_eq!(merged.end, 25);
        assert_eq!(merged.line, 2);
        assert_eq!(merged.column, 3);

        // Order of operands must not matter for the range
        let flipped = b.merge(a);
        assert_eq!(flipped.start, 10);
        assert_eq!(flipped.end, 25);
        assert_eq!(flipped.line, 2);
    }

    #[test]
    fn test_location() {
        let span = Span::new(5, 8, 1, 6);
        let loc = span.location();
        assert_eq!(loc.byte_offset, 5);
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 6);
    }
}
