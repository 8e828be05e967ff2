// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Human-readable rendering of diagnostics against the original source

use crate::{Diagnostics, Severity};

/// Render a full report for `diagnostics` against `source`
///
/// Each diagnostic is shown as:
///
/// ```text
/// error: name resolution error: unknown column 'missing_col'
///   --> 3:8
///    |
///  3 | select missing_col
///    |        ^^^^^^^^^^^
///    = hint: did you mean 'missing'?
/// ```
pub fn render_report(source: &str, diagnostics: &Diagnostics) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = String::new();

    for (i, d) in diagnostics.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let label = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        out.push_str(&format!("{}: {}\n", label, d.message()));
        out.push_str(&format!("  --> {}:{}\n", d.span.line, d.span.column));

        if let Some(line_text) = lines.get(d.span.line.saturating_sub(1)) {
            let gutter = d.span.line.to_string();
            let pad = " ".repeat(gutter.len());
            out.push_str(&format!("{} |\n", pad));
            out.push_str(&format!("{} | {}\n", gutter, line_text));

            let underline_start = d.span.column.saturating_sub(1).min(line_text.len());
            let max_len = (line_text.len() - underline_start).max(1);
            let underline_len = d.span.len().clamp(1, max_len);
            out.push_str(&format!(
                "{} | {}{}\n",
                pad,
                " ".repeat(underline_start),
                "^".repeat(underline_len)
            ));
        }

        if let Some(hint) = &d.hint {
            out.push_str(&format!("   = hint: {}\n", hint));
        }
    }

    out
}
