// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;
use std::fmt::Write;

use crate::embedding::{ComparisonReport, EmbeddingResult};

const PREVIEW_VALUES: usize = 10;
const TOP_TOKENS: usize = 5;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize section header (bold cyan)
pub fn colorize_header(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a label (dimmed)
pub fn colorize_label(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a token id (yellow)
pub fn colorize_token(id: i64, use_color: bool) -> String {
    if use_color {
        id.to_string().yellow().to_string()
    } else {
        id.to_string()
    }
}

/// Colorize pass/fail status
pub fn colorize_status(passed: bool, use_color: bool) -> String {
    match (passed, use_color) {
        (true, true) => "PASS".green().bold().to_string(),
        (false, true) => "FAIL".red().bold().to_string(),
        (true, false) => "PASS".to_string(),
        (false, false) => "FAIL".to_string(),
    }
}

fn preview(values: &[f32]) -> String {
    let shown: Vec<String> = values
        .iter()
        .take(PREVIEW_VALUES)
        .map(|v| format!("{:.6}", v))
        .collect();
    format!("[{}]", shown.join(", "))
}

/// Human-readable summary of one embedding result.
pub fn format_summary(text: &str, result: &EmbeddingResult, use_color: bool) -> String {
    let mut out = String::new();
    let label = |s: &str| colorize_label(s, use_color);

    let _ = writeln!(out, "{} {}", colorize_header("Text:", use_color), text);

    let _ = writeln!(out, "{}", colorize_header("Dense", use_color));
    let _ = writeln!(out, "  {} {}", label("length:"), result.dense_dim());
    let _ = writeln!(out, "  {} {}", label("first values:"), preview(&result.dense));

    let _ = writeln!(out, "{}", colorize_header("Sparse", use_color));
    let _ = writeln!(
        out,
        "  {} {}",
        label("non-zero tokens:"),
        result.lexical_weights.len()
    );
    for (id, weight) in result.lexical_weights.top(TOP_TOKENS) {
        let _ = writeln!(out, "    {}: {:.6}", colorize_token(id, use_color), weight);
    }

    let _ = writeln!(out, "{}", colorize_header("ColBERT", use_color));
    let _ = writeln!(
        out,
        "  {} {}",
        label("vectors:"),
        result.multi_vectors.len()
    );
    if let Some(first) = result.multi_vectors.first() {
        let _ = writeln!(out, "  {} {}", label("dimension:"), first.len());
        let _ = writeln!(out, "  {} {}", label("first vector:"), preview(first));
    }

    out
}

/// One-line status plus indented failures for a comparison.
pub fn format_comparison(text: &str, report: &ComparisonReport, use_color: bool) -> String {
    let mut out = format!(
        "{} {} (dense similarity {:.10})\n",
        colorize_status(report.passed(), use_color),
        text,
        report.dense_similarity
    );
    for failure in &report.failures {
        let _ = writeln!(out, "  - {}", failure);
    }
    out
}
