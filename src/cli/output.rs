//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use crate::error::Error;
use crate::model::QueryResult;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Renders a completed query result for the given format.
#[must_use]
pub fn format_query_result(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Text => {
            let mut out = String::new();
            if result.refused {
                let reason = result.refusal_reason.map_or("unknown", crate::model::RefusalReason::as_str);
                let _ = writeln!(out, "Refused ({reason}): {}", result.answer);
            } else {
                let _ = writeln!(out, "{}", result.answer);
                if !result.citations.is_empty() {
                    let _ = writeln!(out, "\nCitations:");
                    for citation in &result.citations {
                        let section = citation.section.as_deref().unwrap_or("");
                        let _ = writeln!(out, "  - {} | {} | p.{}-{}", citation.document, section, citation.page_start, citation.page_end);
                    }
                }
            }
            let _ = writeln!(
                out,
                "\n[{} chunks retrieved, {} used, {}ms, mode={}]",
                result.chunks_retrieved, result.chunks_used, result.latency_ms, result.effective_search_mode
            );
            out
        }
    }
}

/// Renders a `/sources`-equivalent listing.
#[must_use]
pub fn format_sources(sources: &[(String, usize)], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let pairs: Vec<_> = sources.iter().map(|(s, c)| serde_json::json!({"source": s, "documentCount": c})).collect();
            serde_json::to_string_pretty(&pairs).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for (source, count) in sources {
                let _ = writeln!(out, "{source}\t{count} document(s)");
            }
            out
        }
    }
}

/// Renders an error for the given format.
#[must_use]
pub fn format_error(err: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::json!({"error": err.to_string()}).to_string(),
        OutputFormat::Text => err.to_string(),
    }
}
