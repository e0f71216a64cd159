//! Output formatting for search results and collection info.
//!
//! Supports human-readable terminal output and JSON for scripting.

use braid_core::scheduler::SchedulerStats;
use braid_core::search::{FusedResult, IndexOutcome, SearchMode};
use braid_core::store::CollectionSummary;
use serde::Serialize;

/// Maximum characters to show in a text snippet
const SNIPPET_MAX_LEN: usize = 200;

/// JSON output structure for search results
#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    mode: String,
    total: usize,
    processing_time_ms: u128,
    results: &'a [FusedResult],
}

/// Formats search results as JSON.
pub fn format_json(
    query: &str,
    mode: SearchMode,
    results: &[FusedResult],
    elapsed_ms: u128,
) -> String {
    let output = JsonOutput {
        query,
        mode: mode.to_string(),
        total: results.len(),
        processing_time_ms: elapsed_ms,
        results,
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Formats search results for human-readable terminal output.
pub fn format_human(query: &str, results: &[FusedResult], elapsed_ms: u128) -> String {
    if results.is_empty() {
        return format!("No results found for \"{}\" ({}ms)", query, elapsed_ms);
    }

    let mut output = String::new();
    output.push_str(&format!(
        "Found {} result{} for \"{}\" in {}ms:\n\n",
        results.len(),
        if results.len() == 1 { "" } else { "s" },
        query,
        elapsed_ms
    ));

    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "{}. {} (score: {:.4})\n",
            i + 1,
            result.id,
            result.score
        ));

        if !result.metadata.is_empty() {
            let fields: Vec<String> = result
                .metadata
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            output.push_str(&format!("   [{}]\n", fields.join(", ")));
        }

        let snippet = truncate_text(&result.text, SNIPPET_MAX_LEN);
        if !snippet.is_empty() {
            output.push_str(&format!("   {}\n", snippet));
        }

        output.push('\n');
    }

    output.trim_end().to_string()
}

/// Formats an indexing report.
pub fn format_index(outcome: &IndexOutcome, elapsed_ms: u128) -> String {
    let mut output = format!(
        "Indexed {}/{} documents in {}ms",
        outcome.indexed, outcome.total, elapsed_ms
    );
    if outcome.failed() > 0 {
        output.push_str(&format!(" ({} failed)", outcome.failed()));
    }
    for error in &outcome.errors {
        output.push_str(&format!("\n  error: {}", error));
    }
    output
}

/// Formats collection statistics.
pub fn format_info(summary: &CollectionSummary) -> String {
    format!(
        "Collection: {}\n  points: {}\n  dense dim: {}\n  distance: {}",
        summary.name, summary.points_count, summary.dense_dim, summary.distance
    )
}

/// Formats engine/store health.
pub fn format_status(
    stats: &SchedulerStats,
    model_error: Option<String>,
    store_error: Option<String>,
) -> String {
    let healthy = model_error.is_none() && store_error.is_none();
    let mut output = format!(
        "Status: {}\n  device: {}\n  models loaded: {}\n  requests completed: {}",
        if healthy { "healthy" } else { "degraded" },
        stats.device,
        stats.models_loaded,
        stats.requests_completed,
    );
    match model_error {
        Some(error) => output.push_str(&format!("\n  models: error ({})", error)),
        None => output.push_str("\n  models: ok"),
    }
    match store_error {
        Some(error) => output.push_str(&format!("\n  store: error ({})", error)),
        None => output.push_str("\n  store: ok"),
    }
    output
}

/// Truncates text to a maximum length, breaking at a word boundary.
fn truncate_text(text: &str, max_len: usize) -> String {
    let text = text.trim().replace('\n', " ");
    if text.len() <= max_len {
        return text;
    }

    let boundary = text
        .char_indices()
        .take_while(|(i, _)| *i < max_len)
        .map(|(i, _)| i)
        .last()
        .unwrap_or(0);
    let truncated = &text[..boundary];
    match truncated.rfind(' ') {
        Some(last_space) => format!("{}...", &truncated[..last_space]),
        None => format!("{}...", truncated),
    }
}
