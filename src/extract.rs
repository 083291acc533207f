use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{truncate, FailureKind, Stage, StageFailure, StageResult};
use crate::llm::{PromptPart, StructuredGenerator};
use crate::prompts;
use crate::types::Citation;

static INDEX_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[\s*\d*\s*\]\s*").expect("static regex"));

/// Drop a leading `[12]` index and collapse whitespace.
pub fn normalize_citation(raw: &str) -> String {
    let stripped = INDEX_PREFIX.replace(raw, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalise a citation list, dropping entries that end up empty.
pub fn normalize_citations<S: AsRef<str>>(raw: &[S]) -> Vec<Citation> {
    raw.iter()
        .map(|c| normalize_citation(c.as_ref()))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Ask the model for the target document's full reference list.
pub async fn extract_citations(
    generator: &dyn StructuredGenerator,
    target_handle: &str,
) -> StageResult<Vec<Citation>> {
    info!(target = %target_handle, "Extracting reference list");
    let parts = vec![
        PromptPart::pdf(target_handle),
        PromptPart::text(prompts::EXTRACT_REFERENCES_PROMPT),
    ];
    let raw = generator
        .generate(&parts, &prompts::string_array_schema())
        .await
        .map_err(|e| StageFailure::generation(Stage::CitationExtraction, &e))?;

    let Some(items) = raw.as_array() else {
        return Err(StageFailure::new(
            Stage::CitationExtraction,
            FailureKind::GenerationError,
            format!("expected a JSON array (raw: {})", truncate(&raw.to_string(), 300)),
        ));
    };
    let strings: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
    let citations = normalize_citations(&strings);
    debug!(first = ?citations.iter().take(3).collect::<Vec<_>>(), "extracted references");

    if citations.is_empty() {
        return Err(StageFailure::upstream_not_ready(
            Stage::CitationExtraction,
            "empty reference list",
        ));
    }
    info!(count = citations.len(), "References extracted");
    Ok(citations)
}
