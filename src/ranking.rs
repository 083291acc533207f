//! Picks two "baseline" and two "innovation" citations with two
//! structured-generation calls, then checks the picks mechanically.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{truncate, Stage, StageFailure, StageResult};
use crate::llm::{PromptPart, StructuredGenerator};
use crate::prompts;
use crate::types::Citation;

pub const PICKS_PER_CALL: usize = 2;
const BASELINE_KEY: &str = "baseline_top2";
const INNOVATION_KEY: &str = "innovation_top2";

/// Document-type nouns that never count as an innovation source. Only whole
/// phrases naming a kind of document match; proceedings series and adjectives do not.
static NON_TECHNICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(text ?books?|handbooks?|encyclopa?edias?|(user|reference|owner)'?s? manuals?|(user|programming|developer|reference)'?s? guides?)\b",
    )
    .expect("static regex")
});

pub fn is_non_technical(citation: &str) -> bool {
    NON_TECHNICAL.is_match(citation)
}

/// Output of the ranking stage: picks are the exact input strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub baseline: Vec<Citation>,
    pub innovation: Vec<Citation>,
}

/// Check one ranking response: exactly two distinct items, each verbatim from `citations`.
fn validate_picks(
    raw: &serde_json::Value,
    key: &str,
    citations: &[Citation],
) -> StageResult<Vec<Citation>> {
    let malformed = |why: &str| {
        StageFailure::ranking_malformed(format!(
            "{}: {} (raw: {})",
            key,
            why,
            truncate(&raw.to_string(), 300)
        ))
    };

    let items = raw
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed("missing list"))?;
    if items.len() != PICKS_PER_CALL {
        return Err(malformed(&format!(
            "expected exactly {} items, got {}",
            PICKS_PER_CALL,
            items.len()
        )));
    }

    let mut picks: Vec<Citation> = Vec::with_capacity(PICKS_PER_CALL);
    for item in items {
        let text = item.as_str().ok_or_else(|| malformed("non-string item"))?;
        let Some(found) = citations.iter().find(|c| c.trim() == text.trim() && !c.trim().is_empty()) else {
            return Err(malformed(&format!(
                "'{}' is not verbatim from the input list",
                truncate(text, 80)
            )));
        };
        if picks.contains(found) {
            return Err(malformed("duplicate item"));
        }
        picks.push(found.clone());
    }
    Ok(picks)
}

/// Run the two ranking calls. No retries: a malformed pick fails the stage.
pub async fn rank_candidates(
    generator: &dyn StructuredGenerator,
    citations: &[Citation],
) -> StageResult<Selection> {
    let refs_json = serde_json::to_string(citations).unwrap_or_else(|_| "[]".to_string());

    info!(count = citations.len(), "Ranking baseline candidates");
    let parts = vec![PromptPart::text(format!(
        "{}\n\nREFERENCES_JSON:\n{}\n",
        prompts::BASELINE_PROMPT,
        refs_json
    ))];
    let raw = generator
        .generate(&parts, &prompts::keyed_list_schema(BASELINE_KEY))
        .await
        .map_err(|e| StageFailure::generation(Stage::Ranking, &e))?;
    let baseline = validate_picks(&raw, BASELINE_KEY, citations)?;
    debug!(?baseline, "baseline picks");

    info!("Ranking innovation candidates");
    let baseline_json = serde_json::to_string(&baseline).unwrap_or_else(|_| "[]".to_string());
    let parts = vec![PromptPart::text(format!(
        "{}\n\nALREADY_SELECTED_BASELINES:\n{}\n\nREFERENCES_JSON:\n{}\n",
        prompts::INNOVATION_PROMPT,
        baseline_json,
        refs_json
    ))];
    let raw = generator
        .generate(&parts, &prompts::keyed_list_schema(INNOVATION_KEY))
        .await
        .map_err(|e| StageFailure::generation(Stage::Ranking, &e))?;
    let innovation = validate_picks(&raw, INNOVATION_KEY, citations)?;

    let baseline_set: HashSet<&str> = baseline.iter().map(|c| c.as_str()).collect();
    if let Some(repeat) = innovation.iter().find(|c| baseline_set.contains(c.as_str())) {
        return Err(StageFailure::ranking_malformed(format!(
            "{}: '{}' was already selected as a baseline",
            INNOVATION_KEY,
            truncate(repeat, 80)
        )));
    }
    if let Some(excluded) = innovation.iter().find(|c| is_non_technical(c)) {
        return Err(StageFailure::ranking_malformed(format!(
            "{}: '{}' is a non-technical source",
            INNOVATION_KEY,
            truncate(excluded, 80)
        )));
    }
    debug!(?innovation, "innovation picks");

    Ok(Selection {
        baseline,
        innovation,
    })
}
