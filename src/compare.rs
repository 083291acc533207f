use tracing::{debug, info};

use crate::error::{truncate, FailureKind, Stage, StageFailure, StageResult};
use crate::llm::{PromptPart, StructuredGenerator};
use crate::prompts;
use crate::types::ComparisonResult;

const UNCLEAR: &str = "unclear";

/// The candidate side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonCandidate {
    pub title: String,
    /// Storage handle, or the remote URL in remote mode
    pub source_uri: String,
}

fn string_list(raw: &serde_json::Value, key: &str) -> StageResult<Vec<String>> {
    let malformed = |why: &str| {
        StageFailure::new(
            Stage::Comparison,
            FailureKind::GenerationError,
            format!("{} {} (raw: {})", key, why, truncate(&raw.to_string(), 300)),
        )
    };
    let items = raw
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed("missing or not a list"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| malformed("has a non-string item"))
        })
        .filter(|item| item.as_ref().map_or(true, |s| !s.is_empty()))
        .collect()
}

/// Why a well-formed comparison still says nothing, if it does.
fn inconclusive_reason(overlap: &[String], novel: &[String]) -> Option<String> {
    let mut points = overlap.iter().chain(novel);
    if overlap.is_empty() && novel.is_empty() {
        Some("comparison returned no points".to_string())
    } else if points.all(|p| p.eq_ignore_ascii_case(UNCLEAR)) {
        Some("comparison inconclusive: model reported nothing but 'unclear'".to_string())
    } else {
        None
    }
}

/// One structured-generation call over the target and candidate artifacts.
///
/// Malformed output fails the stage; it is never defaulted.
pub async fn compare(
    generator: &dyn StructuredGenerator,
    target_handle: &str,
    candidate: &ComparisonCandidate,
) -> StageResult<ComparisonResult> {
    info!(candidate = %candidate.title, source = %candidate.source_uri, "Comparing against candidate");

    let parts = vec![
        PromptPart::pdf(target_handle),
        PromptPart::pdf(candidate.source_uri.clone()),
        PromptPart::text(format!(
            "{}\n\nORIGINAL_DOCUMENT:\n{}\nCANDIDATE_TITLE:\n{}\nCANDIDATE_DOCUMENT:\n{}\n",
            prompts::COMPARE_PROMPT,
            target_handle,
            candidate.title,
            candidate.source_uri
        )),
    ];

    let raw = generator
        .generate(&parts, &prompts::compare_schema())
        .await
        .map_err(|e| StageFailure::generation(Stage::Comparison, &e))?;

    let overlap_points = string_list(&raw, "overlap")?;
    let novel_points = string_list(&raw, "novel")?;
    debug!(overlap = overlap_points.len(), novel = novel_points.len(), "comparison parsed");

    let failure_reason = inconclusive_reason(&overlap_points, &novel_points);

    Ok(ComparisonResult {
        candidate_title: candidate.title.clone(),
        candidate_source_uri: candidate.source_uri.clone(),
        overlap_points,
        novel_points,
        failure_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        response: anyhow::Result<serde_json::Value>,
        seen: Mutex<Vec<PromptPart>>,
    }

    impl Canned {
        fn ok(value: serde_json::Value) -> Self {
            Self {
                response: Ok(value),
                seen: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl StructuredGenerator for Canned {
        async fn generate(
            &self,
            parts: &[PromptPart],
            _schema: &serde_json::Value,
        ) -> anyhow::Result<serde_json::Value> {
            self.seen.lock().unwrap().extend(parts.iter().cloned());
            match &self.response {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn candidate() -> ComparisonCandidate {
        ComparisonCandidate {
            title: "Lee 2021 Device".into(),
            source_uri: "store://artifact/netpdf_x.pdf".into(),
        }
    }

    #[tokio::test]
    async fn test_compare_parses_points() {
        let generator = Canned::ok(serde_json::json!({
            "candidate_title": "whatever the model says",
            "overlap": ["shared material X"],
            "novel": ["new mechanism Y", "  "]
        }));
        let result = compare(&generator, "store://target.pdf", &candidate()).await.unwrap();
        assert_eq!(result.overlap_points, vec!["shared material X"]);
        assert_eq!(result.novel_points, vec!["new mechanism Y"]);
        assert_eq!(result.candidate_title, "Lee 2021 Device");
        assert!(result.failure_reason.is_none());

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen[0], PromptPart::pdf("store://target.pdf"));
        assert_eq!(seen[1], PromptPart::pdf("store://artifact/netpdf_x.pdf"));
    }

    #[tokio::test]
    async fn test_missing_key_is_generation_error() {
        let generator = Canned::ok(serde_json::json!({"same": ["x"], "new": ["y"]}));
        let err = compare(&generator, "t", &candidate()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::GenerationError);
        assert_eq!(err.stage, Stage::Comparison);
        assert!(err.reason.contains("overlap"));
    }

    #[tokio::test]
    async fn test_non_string_item_is_generation_error() {
        let generator = Canned::ok(serde_json::json!({"overlap": [1], "novel": []}));
        let err = compare(&generator, "t", &candidate()).await.unwrap_err();
        assert!(err.reason.contains("non-string"));
    }

    #[tokio::test]
    async fn test_all_unclear_is_inconclusive() {
        let generator = Canned::ok(serde_json::json!({"overlap": ["unclear"], "novel": ["Unclear"]}));
        let result = compare(&generator, "t", &candidate()).await.unwrap();
        assert!(result.failure_reason.unwrap().contains("unclear"));
    }

    #[tokio::test]
    async fn test_empty_points_have_their_own_reason() {
        let generator = Canned::ok(serde_json::json!({"overlap": [], "novel": ["  "]}));
        let result = compare(&generator, "t", &candidate()).await.unwrap();
        assert_eq!(result.failure_reason.as_deref(), Some("comparison returned no points"));
    }

    #[tokio::test]
    async fn test_unclear_beside_real_point_is_conclusive() {
        let generator = Canned::ok(serde_json::json!({"overlap": ["unclear"], "novel": ["new mechanism Y"]}));
        let result = compare(&generator, "t", &candidate()).await.unwrap();
        assert!(result.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_generator_failure() {
        let generator = Canned {
            response: Err(anyhow::anyhow!("deadline exceeded")),
            seen: Mutex::new(vec![]),
        };
        let err = compare(&generator, "t", &candidate()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::GenerationError);
        assert!(err.reason.contains("deadline exceeded"));
    }
}
