use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Precheck,
    CitationExtraction,
    BibliographicResolution,
    Ranking,
    IdentityResolution,
    CitationGraph,
    ArtifactAcquisition,
    Comparison,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precheck => "precheck",
            Self::CitationExtraction => "citation-extraction",
            Self::BibliographicResolution => "bibliographic-resolution",
            Self::Ranking => "ranking",
            Self::IdentityResolution => "identity-resolution",
            Self::CitationGraph => "citation-graph",
            Self::ArtifactAcquisition => "artifact-acquisition",
            Self::Comparison => "comparison",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable failure tag. Callers branch on this, never on the reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    UpstreamNotReady,
    RankingMalformed,
    NoCandidates,
    DownloadInvalid,
    GenerationError,
    LookupFailed,
    StorageFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpstreamNotReady => "upstream-not-ready",
            Self::RankingMalformed => "ranking-malformed",
            Self::NoCandidates => "no-candidates",
            Self::DownloadInvalid => "download-invalid",
            Self::GenerationError => "generation-error",
            Self::LookupFailed => "lookup-failed",
            Self::StorageFailed => "storage-failed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{stage}] {kind}: {reason}")]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub reason: String,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            reason: reason.into(),
        }
    }

    pub fn upstream_not_ready(stage: Stage, reason: impl Into<String>) -> Self {
        Self::new(stage, FailureKind::UpstreamNotReady, reason)
    }

    pub fn ranking_malformed(reason: impl Into<String>) -> Self {
        Self::new(Stage::Ranking, FailureKind::RankingMalformed, reason)
    }

    pub fn generation(stage: Stage, err: &anyhow::Error) -> Self {
        Self::new(stage, FailureKind::GenerationError, format!("{:#}", err))
    }
}

pub type StageResult<T> = std::result::Result<T, StageFailure>;

/// Truncate raw model output for inclusion in a failure reason.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&FailureKind::RankingMalformed).unwrap();
        assert_eq!(json, "\"ranking-malformed\"");
        assert_eq!(
            serde_json::to_string(&Stage::ArtifactAcquisition).unwrap(),
            "\"artifact-acquisition\""
        );
    }

    #[test]
    fn test_display_includes_stage_and_kind() {
        let failure = StageFailure::ranking_malformed("expected 2 items, got 3");
        assert_eq!(
            failure.to_string(),
            "[ranking] ranking-malformed: expected 2 items, got 3"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
