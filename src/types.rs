use serde::{Deserialize, Serialize};

/// Free-text reference string as extracted from the target document.
pub type Citation = String;

/// Opaque handle returned by durable storage (or a remote URL in remote mode).
pub type StorageHandle = String;

/// Best-effort bibliographic metadata for one citation.
/// Absent fields stay empty; a lookup with zero hits yields `Default`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographicRecord {
    pub title: String,
    /// e.g. a DOI, stored without the `https://doi.org/` prefix
    #[serde(default)]
    pub identifier: Option<String>,
    pub landing_url: String,
    #[serde(default)]
    pub candidate_pdf_url: Option<String>,
}

impl BibliographicRecord {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.identifier.is_none()
            && self.landing_url.is_empty()
            && self.candidate_pdf_url.is_none()
    }
}

/// The scholarly graph's deduplicated notion of one publication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalWork {
    /// Bare slug, e.g. `W2741809807`
    #[serde(default)]
    pub canonical_id: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub landing_url: Option<String>,
    #[serde(default)]
    pub open_access_pdf_url: Option<String>,
    #[serde(default)]
    pub citation_count: Option<u64>,
    #[serde(default)]
    pub citation_list_endpoint: Option<String>,
}

impl CanonicalWork {
    pub fn is_empty(&self) -> bool {
        self.canonical_id.is_none()
            && self.identifier.is_none()
            && self.title.is_empty()
            && self.landing_url.is_none()
    }
}

/// Which ranking call selected a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionLabel {
    Baseline,
    Innovation,
}

impl std::fmt::Display for SelectionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Baseline => f.write_str("baseline"),
            Self::Innovation => f.write_str("innovation"),
        }
    }
}

/// Lightweight forward-citation record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitingWork {
    pub title: String,
    pub landing_url: String,
    pub canonical_id: String,
    #[serde(default)]
    pub year: Option<i32>,
}

/// One selected citation with everything resolved about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedReference {
    pub label: SelectionLabel,
    pub citation: Citation,
    pub record: BibliographicRecord,
    /// Empty when neither identifier nor title search matched.
    pub work: CanonicalWork,
    #[serde(default)]
    pub citing_works: Vec<CitingWork>,
}

impl ResolvedReference {
    /// Display title: canonical title, then bibliographic title, then the raw citation.
    pub fn title(&self) -> &str {
        if !self.work.title.trim().is_empty() {
            &self.work.title
        } else if !self.record.title.trim().is_empty() {
            &self.record.title
        } else {
            &self.citation
        }
    }

    pub fn landing_url(&self) -> Option<&str> {
        self.work
            .landing_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| Some(self.record.landing_url.as_str()).filter(|u| !u.trim().is_empty()))
    }

    pub fn identifier(&self) -> Option<&str> {
        self.record
            .identifier
            .as_deref()
            .or(self.work.identifier.as_deref())
            .filter(|i| !i.trim().is_empty())
    }
}

/// A downloadable artifact URL harvested for one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCandidate {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub year: Option<i32>,
}

/// Structured overlap/novelty comparison of the target against one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub candidate_title: String,
    pub candidate_source_uri: String,
    pub overlap_points: Vec<String>,
    pub novel_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Observability counters; never used for control flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounts {
    pub citations_total: usize,
    pub identifiers_resolved: usize,
    pub canonical_resolved: usize,
    pub unique_candidates: usize,
    pub citing_works_total: usize,
    pub harvested_urls: usize,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBundle {
    pub citations: Vec<Citation>,
    pub resolved_references: Vec<ResolvedReference>,
    pub comparison: ComparisonResult,
    pub counts: OutcomeCounts,
}

/// What the upstream classification stage hands over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Handoff {
    #[serde(default)]
    pub upstream_status: String,
    pub target_handle: StorageHandle,
    #[serde(default)]
    pub target_summary: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl Handoff {
    pub fn upstream_finished(&self) -> bool {
        self.upstream_status.eq_ignore_ascii_case("finished")
    }
}
