//! Candidate-URL harvesting, recency-pooled random choice, and validated download.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use super::fetch::{ensure_pdf_url, is_valid_pdf, preprint_pdf_url, ContentFetcher};
use super::types::FetchedContent;
use crate::error::{FailureKind, Stage, StageFailure, StageResult};
use crate::types::{ArtifactCandidate, ResolvedReference};

const DOI_RESOLVER: &str = "https://doi.org/";

/// Which rung of the fallback chain produced a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestSource {
    OpenAccess,
    Preprint,
    IdentifierNegotiation,
    LandingNegotiation,
}

/// Accept `url` only if its final response is PDF-shaped.
async fn negotiate(fetcher: &dyn ContentFetcher, url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return None;
    }
    let probe = fetcher.probe(url).await?;
    if probe.is_pdf() {
        Some(probe.resolved_url)
    } else {
        debug!(url, media_type = %probe.media_type, "negotiation did not reach a PDF");
        None
    }
}

/// Walk the fallback chain for one reference, stopping at the first usable URL.
pub async fn harvest_url(
    fetcher: &dyn ContentFetcher,
    reference: &ResolvedReference,
) -> Option<(String, HarvestSource)> {
    let open_access = reference
        .work
        .open_access_pdf_url
        .as_deref()
        .or(reference.record.candidate_pdf_url.as_deref())
        .map(str::trim)
        .filter(|u| !u.is_empty());
    if let Some(url) = open_access {
        return Some((url.to_string(), HarvestSource::OpenAccess));
    }

    let landing = reference.landing_url();
    if let Some(url) = landing.and_then(preprint_pdf_url) {
        return Some((url, HarvestSource::Preprint));
    }

    if let Some(identifier) = reference.identifier() {
        let persistent = if identifier.to_lowercase().starts_with("http") {
            identifier.to_string()
        } else {
            format!("{}{}", DOI_RESOLVER, identifier)
        };
        if let Some(url) = negotiate(fetcher, &persistent).await {
            return Some((url, HarvestSource::IdentifierNegotiation));
        }
    }

    if let Some(landing) = landing {
        if let Some(url) = negotiate(fetcher, landing).await {
            return Some((url, HarvestSource::LandingNegotiation));
        }
    }
    None
}

/// Harvest a candidate for every reference that yields a URL, in reference order.
pub async fn harvest_candidates(
    fetcher: &dyn ContentFetcher,
    references: &[ResolvedReference],
) -> Vec<ArtifactCandidate> {
    let mut candidates = Vec::new();
    for reference in references {
        match harvest_url(fetcher, reference).await {
            Some((url, source)) => {
                let url = ensure_pdf_url(&url);
                debug!(title = %reference.title(), %url, ?source, "artifact candidate");
                candidates.push(ArtifactCandidate {
                    title: reference.title().to_string(),
                    url,
                    year: reference.work.year,
                });
            }
            None => debug!(citation = %reference.citation, "no usable artifact URL"),
        }
    }
    info!(harvested = candidates.len(), total = references.len(), "Artifact candidates harvested");
    candidates
}

/// Candidates published within `window_years` of `current_year`, or all of them
/// if none qualify.
pub fn candidate_pool(
    candidates: &[ArtifactCandidate],
    current_year: i32,
    window_years: i32,
) -> Vec<&ArtifactCandidate> {
    let min_year = current_year - window_years;
    let recent: Vec<&ArtifactCandidate> = candidates
        .iter()
        .filter(|c| c.year.is_some_and(|y| y >= min_year))
        .collect();
    if recent.is_empty() {
        candidates.iter().collect()
    } else {
        recent
    }
}

/// Pick one candidate at random from the recency pool. Callers must not assume repeatability.
pub fn choose_candidate<R: Rng + ?Sized>(
    candidates: &[ArtifactCandidate],
    current_year: i32,
    window_years: i32,
    rng: &mut R,
) -> StageResult<ArtifactCandidate> {
    let pool = candidate_pool(candidates, current_year, window_years);
    pool.choose(rng).map(|c| (*c).clone()).ok_or_else(|| {
        StageFailure::new(
            Stage::ArtifactAcquisition,
            FailureKind::NoCandidates,
            "no reference has a usable artifact URL",
        )
    })
}

/// Download the chosen URL and check it is really a PDF.
pub async fn download_validated(fetcher: &dyn ContentFetcher, url: &str) -> StageResult<FetchedContent> {
    let url = ensure_pdf_url(url);
    let invalid = |reason: String| StageFailure::new(Stage::ArtifactAcquisition, FailureKind::DownloadInvalid, reason);

    let content = fetcher
        .fetch(&url)
        .await
        .map_err(|e| invalid(format!("download of {} failed: {:#}", url, e)))?;

    if !is_valid_pdf(&content) {
        warn!(
            %url,
            resolved_url = %content.resolved_url,
            media_type = %content.media_type,
            size = content.bytes.len(),
            "Downloaded content is not a PDF"
        );
        return Err(invalid(format!(
            "content from {} is not a valid PDF (content-type '{}', {} bytes)",
            content.resolved_url,
            content.media_type,
            content.bytes.len()
        )));
    }
    info!(%url, resolved_url = %content.resolved_url, size = content.bytes.len(), "Artifact downloaded");
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::types::Probe;
    use crate::types::{BibliographicRecord, CanonicalWork, SelectionLabel};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFetcher {
        probes: HashMap<String, Probe>,
        bodies: HashMap<String, FetchedContent>,
        probed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContentFetcher for FakeFetcher {
        async fn probe(&self, url: &str) -> Option<Probe> {
            self.probed.lock().unwrap().push(url.to_string());
            self.probes.get(url).cloned()
        }

        async fn fetch(&self, url: &str) -> anyhow::Result<FetchedContent> {
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 for {}", url))
        }
    }

    fn reference(work: CanonicalWork, record: BibliographicRecord) -> ResolvedReference {
        ResolvedReference {
            label: SelectionLabel::Innovation,
            citation: "Lee 2021 Device".to_string(),
            record,
            work,
            citing_works: vec![],
        }
    }

    #[tokio::test]
    async fn test_open_access_url_first() {
        let fetcher = FakeFetcher::default();
        let r = reference(
            CanonicalWork {
                open_access_pdf_url: Some("https://repo.example/oa.pdf".into()),
                landing_url: Some("https://arxiv.org/abs/2101.00001".into()),
                ..Default::default()
            },
            BibliographicRecord::default(),
        );
        let (url, source) = harvest_url(&fetcher, &r).await.unwrap();
        assert_eq!(url, "https://repo.example/oa.pdf");
        assert_eq!(source, HarvestSource::OpenAccess);
    }

    #[tokio::test]
    async fn test_preprint_transform_skips_negotiation() {
        let fetcher = FakeFetcher::default();
        let r = reference(
            CanonicalWork {
                identifier: Some("10.48550/arXiv.2101.00001".into()),
                landing_url: Some("https://arxiv.org/abs/2101.00001".into()),
                ..Default::default()
            },
            BibliographicRecord::default(),
        );
        let (url, source) = harvest_url(&fetcher, &r).await.unwrap();
        assert_eq!(url, "https://arxiv.org/pdf/2101.00001.pdf");
        assert_eq!(source, HarvestSource::Preprint);
        assert!(fetcher.probed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identifier_negotiation_then_landing() {
        let mut fetcher = FakeFetcher::default();
        fetcher.probes.insert(
            "https://doi.org/10.1/a".into(),
            Probe {
                resolved_url: "https://publisher.example/article/a".into(),
                media_type: "text/html".into(),
            },
        );
        fetcher.probes.insert(
            "https://publisher.example/landing/a".into(),
            Probe {
                resolved_url: "https://publisher.example/files/a".into(),
                media_type: "application/pdf".into(),
            },
        );
        let r = reference(
            CanonicalWork::default(),
            BibliographicRecord {
                identifier: Some("10.1/a".into()),
                landing_url: "https://publisher.example/landing/a".into(),
                ..Default::default()
            },
        );
        let (url, source) = harvest_url(&fetcher, &r).await.unwrap();
        assert_eq!(url, "https://publisher.example/files/a");
        assert_eq!(source, HarvestSource::LandingNegotiation);
        assert_eq!(
            *fetcher.probed.lock().unwrap(),
            vec!["https://doi.org/10.1/a", "https://publisher.example/landing/a"]
        );
    }

    #[tokio::test]
    async fn test_nothing_usable() {
        let fetcher = FakeFetcher::default();
        let r = reference(CanonicalWork::default(), BibliographicRecord::default());
        assert!(harvest_url(&fetcher, &r).await.is_none());
    }

    fn candidate(title: &str, year: Option<i32>) -> ArtifactCandidate {
        ArtifactCandidate {
            title: title.to_string(),
            url: format!("https://x/{}.pdf", title),
            year,
        }
    }

    #[test]
    fn test_pool_prefers_recent() {
        let candidates = vec![
            candidate("old", Some(2001)),
            candidate("new", Some(2020)),
            candidate("undated", None),
        ];
        let pool = candidate_pool(&candidates, 2026, 10);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].title, "new");
    }

    #[test]
    fn test_pool_falls_back_to_all() {
        let candidates = vec![candidate("old", Some(2001)), candidate("undated", None)];
        assert_eq!(candidate_pool(&candidates, 2026, 10).len(), 2);
    }

    #[test]
    fn test_choose_from_empty_is_no_candidates() {
        let mut rng = StdRng::seed_from_u64(7);
        let err = choose_candidate(&[], 2026, 10, &mut rng).unwrap_err();
        assert_eq!(err.kind, FailureKind::NoCandidates);
    }

    #[test]
    fn test_choose_stays_in_recent_pool() {
        let candidates = vec![
            candidate("old", Some(1990)),
            candidate("a", Some(2022)),
            candidate("b", Some(2024)),
        ];
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let chosen = choose_candidate(&candidates, 2026, 10, &mut rng).unwrap();
            assert_ne!(chosen.title, "old");
        }
    }

    #[tokio::test]
    async fn test_download_rejects_html() {
        let mut fetcher = FakeFetcher::default();
        fetcher.bodies.insert(
            "https://x/paywall.pdf".into(),
            FetchedContent {
                bytes: b"<html>sign in</html>".to_vec(),
                resolved_url: "https://x/login".into(),
                media_type: "text/html".into(),
            },
        );
        let err = download_validated(&fetcher, "https://x/paywall.pdf").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::DownloadInvalid);

        let err = download_validated(&fetcher, "https://x/absent.pdf").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::DownloadInvalid);
    }

    #[tokio::test]
    async fn test_download_applies_preprint_rule() {
        let mut fetcher = FakeFetcher::default();
        fetcher.bodies.insert(
            "https://arxiv.org/pdf/2101.00001.pdf".into(),
            FetchedContent {
                bytes: b"%PDF-1.5 body bytes".to_vec(),
                resolved_url: "https://arxiv.org/pdf/2101.00001.pdf".into(),
                media_type: "application/pdf".into(),
            },
        );
        let content = download_validated(&fetcher, "https://arxiv.org/abs/2101.00001")
            .await
            .unwrap();
        assert!(content.bytes.starts_with(b"%PDF-"));
    }
}
