use std::sync::Arc;

use anyhow::Result;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::artifact::fetch::{ensure_pdf_url, ContentFetcher, HttpFetcher};
use crate::artifact::harvest::{choose_candidate, download_validated, harvest_candidates};
use crate::artifact::{ArtifactStorage, ArtifactStore};
use crate::biblio::{self, BibliographicLookup, CrossrefClient};
use crate::compare::{self, ComparisonCandidate};
use crate::config::PipelineConfig;
use crate::error::{FailureKind, Stage, StageFailure, StageResult};
use crate::expand::{self, ExpandLimits};
use crate::extract;
use crate::http;
use crate::identity;
use crate::llm::{LlmClient, StructuredGenerator};
use crate::ranking;
use crate::scholar::{OpenAlexClient, ScholarlyGraph};
use crate::types::{ArtifactCandidate, Citation, Handoff, OutcomeCounts, ResultBundle};

/// Terminal value of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PipelineOutcome {
    #[serde(rename_all = "camelCase")]
    Finished {
        generated_at: String,
        #[serde(flatten)]
        result: ResultBundle,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        generated_at: String,
        #[serde(flatten)]
        failure: StageFailure,
    },
}

impl PipelineOutcome {
    fn from_result(result: StageResult<ResultBundle>) -> Self {
        let generated_at = chrono::Utc::now().to_rfc3339();
        match result {
            Ok(result) => Self::Finished {
                generated_at,
                result,
            },
            Err(failure) => Self::Failed {
                generated_at,
                failure,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    pub fn result(&self) -> Option<&ResultBundle> {
        match self {
            Self::Finished { result, .. } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Failed { failure, .. } => Some(failure),
            Self::Finished { .. } => None,
        }
    }
}

/// External capabilities the pipeline coordinates.
#[derive(Clone)]
pub struct Services {
    pub biblio: Arc<dyn BibliographicLookup>,
    pub graph: Arc<dyn ScholarlyGraph>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub storage: Arc<dyn ArtifactStorage>,
    pub generator: Arc<dyn StructuredGenerator>,
}

impl Services {
    /// Production clients: Crossref, OpenAlex, HTTP fetch, cnidarium storage, chat-completions LLM.
    pub async fn from_config(config: &PipelineConfig, generator: LlmClient) -> Result<Self> {
        let store = ArtifactStore::new(&config.artifact_dir, &config.artifact_prefix).await?;
        info!("Artifact store initialized at {:?}", config.artifact_dir);
        Ok(Self {
            biblio: Arc::new(CrossrefClient::from_config(config)?),
            graph: Arc::new(OpenAlexClient::from_config(config)?),
            fetcher: Arc::new(HttpFetcher::new(http::build_client(config.http_timeout)?)),
            storage: Arc::new(store),
            generator: Arc::new(generator),
        })
    }
}

pub struct Pipeline {
    services: Services,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(services: Services, config: PipelineConfig) -> Self {
        Self { services, config }
    }

    /// Run every stage for one target document. Always returns exactly one outcome.
    pub async fn run(&self, handoff: &Handoff) -> PipelineOutcome {
        let outcome = PipelineOutcome::from_result(self.run_stages(handoff, None).await);
        log_outcome(&outcome);
        outcome
    }

    /// Like [`Pipeline::run`], extracting the citation list from the target first
    /// when the handoff carries none.
    pub async fn run_from_document(&self, handoff: &Handoff) -> PipelineOutcome {
        let result = async {
            precheck(handoff)?;
            let extracted = if handoff.citations.is_empty() {
                Some(extract::extract_citations(self.services.generator.as_ref(), &handoff.target_handle).await?)
            } else {
                None
            };
            self.run_stages(handoff, extracted).await
        }
        .await;
        let outcome = PipelineOutcome::from_result(result);
        log_outcome(&outcome);
        outcome
    }

    async fn run_stages(
        &self,
        handoff: &Handoff,
        extracted: Option<Vec<Citation>>,
    ) -> StageResult<ResultBundle> {
        precheck(handoff)?;
        let citations = match extracted {
            Some(citations) => citations,
            None => extract::normalize_citations(&handoff.citations),
        };
        if citations.is_empty() {
            return Err(StageFailure::upstream_not_ready(Stage::Precheck, "empty citation list"));
        }
        info!(
            target = %handoff.target_handle,
            citations = citations.len(),
            summary_len = handoff.target_summary.len(),
            "Pipeline started"
        );

        let cache = biblio::resolve_all(
            self.services.biblio.clone(),
            &citations,
            self.config.polite_email.as_deref(),
            self.config.lookup_concurrency,
        )
        .await?;

        let selection = ranking::rank_candidates(self.services.generator.as_ref(), &citations).await?;

        let (references, canonical_resolved) =
            identity::resolve_selection(self.services.graph.as_ref(), &cache, &selection).await;

        let references = expand::expand_references(
            self.services.graph.as_ref(),
            references,
            ExpandLimits {
                page_size: self.config.citation_page_size,
                max_pages: self.config.max_citation_pages,
                page_delay: self.config.page_delay,
                concurrency: self.config.lookup_concurrency,
            },
        )
        .await;

        let (candidate, harvested_urls) = match &self.config.candidate_override {
            Some(pinned) => {
                info!(url = %pinned.url, title = %pinned.title, "Using configured candidate");
                let candidate = ArtifactCandidate {
                    title: pinned.title.clone(),
                    url: ensure_pdf_url(&pinned.url),
                    year: None,
                };
                (candidate, 0)
            }
            None => {
                let harvested = harvest_candidates(self.services.fetcher.as_ref(), &references).await;
                let current_year = chrono::Utc::now().year();
                let chosen = choose_candidate(
                    &harvested,
                    current_year,
                    self.config.recency_years,
                    &mut rand::thread_rng(),
                )?;
                (chosen, harvested.len())
            }
        };
        info!(title = %candidate.title, url = %candidate.url, "Comparison candidate chosen");

        let source_uri = if self.config.remote_artifacts {
            info!(url = %candidate.url, "Remote mode, skipping download");
            candidate.url.clone()
        } else {
            let content = download_validated(self.services.fetcher.as_ref(), &candidate.url).await?;
            self.services
                .storage
                .put(&content.bytes, "application/pdf", &candidate.url)
                .await
                .map_err(|e| {
                    StageFailure::new(
                        Stage::ArtifactAcquisition,
                        FailureKind::StorageFailed,
                        format!("{:#}", e),
                    )
                })?
        };

        let comparison = compare::compare(
            self.services.generator.as_ref(),
            &handoff.target_handle,
            &ComparisonCandidate {
                title: candidate.title.clone(),
                source_uri,
            },
        )
        .await?;
        if let Some(reason) = &comparison.failure_reason {
            warn!(reason = %reason, "Comparison inconclusive");
        }

        let counts = OutcomeCounts {
            citations_total: citations.len(),
            identifiers_resolved: cache.identifiers_resolved(),
            canonical_resolved,
            unique_candidates: references.len(),
            citing_works_total: references.iter().map(|r| r.citing_works.len()).sum(),
            harvested_urls,
        };

        Ok(ResultBundle {
            citations,
            resolved_references: references,
            comparison,
            counts,
        })
    }
}

fn precheck(handoff: &Handoff) -> StageResult<()> {
    if !handoff.upstream_finished() {
        return Err(StageFailure::upstream_not_ready(
            Stage::Precheck,
            format!("upstream status is '{}'", handoff.upstream_status),
        ));
    }
    if handoff.target_handle.trim().is_empty() {
        return Err(StageFailure::upstream_not_ready(
            Stage::Precheck,
            "no target document handle",
        ));
    }
    Ok(())
}

fn log_outcome(outcome: &PipelineOutcome) {
    match outcome {
        PipelineOutcome::Finished { result, .. } => info!(
            citations = result.counts.citations_total,
            identifiers = result.counts.identifiers_resolved,
            unique = result.counts.unique_candidates,
            citing = result.counts.citing_works_total,
            candidate = %result.comparison.candidate_title,
            "Pipeline finished"
        ),
        PipelineOutcome::Failed { failure, .. } => error!(
            stage = %failure.stage,
            kind = %failure.kind,
            reason = %failure.reason,
            "Pipeline failed"
        ),
    }
}
