//! Free-text citation → bibliographic record, via Crossref's
//! `query.bibliographic` best-match search.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{FailureKind, Stage, StageFailure, StageResult};
use crate::http;
use crate::types::{BibliographicRecord, Citation};

/// Single-best-match bibliographic lookup. Zero hits is `Ok(None)`, not an error.
#[async_trait]
pub trait BibliographicLookup: Send + Sync {
    async fn lookup(&self, text: &str, polite_contact: Option<&str>) -> Result<Option<BibliographicRecord>>;
}

pub struct CrossrefClient {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl CrossrefClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, retries: u32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retries,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = http::build_client(config.http_timeout)?;
        Ok(Self::new(client, config.crossref_base.clone(), config.lookup_retries))
    }
}

/// Map the first Crossref `message.items[]` entry into a record.
fn record_from_item(item: &serde_json::Value) -> BibliographicRecord {
    let identifier = item["DOI"]
        .as_str()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    let title = item["title"]
        .get(0)
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let landing_url = item["URL"].as_str().unwrap_or("").trim().to_string();
    let candidate_pdf_url = item["link"].as_array().and_then(|links| {
        links
            .iter()
            .find(|l| l["content-type"].as_str() == Some("application/pdf"))
            .and_then(|l| l["URL"].as_str())
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
    });

    BibliographicRecord {
        title,
        identifier,
        landing_url,
        candidate_pdf_url,
    }
}

#[async_trait]
impl BibliographicLookup for CrossrefClient {
    async fn lookup(&self, text: &str, polite_contact: Option<&str>) -> Result<Option<BibliographicRecord>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let mut params = vec![
            ("query.bibliographic", text.to_string()),
            ("rows", "1".to_string()),
        ];
        if let Some(mailto) = polite_contact {
            params.push(("mailto", mailto.to_string()));
        }

        let url = format!("{}/works", self.base_url);
        let json = http::get_json_with_retry(&self.client, &url, &params, self.retries).await?;
        Ok(json["message"]["items"]
            .get(0)
            .map(record_from_item))
    }
}

/// Stage-1 output: one record per citation, in input order.
///
/// Built completely before ranking starts and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordCache {
    records: Vec<BibliographicRecord>,
    index: HashMap<String, usize>,
}

impl RecordCache {
    pub fn new(citations: &[Citation], records: Vec<BibliographicRecord>) -> Self {
        let mut index = HashMap::new();
        for (i, citation) in citations.iter().enumerate() {
            // First occurrence wins for repeated citation strings
            index.entry(citation.trim().to_string()).or_insert(i);
        }
        Self { records, index }
    }

    /// Cached record for a citation; empty when unknown.
    pub fn get(&self, citation: &str) -> BibliographicRecord {
        self.index
            .get(citation.trim())
            .and_then(|&i| self.records.get(i))
            .cloned()
            .unwrap_or_default()
    }

    pub fn records(&self) -> &[BibliographicRecord] {
        &self.records
    }

    pub fn identifiers_resolved(&self) -> usize {
        self.records.iter().filter(|r| r.identifier.is_some()).count()
    }
}

/// Resolve every citation (not only the selected ones) with bounded concurrency.
///
/// `buffered` yields results in input order, so the cache lines up positionally
/// with `citations`.
pub async fn resolve_all(
    lookup: Arc<dyn BibliographicLookup>,
    citations: &[Citation],
    polite_contact: Option<&str>,
    concurrency: usize,
) -> StageResult<RecordCache> {
    info!(count = citations.len(), concurrency, "Resolving citations");

    let results: Vec<Result<Option<BibliographicRecord>>> = futures::stream::iter(citations.iter())
        .map(|citation| {
            let lookup = lookup.clone();
            async move { lookup.lookup(citation, polite_contact).await }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut records = Vec::with_capacity(results.len());
    for (citation, result) in citations.iter().zip(results) {
        match result {
            Ok(Some(record)) => {
                debug!(title = %record.title, identifier = ?record.identifier, "bibliographic match");
                records.push(record);
            }
            Ok(None) => {
                debug!(citation = %citation, "no bibliographic match");
                records.push(BibliographicRecord::default());
            }
            Err(e) => {
                return Err(StageFailure::new(
                    Stage::BibliographicResolution,
                    FailureKind::LookupFailed,
                    format!("lookup failed for '{}': {:#}", crate::error::truncate(citation, 80), e),
                ));
            }
        }
    }

    let cache = RecordCache::new(citations, records);
    info!(
        resolved = cache.identifiers_resolved(),
        total = citations.len(),
        "Identifiers resolved"
    );
    Ok(cache)
}
