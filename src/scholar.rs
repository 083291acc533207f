//! OpenAlex-backed scholarly graph: identity lookups and cited-by pages.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::config::{PipelineConfig, MAX_IDENTIFIER_BATCH};
use crate::http;
use crate::types::{CanonicalWork, CitingWork};

/// Cursor value that starts a fresh pagination.
pub const FIRST_CURSOR: &str = "*";
const DOI_PREFIX: &str = "https://doi.org/";

/// One page of forward citations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationPage {
    pub items: Vec<CitingWork>,
    /// Absent when the listing is exhausted
    pub next_cursor: Option<String>,
    pub expected_total: Option<u64>,
}

/// Parameters for one cited-by page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub canonical_id: &'a str,
    /// Service-provided listing endpoint, preferred when present
    pub endpoint: Option<&'a str>,
    pub cursor: &'a str,
    pub per_page: u32,
}

#[async_trait]
pub trait ScholarlyGraph: Send + Sync {
    /// Batched identifier lookup. Batches larger than the service cap are split.
    async fn by_identifiers(&self, ids: &[String]) -> Result<Vec<CanonicalWork>>;
    /// Free-text title search; top hit only.
    async fn by_title(&self, text: &str) -> Result<Option<CanonicalWork>>;
    async fn citing_page(&self, request: PageRequest<'_>) -> Result<CitationPage>;
}

/// Reduce `https://openalex.org/W123`, `openalex.org/W123` or `W123` to `W123`.
pub fn normalize_canonical_id(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if raw.starts_with("http") {
        if let Ok(parsed) = url::Url::parse(raw) {
            return parsed
                .path_segments()
                .and_then(|mut segs| segs.next_back())
                .unwrap_or("")
                .trim()
                .to_string();
        }
    }
    if raw.contains("openalex.org/") {
        return raw.rsplit('/').next().unwrap_or("").trim().to_string();
    }
    raw.to_string()
}

/// Strip a resolver prefix so identifiers compare as bare DOIs.
pub fn normalize_identifier(raw: &str) -> String {
    let raw = raw.trim();
    let lower = raw.to_lowercase();
    for prefix in [DOI_PREFIX, "http://doi.org/", "https://dx.doi.org/", "doi:"] {
        if lower.starts_with(prefix) {
            return raw.get(prefix.len()..).unwrap_or(raw).trim().to_string();
        }
    }
    raw.to_string()
}

fn non_empty(value: &serde_json::Value) -> Option<String> {
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn work_from_json(w: &serde_json::Value) -> CanonicalWork {
    let identifier = non_empty(&w["doi"]).map(|d| normalize_identifier(&d));
    let landing_url = non_empty(&w["primary_location"]["landing_page_url"])
        .or_else(|| identifier.as_ref().map(|d| format!("{}{}", DOI_PREFIX, d)));

    CanonicalWork {
        canonical_id: non_empty(&w["id"]).map(|id| normalize_canonical_id(&id)),
        identifier,
        title: w["title"].as_str().unwrap_or("").trim().to_string(),
        year: w["publication_year"].as_i64().map(|y| y as i32),
        landing_url,
        open_access_pdf_url: non_empty(&w["best_oa_location"]["pdf_url"]),
        citation_count: w["cited_by_count"].as_u64(),
        citation_list_endpoint: non_empty(&w["cited_by_api_url"]),
    }
}

fn citing_from_json(w: &serde_json::Value) -> CitingWork {
    CitingWork {
        title: w["title"].as_str().unwrap_or("").trim().to_string(),
        landing_url: w["primary_location"]["landing_page_url"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        canonical_id: normalize_canonical_id(w["id"].as_str().unwrap_or("")),
        year: w["publication_year"].as_i64().map(|y| y as i32),
    }
}

pub struct OpenAlexClient {
    client: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
    retries: u32,
}

impl OpenAlexClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        mailto: Option<String>,
        retries: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto,
            retries,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = http::build_client(config.http_timeout)?;
        Ok(Self::new(
            client,
            config.openalex_base.clone(),
            config.polite_email.clone(),
            config.lookup_retries,
        ))
    }

    fn works_url(&self) -> String {
        format!("{}/works", self.base_url)
    }

    fn with_mailto(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }
        params
    }
}

#[async_trait]
impl ScholarlyGraph for OpenAlexClient {
    async fn by_identifiers(&self, ids: &[String]) -> Result<Vec<CanonicalWork>> {
        let ids: Vec<String> = ids
            .iter()
            .map(|id| normalize_identifier(id))
            .filter(|id| !id.is_empty())
            .collect();
        let mut out = Vec::new();
        for group in ids.chunks(MAX_IDENTIFIER_BATCH) {
            let params = self.with_mailto(vec![
                ("filter", format!("doi:{}", group.join("|"))),
                ("per-page", group.len().to_string()),
            ]);
            let json =
                http::get_json_with_retry(&self.client, &self.works_url(), &params, self.retries).await?;
            if let Some(results) = json["results"].as_array() {
                out.extend(results.iter().map(work_from_json));
            }
        }
        debug!(requested = ids.len(), found = out.len(), "identifier lookup");
        Ok(out)
    }

    async fn by_title(&self, text: &str) -> Result<Option<CanonicalWork>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let params = self.with_mailto(vec![
            ("search", text.trim().to_string()),
            ("per-page", "1".to_string()),
        ]);
        let json =
            http::get_json_with_retry(&self.client, &self.works_url(), &params, self.retries).await?;
        Ok(json["results"].get(0).map(work_from_json))
    }

    async fn citing_page(&self, request: PageRequest<'_>) -> Result<CitationPage> {
        let (url, mut params) = match request.endpoint.filter(|e| !e.trim().is_empty()) {
            Some(endpoint) => (endpoint.to_string(), Vec::new()),
            None => (
                self.works_url(),
                vec![("filter", format!("cites:{}", normalize_canonical_id(request.canonical_id)))],
            ),
        };
        params.push(("per-page", request.per_page.to_string()));
        params.push(("cursor", request.cursor.to_string()));
        let params = self.with_mailto(params);

        let json = http::get_json_with_retry(&self.client, &url, &params, self.retries).await?;
        let items = json["results"]
            .as_array()
            .map(|results| results.iter().map(citing_from_json).collect())
            .unwrap_or_default();

        Ok(CitationPage {
            items,
            next_cursor: non_empty(&json["meta"]["next_cursor"]),
            expected_total: json["meta"]["count"].as_u64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_normalize_canonical_id_forms() {
        assert_eq!(normalize_canonical_id("https://openalex.org/W2741809807"), "W2741809807");
        assert_eq!(normalize_canonical_id("openalex.org/W2741809807"), "W2741809807");
        assert_eq!(normalize_canonical_id(" W2741809807 "), "W2741809807");
        assert_eq!(normalize_canonical_id(""), "");
    }

    #[test]
    fn test_normalize_identifier_strips_resolver() {
        assert_eq!(normalize_identifier("https://doi.org/10.1000/ABC"), "10.1000/ABC");
        assert_eq!(normalize_identifier("doi:10.1000/abc"), "10.1000/abc");
        assert_eq!(normalize_identifier("10.1000/abc"), "10.1000/abc");
    }

    #[test]
    fn test_work_from_json_fills_fallbacks() {
        let work = work_from_json(&serde_json::json!({
            "id": "https://openalex.org/W1",
            "doi": "https://doi.org/10.1000/x",
            "title": "X",
            "publication_year": 2021,
            "primary_location": { "landing_page_url": null },
            "best_oa_location": { "pdf_url": "https://repo.example/x.pdf" },
            "cited_by_count": 37,
            "cited_by_api_url": "https://api.openalex.org/works?filter=cites:W1"
        }));
        assert_eq!(work.canonical_id.as_deref(), Some("W1"));
        assert_eq!(work.identifier.as_deref(), Some("10.1000/x"));
        assert_eq!(work.landing_url.as_deref(), Some("https://doi.org/10.1000/x"));
        assert_eq!(work.year, Some(2021));
        assert_eq!(work.citation_count, Some(37));
        assert_eq!(work.open_access_pdf_url.as_deref(), Some("https://repo.example/x.pdf"));
    }

    #[tokio::test]
    async fn test_by_identifiers_batches_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "doi:10.1/a|10.1/b".into()),
                Matcher::UrlEncoded("per-page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(
                serde_json::json!({"results": [
                    {"id": "https://openalex.org/W1", "doi": "https://doi.org/10.1/a", "title": "A"},
                    {"id": "https://openalex.org/W2", "doi": "https://doi.org/10.1/b", "title": "B"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenAlexClient::new(reqwest::Client::new(), server.url(), None, 0);
        let works = client
            .by_identifiers(&["10.1/a".to_string(), "https://doi.org/10.1/b".to_string()])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(works.len(), 2);
        assert_eq!(works[1].canonical_id.as_deref(), Some("W2"));
    }

    #[tokio::test]
    async fn test_citing_page_reads_cursor_and_count() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "cites:W9".into()),
                Matcher::UrlEncoded("cursor".into(), "*".into()),
                Matcher::UrlEncoded("per-page".into(), "10".into()),
                Matcher::UrlEncoded("mailto".into(), "ops@example.org".into()),
            ]))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "meta": {"count": 37, "next_cursor": "abc"},
                    "results": [{"id": "https://openalex.org/W10", "title": "Citer", "publication_year": 2022}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenAlexClient::new(
            reqwest::Client::new(),
            server.url(),
            Some("ops@example.org".into()),
            0,
        );
        let page = client
            .citing_page(PageRequest {
                canonical_id: "https://openalex.org/W9",
                endpoint: None,
                cursor: FIRST_CURSOR,
                per_page: 10,
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(page.expected_total, Some(37));
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
        assert_eq!(page.items[0].canonical_id, "W10");
        assert_eq!(page.items[0].year, Some(2022));
    }

    #[tokio::test]
    async fn test_last_page_has_no_cursor() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"meta": {"count": 1, "next_cursor": null}, "results": []}"#)
            .create_async()
            .await;

        let client = OpenAlexClient::new(reqwest::Client::new(), server.url(), None, 0);
        let page = client
            .citing_page(PageRequest {
                canonical_id: "W9",
                endpoint: None,
                cursor: "abc",
                per_page: 200,
            })
            .await
            .unwrap();
        assert!(page.next_cursor.is_none());
        assert!(page.items.is_empty());
    }
}
