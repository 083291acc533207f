use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use super::types::{FetchedContent, Probe};

const PDF_ACCEPT: &str = "application/pdf, */*;q=0.1";
const PDF_MAGIC: &[u8] = b"%PDF-";
const MIN_PDF_LEN: usize = 10;

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Follow redirects without downloading the body. `None` if unreachable or non-2xx.
    async fn probe(&self, url: &str) -> Option<Probe>;
    /// Download the resource. Errors on transport failure or non-2xx.
    async fn fetch(&self, url: &str) -> Result<FetchedContent>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn media_type(resp: &reqwest::Response) -> String {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase()
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn probe(&self, url: &str) -> Option<Probe> {
        // HEAD first; some hosts reject it, so fall back to a GET whose body is never read.
        match self.client.head(url).header(ACCEPT, PDF_ACCEPT).send().await {
            Ok(resp) if resp.status().is_success() => {
                return Some(Probe {
                    resolved_url: resp.url().to_string(),
                    media_type: media_type(&resp),
                })
            }
            Ok(resp) => debug!(url, status = %resp.status(), "HEAD probe rejected"),
            Err(e) => debug!(url, "HEAD probe failed: {}", e),
        }
        match self.client.get(url).header(ACCEPT, PDF_ACCEPT).send().await {
            Ok(resp) if resp.status().is_success() => Some(Probe {
                resolved_url: resp.url().to_string(),
                media_type: media_type(&resp),
            }),
            Ok(resp) => {
                debug!(url, status = %resp.status(), "GET probe rejected");
                None
            }
            Err(e) => {
                debug!(url, "GET probe failed: {}", e);
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, PDF_ACCEPT)
            .send()
            .await
            .context("Failed to fetch URL")?
            .error_for_status()
            .context("Artifact host returned an error status")?;

        let resolved_url = resp.url().to_string();
        let media_type = media_type(&resp);
        let bytes = resp.bytes().await.context("Failed to read response body")?;

        Ok(FetchedContent {
            bytes: bytes.to_vec(),
            resolved_url,
            media_type,
        })
    }
}

/// Rewrite a preprint abstract page to its direct PDF, when the rule applies.
///
/// `.pdf` URLs are returned as-is; `arxiv.org/abs/<id>` becomes
/// `https://arxiv.org/pdf/<id>.pdf`; `arxiv.org/pdf/<id>` gains the suffix.
pub fn preprint_pdf_url(url: &str) -> Option<String> {
    let u = url.trim();
    if u.is_empty() {
        return None;
    }
    let lower = u.to_lowercase();
    if lower.ends_with(".pdf") {
        return Some(u.to_string());
    }
    if lower.contains("arxiv.org/abs/") {
        let tail = u.split("/abs/").nth(1)?.split('?').next()?.trim_matches('/');
        if tail.is_empty() {
            return None;
        }
        return Some(format!("https://arxiv.org/pdf/{}.pdf", tail));
    }
    if lower.contains("arxiv.org/pdf/") {
        let base = u.split('?').next()?.trim_end_matches('/');
        return Some(format!("{}.pdf", base));
    }
    None
}

/// Normalise a download URL through the preprint rule, leaving others untouched.
pub fn ensure_pdf_url(url: &str) -> String {
    preprint_pdf_url(url).unwrap_or_else(|| url.trim().to_string())
}

pub fn looks_like_pdf(data: &[u8]) -> bool {
    data.len() >= MIN_PDF_LEN && data.starts_with(PDF_MAGIC)
}

/// Magic bytes decide; a PDF content type is accepted only for a non-trivial body.
pub fn is_valid_pdf(content: &FetchedContent) -> bool {
    looks_like_pdf(&content.bytes)
        || (content.media_type.contains("pdf") && content.bytes.len() >= MIN_PDF_LEN)
}
