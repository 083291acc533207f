use serde::{Deserialize, Serialize};

use crate::types::StorageHandle;

/// Metadata stored alongside artifact bytes in cnidarium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub handle: StorageHandle,
    /// Object name under the artifact prefix, e.g. `netpdf_2025-10-10-12-00-00_1a2b3c4d5e6f.pdf`
    pub object: String,
    pub media_type: String,
    /// URL the bytes were downloaded from
    pub source_url: String,
    /// blake3 hex of the content
    pub content_hash: String,
    pub size: usize,
    pub stored_at: i64,
}

/// Result of a content fetch, after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub bytes: Vec<u8>,
    pub resolved_url: String,
    /// Lowercased `Content-Type`, empty when absent
    pub media_type: String,
}

/// Result of a content-negotiation probe (no body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub resolved_url: String,
    pub media_type: String,
}

impl Probe {
    /// The final response looks like the artifact format we want.
    pub fn is_pdf(&self) -> bool {
        self.media_type.contains("pdf") || self.resolved_url.to_lowercase().ends_with(".pdf")
    }
}
