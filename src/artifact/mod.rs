pub mod fetch;
pub mod harvest;
pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cnidarium::{StateDelta, StateWrite, Storage};
use tracing::debug;

use crate::types::StorageHandle;
use types::ArtifactMeta;

// Key prefixes, no trailing slashes
const CONTENT_PREFIX: &str = "artifact/content";
const META_PREFIX: &str = "artifact/meta";
const HANDLE_SCHEME: &str = "store://artifact/";

fn content_key(object: &str) -> String {
    format!("{}/{}", CONTENT_PREFIX, object)
}
fn meta_key(object: &str) -> String {
    format!("{}/{}", META_PREFIX, object)
}

/// Object name for a downloaded artifact: prefix, UTC timestamp, and a short
/// blake3 digest of the source URL.
pub fn object_name(prefix: &str, source_url: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    let digest = blake3::hash(source_url.as_bytes()).to_hex();
    format!(
        "{}_{}_{}.pdf",
        prefix.trim_end_matches('_'),
        now.format("%Y-%m-%d-%H-%M-%S"),
        &digest.as_str()[..12]
    )
}

pub fn handle_for(object: &str) -> StorageHandle {
    format!("{}{}", HANDLE_SCHEME, object)
}

fn object_from_handle(handle: &str) -> Result<&str> {
    handle
        .strip_prefix(HANDLE_SCHEME)
        .filter(|o| !o.is_empty())
        .ok_or_else(|| anyhow::anyhow!("not an artifact handle: {}", handle))
}

/// Durable artifact storage.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Persist bytes and return a handle other services can be pointed at.
    async fn put(&self, bytes: &[u8], media_type: &str, source_url: &str) -> Result<StorageHandle>;
}

pub struct ArtifactStore {
    storage: Storage,
    prefix: String,
}

impl ArtifactStore {
    pub async fn new(data_dir: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![CONTENT_PREFIX.to_string(), META_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self {
            storage,
            prefix: prefix.to_string(),
        })
    }

    pub async fn get_content(&self, handle: &str) -> Result<Vec<u8>> {
        let object = object_from_handle(handle)?;
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        snapshot
            .get_raw(&content_key(object))
            .await?
            .ok_or_else(|| anyhow::anyhow!("artifact not found: {}", handle))
    }

    pub async fn get_meta(&self, handle: &str) -> Result<ArtifactMeta> {
        let object = object_from_handle(handle)?;
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let bytes = snapshot
            .get_raw(&meta_key(object))
            .await?
            .ok_or_else(|| anyhow::anyhow!("artifact metadata not found: {}", handle))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ArtifactStorage for ArtifactStore {
    async fn put(&self, bytes: &[u8], media_type: &str, source_url: &str) -> Result<StorageHandle> {
        let now = chrono::Utc::now();
        let object = object_name(&self.prefix, source_url, now);
        let handle = handle_for(&object);

        let meta = ArtifactMeta {
            handle: handle.clone(),
            object: object.clone(),
            media_type: media_type.to_string(),
            source_url: source_url.to_string(),
            content_hash: blake3::hash(bytes).to_hex().to_string(),
            size: bytes.len(),
            stored_at: now.timestamp(),
        };

        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        delta.put_raw(content_key(&object), bytes.to_vec());
        delta.put_raw(
            meta_key(&object),
            serde_json::to_vec(&meta).context("serialize artifact meta")?,
        );
        self.storage.commit(delta).await?;

        debug!(%handle, size = bytes.len(), media_type, "artifact stored");
        Ok(handle)
    }
}
