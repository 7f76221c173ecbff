use crate::error::Result;
use crate::registry::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prefix of the per-file metadata keys in the KV store.
pub const FILE_KEY_PREFIX: &str = "file:";

/// Replication target for every chunk.
pub const REPLICATION_FACTOR: usize = 2;

/// Placement record for one chunk. `nodes` lists the URLs believed to hold
/// the chunk, in the order writes succeeded; reads follow this order.
/// Liveness never removes entries; a dark replica may come back with its
/// bytes intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub hash: String,
    pub nodes: Vec<String>,
}

impl ChunkMeta {
    pub fn is_under_replicated(&self) -> bool {
        self.nodes.len() < REPLICATION_FACTOR
    }
}

/// Metadata document stored as JSON under `file:{fileId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub file_id: String,
    pub filename: String,
    pub total_chunks: usize,
    pub chunks: Vec<ChunkMeta>,
    pub size_bytes: u64,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

impl FileMeta {
    pub fn references_node(&self, node_url: &str) -> bool {
        self.chunks
            .iter()
            .any(|chunk| chunk.nodes.iter().any(|node| node == node_url))
    }
}

/// File metadata access over the external KV. Values are self-describing
/// JSON documents; writes are last-writer-wins.
pub struct MetadataStore {
    kv: Arc<dyn KvStore>,
}

impl MetadataStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(file_id: &str) -> String {
        format!("{}{}", FILE_KEY_PREFIX, file_id)
    }

    pub async fn put_file(&self, meta: &FileMeta) -> Result<()> {
        let payload = serde_json::to_string(meta)?;
        self.kv.set(&Self::key(&meta.file_id), &payload).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<Option<FileMeta>> {
        match self.kv.get(&Self::key(file_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Every stored metadata document. Undecodable entries are logged and
    /// skipped rather than failing the listing.
    pub async fn list_files(&self) -> Result<Vec<FileMeta>> {
        let keys = self.kv.keys(FILE_KEY_PREFIX).await?;
        let mut files = Vec::with_capacity(keys.len());

        for key in keys {
            let Some(payload) = self.kv.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<FileMeta>(&payload) {
                Ok(meta) => files.push(meta),
                Err(error) => {
                    tracing::warn!("skipping undecodable metadata at {}: {}", key, error)
                }
            }
        }

        Ok(files)
    }
}
