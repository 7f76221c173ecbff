use crate::cache::{CachedFile, FileCache};
use crate::chunk;
use crate::error::{OrbioError, Result};
use crate::metadata::{ChunkMeta, FileMeta, MetadataStore};
use crate::transport::NodeTransport;
use bytes::{Bytes, BytesMut};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct FetchFileOperation {
    metadata: Arc<MetadataStore>,
    transport: Arc<dyn NodeTransport>,
    cache: Arc<FileCache>,
}

#[derive(Debug, Clone)]
pub struct FetchFileOperationRequest {
    pub file_id: String,
    /// Replica URLs to skip while reconstructing. Empty for downloads;
    /// the pre-cache loop avoids the node about to enter a blackout.
    pub avoid: HashSet<String>,
}

impl FetchFileOperationRequest {
    pub fn download(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            avoid: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchFileOperationResult {
    pub file_id: String,
    pub filename: String,
    pub body: Bytes,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub enum FetchFileOperationOutcome {
    Found(FetchFileOperationResult),
    NotFound,
}

impl FetchFileOperation {
    pub fn new(
        metadata: Arc<MetadataStore>,
        transport: Arc<dyn NodeTransport>,
        cache: Arc<FileCache>,
    ) -> Self {
        Self {
            metadata,
            transport,
            cache,
        }
    }

    pub async fn run(&self, request: FetchFileOperationRequest) -> Result<FetchFileOperationOutcome> {
        let FetchFileOperationRequest { file_id, avoid } = request;

        if avoid.is_empty() {
            if let Some(cached) = self.cache.get(&file_id).await {
                return Ok(FetchFileOperationOutcome::Found(FetchFileOperationResult {
                    file_id,
                    filename: cached.filename,
                    body: cached.buffer,
                    from_cache: true,
                }));
            }
        }

        let Some(meta) = self.metadata.get_file(&file_id).await? else {
            return Ok(FetchFileOperationOutcome::NotFound);
        };

        let body = self.reconstruct(&meta, &avoid).await?;
        self.cache
            .insert(CachedFile {
                file_id: file_id.clone(),
                filename: meta.filename.clone(),
                buffer: body.clone(),
            })
            .await;

        Ok(FetchFileOperationOutcome::Found(FetchFileOperationResult {
            file_id,
            filename: meta.filename,
            body,
            from_cache: false,
        }))
    }

    /// Rebuild the file body from replicas, skipping `avoid`. All chunks
    /// must come back verified; there is no partial body.
    async fn reconstruct(&self, meta: &FileMeta, avoid: &HashSet<String>) -> Result<Bytes> {
        let mut body = BytesMut::with_capacity(meta.size_bytes as usize);
        for chunk_meta in &meta.chunks {
            let data = self.fetch_verified(chunk_meta, avoid).await?;
            body.extend_from_slice(&data);
        }
        Ok(body.freeze())
    }

    /// Try replicas strictly in metadata order; the first readable copy
    /// wins and must match the stored hash. A corrupt replica aborts the
    /// read outright; repair is the rebalancer's job, not the reader's.
    async fn fetch_verified(&self, chunk_meta: &ChunkMeta, avoid: &HashSet<String>) -> Result<Bytes> {
        for node_url in &chunk_meta.nodes {
            if avoid.contains(node_url) {
                continue;
            }

            let data = match self.transport.fetch_chunk(node_url, &chunk_meta.chunk_id).await {
                Ok(data) => data,
                Err(error) => {
                    tracing::warn!(
                        "replica {} failed for chunk {}: {}",
                        node_url,
                        chunk_meta.chunk_id,
                        error
                    );
                    continue;
                }
            };

            chunk::verify_hash(&data, &chunk_meta.hash)?;
            return Ok(data);
        }

        Err(OrbioError::ReplicaUnavailable(chunk_meta.chunk_id.clone()))
    }
}
