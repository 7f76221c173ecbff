use crate::cache::FileCache;
use crate::error::Result;
use crate::metadata::MetadataStore;
use crate::nodes::NodePool;
use crate::operations::fetch_file::{
    FetchFileOperation, FetchFileOperationOutcome, FetchFileOperationRequest,
};
use crate::transport::NodeTransport;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// How often blackout schedules are polled.
pub const PRECACHE_PERIOD: Duration = Duration::from_secs(3);

/// A node whose next blackout starts within this window triggers
/// pre-caching of the files it holds.
pub const PREDICT_THRESHOLD_MS: i64 = 4000;

#[derive(Clone)]
pub struct PrecacheOperation {
    metadata: Arc<MetadataStore>,
    nodes: Arc<NodePool>,
    transport: Arc<dyn NodeTransport>,
    fetcher: FetchFileOperation,
    cache: Arc<FileCache>,
}

#[derive(Debug, Clone, Default)]
pub struct PrecacheOperationResult {
    pub cached_files: usize,
    pub skipped_files: usize,
}

impl PrecacheOperation {
    pub fn new(
        metadata: Arc<MetadataStore>,
        nodes: Arc<NodePool>,
        transport: Arc<dyn NodeTransport>,
        fetcher: FetchFileOperation,
        cache: Arc<FileCache>,
    ) -> Self {
        Self {
            metadata,
            nodes,
            transport,
            fetcher,
            cache,
        }
    }

    /// One poll of every configured node's blackout schedule. Nodes whose
    /// status call fails are skipped; they are either dark already or will
    /// be caught on the next poll.
    pub async fn run(&self) -> Result<PrecacheOperationResult> {
        let mut result = PrecacheOperationResult::default();

        for node_url in self.nodes.urls() {
            let status = match self.transport.orbital_status(node_url).await {
                Ok(status) => status,
                Err(error) => {
                    tracing::debug!("orbital status of {} unavailable: {}", node_url, error);
                    continue;
                }
            };

            if status.is_in_blackout || status.next_blackout_in_ms >= PREDICT_THRESHOLD_MS {
                continue;
            }

            tracing::info!(
                "node {} enters blackout in {} ms, warming cache",
                node_url,
                status.next_blackout_in_ms
            );
            self.precache_from_node(node_url, &mut result).await?;
        }

        Ok(result)
    }

    /// Reconstruct-and-cache every uncached file with a replica on the
    /// node, reading around that node while it can still serve its peers'
    /// health checks.
    async fn precache_from_node(
        &self,
        node_url: &str,
        result: &mut PrecacheOperationResult,
    ) -> Result<()> {
        let avoid: HashSet<String> = [node_url.to_string()].into_iter().collect();

        for meta in self.metadata.list_files().await? {
            if !meta.references_node(node_url) {
                continue;
            }
            if self.cache.contains(&meta.file_id).await {
                continue;
            }

            // A chunk whose only replica sits on the avoided node cannot
            // be read around it; the whole file is skipped.
            if meta
                .chunks
                .iter()
                .any(|chunk| chunk.nodes.iter().all(|node| node == node_url))
            {
                tracing::info!(
                    "skipping pre-cache of {}: {} holds the only replica of a chunk",
                    meta.file_id,
                    node_url
                );
                result.skipped_files += 1;
                continue;
            }

            let request = FetchFileOperationRequest {
                file_id: meta.file_id.clone(),
                avoid: avoid.clone(),
            };
            match self.fetcher.run(request).await {
                Ok(FetchFileOperationOutcome::Found(_)) => {
                    tracing::info!(
                        "pre-cached {} ahead of blackout on {}",
                        meta.file_id,
                        node_url
                    );
                    result.cached_files += 1;
                }
                Ok(FetchFileOperationOutcome::NotFound) => {}
                Err(error) => {
                    tracing::warn!("pre-cache of {} failed: {}", meta.file_id, error);
                    result.skipped_files += 1;
                }
            }
        }

        Ok(())
    }
}
