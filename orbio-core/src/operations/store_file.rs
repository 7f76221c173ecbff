use crate::chunk;
use crate::error::{OrbioError, Result};
use crate::metadata::{ChunkMeta, FileMeta, MetadataStore, REPLICATION_FACTOR};
use crate::nodes::NodePool;
use crate::transport::NodeTransport;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ulid::Ulid;

/// Process-wide placement cursor. Advancing once per chunk keeps primary
/// and replica distinct whenever at least two nodes are alive, and spreads
/// consecutive chunks across the pool. Concurrent uploads may interleave
/// increments; only monotonicity matters.
#[derive(Default)]
pub struct PlacementCursor {
    next: AtomicU64,
}

impl PlacementCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// (primary, replica) indices into an alive-set of length `len`.
    fn advance(&self, len: usize) -> (usize, usize) {
        let index = self.next.fetch_add(1, Ordering::SeqCst) as usize;
        (index % len, (index + 1) % len)
    }
}

#[derive(Clone)]
pub struct StoreFileOperation {
    metadata: Arc<MetadataStore>,
    nodes: Arc<NodePool>,
    transport: Arc<dyn NodeTransport>,
    cursor: Arc<PlacementCursor>,
}

#[derive(Debug, Clone)]
pub struct StoreFileOperationRequest {
    pub filename: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone)]
pub struct StoreFileOperationResult {
    pub file_id: String,
    pub total_chunks: usize,
}

impl StoreFileOperation {
    pub fn new(
        metadata: Arc<MetadataStore>,
        nodes: Arc<NodePool>,
        transport: Arc<dyn NodeTransport>,
        cursor: Arc<PlacementCursor>,
    ) -> Self {
        Self {
            metadata,
            nodes,
            transport,
            cursor,
        }
    }

    pub async fn run(&self, request: StoreFileOperationRequest) -> Result<StoreFileOperationResult> {
        let alive = self.nodes.alive_nodes().await?;
        if alive.len() < REPLICATION_FACTOR {
            return Err(OrbioError::InsufficientNodes {
                required: REPLICATION_FACTOR,
                alive: alive.len(),
            });
        }

        let file_id = Ulid::new().to_string();
        let chunks = chunk::split_chunks(&request.payload);

        // Every successful store in order, so the failure branch can undo
        // all of them, including the primary of a half-replicated chunk.
        let mut placed: Vec<(String, String)> = Vec::with_capacity(chunks.len() * REPLICATION_FACTOR);
        let mut chunk_metas = Vec::with_capacity(chunks.len());

        for (index, data) in chunks.iter().enumerate() {
            let chunk_id = chunk::chunk_id(&file_id, index);
            let hash = chunk::compute_hash(data);
            let (primary, replica) = self.cursor.advance(alive.len());
            let targets = [alive[primary].clone(), alive[replica].clone()];

            for node_url in &targets {
                if let Err(error) = self.transport.store_chunk(node_url, &chunk_id, data).await {
                    tracing::warn!("store of chunk {} on {} failed: {}", chunk_id, node_url, error);
                    self.rollback(&placed).await;
                    return Err(OrbioError::ReplicationFailed(format!(
                        "chunk {} could not be replicated to {}",
                        chunk_id, node_url
                    )));
                }
                placed.push((chunk_id.clone(), node_url.clone()));
            }

            chunk_metas.push(ChunkMeta {
                chunk_id,
                hash,
                nodes: targets.to_vec(),
            });
        }

        let meta = FileMeta {
            file_id: file_id.clone(),
            filename: request.filename,
            total_chunks: chunk_metas.len(),
            chunks: chunk_metas,
            size_bytes: request.payload.len() as u64,
            uploaded_at: chrono::Utc::now(),
        };

        // The upload is only acknowledged once this write lands. Chunks
        // with no metadata record are unreachable residue on the nodes.
        self.metadata.put_file(&meta).await?;

        tracing::info!(
            "stored file {} ({} chunks, {} bytes)",
            file_id,
            meta.total_chunks,
            meta.size_bytes
        );

        Ok(StoreFileOperationResult {
            file_id,
            total_chunks: meta.total_chunks,
        })
    }

    /// Best-effort undo of everything stored so far. Individual delete
    /// failures leave orphans behind; they are never referenced from
    /// metadata.
    async fn rollback(&self, placed: &[(String, String)]) {
        tracing::warn!("rolling back {} chunk placements", placed.len());
        for (chunk_id, node_url) in placed {
            if let Err(error) = self.transport.delete_chunk(node_url, chunk_id).await {
                tracing::warn!("rollback delete of {} on {} failed: {}", chunk_id, node_url, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::CHUNK_SIZE;
    use crate::nodes::{heartbeat_key, now_ms};
    use crate::registry::{KvStore, MemoryKv};
    use crate::transport::MemoryTransport;

    const N1: &str = "http://n1:4001";
    const N2: &str = "http://n2:4002";
    const N3: &str = "http://n3:4003";

    async fn cluster(urls: &[&str]) -> (Arc<MemoryKv>, Arc<NodePool>) {
        let kv = Arc::new(MemoryKv::new());
        for url in urls {
            kv.set(&heartbeat_key(url), &now_ms().to_string()).await.unwrap();
        }
        let pool = Arc::new(NodePool::new(
            urls.iter().map(|url| url.to_string()).collect(),
            kv.clone(),
        ));
        (kv, pool)
    }

    fn operation(
        kv: Arc<MemoryKv>,
        pool: Arc<NodePool>,
        transport: Arc<MemoryTransport>,
    ) -> (StoreFileOperation, Arc<MetadataStore>) {
        let metadata = Arc::new(MetadataStore::new(kv));
        let op = StoreFileOperation::new(
            metadata.clone(),
            pool,
            transport,
            Arc::new(PlacementCursor::new()),
        );
        (op, metadata)
    }

    #[tokio::test]
    async fn test_round_robin_placement_over_three_nodes() {
        let (kv, pool) = cluster(&[N1, N2, N3]).await;
        let transport = Arc::new(MemoryTransport::new());
        let (op, metadata) = operation(kv, pool, transport.clone());

        let payload = Bytes::from(vec![0xAB; 2 * CHUNK_SIZE + CHUNK_SIZE / 2]);
        let result = op
            .run(StoreFileOperationRequest {
                filename: "probe.bin".to_string(),
                payload: payload.clone(),
            })
            .await
            .unwrap();

        assert_eq!(result.total_chunks, 3);

        let meta = metadata.get_file(&result.file_id).await.unwrap().unwrap();
        assert_eq!(meta.size_bytes, payload.len() as u64);
        assert_eq!(meta.chunks[0].nodes, vec![N1.to_string(), N2.to_string()]);
        assert_eq!(meta.chunks[1].nodes, vec![N2.to_string(), N3.to_string()]);
        assert_eq!(meta.chunks[2].nodes, vec![N3.to_string(), N1.to_string()]);

        for chunk in &meta.chunks {
            assert_ne!(chunk.nodes[0], chunk.nodes[1]);
            for node in &chunk.nodes {
                assert!(transport.has_chunk(node, &chunk.chunk_id).await);
            }
        }
    }

    #[tokio::test]
    async fn test_fails_below_two_alive_nodes() {
        let (kv, pool) = cluster(&[N1]).await;
        let transport = Arc::new(MemoryTransport::new());
        let (op, _) = operation(kv, pool, transport);

        let error = op
            .run(StoreFileOperationRequest {
                filename: "x".to_string(),
                payload: Bytes::from_static(b"data"),
            })
            .await
            .unwrap_err();

        assert!(matches!(error, OrbioError::InsufficientNodes { alive: 1, .. }));
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_placed_chunks() {
        let (kv, pool) = cluster(&[N1, N2]).await;
        let transport = Arc::new(MemoryTransport::new());
        transport.reject_stores(N2).await;
        let (op, metadata) = operation(kv, pool, transport.clone());

        let error = op
            .run(StoreFileOperationRequest {
                filename: "x".to_string(),
                payload: Bytes::from(vec![1u8; 64]),
            })
            .await
            .unwrap_err();
        assert!(matches!(error, OrbioError::ReplicationFailed(_)));

        // The primary copy was deleted again and no metadata was written.
        let deletes = transport.deletes().await;
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].0, N1);
        assert_eq!(transport.chunk_count(N1).await, 0);
        assert!(metadata.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mid_file_failure_deletes_all_earlier_replicas() {
        let (kv, pool) = cluster(&[N1, N2]).await;
        let transport = Arc::new(MemoryTransport::new());
        // Chunk 0 replicates to both nodes; chunk 1's primary (N2, after
        // the cursor advanced) then refuses and the upload unwinds.
        transport.fail_stores_after(N2, 1).await;
        let (op, metadata) = operation(kv, pool, transport.clone());

        let error = op
            .run(StoreFileOperationRequest {
                filename: "x".to_string(),
                payload: Bytes::from(vec![2u8; CHUNK_SIZE + 16]),
            })
            .await
            .unwrap_err();
        assert!(matches!(error, OrbioError::ReplicationFailed(_)));

        // Both replicas of the completed chunk were deleted again.
        let deletes = transport.deletes().await;
        assert_eq!(deletes.len(), 2);
        assert!(deletes.iter().any(|(node, _)| node == N1));
        assert!(deletes.iter().any(|(node, _)| node == N2));
        assert_eq!(transport.chunk_count(N1).await, 0);
        assert_eq!(transport.chunk_count(N2).await, 0);
        assert!(metadata.list_files().await.unwrap().is_empty());
    }
}
