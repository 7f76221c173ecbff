use crate::error::Result;
use crate::metadata::{MetadataStore, REPLICATION_FACTOR};
use crate::nodes::NodePool;
use crate::transport::NodeTransport;
use std::sync::Arc;
use std::time::Duration;

/// How often the repair loop scans metadata.
pub const REBALANCE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RebalanceOperation {
    metadata: Arc<MetadataStore>,
    nodes: Arc<NodePool>,
    transport: Arc<dyn NodeTransport>,
}

#[derive(Debug, Clone, Default)]
pub struct RebalanceOperationResult {
    pub scanned_files: usize,
    pub repaired_chunks: usize,
}

impl RebalanceOperation {
    pub fn new(
        metadata: Arc<MetadataStore>,
        nodes: Arc<NodePool>,
        transport: Arc<dyn NodeTransport>,
    ) -> Self {
        Self {
            metadata,
            nodes,
            transport,
        }
    }

    /// One repair sweep over all file metadata. Per-chunk failures are
    /// logged and retried on the next sweep; the sweep itself only fails
    /// when the KV is unreachable.
    ///
    /// Dead-looking replicas are never dropped from `nodes`: a dark node
    /// may return with its bytes intact, and the hash still vouches for
    /// them. Placement only ever grows here.
    pub async fn run(&self) -> Result<RebalanceOperationResult> {
        let mut result = RebalanceOperationResult::default();

        let alive = self.nodes.alive_nodes().await?;
        if alive.len() < REPLICATION_FACTOR {
            return Ok(result);
        }

        for mut meta in self.metadata.list_files().await? {
            result.scanned_files += 1;
            let mut dirty = false;

            for chunk in &mut meta.chunks {
                if !chunk.is_under_replicated() {
                    continue;
                }

                let Some(source) = chunk.nodes.first().cloned() else {
                    tracing::warn!("chunk {} has no replicas left to copy from", chunk.chunk_id);
                    continue;
                };
                let Some(target) = alive.iter().find(|node| !chunk.nodes.contains(*node)).cloned() else {
                    continue;
                };

                match self.copy_chunk(&source, &target, &chunk.chunk_id).await {
                    Ok(()) => {
                        tracing::info!(
                            "re-replicated chunk {} from {} to {}",
                            chunk.chunk_id,
                            source,
                            target
                        );
                        chunk.nodes.push(target);
                        dirty = true;
                        result.repaired_chunks += 1;
                    }
                    Err(error) => {
                        tracing::warn!("repair of chunk {} failed: {}", chunk.chunk_id, error);
                    }
                }
            }

            if dirty {
                if let Err(error) = self.metadata.put_file(&meta).await {
                    tracing::warn!(
                        "failed to persist repaired metadata for {}: {}",
                        meta.file_id,
                        error
                    );
                }
            }
        }

        Ok(result)
    }

    async fn copy_chunk(&self, source: &str, target: &str, chunk_id: &str) -> Result<()> {
        let data = self.transport.fetch_chunk(source, chunk_id).await?;
        self.transport.store_chunk(target, chunk_id, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ChunkMeta, FileMeta};
    use crate::nodes::{heartbeat_key, now_ms};
    use crate::registry::{KvStore, MemoryKv};
    use crate::transport::MemoryTransport;
    use bytes::Bytes;

    const N1: &str = "http://n1:4001";
    const N2: &str = "http://n2:4002";
    const N3: &str = "http://n3:4003";

    struct Fixture {
        metadata: Arc<MetadataStore>,
        transport: Arc<MemoryTransport>,
        op: RebalanceOperation,
    }

    async fn fixture(alive: &[&str]) -> Fixture {
        let kv = Arc::new(MemoryKv::new());
        for url in alive {
            kv.set(&heartbeat_key(url), &now_ms().to_string()).await.unwrap();
        }
        let pool = Arc::new(NodePool::new(
            vec![N1.to_string(), N2.to_string(), N3.to_string()],
            kv.clone(),
        ));
        let metadata = Arc::new(MetadataStore::new(kv));
        let transport = Arc::new(MemoryTransport::new());
        let op = RebalanceOperation::new(metadata.clone(), pool, transport.clone());
        Fixture {
            metadata,
            transport,
            op,
        }
    }

    async fn seed_single_replica_file(fixture: &Fixture) -> Bytes {
        let data = Bytes::from_static(b"lonely chunk");
        fixture.transport.seed_chunk(N1, "f1_chunk_0", data.clone()).await;
        fixture
            .metadata
            .put_file(&FileMeta {
                file_id: "f1".to_string(),
                filename: "f1.bin".to_string(),
                total_chunks: 1,
                chunks: vec![ChunkMeta {
                    chunk_id: "f1_chunk_0".to_string(),
                    hash: crate::chunk::compute_hash(&data),
                    nodes: vec![N1.to_string()],
                }],
                size_bytes: data.len() as u64,
                uploaded_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        data
    }

    #[tokio::test]
    async fn test_repairs_under_replicated_chunk() {
        let fixture = fixture(&[N1, N2, N3]).await;
        let data = seed_single_replica_file(&fixture).await;

        let result = fixture.op.run().await.unwrap();
        assert_eq!(result.repaired_chunks, 1);

        let meta = fixture.metadata.get_file("f1").await.unwrap().unwrap();
        let nodes = &meta.chunks[0].nodes;
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], N1);
        // First alive node not already holding the chunk.
        assert_eq!(nodes[1], N2);
        assert_eq!(
            fixture.transport.fetch_chunk(N2, "f1_chunk_0").await.unwrap(),
            data
        );
    }

    #[tokio::test]
    async fn test_rebalance_is_idempotent() {
        let fixture = fixture(&[N1, N2, N3]).await;
        seed_single_replica_file(&fixture).await;

        fixture.op.run().await.unwrap();
        let first = fixture.metadata.get_file("f1").await.unwrap().unwrap();

        let result = fixture.op.run().await.unwrap();
        assert_eq!(result.repaired_chunks, 0);
        let second = fixture.metadata.get_file("f1").await.unwrap().unwrap();
        assert_eq!(first.chunks[0].nodes, second.chunks[0].nodes);
    }

    #[tokio::test]
    async fn test_noop_below_two_alive_nodes() {
        let fixture = fixture(&[N1]).await;
        seed_single_replica_file(&fixture).await;

        let result = fixture.op.run().await.unwrap();
        assert_eq!(result.scanned_files, 0);

        let meta = fixture.metadata.get_file("f1").await.unwrap().unwrap();
        assert_eq!(meta.chunks[0].nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_metadata_unchanged() {
        // N2 is the only candidate target and refuses the store, so the
        // chunk stays under-replicated until a later sweep.
        let fixture = fixture(&[N1, N2]).await;
        seed_single_replica_file(&fixture).await;
        fixture.transport.reject_stores(N2).await;

        let result = fixture.op.run().await.unwrap();
        assert_eq!(result.repaired_chunks, 0);
        let meta = fixture.metadata.get_file("f1").await.unwrap().unwrap();
        assert_eq!(meta.chunks[0].nodes, vec![N1.to_string()]);
    }

    #[tokio::test]
    async fn test_never_removes_dead_replicas() {
        let fixture = fixture(&[N2, N3]).await;

        // Both recorded replicas look dead; the entry must survive as-is
        // plus the freshly minted copy.
        let data = Bytes::from_static(b"chunk");
        fixture.transport.seed_chunk(N1, "f2_chunk_0", data.clone()).await;
        fixture
            .metadata
            .put_file(&FileMeta {
                file_id: "f2".to_string(),
                filename: "f2.bin".to_string(),
                total_chunks: 1,
                chunks: vec![ChunkMeta {
                    chunk_id: "f2_chunk_0".to_string(),
                    hash: crate::chunk::compute_hash(&data),
                    nodes: vec![N1.to_string()],
                }],
                size_bytes: data.len() as u64,
                uploaded_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        fixture.op.run().await.unwrap();

        let meta = fixture.metadata.get_file("f2").await.unwrap().unwrap();
        assert!(meta.chunks[0].nodes.contains(&N1.to_string()));
        assert_eq!(meta.chunks[0].nodes.len(), 2);
    }
}
