//! Orbio core - coordinator internals for a blackout-aware replicated
//! object store.
//!
//! A single elected coordinator chunks uploads, replicates every chunk to
//! two storage nodes, tracks placement in an external key-value store and
//! keeps replication intact while nodes pass through scheduled blackout
//! windows:
//! - fenced leader lease over a single KV key
//! - two-node replicated writes with rollback
//! - integrity-checked multi-replica reads feeding an LRU file cache
//! - under-replication repair and blackout-aware predictive pre-cache

pub mod cache;
pub mod chunk;
pub mod error;
pub mod lease;
pub mod metadata;
pub mod nodes;
pub mod operations;
pub mod registry;
pub mod transport;

pub use cache::{CachedFile, FileCache, CACHE_MAX_BYTES, CACHE_MAX_FILES};
pub use chunk::{chunk_id, compute_hash, split_chunks, verify_hash, CHUNK_SIZE};
pub use error::{OrbioError, Result};
pub use lease::{LeaderLease, LEASE_TICK, LEASE_TTL, LOCK_KEY};
pub use metadata::{ChunkMeta, FileMeta, MetadataStore, FILE_KEY_PREFIX, REPLICATION_FACTOR};
pub use nodes::{heartbeat_key, node_id, now_ms, NodePool, HEARTBEAT_DEAD_MS, NODE_KEY_PREFIX};
pub use operations::{
    FetchFileOperation, FetchFileOperationOutcome, FetchFileOperationRequest,
    FetchFileOperationResult, PlacementCursor, PrecacheOperation, PrecacheOperationResult,
    RebalanceOperation, RebalanceOperationResult, StoreFileOperation, StoreFileOperationRequest,
    StoreFileOperationResult, PRECACHE_PERIOD, PREDICT_THRESHOLD_MS, REBALANCE_PERIOD,
};
pub use registry::{KvStore, MemoryKv, RedisKv};
pub use transport::{HttpNodeTransport, MemoryTransport, NodeTransport, OrbitalStatus};
