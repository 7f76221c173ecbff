//! Client surface of the storage-node blob API.
//!
//! The coordinator only talks to storage nodes through [`NodeTransport`],
//! so tests can swap the HTTP transport for an in-process one.

pub mod http;
pub mod memory;

pub use http::HttpNodeTransport;
pub use memory::MemoryTransport;

use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Blackout schedule snapshot reported by a storage node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrbitalStatus {
    pub node_id: String,
    pub is_in_blackout: bool,
    pub next_blackout_in_ms: i64,
}

#[async_trait::async_trait]
pub trait NodeTransport: Send + Sync {
    /// POST the chunk to the node. Nodes in blackout refuse the write.
    async fn store_chunk(&self, node_url: &str, chunk_id: &str, data: &Bytes) -> Result<()>;

    /// Fetch one chunk. Bounded by a 2 s timeout per attempt so a replica
    /// loop over a dark node moves on quickly.
    async fn fetch_chunk(&self, node_url: &str, chunk_id: &str) -> Result<Bytes>;

    /// Idempotent; deleting an absent chunk succeeds.
    async fn delete_chunk(&self, node_url: &str, chunk_id: &str) -> Result<()>;

    async fn orbital_status(&self, node_url: &str) -> Result<OrbitalStatus>;
}
