use super::{NodeTransport, OrbitalStatus};
use crate::error::{OrbioError, Result};
use crate::nodes::node_id;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// In-process stand-in for a pool of blob servers, with the failure and
/// corruption injection the coordinator tests need.
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// node url -> chunk id -> bytes
    chunks: HashMap<String, HashMap<String, Bytes>>,
    unreachable: HashSet<String>,
    reject_stores: HashSet<String>,
    /// node url -> stores still allowed before the node starts refusing.
    store_quotas: HashMap<String, usize>,
    statuses: HashMap<String, OrbitalStatus>,
    /// Every delete issued, in order.
    deletes: Vec<(String, String)>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call against the node fail, as a blackout would.
    pub async fn set_unreachable(&self, node_url: &str, unreachable: bool) {
        let mut inner = self.inner.lock().await;
        if unreachable {
            inner.unreachable.insert(node_url.to_string());
        } else {
            inner.unreachable.remove(node_url);
        }
    }

    /// Make only stores fail on the node; reads and deletes keep working.
    pub async fn reject_stores(&self, node_url: &str) {
        let mut inner = self.inner.lock().await;
        inner.reject_stores.insert(node_url.to_string());
    }

    /// Let `allowed` stores succeed on the node, then refuse the rest.
    pub async fn fail_stores_after(&self, node_url: &str, allowed: usize) {
        let mut inner = self.inner.lock().await;
        inner.store_quotas.insert(node_url.to_string(), allowed);
    }

    pub async fn set_status(&self, node_url: &str, is_in_blackout: bool, next_blackout_in_ms: i64) {
        let mut inner = self.inner.lock().await;
        inner.statuses.insert(
            node_url.to_string(),
            OrbitalStatus {
                node_id: node_id(node_url),
                is_in_blackout,
                next_blackout_in_ms,
            },
        );
    }

    /// Overwrite stored chunk bytes without touching the recorded hash.
    pub async fn tamper_chunk(&self, node_url: &str, chunk_id: &str, data: Bytes) {
        let mut inner = self.inner.lock().await;
        inner
            .chunks
            .entry(node_url.to_string())
            .or_default()
            .insert(chunk_id.to_string(), data);
    }

    pub async fn seed_chunk(&self, node_url: &str, chunk_id: &str, data: Bytes) {
        self.tamper_chunk(node_url, chunk_id, data).await;
    }

    pub async fn has_chunk(&self, node_url: &str, chunk_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .chunks
            .get(node_url)
            .map(|chunks| chunks.contains_key(chunk_id))
            .unwrap_or(false)
    }

    pub async fn chunk_count(&self, node_url: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.chunks.get(node_url).map(|chunks| chunks.len()).unwrap_or(0)
    }

    pub async fn deletes(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock().await;
        inner.deletes.clone()
    }
}

#[async_trait::async_trait]
impl NodeTransport for MemoryTransport {
    async fn store_chunk(&self, node_url: &str, chunk_id: &str, data: &Bytes) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.unreachable.contains(node_url) || inner.reject_stores.contains(node_url) {
            return Err(OrbioError::Http(format!("store refused by {}", node_url)));
        }
        if let Some(quota) = inner.store_quotas.get_mut(node_url) {
            if *quota == 0 {
                return Err(OrbioError::Http(format!("store refused by {}", node_url)));
            }
            *quota -= 1;
        }

        inner
            .chunks
            .entry(node_url.to_string())
            .or_default()
            .insert(chunk_id.to_string(), data.clone());
        Ok(())
    }

    async fn fetch_chunk(&self, node_url: &str, chunk_id: &str) -> Result<Bytes> {
        let inner = self.inner.lock().await;
        if inner.unreachable.contains(node_url) {
            return Err(OrbioError::Http(format!("{} unreachable", node_url)));
        }

        inner
            .chunks
            .get(node_url)
            .and_then(|chunks| chunks.get(chunk_id))
            .cloned()
            .ok_or_else(|| OrbioError::Http(format!("chunk {} absent on {}", chunk_id, node_url)))
    }

    async fn delete_chunk(&self, node_url: &str, chunk_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.deletes.push((node_url.to_string(), chunk_id.to_string()));
        if inner.unreachable.contains(node_url) {
            return Err(OrbioError::Http(format!("{} unreachable", node_url)));
        }

        if let Some(chunks) = inner.chunks.get_mut(node_url) {
            chunks.remove(chunk_id);
        }
        Ok(())
    }

    async fn orbital_status(&self, node_url: &str) -> Result<OrbitalStatus> {
        let inner = self.inner.lock().await;
        if inner.unreachable.contains(node_url) {
            return Err(OrbioError::Http(format!("{} unreachable", node_url)));
        }

        Ok(inner.statuses.get(node_url).cloned().unwrap_or(OrbitalStatus {
            node_id: node_id(node_url),
            is_in_blackout: false,
            next_blackout_in_ms: i64::MAX,
        }))
    }
}
