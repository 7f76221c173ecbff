use crate::error::Result;
use crate::registry::KvStore;
use std::sync::Arc;

/// Heartbeat freshness window. Nodes heartbeat every 3 s; missing three in
/// a row marks them down.
pub const HEARTBEAT_DEAD_MS: i64 = 6000;

/// Prefix of the per-node heartbeat keys in the KV store.
pub const NODE_KEY_PREFIX: &str = "node:";

/// Heartbeat-key suffix for a node URL: scheme stripped, trailing slashes
/// trimmed. Storage nodes derive the same id when writing their heartbeat.
pub fn node_id(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed)
        .to_string()
}

pub fn heartbeat_key(url: &str) -> String {
    format!("{}{}", NODE_KEY_PREFIX, node_id(url))
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The configured storage node pool. Configuration order is stable, so
/// round-robin placement over the alive subset is deterministic.
pub struct NodePool {
    urls: Vec<String>,
    kv: Arc<dyn KvStore>,
}

impl NodePool {
    pub fn new(urls: Vec<String>, kv: Arc<dyn KvStore>) -> Self {
        Self { urls, kv }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Nodes whose last heartbeat is younger than [`HEARTBEAT_DEAD_MS`],
    /// in configuration order. An absent or unparsable heartbeat key
    /// counts as down.
    pub async fn alive_nodes(&self) -> Result<Vec<String>> {
        let now = now_ms();
        let mut alive = Vec::with_capacity(self.urls.len());

        for url in &self.urls {
            let last_seen = self
                .kv
                .get(&heartbeat_key(url))
                .await?
                .and_then(|value| value.parse::<i64>().ok());

            if let Some(last_seen) = last_seen {
                if now - last_seen < HEARTBEAT_DEAD_MS {
                    alive.push(url.clone());
                }
            }
        }

        Ok(alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryKv;

    #[test]
    fn test_node_id_strips_scheme() {
        assert_eq!(node_id("http://127.0.0.1:4001"), "127.0.0.1:4001");
        assert_eq!(node_id("https://storage-1:4001/"), "storage-1:4001");
        assert_eq!(node_id("storage-1:4001"), "storage-1:4001");
    }

    #[tokio::test]
    async fn test_alive_nodes_filters_on_heartbeat_age() {
        let kv = Arc::new(MemoryKv::new());
        let urls = vec![
            "http://n1:4001".to_string(),
            "http://n2:4002".to_string(),
            "http://n3:4003".to_string(),
        ];

        kv.set("node:n1:4001", &now_ms().to_string()).await.unwrap();
        kv.set("node:n2:4002", &(now_ms() - HEARTBEAT_DEAD_MS - 1).to_string())
            .await
            .unwrap();
        // n3 never heartbeated.

        let pool = NodePool::new(urls, kv);
        let alive = pool.alive_nodes().await.unwrap();
        assert_eq!(alive, vec!["http://n1:4001".to_string()]);
    }

    #[tokio::test]
    async fn test_alive_nodes_keeps_configuration_order() {
        let kv = Arc::new(MemoryKv::new());
        let urls = vec![
            "http://n1:4001".to_string(),
            "http://n2:4002".to_string(),
            "http://n3:4003".to_string(),
        ];
        for url in &urls {
            kv.set(&heartbeat_key(url), &now_ms().to_string()).await.unwrap();
        }

        let pool = NodePool::new(urls.clone(), kv);
        assert_eq!(pool.alive_nodes().await.unwrap(), urls);
    }
}
