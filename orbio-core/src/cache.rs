use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Most files the cache will hold.
pub const CACHE_MAX_FILES: usize = 5;

/// Aggregate bound on cached buffer bytes.
pub const CACHE_MAX_BYTES: usize = 200 * 1024 * 1024;

/// A fully reconstructed file held in memory.
#[derive(Debug, Clone)]
pub struct CachedFile {
    pub file_id: String,
    pub filename: String,
    pub buffer: Bytes,
}

/// Bounded in-memory cache of reconstructed files: strict LRU on access,
/// bounded both by entry count and by total buffer bytes. The cache lives
/// in one coordinator process only; leadership changes do not migrate it.
pub struct FileCache {
    inner: Mutex<Inner>,
}

struct Inner {
    entries: HashMap<String, CachedFile>,
    /// Recency list, most recently used last. Entry count is small enough
    /// that linear scans on touch stay cheap.
    order: Vec<String>,
    total_bytes: usize,
    max_files: usize,
    max_bytes: usize,
}

impl FileCache {
    pub fn new() -> Self {
        Self::with_bounds(CACHE_MAX_FILES, CACHE_MAX_BYTES)
    }

    pub fn with_bounds(max_files: usize, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                total_bytes: 0,
                max_files,
                max_bytes,
            }),
        }
    }

    pub async fn contains(&self, file_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.entries.contains_key(file_id)
    }

    /// Fetch an entry, marking it most recently used.
    pub async fn get(&self, file_id: &str) -> Option<CachedFile> {
        let mut inner = self.inner.lock().await;
        let found = inner.entries.get(file_id).cloned();
        if found.is_some() {
            inner.touch(file_id);
        }
        found
    }

    /// Insert an entry, evicting least-recently-used entries until both
    /// bounds hold again.
    pub async fn insert(&self, file: CachedFile) {
        let mut inner = self.inner.lock().await;

        if let Some(previous) = inner.entries.remove(&file.file_id) {
            inner.total_bytes -= previous.buffer.len();
            inner.order.retain(|id| id != &file.file_id);
        }

        inner.total_bytes += file.buffer.len();
        inner.order.push(file.file_id.clone());
        inner.entries.insert(file.file_id.clone(), file);

        while (inner.entries.len() > inner.max_files || inner.total_bytes > inner.max_bytes)
            && !inner.order.is_empty()
        {
            let evicted = inner.order.remove(0);
            if let Some(entry) = inner.entries.remove(&evicted) {
                inner.total_bytes -= entry.buffer.len();
                tracing::debug!("evicted {} from file cache ({} bytes)", evicted, entry.buffer.len());
            }
        }
    }

    /// All entries in LRU order, least recently used first.
    pub async fn snapshot(&self) -> Vec<CachedFile> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.entries.len()
    }

    pub async fn total_bytes(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.total_bytes
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn touch(&mut self, file_id: &str) {
        self.order.retain(|id| id != file_id);
        self.order.push(file_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, size: usize) -> CachedFile {
        CachedFile {
            file_id: id.to_string(),
            filename: format!("{}.bin", id),
            buffer: Bytes::from(vec![0u8; size]),
        }
    }

    #[tokio::test]
    async fn test_count_bound_evicts_lru() {
        let cache = FileCache::with_bounds(2, 1024);
        cache.insert(entry("a", 10)).await;
        cache.insert(entry("b", 10)).await;

        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").await.is_some());
        cache.insert(entry("c", 10)).await;

        assert!(cache.contains("a").await);
        assert!(!cache.contains("b").await);
        assert!(cache.contains("c").await);
    }

    #[tokio::test]
    async fn test_byte_bound_evicts_until_satisfied() {
        let cache = FileCache::with_bounds(10, 100);
        cache.insert(entry("a", 40)).await;
        cache.insert(entry("b", 40)).await;
        cache.insert(entry("c", 40)).await;

        assert!(cache.total_bytes().await <= 100);
        assert!(!cache.contains("a").await);
        assert!(cache.contains("b").await);
        assert!(cache.contains("c").await);
    }

    #[tokio::test]
    async fn test_reinsert_replaces_and_adjusts_bytes() {
        let cache = FileCache::with_bounds(5, 1000);
        cache.insert(entry("a", 100)).await;
        cache.insert(entry("a", 50)).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.total_bytes().await, 50);
    }

    #[tokio::test]
    async fn test_snapshot_in_lru_order() {
        let cache = FileCache::with_bounds(5, 1000);
        cache.insert(entry("a", 1)).await;
        cache.insert(entry("b", 1)).await;
        assert!(cache.get("a").await.is_some());

        let ids: Vec<String> = cache.snapshot().await.into_iter().map(|e| e.file_id).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }
}
