//! Key-value adapters for the external metadata store.
//!
//! Everything the coordinator must share or persist (the leader lease,
//! node heartbeats, file metadata) goes through the [`KvStore`] trait.

pub mod memory;
pub mod redis;

pub use memory::MemoryKv;
pub use redis::RedisKv;

use crate::error::Result;
use std::time::Duration;

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// SET key value NX EX ttl. Returns true when the key was created.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Refresh the TTL of an existing key. Returns false when the key no
    /// longer exists.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// All keys starting with the prefix.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
