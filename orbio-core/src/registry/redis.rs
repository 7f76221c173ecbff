use super::KvStore;
use crate::error::{OrbioError, Result};
use redis::AsyncCommands;
use std::time::Duration;

/// Redis-backed KV adapter. The multiplexed connection is cheap to clone,
/// so every call operates on its own handle.
pub struct RedisKv {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|error| OrbioError::Config(format!("invalid redis url: {}", error)))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| OrbioError::Kv(format!("redis connection failed: {}", error)))?;

        Ok(Self { conn })
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait::async_trait]
impl KvStore for RedisKv {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|error| OrbioError::Kv(error.to_string()))?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|error| OrbioError::Kv(error.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set(key, value)
            .await
            .map_err(|error| OrbioError::Kv(error.to_string()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.expire(key, ttl_secs(ttl) as i64)
            .await
            .map_err(|error| OrbioError::Kv(error.to_string()))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.keys(format!("{}*", prefix))
            .await
            .map_err(|error| OrbioError::Kv(error.to_string()))
    }
}
