use super::{NodeTransport, OrbitalStatus};
use crate::error::{OrbioError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-attempt timeout for chunk reads.
pub const CHUNK_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Bound for store/delete/status calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreChunkBody<'a> {
    chunk_id: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct ChunkResponse {
    data: String,
}

/// Reqwest-backed transport speaking the blob-server wire format: JSON
/// bodies with base64 chunk payloads.
pub struct HttpNodeTransport {
    client: reqwest::Client,
}

impl HttpNodeTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| OrbioError::Http(error.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl NodeTransport for HttpNodeTransport {
    async fn store_chunk(&self, node_url: &str, chunk_id: &str, data: &Bytes) -> Result<()> {
        let body = StoreChunkBody {
            chunk_id,
            data: BASE64.encode(data),
        };

        let response = self
            .client
            .post(format!("{}/store", node_url))
            .json(&body)
            .send()
            .await
            .map_err(|error| OrbioError::Http(error.to_string()))?;

        if !response.status().is_success() {
            return Err(OrbioError::Http(format!(
                "store of {} on {} failed: {}",
                chunk_id,
                node_url,
                response.status()
            )));
        }

        Ok(())
    }

    async fn fetch_chunk(&self, node_url: &str, chunk_id: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(format!("{}/chunk/{}", node_url, chunk_id))
            .timeout(CHUNK_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|error| OrbioError::Http(error.to_string()))?;

        if !response.status().is_success() {
            return Err(OrbioError::Http(format!(
                "fetch of {} from {} failed: {}",
                chunk_id,
                node_url,
                response.status()
            )));
        }

        let payload: ChunkResponse = response
            .json()
            .await
            .map_err(|error| OrbioError::Http(error.to_string()))?;

        let data = BASE64.decode(payload.data).map_err(|error| {
            OrbioError::Http(format!("invalid chunk payload from {}: {}", node_url, error))
        })?;

        Ok(Bytes::from(data))
    }

    async fn delete_chunk(&self, node_url: &str, chunk_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/chunk/{}", node_url, chunk_id))
            .send()
            .await
            .map_err(|error| OrbioError::Http(error.to_string()))?;

        // Deletes are idempotent; a missing chunk is not an error.
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(OrbioError::Http(format!(
                "delete of {} on {} failed: {}",
                chunk_id,
                node_url,
                response.status()
            )));
        }

        Ok(())
    }

    async fn orbital_status(&self, node_url: &str) -> Result<OrbitalStatus> {
        let response = self
            .client
            .get(format!("{}/orbital-status", node_url))
            .send()
            .await
            .map_err(|error| OrbioError::Http(error.to_string()))?;

        if !response.status().is_success() {
            return Err(OrbioError::Http(format!(
                "orbital status of {} failed: {}",
                node_url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|error| OrbioError::Http(error.to_string()))
    }
}
