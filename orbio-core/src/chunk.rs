use crate::error::{OrbioError, Result};
use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Chunk size applied to new uploads. Stored files keep whatever size they
/// were chunked with; the final chunk of a file may be short.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Chunk ids are derivable from the file id and the chunk index, so every
/// component can name a chunk without extra lookups.
pub fn chunk_id(file_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", file_id, index)
}

/// Split a payload into CHUNK_SIZE slices. Slices share the payload's
/// allocation.
pub fn split_chunks(payload: &Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(payload.len().div_ceil(CHUNK_SIZE));
    let mut offset = 0;
    while offset < payload.len() {
        let end = (offset + CHUNK_SIZE).min(payload.len());
        chunks.push(payload.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Compute the hex SHA256 hash of chunk plaintext.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that data matches the expected hash.
pub fn verify_hash(data: &[u8], expected_hash: &str) -> Result<()> {
    let actual_hash = compute_hash(data);
    if actual_hash != expected_hash {
        return Err(OrbioError::HashMismatch {
            expected: expected_hash.to_string(),
            actual: actual_hash,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chunks_sizes() {
        let payload = Bytes::from(vec![0xAB; 2 * CHUNK_SIZE + CHUNK_SIZE / 2]);
        let chunks = split_chunks(&payload);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), CHUNK_SIZE);
        assert_eq!(chunks[1].len(), CHUNK_SIZE);
        assert_eq!(chunks[2].len(), CHUNK_SIZE / 2);

        let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();
        assert_eq!(reassembled, payload.to_vec());
    }

    #[test]
    fn test_split_chunks_empty() {
        assert!(split_chunks(&Bytes::new()).is_empty());
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("f1", 0), "f1_chunk_0");
        assert_eq!(chunk_id("f1", 17), "f1_chunk_17");
    }

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash(b"hello world");
        assert_eq!(hash.len(), 64); // SHA256 hex string is 64 chars
        assert!(verify_hash(b"hello world", &hash).is_ok());
    }

    #[test]
    fn test_verify_hash_mismatch() {
        let hash = compute_hash(b"hello world");
        let error = verify_hash(b"hello w0rld", &hash).unwrap_err();
        assert!(matches!(error, OrbioError::HashMismatch { .. }));
    }
}
