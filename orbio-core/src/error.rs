use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrbioError>;

#[derive(Debug, Error)]
pub enum OrbioError {
    #[error("not the current leader")]
    NotLeader,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not enough alive storage nodes: need {required}, found {alive}")]
    InsufficientNodes { required: usize, alive: usize },

    #[error("replication failed, upload rolled back: {0}")]
    ReplicationFailed(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("all replicas failed for chunk {0}")]
    ReplicaUnavailable(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("kv store error: {0}")]
    Kv(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
