pub mod fetch_file;
pub mod precache;
pub mod rebalance;
pub mod store_file;

pub use fetch_file::{
    FetchFileOperation, FetchFileOperationOutcome, FetchFileOperationRequest,
    FetchFileOperationResult,
};
pub use precache::{
    PrecacheOperation, PrecacheOperationResult, PRECACHE_PERIOD, PREDICT_THRESHOLD_MS,
};
pub use rebalance::{RebalanceOperation, RebalanceOperationResult, REBALANCE_PERIOD};
pub use store_file::{
    PlacementCursor, StoreFileOperation, StoreFileOperationRequest, StoreFileOperationResult,
};
