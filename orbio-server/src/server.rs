use crate::config::Config;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use orbio_core::{
    FetchFileOperation, FetchFileOperationOutcome, FetchFileOperationRequest, FileCache,
    HttpNodeTransport, KvStore, LeaderLease, MetadataStore, NodePool, NodeTransport, OrbioError,
    PlacementCursor, PrecacheOperation, RebalanceOperation, RedisKv, Result, StoreFileOperation,
    StoreFileOperationRequest, PRECACHE_PERIOD, REBALANCE_PERIOD,
};
use serde_json::json;
use std::sync::Arc;

/// Upload bodies are capped here, which also bounds the per-upload working
/// set held in memory for chunking.
const REQUEST_BODY_LIMIT: usize = 200 * 1024 * 1024;

pub struct ServerState {
    pub lease: Arc<LeaderLease>,
    pub nodes: Arc<NodePool>,
    pub transport: Arc<dyn NodeTransport>,
    pub metadata: Arc<MetadataStore>,
    pub cache: Arc<FileCache>,
    pub store_file: StoreFileOperation,
    pub fetch_file: FetchFileOperation,
}

pub async fn run_server(config: Config, port: u16) -> Result<()> {
    let master_id = config.master_id();

    let kv: Arc<dyn KvStore> = Arc::new(RedisKv::connect(&config.redis.url).await?);
    let transport: Arc<dyn NodeTransport> = Arc::new(HttpNodeTransport::new()?);
    let nodes = Arc::new(NodePool::new(config.nodes.clone(), kv.clone()));
    let metadata = Arc::new(MetadataStore::new(kv.clone()));
    let cache = Arc::new(FileCache::new());

    let store_file = StoreFileOperation::new(
        metadata.clone(),
        nodes.clone(),
        transport.clone(),
        Arc::new(PlacementCursor::new()),
    );
    let fetch_file = FetchFileOperation::new(metadata.clone(), transport.clone(), cache.clone());
    let rebalance = RebalanceOperation::new(metadata.clone(), nodes.clone(), transport.clone());
    let precache = PrecacheOperation::new(
        metadata.clone(),
        nodes.clone(),
        transport.clone(),
        fetch_file.clone(),
        cache.clone(),
    );

    let lease = LeaderLease::new(kv, master_id.clone());
    lease.start();

    let state = Arc::new(ServerState {
        lease: lease.clone(),
        nodes,
        transport,
        metadata,
        cache,
        store_file,
        fetch_file,
    });

    {
        let lease = lease.clone();
        tokio::spawn(async move { rebalance_loop(lease, rebalance).await });
    }
    {
        let lease = lease.clone();
        tokio::spawn(async move { precache_loop(lease, precache).await });
    }

    let app = Router::new()
        .route("/upload", post(upload))
        .route("/download/:file_id", get(download))
        .route("/metadata", get(list_metadata))
        .route("/metadata/:file_id", get(file_metadata))
        .route("/nodes", get(node_statuses))
        .route("/cache-status", get(cache_status))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Coordinator {} listening on port {}", master_id, port);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Repair under-replicated chunks while leader. Leadership is checked at
/// loop entry; a tick already in flight when the lease flips finishes its
/// metadata write, which is safe because repairs only add replicas.
async fn rebalance_loop(lease: Arc<LeaderLease>, rebalance: RebalanceOperation) {
    let mut interval = tokio::time::interval(REBALANCE_PERIOD);

    loop {
        interval.tick().await;
        if !lease.is_leader() {
            continue;
        }

        match rebalance.run().await {
            Ok(result) if result.repaired_chunks > 0 => {
                tracing::info!(
                    "rebalance repaired {} chunks across {} files",
                    result.repaired_chunks,
                    result.scanned_files
                );
            }
            Ok(_) => {}
            Err(error) => tracing::warn!("rebalance sweep failed: {}", error),
        }
    }
}

async fn precache_loop(lease: Arc<LeaderLease>, precache: PrecacheOperation) {
    let mut interval = tokio::time::interval(PRECACHE_PERIOD);

    loop {
        interval.tick().await;
        if !lease.is_leader() {
            continue;
        }

        match precache.run().await {
            Ok(result) if result.cached_files > 0 => {
                tracing::info!("pre-cached {} files ahead of blackouts", result.cached_files);
            }
            Ok(_) => {}
            Err(error) => tracing::warn!("pre-cache sweep failed: {}", error),
        }
    }
}

fn error_response(error: OrbioError) -> Response {
    let status = match &error {
        OrbioError::NotLeader => StatusCode::FORBIDDEN,
        OrbioError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        OrbioError::FileNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

async fn upload(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Response {
    // Leadership is checked at request entry; losing the lease while the
    // upload is in flight does not cancel it.
    if let Err(error) = state.lease.require_leader() {
        return error_response(error);
    }

    let mut upload: Option<(String, Bytes)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return error_response(OrbioError::InvalidRequest(error.to_string())),
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("unnamed").to_string();
        match field.bytes().await {
            Ok(payload) => {
                upload = Some((filename, payload));
                break;
            }
            Err(error) => return error_response(OrbioError::InvalidRequest(error.to_string())),
        }
    }

    let Some((filename, payload)) = upload else {
        return error_response(OrbioError::InvalidRequest(
            "multipart field 'file' is required".to_string(),
        ));
    };

    match state.store_file.run(StoreFileOperationRequest { filename, payload }).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "message": "File uploaded successfully",
                "fileId": result.file_id,
                "totalChunks": result.total_chunks,
            })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn download(State(state): State<Arc<ServerState>>, Path(file_id): Path<String>) -> Response {
    let request = FetchFileOperationRequest::download(file_id.clone());

    match state.fetch_file.run(request).await {
        Ok(FetchFileOperationOutcome::Found(result)) => {
            let disposition = format!("attachment; filename=\"{}\"", result.filename);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                result.body,
            )
                .into_response()
        }
        Ok(FetchFileOperationOutcome::NotFound) => {
            error_response(OrbioError::FileNotFound(file_id))
        }
        Err(error) => error_response(error),
    }
}

async fn list_metadata(State(state): State<Arc<ServerState>>) -> Response {
    match state.metadata.list_files().await {
        Ok(files) => (
            StatusCode::OK,
            Json(json!({ "totalFiles": files.len(), "files": files })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn file_metadata(
    State(state): State<Arc<ServerState>>,
    Path(file_id): Path<String>,
) -> Response {
    match state.metadata.get_file(&file_id).await {
        Ok(Some(meta)) => (StatusCode::OK, Json(meta)).into_response(),
        Ok(None) => error_response(OrbioError::FileNotFound(file_id)),
        Err(error) => error_response(error),
    }
}

async fn node_statuses(State(state): State<Arc<ServerState>>) -> Response {
    let alive = match state.nodes.alive_nodes().await {
        Ok(alive) => alive,
        Err(error) => return error_response(error),
    };

    let mut nodes = Vec::with_capacity(state.nodes.urls().len());
    for url in state.nodes.urls() {
        let mut entry = json!({ "url": url, "alive": alive.contains(url) });
        // Blackout fields only appear when the node answers its status.
        if let Ok(status) = state.transport.orbital_status(url).await {
            entry["isInBlackout"] = json!(status.is_in_blackout);
            entry["nextBlackoutInMs"] = json!(status.next_blackout_in_ms);
        }
        nodes.push(entry);
    }

    (StatusCode::OK, Json(json!(nodes))).into_response()
}

async fn cache_status(State(state): State<Arc<ServerState>>) -> Response {
    let entries = state.cache.snapshot().await;
    let files: Vec<_> = entries
        .iter()
        .map(|entry| {
            let size_mb = entry.buffer.len() as f64 / (1024.0 * 1024.0);
            json!({
                "fileId": entry.file_id,
                "filename": entry.filename,
                "sizeMB": (size_mb * 100.0).round() / 100.0,
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({ "totalCached": files.len(), "files": files })),
    )
        .into_response()
}

async fn health(State(state): State<Arc<ServerState>>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "master": state.lease.master_id(),
            "leader": state.lease.is_leader(),
        })),
    )
        .into_response()
}
