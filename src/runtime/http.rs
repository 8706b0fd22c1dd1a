//! §6 HTTP route table: cell-local management endpoints plus the Git Smart
//! HTTP surface, wired onto `CellRuntime` with `axum`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{CellRuntime, ForkRequest};
use crate::errors::CellError;
use crate::wire::types::ServiceType;

pub fn router(runtime: Arc<CellRuntime>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/fork", post(fork))
        .route("/sync", post(sync))
        .route("/export", post(export))
        .route("/export/status/{job_id}", get(export_status))
        .route("/objects/batch", post(objects_batch))
        .route("/{ns}/info/refs", get(info_refs))
        .route("/{ns}/git-upload-pack", post(upload_pack))
        .route("/{ns}/git-receive-pack", post(receive_pack))
        .with_state(runtime)
}

fn map_error(err: CellError) -> Response {
    let status = match err {
        CellError::NotFound(_) => StatusCode::NOT_FOUND,
        CellError::Conflict(_) => StatusCode::CONFLICT,
        CellError::Protected(_) => StatusCode::FORBIDDEN,
        CellError::Invalid(_) | CellError::Malformed { .. } => StatusCode::BAD_REQUEST,
        CellError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CellError::Cancelled(_) => StatusCode::BAD_REQUEST,
        CellError::Io(_) | CellError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: err.to_string() })).into_response()
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    ns: String,
    r#type: &'static str,
    uptime: u64,
    capabilities: Vec<&'static str>,
}

async fn health(State(runtime): State<Arc<CellRuntime>>) -> impl IntoResponse {
    Json(HealthBody {
        status: if runtime.is_initialized() { "ready" } else { "uninitialized" },
        ns: runtime.config.namespace.clone(),
        r#type: "repocell",
        uptime: runtime.uptime_secs(),
        capabilities: vec!["git-smart-http", "columnar-export", "fork"],
    })
}

#[derive(Serialize)]
struct InfoBody {
    r#type: &'static str,
    ns: String,
    capabilities: Vec<&'static str>,
}

async fn info(State(runtime): State<Arc<CellRuntime>>) -> impl IntoResponse {
    Json(InfoBody {
        r#type: "repocell",
        ns: runtime.config.namespace.clone(),
        capabilities: vec!["git-smart-http", "columnar-export", "fork"],
    })
}

#[derive(Deserialize)]
struct ForkBody {
    ns: String,
    parent: Option<String>,
    branch: Option<String>,
}

async fn fork(State(runtime): State<Arc<CellRuntime>>, Json(body): Json<ForkBody>) -> Response {
    match runtime.initialize(&body.ns, body.parent.as_deref()).await {
        Ok(()) => {}
        Err(e) => return map_error(e),
    }
    match runtime.fork(ForkRequest { to: body.ns, branch: body.branch }).await {
        Ok(()) => Json(serde_json::json!({"success": true})).into_response(),
        Err(e) => map_error(e),
    }
}

#[derive(Deserialize)]
struct SyncRepository {
    clone_url: String,
}

#[derive(Deserialize)]
struct SyncBody {
    repository: SyncRepository,
    r#ref: Option<String>,
}

async fn sync(State(runtime): State<Arc<CellRuntime>>, Json(body): Json<SyncBody>) -> Response {
    if body.repository.clone_url.is_empty() {
        return map_error(CellError::Invalid("repository.clone_url is required".into()));
    }
    let report = match runtime.sync(&body.repository.clone_url).await {
        Ok(report) => report,
        Err(e) => return map_error(e),
    };
    Json(serde_json::json!({
        "success": true,
        "ref": body.r#ref,
        "objectCount": report.object_count,
        "refs": report.refs,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct ExportBody {
    #[serde(default)]
    tables: Vec<String>,
    codec: Option<String>,
    format: Option<String>,
}

async fn export(State(runtime): State<Arc<CellRuntime>>, Json(body): Json<ExportBody>) -> Response {
    match runtime.columnar.flush().await {
        Ok(key) => Json(serde_json::json!({
            "success": true,
            "tables": body.tables,
            "codec": body.codec.unwrap_or_else(|| "UNCOMPRESSED".to_string()),
            "format": body.format.unwrap_or_else(|| "raw".to_string()),
            "segment": key,
        }))
        .into_response(),
        Err(e) => Json(serde_json::json!({"success": false, "error": e.to_string()})).into_response(),
    }
}

async fn export_status(Path(job_id): Path<String>) -> impl IntoResponse {
    Json(serde_json::json!({"jobId": job_id, "status": "completed"}))
}

/// §6, §9 design note (b): LFS batch protocol stub, 501 for any OID.
async fn objects_batch() -> impl IntoResponse {
    (StatusCode::NOT_IMPLEMENTED, Json(serde_json::json!({"message": "LFS batch protocol is not implemented"})))
}

async fn info_refs(State(runtime): State<Arc<CellRuntime>>, Path(_ns): Path<String>, Query(params): Query<HashMap<String, String>>) -> Response {
    let service = match params.get("service").map(|s| s.parse::<ServiceType>()) {
        Some(Ok(service)) => service,
        _ => return map_error(CellError::Invalid("missing or unknown service parameter".into())),
    };
    match runtime.git_server.info_refs(service).await {
        Ok(body) => body.into_response(),
        Err(e) => map_error(CellError::Internal(e.to_string())),
    }
}

async fn upload_pack(State(runtime): State<Arc<CellRuntime>>, Path(_ns): Path<String>, body: axum::body::Bytes) -> Response {
    match runtime.git_server.upload_pack(&body).await {
        Ok(response) => response.into_response(),
        Err(e) => map_error(CellError::Internal(e.to_string())),
    }
}

async fn receive_pack(State(runtime): State<Arc<CellRuntime>>, Path(_ns): Path<String>, body: axum::body::Bytes) -> Response {
    match runtime.git_server.receive_pack(&body).await {
        Ok(response) => response.into_response(),
        Err(e) => map_error(CellError::Internal(e.to_string())),
    }
}
