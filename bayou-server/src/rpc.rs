//! The replica RPC surface (spec.md §6), realized as JSON POSTs to
//! `/rpc/<Method>` against an `axum::Router`.

use crate::{retire, state::ServerState};
use axum::{extract::State, routing::post, Json, Router};
use bayou_core::wire::{
    Empty, IdRequest, KeyRequest, PrintLogResponse, PutRequest, SjoinRequest, SjoinResponse,
    SretResponse, SyncPayload,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/rpc/Sput", post(sput))
        .route("/rpc/Sget", post(sget))
        .route("/rpc/Sdelete", post(sdelete))
        .route("/rpc/Sjoin", post(sjoin))
        .route("/rpc/Sync", post(sync))
        .route("/rpc/BePrimary", post(be_primary))
        .route("/rpc/Retire", post(retire_rpc))
        .route("/rpc/Break", post(break_rpc))
        .route("/rpc/Restore", post(restore_rpc))
        .route("/rpc/Pause", post(pause_rpc))
        .route("/rpc/Start", post(start_rpc))
        .route("/rpc/Stabilize", post(stabilize_rpc))
        .route("/rpc/PrintLog", post(print_log_rpc))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn sput(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<PutRequest>,
) -> Json<SretResponse> {
    let vv = state.replica.apply_put(req.key, req.value);
    Json(SretResponse {
        value: String::new(),
        vv,
    })
}

async fn sget(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<KeyRequest>,
) -> Json<SretResponse> {
    let (value, vv) = state.replica.apply_get(&req.key);
    Json(SretResponse { value, vv })
}

async fn sdelete(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<KeyRequest>,
) -> Json<SretResponse> {
    let vv = state.replica.apply_delete(req.key);
    Json(SretResponse {
        value: String::new(),
        vv,
    })
}

async fn sjoin(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<SjoinRequest>,
) -> Json<SjoinResponse> {
    let name = state.replica.apply_join(req.replica_id);
    Json(SjoinResponse { name })
}

async fn sync(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<SyncPayload>,
) -> Json<SyncPayload> {
    Json(state.replica.handle_sync(payload))
}

async fn be_primary(State(state): State<Arc<ServerState>>) -> Json<Empty> {
    state.replica.set_primary(true);
    Json(Empty {})
}

async fn retire_rpc(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<IdRequest>,
) -> Json<Empty> {
    retire::retire(state, req.id).await;
    Json(Empty {})
}

async fn break_rpc(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<IdRequest>,
) -> Json<Empty> {
    state.replica.break_peer(req.id);
    Json(Empty {})
}

async fn restore_rpc(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<IdRequest>,
) -> Json<Empty> {
    state.replica.restore_peer(req.id);
    Json(Empty {})
}

async fn pause_rpc(State(state): State<Arc<ServerState>>) -> Json<Empty> {
    state.replica.pause();
    Json(Empty {})
}

async fn start_rpc(State(state): State<Arc<ServerState>>) -> Json<Empty> {
    state.replica.resume();
    Json(Empty {})
}

/// Blocks until `dirty` is false on this replica, or `stabilize_timeout`
/// elapses. The original source's unbounded spin is hardened with a
/// bound per spec.md §9 OQ-4; it does not change the protocol, only the
/// failure mode when something is wedged.
async fn stabilize_rpc(State(state): State<Arc<ServerState>>) -> Result<Json<Empty>, axum::http::StatusCode> {
    let start = Instant::now();
    loop {
        if !state.replica.is_dirty() {
            return Ok(Json(Empty {}));
        }
        if start.elapsed() > state.stabilize_timeout {
            info!("stabilize timed out");
            return Err(axum::http::StatusCode::REQUEST_TIMEOUT);
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

async fn print_log_rpc(State(state): State<Arc<ServerState>>) -> Json<PrintLogResponse> {
    Json(PrintLogResponse {
        text: state.replica.print_log(),
    })
}
