//! The client agent's own HTTP surface (spec.md §6: "client-side RPC
//! surface (controller → client agent): Put, Get, Delete, Break,
//! Restore"). The controller talks to a client agent exactly the way it
//! talks to a replica: JSON POSTs to `/rpc/<Method>`.

use crate::session::ClientSession;
use axum::{extract::State, routing::post, Json, Router};
use bayou_core::wire::{ClientOpResponse, Empty, IdRequest, KeyRequest, PutRequest};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub fn router(session: Arc<ClientSession>) -> Router {
    Router::new()
        .route("/rpc/Put", post(put))
        .route("/rpc/Get", post(get))
        .route("/rpc/Delete", post(delete))
        .route("/rpc/Break", post(break_rpc))
        .route("/rpc/Restore", post(restore_rpc))
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

async fn put(
    State(session): State<Arc<ClientSession>>,
    Json(req): Json<PutRequest>,
) -> Json<ClientOpResponse> {
    let result = match session.put(req.key, req.value).await {
        Ok(()) => String::new(),
        Err(err) => {
            warn!(%err, "put forward failed");
            err.to_string()
        }
    };
    Json(ClientOpResponse { result })
}

async fn get(
    State(session): State<Arc<ClientSession>>,
    Json(req): Json<KeyRequest>,
) -> Json<ClientOpResponse> {
    let result = match session.get(req.key).await {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "get forward failed");
            err.to_string()
        }
    };
    Json(ClientOpResponse { result })
}

async fn delete(
    State(session): State<Arc<ClientSession>>,
    Json(req): Json<KeyRequest>,
) -> Json<ClientOpResponse> {
    let result = match session.delete(req.key).await {
        Ok(()) => String::new(),
        Err(err) => {
            warn!(%err, "delete forward failed");
            err.to_string()
        }
    };
    Json(ClientOpResponse { result })
}

async fn break_rpc(
    State(session): State<Arc<ClientSession>>,
    Json(req): Json<IdRequest>,
) -> Json<Empty> {
    session.break_link(req.id);
    Json(Empty {})
}

async fn restore_rpc(
    State(session): State<Arc<ClientSession>>,
    Json(req): Json<IdRequest>,
) -> Json<Empty> {
    session.restore_link(req.id);
    Json(Empty {})
}
