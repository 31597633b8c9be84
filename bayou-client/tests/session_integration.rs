//! Exercises `ClientSession` against a minimal in-process stand-in for a
//! replica's RPC surface (just `Sput`/`Sget`/`Sdelete`/`Sync` backed by a
//! real `bayou_core::Replica`), the way `rhc`'s local consensus tests
//! drive a node directly rather than through a spawned binary.

use axum::{extract::State, routing::post, Json, Router};
use bayou_core::replica::Replica;
use bayou_core::wire::{KeyRequest, PutRequest, SretResponse, SyncPayload};
use std::sync::Arc;

async fn sput(State(replica): State<Arc<Replica>>, Json(req): Json<PutRequest>) -> Json<SretResponse> {
    let vv = replica.apply_put(req.key, req.value);
    Json(SretResponse { value: String::new(), vv })
}

async fn sget(State(replica): State<Arc<Replica>>, Json(req): Json<KeyRequest>) -> Json<SretResponse> {
    let (value, vv) = replica.apply_get(&req.key);
    Json(SretResponse { value, vv })
}

async fn sdelete(State(replica): State<Arc<Replica>>, Json(req): Json<KeyRequest>) -> Json<SretResponse> {
    let vv = replica.apply_delete(req.key);
    Json(SretResponse { value: String::new(), vv })
}

async fn sync(State(replica): State<Arc<Replica>>, Json(payload): Json<SyncPayload>) -> Json<SyncPayload> {
    Json(replica.handle_sync(payload))
}

fn replica_router(replica: Arc<Replica>) -> Router {
    Router::new()
        .route("/rpc/Sput", post(sput))
        .route("/rpc/Sget", post(sget))
        .route("/rpc/Sdelete", post(sdelete))
        .route("/rpc/Sync", post(sync))
        .with_state(replica)
}

async fn spawn_replica(replica: Arc<Replica>, port: u16) {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let router = replica_router(replica);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
}

async fn spawn_bootstrap_replica() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let router = replica_router(Arc::new(Replica::new_bootstrap(4)));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    port
}

fn free_base_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

use bayou_client::session;

#[tokio::test]
async fn put_then_get_round_trips_through_bound_replica() {
    let port = spawn_bootstrap_replica().await;
    let client = session::ClientSession::new(1, 0, 4, "127.0.0.1".to_string(), port);

    client.put("k".to_string(), "v".to_string()).await.unwrap();
    let value = client.get("k".to_string()).await.unwrap();

    assert_eq!(value, "v");
}

#[tokio::test]
async fn get_on_missing_key_returns_err_key() {
    let port = spawn_bootstrap_replica().await;
    let client = session::ClientSession::new(1, 0, 4, "127.0.0.1".to_string(), port);

    let value = client.get("nope".to_string()).await.unwrap();

    assert_eq!(value, session::ERR_KEY);
}

#[tokio::test]
async fn break_then_restore_changes_bound_replica() {
    let port = spawn_bootstrap_replica().await;
    let client = session::ClientSession::new(1, 0, 4, "127.0.0.1".to_string(), port);

    client.break_link(0);
    let err = client.get("k".to_string()).await;
    assert!(err.is_err(), "an unbound client cannot reach any replica");

    client.restore_link(0);
    client.put("k".to_string(), "v".to_string()).await.unwrap();
    assert_eq!(client.get("k".to_string()).await.unwrap(), "v");
}

#[tokio::test]
async fn delete_then_get_returns_err_key() {
    let port = spawn_bootstrap_replica().await;
    let client = session::ClientSession::new(1, 0, 4, "127.0.0.1".to_string(), port);

    client.put("k".to_string(), "v".to_string()).await.unwrap();
    client.delete("k".to_string()).await.unwrap();

    assert_eq!(client.get("k".to_string()).await.unwrap(), session::ERR_KEY);
}

/// Scenario 3: a client writes through replica 0, then switches to an
/// unsynced replica 1 and should be told `ERR_DEP` until the two
/// replicas have exchanged state.
#[tokio::test]
async fn switching_replicas_before_sync_yields_err_dep() {
    let base = free_base_port();
    let primary = Arc::new(Replica::new_bootstrap(4));
    let follower = Arc::new(Replica::new(1, 4));
    spawn_replica(primary.clone(), base).await;
    spawn_replica(follower.clone(), base + 1).await;

    let client = session::ClientSession::new(1, 0, 4, "127.0.0.1".to_string(), base);
    client.put("k".to_string(), "v1".to_string()).await.unwrap();

    client.restore_link(1);
    assert_eq!(client.get("k".to_string()).await.unwrap(), session::ERR_DEP);

    // Sync replica 1 up to date with replica 0's committed state.
    let response = primary.handle_sync(follower.snapshot_for_sync());
    follower.adopt_sync_response(&response);

    assert_eq!(client.get("k".to_string()).await.unwrap(), "v1");
}
