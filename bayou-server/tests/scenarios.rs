//! Exercises the reference walkthroughs against in-process replicas
//! wired together with real axum routers on loopback sockets, the way
//! `rhc/tests/local_consensus.rs` drives a node directly rather than
//! through a spawned binary.

use bayou_core::replica::Replica;
use bayou_core::rpc_client::RpcClient;
use bayou_server::state::ServerState;
use bayou_server::{retire, rpc};
use std::sync::Arc;
use std::time::Duration;

async fn spawn_replica(replica_id: u32, max_replicas: u32, host: &str, base_port: u16) -> Arc<ServerState> {
    let replica = if replica_id == 0 {
        Arc::new(Replica::new_bootstrap(max_replicas))
    } else {
        Arc::new(Replica::new(replica_id, max_replicas))
    };
    let state = Arc::new(ServerState {
        replica,
        rpc: RpcClient::new(),
        host: host.to_string(),
        base_port,
        stabilize_timeout: Duration::from_secs(5),
    });

    let addr = format!("{host}:{}", base_port + replica_id as u16);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    let router = rpc::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    state
}

fn free_base_port() -> u16 {
    // Each test picks a fresh base so replica ids never collide with
    // another test's sockets when tests run concurrently.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn sync_once(from: &Arc<ServerState>, to: u32) {
    let payload = from.replica.snapshot_for_sync();
    let url = from.peer_url(to);
    let response: bayou_core::wire::SyncPayload =
        from.rpc.call(&url, "Sync", &payload).await.unwrap();
    from.replica.adopt_sync_response(&response);
}

/// Scenario 1: single primary, `joinServer 0; put 0 x 1; get 0 x` → `x:1`.
#[tokio::test]
async fn single_primary_put_then_get() {
    let host = "127.0.0.1";
    let base = free_base_port();
    let primary = spawn_replica(0, 4, host, base).await;

    primary.replica.apply_put("x".to_string(), "1".to_string());
    let (value, _) = primary.replica.apply_get("x");

    assert_eq!(value, "1");
    assert!(primary.replica.print_log().contains("PUT:(x, 1):TRUE"));
}

/// Scenario 2: two replicas, a follower's tentative write becomes
/// committed on both sides once they sync in each direction.
#[tokio::test]
async fn two_replicas_tentative_then_stabilize() {
    let host = "127.0.0.1";
    let base = free_base_port();
    let primary = spawn_replica(0, 4, host, base).await;
    let follower = spawn_replica(1, 4, host, base).await;
    follower.replica.apply_put("a".to_string(), "A".to_string());
    assert!(follower.replica.print_log().contains("PUT:(a, A):FALSE"));

    sync_once(&follower, 0).await;
    sync_once(&primary, 1).await;

    assert!(primary.replica.print_log().contains("PUT:(a, A):TRUE"));
    assert!(follower.replica.print_log().contains("PUT:(a, A):TRUE"));
}

/// Scenario 4: a broken link keeps a follower's write tentative-only on
/// the primary; restoring and syncing converges both sides.
#[tokio::test]
async fn partition_isolates_writes_until_restored() {
    let host = "127.0.0.1";
    let base = free_base_port();
    let primary = spawn_replica(0, 4, host, base).await;
    let follower = spawn_replica(1, 4, host, base).await;

    follower.replica.break_peer(0);
    follower.replica.apply_put("k".to_string(), "tentative".to_string());
    assert!(follower.replica.print_log().contains("PUT:(k, tentative):FALSE"));
    assert!(!primary.replica.print_log().contains("tentative"));

    follower.replica.restore_peer(0);
    sync_once(&follower, 0).await;
    sync_once(&primary, 1).await;

    assert!(primary.replica.print_log().contains("PUT:(k, tentative):TRUE"));
    assert!(follower.replica.print_log().contains("PUT:(k, tentative):TRUE"));
}

/// Scenario 5: retiring the primary hands commit authority to a peer,
/// which can then commit further writes on its own.
#[tokio::test]
async fn primary_retire_hands_off_to_peer() {
    let host = "127.0.0.1";
    let base = free_base_port();
    let primary = spawn_replica(0, 4, host, base).await;
    let follower = spawn_replica(1, 4, host, base).await;

    // Make replica 1 a member both sides agree on, so the retire handoff
    // has a reachable peer to pick.
    primary.replica.apply_join(1);
    sync_once(&primary, 1).await;
    sync_once(&follower, 0).await;

    retire::retire(primary.clone(), 0).await;
    assert!(!primary.replica.is_primary());
    assert!(follower.replica.is_primary());

    follower.replica.apply_put("z".to_string(), "Z".to_string());
    assert!(follower.replica.print_log().contains("PUT:(z, Z):TRUE"));
}

/// Scenario 6: reading a key that was never written yields an empty value.
#[tokio::test]
async fn missing_key_reads_empty() {
    let host = "127.0.0.1";
    let base = free_base_port();
    let primary = spawn_replica(0, 4, host, base).await;

    let (value, _) = primary.replica.apply_get("nope");
    assert_eq!(value, "");
}
