//! Startup self-join (spec.md §4.4). A fresh (non-bootstrap) replica tries
//! every other candidate replica id once, in order, and joins the first
//! one that answers. If none answer, the replica sits isolated until a
//! later command brings a peer up and that peer happens to dial in —
//! matching `original_source/server/main.go`'s `join()`, which makes the
//! same single pass.

use crate::state::ServerState;
use bayou_core::wire::SjoinRequest;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn join_cluster(state: Arc<ServerState>, max_replicas: u32) {
    if state.replica.replica_id == 0 {
        return; // the bootstrap primary seeded itself at construction
    }

    for candidate in 0..max_replicas {
        if candidate == state.replica.replica_id || state.replica.is_broken(candidate) {
            continue;
        }
        let url = state.peer_url(candidate);
        let request = SjoinRequest {
            replica_id: state.replica.replica_id,
        };
        match state
            .rpc
            .call::<_, bayou_core::wire::SjoinResponse>(&url, "Sjoin", &request)
            .await
        {
            Ok(response) => {
                state.replica.set_name(response.name);
                state.replica.mark_dirty();
                info!(candidate, "joined cluster via peer");
                return;
            }
            Err(_) => continue,
        }
    }
    warn!("no reachable peer answered Sjoin at startup");
}
