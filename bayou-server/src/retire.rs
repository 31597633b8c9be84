//! Retirement handoff (spec.md §4.4). Runs as the body of the `Retire`
//! RPC handler on the replica being retired.

use crate::state::ServerState;
use bayou_core::wire::{Empty, IdRequest};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn retire(state: Arc<ServerState>, self_id: u32) {
    state.replica.append_retire_entry(self_id);

    let Some(peer) = state.replica.reachable_peers().into_iter().next() else {
        warn!(self_id, "retire: no reachable peer to hand off to");
        return;
    };

    // BePrimary is treated as synchronous (spec.md §9 OQ-2): we wait for
    // it to succeed before clearing our own primary bit, so the cluster
    // is never left with zero primaries even if this call is the only
    // thing that fails.
    if state.replica.is_primary() {
        let url = state.peer_url(peer);
        match state
            .rpc
            .call::<IdRequest, Empty>(&url, "BePrimary", &IdRequest { id: self_id })
            .await
        {
            Ok(_) => state.replica.set_primary(false),
            Err(error) => {
                warn!(peer, %error, "BePrimary handoff failed, staying primary");
                return;
            }
        }
    }

    let payload = state.replica.snapshot_for_sync();
    let url = state.peer_url(peer);
    match state
        .rpc
        .call::<_, bayou_core::wire::SyncPayload>(&url, "Sync", &payload)
        .await
    {
        Ok(response) => {
            state.replica.adopt_sync_response(&response);
            info!(peer, "retire handoff complete");
        }
        Err(error) => {
            warn!(peer, %error, "final retire sync failed, relying on anti-entropy");
        }
    }
}
