//! Background anti-entropy loop (spec.md §4.3, §5). Ticks every ~10ms;
//! while the replica is dirty and unpaused, pushes local state to every
//! reachable member peer and adopts any response that strictly extends
//! local state.
//!
//! Runs on every replica, the primary included: a primary that commits a
//! peer's tentative suffix (via `Sync`) becomes dirty itself and must push
//! the new commits back out, or the Convergence property in spec.md §8
//! would never hold for replicas that generate no local writes of their
//! own. The "non-primary" phrasing in spec.md §4.3 is read as describing
//! the common case, not a restriction — see DESIGN.md.

use crate::state::ServerState;
use bayou_core::wire::SyncPayload;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const TICK: Duration = Duration::from_millis(10);

pub async fn run(state: Arc<ServerState>) {
    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;

        if state.replica.is_paused() {
            continue;
        }
        if !state.replica.is_dirty() {
            continue;
        }
        state.replica.clear_dirty();

        for peer in state.replica.reachable_peers() {
            let payload = state.replica.snapshot_for_sync();
            let url = state.peer_url(peer);
            match state
                .rpc
                .call::<SyncPayload, SyncPayload>(&url, "Sync", &payload)
                .await
            {
                Ok(response) => {
                    if state.replica.adopt_sync_response(&response) {
                        trace!(peer, "adopted extended state from sync");
                    }
                }
                Err(error) => {
                    debug!(peer, %error, "sync attempt failed this round, will retry");
                }
            }
        }
    }
}
