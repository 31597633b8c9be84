use bayou_core::replica::Replica;
use bayou_core::rpc_client::RpcClient;
use std::sync::Arc;

/// Shared handle threaded through every axum route and the background
/// anti-entropy task.
pub struct ServerState {
    pub replica: Arc<Replica>,
    pub rpc: RpcClient,
    pub host: String,
    pub base_port: u16,
    pub stabilize_timeout: std::time::Duration,
}

impl ServerState {
    pub fn peer_url(&self, peer_id: u32) -> String {
        bayou_core::config::replica_url(&self.host, self.base_port, peer_id)
    }
}
