//! The client-side session layer (spec.md §4.5): a client agent pinned to
//! one replica at a time, forwarding puts/gets/deletes and tracking a
//! per-key version vector to detect reads that would violate
//! read-your-writes.

use bayou_core::error::{Error, Result};
use bayou_core::rpc_client::RpcClient;
use bayou_core::vv::{self, VersionVector};
use bayou_core::wire::{KeyRequest, PutRequest, SretResponse};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::debug;

pub const ERR_KEY: &str = "ERR_KEY";
pub const ERR_DEP: &str = "ERR_DEP";

pub struct ClientSession {
    pub client_id: u32,
    max_replicas: u32,
    host: String,
    base_port: u16,
    rpc: RpcClient,
    bound_replica_id: RwLock<Option<u32>>,
    session_vv: Mutex<HashMap<String, VersionVector>>,
}

impl ClientSession {
    pub fn new(client_id: u32, bound_replica_id: u32, max_replicas: u32, host: String, base_port: u16) -> Self {
        ClientSession {
            client_id,
            max_replicas,
            host,
            base_port,
            rpc: RpcClient::new(),
            bound_replica_id: RwLock::new(Some(bound_replica_id)),
            session_vv: Mutex::new(HashMap::new()),
        }
    }

    fn bound_url(&self) -> Result<String> {
        let bound = self
            .bound_replica_id
            .read()
            .ok_or_else(|| Error::Config("client is not bound to any replica".to_string()))?;
        Ok(bayou_core::config::replica_url(&self.host, self.base_port, bound))
    }

    fn merge_session_vv(&self, key: &str, incoming: &[u64]) {
        let mut sessions = self.session_vv.lock();
        let slot = sessions
            .entry(key.to_string())
            .or_insert_with(|| vv::zero(self.max_replicas as usize));
        vv::merge_max(slot, incoming);
    }

    pub async fn put(&self, key: String, value: String) -> Result<()> {
        let url = self.bound_url()?;
        let response: SretResponse = self
            .rpc
            .call(&url, "Sput", &PutRequest { key: key.clone(), value })
            .await?;
        self.merge_session_vv(&key, &response.vv);
        Ok(())
    }

    pub async fn delete(&self, key: String) -> Result<()> {
        let url = self.bound_url()?;
        let response: SretResponse = self
            .rpc
            .call(&url, "Sdelete", &KeyRequest { key: key.clone() })
            .await?;
        self.merge_session_vv(&key, &response.vv);
        Ok(())
    }

    pub async fn get(&self, key: String) -> Result<String> {
        let url = self.bound_url()?;
        let response: SretResponse = self
            .rpc
            .call(&url, "Sget", &KeyRequest { key: key.clone() })
            .await?;

        let dependency_met = {
            let sessions = self.session_vv.lock();
            match sessions.get(&key) {
                Some(known) => vv::dominates(&response.vv, known),
                None => true,
            }
        };

        let result = if !dependency_met {
            debug!(key, "read rejected: replica has not seen a previously observed write");
            ERR_DEP.to_string()
        } else if response.value.is_empty() {
            ERR_KEY.to_string()
        } else {
            response.value
        };

        // The bound replica's vv is still monotonic information even when
        // the read is rejected, so the session vector is updated either way.
        self.merge_session_vv(&key, &response.vv);

        Ok(result)
    }

    /// `Break(peer)`: if `peer` is the replica we're currently bound to,
    /// go unbound. Mirrors `original_source/client/main.go`'s `Break`.
    pub fn break_link(&self, peer: u32) {
        let mut bound = self.bound_replica_id.write();
        if *bound == Some(peer) {
            *bound = None;
        }
    }

    /// `Restore(peer)`: (re)bind to `peer` unconditionally, matching the
    /// original source, which treats a restore as "use this replica now"
    /// rather than strictly undoing the matching `Break`.
    pub fn restore_link(&self, peer: u32) {
        *self.bound_replica_id.write() = Some(peer);
    }
}
