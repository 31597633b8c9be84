//! JSON request/response bodies for the replica and client-agent RPC
//! surfaces (spec.md §6). Each RPC is a `POST` to `/rpc/<Method>`.

use crate::log::LogEntry;
use crate::vv::VersionVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SretResponse {
    pub value: String,
    pub vv: VersionVector,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SjoinRequest {
    pub replica_id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SjoinResponse {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncPayload {
    pub committed: Vec<LogEntry>,
    pub tentative: Vec<LogEntry>,
    pub vv: VersionVector,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: u32,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Empty {}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrintLogResponse {
    pub text: String,
}

/// Response to a client-agent `Get`/`Put`/`Delete` forward, mirroring the
/// original protocol's single-string result (`ERR_KEY`, `ERR_DEP`, or the
/// stored value).
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientOpResponse {
    pub result: String,
}
