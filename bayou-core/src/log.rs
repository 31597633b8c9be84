use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Put,
    Delete,
    Join,
    Retire,
}

/// The fundamental unit of replication. See spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub op: Op,
    pub key: Option<String>,
    pub value: Option<String>,
    pub acc_time: u64,
    pub replica_id: u32,
    pub replica_name: String,
    pub target_id: Option<u32>,
    pub unique_id: u64,
    pub csn: u64,
    pub stable: bool,
}

impl LogEntry {
    pub fn unique_id(acc_time: u64, replica_id: u32, max_replicas: u32) -> u64 {
        acc_time * max_replicas as u64 + replica_id as u64
    }

    pub fn new_put(
        key: String,
        value: String,
        acc_time: u64,
        replica_id: u32,
        replica_name: String,
        max_replicas: u32,
        stable: bool,
    ) -> Self {
        LogEntry {
            op: Op::Put,
            key: Some(key),
            value: Some(value),
            acc_time,
            replica_id,
            replica_name,
            target_id: None,
            unique_id: Self::unique_id(acc_time, replica_id, max_replicas),
            csn: 0,
            stable,
        }
    }

    pub fn new_delete(
        key: String,
        acc_time: u64,
        replica_id: u32,
        replica_name: String,
        max_replicas: u32,
        stable: bool,
    ) -> Self {
        LogEntry {
            op: Op::Delete,
            key: Some(key),
            value: None,
            acc_time,
            replica_id,
            replica_name,
            target_id: None,
            unique_id: Self::unique_id(acc_time, replica_id, max_replicas),
            csn: 0,
            stable,
        }
    }

    pub fn new_join(
        target_id: u32,
        acc_time: u64,
        replica_id: u32,
        replica_name: String,
        max_replicas: u32,
        stable: bool,
    ) -> Self {
        LogEntry {
            op: Op::Join,
            key: None,
            value: None,
            acc_time,
            replica_id,
            replica_name,
            target_id: Some(target_id),
            unique_id: Self::unique_id(acc_time, replica_id, max_replicas),
            csn: 0,
            stable,
        }
    }

    pub fn new_retire(
        target_id: u32,
        acc_time: u64,
        replica_id: u32,
        replica_name: String,
        max_replicas: u32,
        stable: bool,
    ) -> Self {
        LogEntry {
            op: Op::Retire,
            key: None,
            value: None,
            acc_time,
            replica_id,
            replica_name,
            target_id: Some(target_id),
            unique_id: Self::unique_id(acc_time, replica_id, max_replicas),
            csn: 0,
            stable,
        }
    }

    /// The bootstrap replica seeds its own committed log with this entry:
    /// `target_id=0`, name `"0"`, acc_time=1, csn=1. Whether `"0"` names a
    /// real replica or is a display placeholder is left open by the
    /// original source; see DESIGN.md OQ-1.
    pub fn bootstrap(max_replicas: u32) -> Self {
        LogEntry {
            op: Op::Join,
            key: None,
            value: None,
            acc_time: 1,
            replica_id: 0,
            replica_name: "0".to_string(),
            target_id: Some(0),
            unique_id: Self::unique_id(1, 0, max_replicas),
            csn: 1,
            stable: true,
        }
    }
}
