//! The per-replica log engine, materialized view rebuild, and anti-entropy
//! merge logic (spec.md §4.1-4.4). Network orchestration (dialing peers,
//! the retire handoff) lives in `bayou-server`; this module only holds the
//! pure state-machine semantics so they can be unit-tested without a
//! network.

use crate::log::{LogEntry, Op};
use crate::vv::{self, VersionVector};
use crate::wire::SyncPayload;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// The mutex-protected mutable state: log, materialized db, and the
/// version vector. Guarded by a single lock, matching spec.md §5's
/// grouping of Sput/Sget/Sdelete/Sjoin/Sync/Retire/PrintLog.
struct ReplicaLog {
    committed: Vec<LogEntry>,
    tentative: Vec<LogEntry>,
    db: HashMap<String, String>,
    members: HashSet<u32>,
    name_index: HashMap<String, u32>,
    acc_time: u64,
    name: String,
    vv: VersionVector,
}

pub struct Replica {
    pub replica_id: u32,
    pub max_replicas: u32,
    log: Mutex<ReplicaLog>,
    is_primary: AtomicBool,
    paused: AtomicBool,
    dirty: AtomicBool,
    break_set: RwLock<HashSet<u32>>,
}

impl Replica {
    /// A fresh, not-yet-joined replica. Becomes a member of the cluster
    /// only once some peer's `Sjoin` response lands.
    pub fn new(replica_id: u32, max_replicas: u32) -> Self {
        Replica {
            replica_id,
            max_replicas,
            log: Mutex::new(ReplicaLog {
                committed: Vec::new(),
                tentative: Vec::new(),
                db: HashMap::new(),
                members: HashSet::new(),
                name_index: HashMap::new(),
                acc_time: 1,
                name: String::new(),
                vv: vv::zero(max_replicas as usize),
            }),
            is_primary: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            break_set: RwLock::new(HashSet::new()),
        }
    }

    /// The distinguished bootstrap primary, replica id 0. Seeds `committed`
    /// with a JOIN entry for itself (csn=1, name `"1, 0"`).
    pub fn new_bootstrap(max_replicas: u32) -> Self {
        let r = Self::new(0, max_replicas);
        r.is_primary.store(true, Ordering::SeqCst);
        {
            let mut locked = r.log.lock();
            locked.committed.push(LogEntry::bootstrap(max_replicas));
            locked.acc_time = 2;
            locked.vv[0] = 1;
            locked.name = "1, 0".to_string();
            Self::rebuild(&mut locked);
        }
        r
    }

    // -- admin scalar flags: no log mutex involved (spec.md §5) --

    pub fn is_primary(&self) -> bool {
        self.is_primary.load(Ordering::SeqCst)
    }

    pub fn set_primary(&self, value: bool) {
        self.is_primary.store(value, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn break_peer(&self, peer: u32) {
        self.break_set.write().insert(peer);
    }

    /// Restoring a link also marks the replica dirty: the anti-entropy
    /// loop must re-attempt the newly-reachable peer even if nothing
    /// local has changed since the last round.
    pub fn restore_peer(&self, peer: u32) {
        self.break_set.write().remove(&peer);
        self.mark_dirty();
    }

    pub fn is_broken(&self, peer: u32) -> bool {
        self.break_set.read().contains(&peer)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clear dirty at the start of an anti-entropy round; any mutation
    /// observed mid-round (local write, or a sync that adopts new state)
    /// sets it again via `mark_dirty`.
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn name(&self) -> String {
        self.log.lock().name.clone()
    }

    /// Set after a successful `Sjoin` reply: the joining replica adopts
    /// the name its sponsor assigned it.
    pub fn set_name(&self, name: String) {
        self.log.lock().name = name;
    }

    pub fn members(&self) -> HashSet<u32> {
        self.log.lock().members.clone()
    }

    pub fn is_member(&self, peer: u32) -> bool {
        self.log.lock().members.contains(&peer)
    }

    /// Members that are not this replica and not administratively broken.
    pub fn reachable_peers(&self) -> Vec<u32> {
        let members = self.members();
        let break_set = self.break_set.read();
        members
            .into_iter()
            .filter(|p| *p != self.replica_id && !break_set.contains(p))
            .collect()
    }

    pub fn vv_snapshot(&self) -> VersionVector {
        self.log.lock().vv.clone()
    }

    pub fn snapshot_for_sync(&self) -> SyncPayload {
        let locked = self.log.lock();
        SyncPayload {
            committed: locked.committed.clone(),
            tentative: locked.tentative.clone(),
            vv: locked.vv.clone(),
        }
    }

    // -- 4.1 replica log engine --

    pub fn apply_put(&self, key: String, value: String) -> VersionVector {
        let mut locked = self.log.lock();
        let is_primary = self.is_primary();
        let acc_time = locked.acc_time;
        let name = locked.name.clone();
        let mut entry = LogEntry::new_put(
            key.clone(),
            value.clone(),
            acc_time,
            self.replica_id,
            name,
            self.max_replicas,
            is_primary,
        );
        locked.acc_time += 1;
        locked.vv[self.replica_id as usize] += 1;
        if is_primary {
            entry.csn = locked.committed.len() as u64 + 1;
            locked.committed.push(entry);
            locked.db.insert(key, value);
        } else {
            locked.tentative.push(entry);
        }
        self.mark_dirty();
        Self::rebuild(&mut locked);
        locked.vv.clone()
    }

    pub fn apply_delete(&self, key: String) -> VersionVector {
        let mut locked = self.log.lock();
        let is_primary = self.is_primary();
        let acc_time = locked.acc_time;
        let name = locked.name.clone();
        let mut entry = LogEntry::new_delete(
            key.clone(),
            acc_time,
            self.replica_id,
            name,
            self.max_replicas,
            is_primary,
        );
        locked.acc_time += 1;
        locked.vv[self.replica_id as usize] += 1;
        if is_primary {
            entry.csn = locked.committed.len() as u64 + 1;
            locked.committed.push(entry);
            locked.db.remove(&key);
        } else {
            locked.tentative.push(entry);
        }
        self.mark_dirty();
        Self::rebuild(&mut locked);
        locked.vv.clone()
    }

    /// Pure read: no log entry is created.
    pub fn apply_get(&self, key: &str) -> (String, VersionVector) {
        let locked = self.log.lock();
        let value = locked.db.get(key).cloned().unwrap_or_default();
        (value, locked.vv.clone())
    }

    /// Appends a JOIN entry for `new_replica_id` and returns the name
    /// assigned to the joiner: `"<acc_time>, <parent_replica_name>"`.
    pub fn apply_join(&self, new_replica_id: u32) -> String {
        let mut locked = self.log.lock();
        let is_primary = self.is_primary();
        let acc_time = locked.acc_time;
        let parent_name = locked.name.clone();
        let assigned_name = format!("{acc_time}, {parent_name}");
        let mut entry = LogEntry::new_join(
            new_replica_id,
            acc_time,
            self.replica_id,
            parent_name,
            self.max_replicas,
            is_primary,
        );
        locked.acc_time += 1;
        locked.vv[self.replica_id as usize] += 1;
        if is_primary {
            entry.csn = locked.committed.len() as u64 + 1;
            locked.committed.push(entry);
        } else {
            locked.tentative.push(entry);
        }
        self.mark_dirty();
        Self::rebuild(&mut locked);
        assigned_name
    }

    /// Appends a RETIRE entry for `self_id`. The handoff orchestration
    /// (picking a peer, sending BePrimary, syncing) is the caller's job —
    /// see `bayou-server`'s retire handler.
    pub fn append_retire_entry(&self, self_id: u32) {
        let mut locked = self.log.lock();
        let is_primary = self.is_primary();
        let acc_time = locked.acc_time;
        let name = locked.name.clone();
        let mut entry = LogEntry::new_retire(
            self_id,
            acc_time,
            self.replica_id,
            name,
            self.max_replicas,
            is_primary,
        );
        locked.acc_time += 1;
        locked.vv[self.replica_id as usize] += 1;
        if is_primary {
            entry.csn = locked.committed.len() as u64 + 1;
            locked.committed.push(entry);
        } else {
            locked.tentative.push(entry);
        }
        self.mark_dirty();
        Self::rebuild(&mut locked);
    }

    // -- 4.2 materialized view rebuild --

    fn rebuild(locked: &mut ReplicaLog) {
        locked.db.clear();
        locked.members.clear();
        locked.name_index.clear();
        for entry in locked.committed.iter().chain(locked.tentative.iter()) {
            match entry.op {
                Op::Put => {
                    locked
                        .db
                        .insert(entry.key.clone().unwrap_or_default(), entry.value.clone().unwrap_or_default());
                }
                Op::Delete => {
                    if let Some(key) = &entry.key {
                        locked.db.remove(key);
                    }
                }
                Op::Join => {
                    if let Some(target) = entry.target_id {
                        locked.members.insert(target);
                        locked.name_index.insert(entry.replica_name.clone(), target);
                    }
                }
                Op::Retire => {
                    if let Some(target) = entry.target_id {
                        locked.members.remove(&target);
                        locked.name_index.remove(&entry.replica_name);
                    }
                }
            }
        }
    }

    // -- 4.3 anti-entropy / sync protocol (callee side) --

    /// `B`'s side of `Sync(A -> B)`: merges `incoming` (A's state) into
    /// this replica's state per the primary/non-primary rules in
    /// spec.md §4.3, and returns the merged state B adopts.
    pub fn handle_sync(&self, incoming: SyncPayload) -> SyncPayload {
        let mut locked = self.log.lock();
        let is_primary = self.is_primary();
        let mut changed = false;

        if is_primary {
            let mut known: HashSet<u64> =
                locked.committed.iter().map(|e| e.unique_id).collect();
            for mut entry in incoming.tentative.into_iter() {
                if known.insert(entry.unique_id) {
                    entry.stable = true;
                    entry.csn = locked.committed.len() as u64 + 1;
                    locked.committed.push(entry);
                    changed = true;
                }
            }
            // tentative_B is returned unchanged.
        } else {
            // Merge committed by csn: dense 1..=max(csn).
            let mut by_csn: HashMap<u64, LogEntry> = HashMap::new();
            for e in &locked.committed {
                by_csn.insert(e.csn, e.clone());
            }
            for e in &incoming.committed {
                by_csn.insert(e.csn, e.clone());
            }
            let max_csn = by_csn.keys().copied().max().unwrap_or(0);
            let merged_committed: Vec<LogEntry> = (1..=max_csn)
                .filter_map(|csn| by_csn.get(&csn).cloned())
                .collect();
            if merged_committed.len() > locked.committed.len() {
                changed = true;
            }
            locked.committed = merged_committed;

            // Merge tentative: drop anything now covered by committed,
            // keep B's order first, then append A's new entries.
            let original_tentative_len = locked.tentative.len();
            let mut seen: HashSet<u64> =
                locked.committed.iter().map(|e| e.unique_id).collect();
            let mut merged_tentative = Vec::new();
            for e in locked.tentative.drain(..).collect::<Vec<_>>() {
                if seen.insert(e.unique_id) {
                    merged_tentative.push(e);
                }
            }
            for e in incoming.tentative {
                if seen.insert(e.unique_id) {
                    merged_tentative.push(e);
                }
            }
            if merged_tentative.len() != original_tentative_len {
                changed = true;
            }
            locked.tentative = merged_tentative;
        }

        vv::merge_max(&mut locked.vv, &incoming.vv);

        if changed {
            self.mark_dirty();
        }
        Self::rebuild(&mut locked);

        SyncPayload {
            committed: locked.committed.clone(),
            tentative: locked.tentative.clone(),
            vv: locked.vv.clone(),
        }
    }

    /// The caller's side of `Sync(self -> peer)`: adopts `response` only
    /// if it strictly extends local state, per spec.md §4.3. Returns
    /// whether it did.
    pub fn adopt_sync_response(&self, response: &SyncPayload) -> bool {
        let mut locked = self.log.lock();
        let extends = response.committed.len() > locked.committed.len()
            || response.tentative.len() != locked.tentative.len();
        if extends {
            locked.committed = response.committed.clone();
            locked.tentative = response.tentative.clone();
            locked.vv = response.vv.clone();
            self.mark_dirty();
            Self::rebuild(&mut locked);
        }
        extends
    }

    // -- 4.6 introspection --

    pub fn print_log(&self) -> String {
        let locked = self.log.lock();
        let mut out = String::new();
        for e in &locked.committed {
            render_write(&mut out, e, "TRUE");
        }
        for e in &locked.tentative {
            render_write(&mut out, e, "FALSE");
        }
        out
    }
}

/// Renders one PUT/DELETE line. JOIN/RETIRE entries produce nothing.
///
/// Tentative DELETEs are faithfully rendered with the `PUT` label — a
/// reproduced rendering bug from the original source, not fixed here;
/// see DESIGN.md OQ-3.
fn render_write(out: &mut String, e: &LogEntry, stability: &str) {
    match e.op {
        Op::Put => {
            out.push_str(&format!(
                "PUT:({}, {}):{}\n",
                e.key.as_deref().unwrap_or(""),
                e.value.as_deref().unwrap_or(""),
                stability
            ));
        }
        Op::Delete => {
            let label = if stability == "TRUE" { "DELETE" } else { "PUT" };
            out.push_str(&format!(
                "{}:({}):{}\n",
                label,
                e.key.as_deref().unwrap_or(""),
                stability
            ));
        }
        Op::Join | Op::Retire => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_seeds_committed_with_self_join() {
        let r = Replica::new_bootstrap(8);
        assert!(r.is_primary());
        assert_eq!(r.name(), "1, 0");
        assert!(r.is_member(0));
    }

    #[test]
    fn primary_put_commits_immediately() {
        let r = Replica::new_bootstrap(8);
        let vv = r.apply_put("x".into(), "1".into());
        assert_eq!(vv[0], 2); // bootstrap join + this put
        let (value, _) = r.apply_get("x");
        assert_eq!(value, "1");
        assert!(r.print_log().contains("PUT:(x, 1):TRUE"));
    }

    #[test]
    fn non_primary_put_is_tentative_until_synced() {
        let r = Replica::new(1, 8);
        r.apply_put("k".into(), "v".into());
        assert!(r.print_log().contains("PUT:(k, v):FALSE"));
    }

    #[test]
    fn missing_key_reads_empty() {
        let r = Replica::new_bootstrap(8);
        let (value, _) = r.apply_get("nope");
        assert_eq!(value, "");
    }

    #[test]
    fn sync_to_primary_commits_peer_tentative_entries() {
        let primary = Replica::new_bootstrap(8);
        let follower = Replica::new(1, 8);
        follower.apply_put("a".into(), "A".into());

        let payload = follower.snapshot_for_sync();
        let response = primary.handle_sync(payload);
        assert!(follower.adopt_sync_response(&response));

        assert!(follower.print_log().contains("PUT:(a, A):TRUE"));
        let (value, _) = primary.apply_get("a");
        assert_eq!(value, "A");
    }

    #[test]
    fn tentative_delete_renders_as_put_bug_is_preserved() {
        let r = Replica::new(1, 8);
        r.apply_delete("k".into());
        assert!(r.print_log().contains("PUT:(k):FALSE"));
    }

    #[test]
    fn sync_merge_is_idempotent_once_converged() {
        let primary = Replica::new_bootstrap(8);
        let follower = Replica::new(1, 8);
        follower.apply_put("a".into(), "A".into());
        let response = primary.handle_sync(follower.snapshot_for_sync());
        follower.adopt_sync_response(&response);

        // A second round with nothing new should not report an extension.
        let response2 = primary.handle_sync(follower.snapshot_for_sync());
        assert!(!follower.adopt_sync_response(&response2));
    }

    #[test]
    fn non_primary_handle_sync_merge_is_idempotent_once_converged() {
        let follower1 = Replica::new(1, 8);
        follower1.apply_put("x".into(), "1".into());
        let follower2 = Replica::new(2, 8);

        // First round: follower2 picks up follower1's outstanding tentative
        // entry, so it's legitimately dirty.
        follower2.handle_sync(follower1.snapshot_for_sync());
        assert!(follower2.is_dirty());

        // Second round with the exact same tentative entry already present
        // on both sides must not spuriously report a change.
        follower2.clear_dirty();
        follower2.handle_sync(follower1.snapshot_for_sync());
        assert!(!follower2.is_dirty());
    }
}
