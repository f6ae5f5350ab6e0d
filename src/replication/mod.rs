//! Replication hand-off (component E): converts a WAL commit into a
//! consensus proposal, awaits quorum, and applies committed entries
//! idempotently by index.
//!
//! Grounded on
//! `other_examples/11a81711_tursodatabase-libsql__libsql-server-sqld-src-database-write_proxy-replication.rs.rs`
//! for the propose/apply shape and the idempotent-by-index re-apply rule.
//! That file's handshake/generation-id negotiation and raw `PgHdr`
//! page-list construction are collapsed here to the frame-vector
//! abstraction `src/vfs/mod.rs` already buffers; this crate does not
//! implement the raw WAL page format.

use crate::error::ReplicationError;
use crate::statem::{StateId, StateMachine};
use crate::vfs::{DatabaseHandle, InterceptingVfs, WalFrame};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};

/// The consensus collaborator this crate consumes. A real embedding wires
/// in a Raft (or similar) implementation; `LoopbackConsensus` below is the
/// crate's own minimal single-node stand-in so the gateway/VFS/replication
/// path is testable end to end.
pub trait Consensus: Send + Sync {
    fn is_leader(&self) -> bool;
    fn leader_address(&self) -> String;
    fn peer_addresses(&self) -> Vec<String>;

    /// Propose `frames` for commit. The returned receiver resolves once the
    /// entry reaches quorum (leader-only; see `ReplicationCoordinator`).
    fn propose(&self, frames: Vec<WalFrame>) -> Receiver<Result<u64, ReplicationError>>;
}

/// What `InterceptingVfs::commit` calls into on the leader path, and what the
/// gateway consults for HELO/HEARTBEAT (`SPEC_FULL.md` §4.6).
pub trait ReplicationSink: Send + Sync {
    fn propose_commit(&self, db_id: u64, frames: &[WalFrame]) -> Result<u64, ReplicationError>;
    fn leader_address(&self) -> String;
    fn peer_addresses(&self) -> Vec<String>;
}

/// A single-node consensus stand-in: every proposal is its own quorum, and
/// commit is synchronous and immediate.
pub struct LoopbackConsensus {
    next_index: AtomicU64,
    on_commit: Mutex<Option<Box<dyn Fn(u64, &[WalFrame]) + Send>>>,
}

impl LoopbackConsensus {
    pub fn new() -> Self {
        Self {
            next_index: AtomicU64::new(0),
            on_commit: Mutex::new(None),
        }
    }

    /// Register the callback invoked, in index order, when an entry commits.
    pub fn set_on_commit(&self, f: impl Fn(u64, &[WalFrame]) + Send + 'static) {
        *self.on_commit.lock().unwrap() = Some(Box::new(f));
    }
}

impl Default for LoopbackConsensus {
    fn default() -> Self {
        Self::new()
    }
}

impl Consensus for LoopbackConsensus {
    fn is_leader(&self) -> bool {
        true
    }

    fn leader_address(&self) -> String {
        "loopback".to_string()
    }

    fn peer_addresses(&self) -> Vec<String> {
        Vec::new()
    }

    fn propose(&self, frames: Vec<WalFrame>) -> Receiver<Result<u64, ReplicationError>> {
        let (tx, rx) = mpsc::channel();
        let index = self.next_index.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(cb) = self.on_commit.lock().unwrap().as_ref() {
            cb(index, &frames);
        }
        let _ = tx.send(Ok(index));
        rx
    }
}

/// A proposed write as the replication layer models it: the consensus term
/// and index it was assigned, and the WAL frames it carries
/// (`SPEC_FULL.md` §3 "Replication entry"). Immutable once proposed.
#[derive(Debug, Clone)]
pub struct ReplicationEntry {
    pub term: u64,
    pub index: u64,
    pub payload: Vec<WalFrame>,
}

/// Lifecycle of a `ReplicationEntry` as this node tracks it, table-driven
/// over `crate::statem` so it panics the same way the pool planner does on
/// an impossible transition (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Proposed,
    Committed,
    Applied,
}

impl StateId for EntryState {
    fn index(&self) -> u32 {
        match self {
            EntryState::Proposed => 0,
            EntryState::Committed => 1,
            EntryState::Applied => 2,
        }
    }

    fn allowed_next(&self) -> u64 {
        match self {
            EntryState::Proposed => 1 << 1,  // Proposed -> Committed
            EntryState::Committed => 1 << 2, // Committed -> Applied
            EntryState::Applied => 0,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            EntryState::Proposed => "Proposed",
            EntryState::Committed => "Committed",
            EntryState::Applied => "Applied",
        }
    }
}

/// Bridges a `Consensus` implementation to the VFS's `ReplicationSink`
/// contract and tracks, per database, the highest index already applied so
/// redelivered `on_commit` callbacks are no-ops (`SPEC_FULL.md` §4.5, §7).
/// Also keeps each entry's own `EntryState` lifecycle, keyed by
/// `(db_id, index)`, for followers applying an already-committed entry.
pub struct ReplicationCoordinator {
    consensus: Arc<dyn Consensus>,
    highest_applied: Mutex<HashMap<u64, u64>>,
    log: Mutex<HashMap<(u64, u64), (ReplicationEntry, StateMachine<EntryState>)>>,
    current_term: AtomicU64,
}

impl ReplicationCoordinator {
    pub fn new(consensus: Arc<dyn Consensus>) -> Self {
        Self {
            consensus,
            highest_applied: Mutex::new(HashMap::new()),
            log: Mutex::new(HashMap::new()),
            current_term: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    fn entry_state(&self, db_id: u64, index: u64) -> Option<EntryState> {
        self.log
            .lock()
            .unwrap()
            .get(&(db_id, index))
            .map(|(_, sm)| sm.current())
    }

    fn mark_applied(&self, db_id: u64, index: u64) {
        let mut map = self.highest_applied.lock().unwrap();
        let entry = map.entry(db_id).or_insert(0);
        if index > *entry {
            *entry = index;
        }
    }

    fn already_applied(&self, db_id: u64, index: u64) -> bool {
        self.highest_applied
            .lock()
            .unwrap()
            .get(&db_id)
            .is_some_and(|highest| index <= *highest)
    }

    /// Apply a committed entry to `vfs`. Idempotent: an index at or below
    /// the highest already applied for this database is silently skipped,
    /// since consensus delivery is at-least-once. Tracks the entry through
    /// `EntryState::Proposed -> Committed -> Applied` as it goes.
    pub fn apply<H: DatabaseHandle>(
        &self,
        db_id: u64,
        index: u64,
        frames: &[WalFrame],
        vfs: &mut InterceptingVfs<H>,
    ) -> Result<(), crate::error::VfsError> {
        if self.already_applied(db_id, index) {
            tracing::debug!(db_id, index, "skipping redelivered entry, already applied");
            return Ok(());
        }

        let term = self.current_term.load(Ordering::SeqCst);
        {
            let mut log = self.log.lock().unwrap();
            let (_, sm) = log.entry((db_id, index)).or_insert_with(|| {
                (
                    ReplicationEntry {
                        term,
                        index,
                        payload: frames.to_vec(),
                    },
                    StateMachine::new(EntryState::Proposed),
                )
            });
            sm.transition(EntryState::Committed);
        }

        tracing::debug!(db_id, index, frame_count = frames.len(), "applying committed entry");
        vfs.apply_committed(frames)?;
        self.mark_applied(db_id, index);

        let mut log = self.log.lock().unwrap();
        if let Some((_, sm)) = log.get_mut(&(db_id, index)) {
            sm.transition(EntryState::Applied);
        }
        Ok(())
    }
}

impl ReplicationSink for ReplicationCoordinator {
    fn propose_commit(&self, db_id: u64, frames: &[WalFrame]) -> Result<u64, ReplicationError> {
        if !self.consensus.is_leader() {
            tracing::warn!(db_id, "rejecting propose_commit: not leader");
            return Err(ReplicationError::NotLeader);
        }
        tracing::debug!(db_id, frame_count = frames.len(), "proposing commit");
        let rx = self.consensus.propose(frames.to_vec());
        let result = rx.recv().map_err(|_| ReplicationError::ChannelClosed)?;
        match &result {
            Ok(index) => {
                tracing::debug!(db_id, index, "commit proposal reached quorum");
                self.mark_applied(db_id, *index);
            }
            Err(err) => tracing::warn!(db_id, error = %err, "commit proposal rejected"),
        }
        result
    }

    fn leader_address(&self) -> String {
        self.consensus.leader_address()
    }

    fn peer_addresses(&self) -> Vec<String> {
        self.consensus.peer_addresses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::test_support::MemoryHandle;

    struct AlwaysFollower;
    impl Consensus for AlwaysFollower {
        fn is_leader(&self) -> bool {
            false
        }
        fn leader_address(&self) -> String {
            "10.0.0.9:9000".to_string()
        }
        fn peer_addresses(&self) -> Vec<String> {
            Vec::new()
        }
        fn propose(&self, _frames: Vec<WalFrame>) -> Receiver<Result<u64, ReplicationError>> {
            unreachable!("a follower must never be asked to propose")
        }
    }

    #[test]
    fn follower_rejects_propose_with_not_leader() {
        let coordinator = ReplicationCoordinator::new(Arc::new(AlwaysFollower));
        let err = coordinator.propose_commit(0, &[]).unwrap_err();
        assert!(matches!(err, ReplicationError::NotLeader));
    }

    #[test]
    fn leader_path_round_trips_through_loopback_and_vfs() {
        let consensus = Arc::new(LoopbackConsensus::new());
        let coordinator = ReplicationCoordinator::new(consensus);
        let mut vfs = InterceptingVfs::new(0, MemoryHandle::default());
        vfs.buffer_frame(WalFrame {
            page_no: 2,
            data: vec![7; 8],
        });
        vfs.commit(&coordinator).unwrap();
    }

    #[test]
    fn redelivered_lower_index_is_idempotent_no_op() {
        let consensus = Arc::new(LoopbackConsensus::new());
        let coordinator = ReplicationCoordinator::new(consensus);
        let mut vfs = InterceptingVfs::new(0, MemoryHandle::default());
        let frames = vec![WalFrame {
            page_no: 1,
            data: vec![1; 4],
        }];

        coordinator.apply(0, 5, &frames, &mut vfs).unwrap();
        // A redelivery of an already-applied (or older) index must not panic
        // or double-apply.
        coordinator.apply(0, 5, &frames, &mut vfs).unwrap();
        coordinator.apply(0, 3, &frames, &mut vfs).unwrap();
        assert!(coordinator.already_applied(0, 5));
        assert!(coordinator.already_applied(0, 3));
        assert!(!coordinator.already_applied(0, 6));
    }

    #[test]
    fn applied_entry_reaches_the_applied_state() {
        let consensus = Arc::new(LoopbackConsensus::new());
        let coordinator = ReplicationCoordinator::new(consensus);
        let mut vfs = InterceptingVfs::new(0, MemoryHandle::default());
        let frames = vec![WalFrame {
            page_no: 1,
            data: vec![9; 4],
        }];

        assert_eq!(coordinator.entry_state(0, 5), None);
        coordinator.apply(0, 5, &frames, &mut vfs).unwrap();
        assert_eq!(coordinator.entry_state(0, 5), Some(EntryState::Applied));
    }

    #[test]
    fn coordinator_surfaces_consensus_leader_and_peers() {
        let consensus = Arc::new(AlwaysFollower);
        let coordinator = ReplicationCoordinator::new(consensus);
        assert_eq!(coordinator.leader_address(), "10.0.0.9:9000");
        assert!(coordinator.peer_addresses().is_empty());
    }
}
