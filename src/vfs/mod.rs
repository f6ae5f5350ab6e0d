//! The intercepting VFS (component D).
//!
//! Grounded on `other_examples/2e89aa62_willothy-threeqlite__sqlite-vfs-src-lib.rs.rs`
//! for the `DatabaseHandle`/`Vfs` trait shapes and the `OpenKind`/
//! `OpenAccess`/`LockKind` enums. That source is async (`impl Future`
//! returns) because it targets a real `sqlite3_vfs` C callback surface; this
//! crate's execution model is synchronous and pool-driven (`SPEC_FULL.md`
//! §5: "the core uses condvars, not async continuations"), so every trait
//! method here returns a plain `Result` instead. Registering a raw
//! `sqlite3_vfs` struct via `sqlite3_vfs_register` is out of scope; an
//! external adapter implements `Vfs`/`DatabaseHandle` against this crate's
//! traits and does that registration.

use crate::error::VfsError;
use crate::replication::ReplicationSink;

/// One SQLite page written by a committing transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalFrame {
    pub page_no: u32,
    pub data: Vec<u8>,
}

/// What kind of file SQLite is asking to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    MainDb,
    MainJournal,
    Wal,
    TempDb,
    TransientDb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAccess {
    Read,
    Write,
    Create,
    CreateNew,
}

/// SQLite's file-locking ladder. Ordered: a higher lock always subsumes a
/// lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockKind {
    None,
    Shared,
    Reserved,
    Pending,
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub kind: OpenKind,
    pub access: OpenAccess,
}

/// A SQLite-facing file handle: the synchronous surface a `Vfs` opens.
pub trait DatabaseHandle: Send {
    fn size(&self) -> Result<u64, VfsError>;
    fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<(), VfsError>;
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> Result<(), VfsError>;
    fn sync(&mut self) -> Result<(), VfsError>;
    fn set_len(&mut self, len: u64) -> Result<(), VfsError>;
    fn lock(&mut self, to: LockKind) -> Result<bool, VfsError>;
    fn current_lock(&self) -> Result<LockKind, VfsError>;
}

/// Opens and manages database files under a given name.
pub trait Vfs: Send + Sync {
    type Handle: DatabaseHandle;

    fn open(&self, db_name: &str, opts: OpenOptions) -> Result<Self::Handle, VfsError>;
    fn delete(&self, db_name: &str) -> Result<(), VfsError>;
    fn exists(&self, db_name: &str) -> Result<bool, VfsError>;
}

const PAGE_SIZE: u64 = 4096;

/// Wraps a `DatabaseHandle` and captures WAL frames produced by a commit,
/// routing them through replication hand-off before they become durable
/// locally (`SPEC_FULL.md` §4.4).
pub struct InterceptingVfs<H: DatabaseHandle> {
    db_id: u64,
    handle: H,
    pending_frames: Vec<WalFrame>,
}

impl<H: DatabaseHandle> InterceptingVfs<H> {
    pub fn new(db_id: u64, handle: H) -> Self {
        Self {
            db_id,
            handle,
            pending_frames: Vec::new(),
        }
    }

    /// Buffer a page write belonging to the transaction currently being
    /// committed. Frames are held in memory, not yet persisted.
    pub fn buffer_frame(&mut self, frame: WalFrame) {
        self.pending_frames.push(frame);
    }

    pub fn pending_frame_count(&self) -> usize {
        self.pending_frames.len()
    }

    /// Commit the buffered frames: hand them to replication, and only write
    /// them to the local WAL once replication confirms. On failure the
    /// buffered frames are dropped without ever touching the local file, so
    /// there is no WAL pointer to roll back.
    pub fn commit(&mut self, replication: &dyn ReplicationSink) -> Result<(), VfsError> {
        let frames = std::mem::take(&mut self.pending_frames);
        if frames.is_empty() {
            return Ok(());
        }

        match replication.propose_commit(self.db_id, &frames) {
            Ok(index) => {
                tracing::debug!(db_id = self.db_id, index, frame_count = frames.len(), "commit accepted, writing locally");
                for frame in &frames {
                    let offset = frame.page_no as u64 * PAGE_SIZE;
                    self.handle.write_all_at(&frame.data, offset)?;
                }
                self.handle.sync()?;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(db_id = self.db_id, error = %err, "commit rejected by replication, frames dropped");
                Err(VfsError::ReplicationRejected(err))
            }
        }
    }

    /// Apply frames delivered by the consensus commit callback (a follower
    /// receiving an already-committed entry). Bypasses proposal.
    pub fn apply_committed(&mut self, frames: &[WalFrame]) -> Result<(), VfsError> {
        tracing::debug!(db_id = self.db_id, frame_count = frames.len(), "applying committed frames locally");
        for frame in frames {
            let offset = frame.page_no as u64 * PAGE_SIZE;
            self.handle.write_all_at(&frame.data, offset)?;
        }
        self.handle.sync()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryHandle;
    use super::*;
    use crate::error::ReplicationError;

    #[test]
    fn lock_kind_ladder_is_ordered() {
        assert!(LockKind::None < LockKind::Shared);
        assert!(LockKind::Shared < LockKind::Reserved);
        assert!(LockKind::Reserved < LockKind::Pending);
        assert!(LockKind::Pending < LockKind::Exclusive);
    }

    struct AcceptingSink;
    impl ReplicationSink for AcceptingSink {
        fn propose_commit(&self, _db_id: u64, _frames: &[WalFrame]) -> Result<u64, ReplicationError> {
            Ok(1)
        }
        fn leader_address(&self) -> String {
            "local".to_string()
        }
        fn peer_addresses(&self) -> Vec<String> {
            Vec::new()
        }
    }

    struct RejectingSink;
    impl ReplicationSink for RejectingSink {
        fn propose_commit(&self, _db_id: u64, _frames: &[WalFrame]) -> Result<u64, ReplicationError> {
            Err(ReplicationError::NotLeader)
        }
        fn leader_address(&self) -> String {
            "elsewhere".to_string()
        }
        fn peer_addresses(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn empty_commit_is_a_no_op_success() {
        let mut vfs = InterceptingVfs::new(0, MemoryHandle::default());
        assert!(vfs.commit(&AcceptingSink).is_ok());
    }

    #[test]
    fn accepted_commit_persists_frames_locally() {
        let mut vfs = InterceptingVfs::new(0, MemoryHandle::default());
        vfs.buffer_frame(WalFrame {
            page_no: 1,
            data: vec![0xAB; 16],
        });
        vfs.commit(&AcceptingSink).unwrap();
        assert_eq!(vfs.handle.page(PAGE_SIZE), Some(&vec![0xAB; 16]));
    }

    #[test]
    fn rejected_commit_never_touches_local_file() {
        let mut vfs = InterceptingVfs::new(0, MemoryHandle::default());
        vfs.buffer_frame(WalFrame {
            page_no: 1,
            data: vec![0xCD; 16],
        });
        let err = vfs.commit(&RejectingSink).unwrap_err();
        assert!(matches!(err, VfsError::ReplicationRejected(_)));
        assert!(vfs.handle.page(PAGE_SIZE).is_none());
        assert_eq!(vfs.pending_frame_count(), 0);
    }
}
