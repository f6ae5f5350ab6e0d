//! Sparse id registries (component G).
//!
//! Grounded on the teacher's `OnceLock`-backed global maps in
//! `src/core/broker.rs` (`DB_LOCKS`, the read cache), generalized into a
//! per-instance `Registry<T>` keyed by a process-wide monotonic `u64`
//! counter truncated to `u32` on the wire. Unlike the teacher's globals,
//! each gateway connection owns its own `Registry` instances (one for
//! databases, one for statements) rather than sharing a single process-wide
//! map, since ids must stay stable and private to a connection's lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate the next globally unique id. Ids are never reused within a
/// process lifetime.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A sparse id -> value map with stable, never-reused ids.
#[derive(Debug, Default)]
pub struct Registry<T> {
    entries: HashMap<u64, T>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert `value` under a freshly allocated id and return that id.
    pub fn insert(&mut self, value: T) -> u64 {
        let id = next_id();
        self.entries.insert(id, value);
        id
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<T> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
