//! Write-scheduling and I/O-ordering core for a replicated, embeddable SQL
//! engine.
//!
//! This crate is the hard-engineering seam between a SQLite-compatible
//! database and a consensus log: a barrier-separated ordered/unordered
//! thread pool (`pool`), an intercepting virtual file system that captures
//! WAL frames on commit (`vfs`), the hand-off that turns those frames into
//! a replicated proposal (`replication`), and the per-connection gateway
//! state machine that ties requests to pool jobs (`gateway`).
//!
//! The consensus implementation itself, the wire byte-codec, and a
//! connection-accept loop are out of scope; `replication::Consensus` and
//! `wire::{Request, Response}` are the seams an embedding plugs into.
//!
//! # Example
//!
//! ```
//! use latticedb_pool::config::PoolConfig;
//! use latticedb_pool::gateway::Gateway;
//! use latticedb_pool::pool::Pool;
//! use latticedb_pool::replication::{LoopbackConsensus, ReplicationCoordinator, ReplicationSink};
//! use latticedb_pool::wire::{OpenFlags, Request, Response};
//! use std::sync::Arc;
//!
//! let cfg = PoolConfig::from_env();
//! latticedb_pool::logging::init(cfg.trace_enabled);
//!
//! let pool = Arc::new(Pool::new(cfg));
//! let consensus = Arc::new(LoopbackConsensus::new());
//! let replication: Arc<dyn ReplicationSink> = Arc::new(ReplicationCoordinator::new(consensus));
//! let gateway = Gateway::new(pool, replication);
//!
//! match gateway.dispatch(Request::Open {
//!     name: "example.db".to_string(),
//!     flags: OpenFlags::READWRITE_CREATE,
//!     vfs_name: "volatile".to_string(),
//! }) {
//!     Response::Db { id } => println!("opened db {id}"),
//!     other => panic!("unexpected response: {other:?}"),
//! };
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod replication;
pub mod statem;
pub mod vfs;
pub mod wire;
