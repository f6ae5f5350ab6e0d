//! Error types for the gateway, pool, VFS, and replication paths.
//!
//! All recoverable failures flow through `GatewayError`. Invariant violations
//! inside the pool planner or the state-machine framework are not part of
//! this taxonomy: they are design-law violations and abort the process via
//! `panic!` instead (see `src/statem.rs`).

use std::io;
use thiserror::Error;

/// Canonical error type returned to a gateway client.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed or out-of-sequence request. The connection must be closed.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Unknown database or statement id.
    #[error("not found: {0}")]
    NotFound(String),

    /// SQLite reported a failure while preparing or stepping a statement.
    #[error("sqlite error {code}: {message}")]
    DbError { code: i32, message: String },

    /// This node is not the leader; the client should retry against `leader`.
    #[error("not leader, current leader is {leader}")]
    NotLeader { leader: String },

    /// Local disk or VFS failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write is already in flight for this database; retry after backoff.
    #[error("busy: {0}")]
    Busy(String),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) => GatewayError::DbError {
                code: e.extended_code,
                message: msg.clone().unwrap_or_else(|| e.to_string()),
            },
            other => GatewayError::DbError {
                code: -1,
                message: other.to_string(),
            },
        }
    }
}

impl From<VfsError> for GatewayError {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::NotFound(msg) => GatewayError::NotFound(msg),
            VfsError::Io(e) => GatewayError::Io(e),
            VfsError::ReplicationRejected(ReplicationError::NotLeader) => GatewayError::NotLeader {
                leader: String::new(),
            },
            VfsError::ReplicationRejected(e) => GatewayError::Busy(e.to_string()),
            other @ VfsError::UnknownVfs(_) => GatewayError::DbError {
                code: 21,
                message: other.to_string(),
            },
        }
    }
}

/// Failures specific to the replication hand-off (component E).
#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("this node is not the leader")]
    NotLeader,

    #[error("proposal rejected: {0}")]
    Rejected(String),

    #[error("consensus channel closed before the proposal resolved")]
    ChannelClosed,
}

/// Failures specific to the intercepting VFS (component D).
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("replication rejected the commit: {0}")]
    ReplicationRejected(#[from] ReplicationError),

    #[error("no such file: {0}")]
    NotFound(String),

    #[error("unknown vfs {0}")]
    UnknownVfs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display() {
        let err = GatewayError::Protocol("second request while busy".to_string());
        assert_eq!(
            format!("{}", err),
            "protocol violation: second request while busy"
        );
    }

    #[test]
    fn not_found_error_display() {
        let err = GatewayError::NotFound("no stmt with id 666".to_string());
        assert_eq!(format!("{}", err), "not found: no stmt with id 666");
    }

    #[test]
    fn not_leader_error_display() {
        let err = GatewayError::NotLeader {
            leader: "10.0.0.1:9000".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "not leader, current leader is 10.0.0.1:9000"
        );
    }

    #[test]
    fn busy_error_display() {
        let err = GatewayError::Busy("write in flight".to_string());
        assert_eq!(format!("{}", err), "busy: write in flight");
    }

    #[test]
    fn db_error_from_sqlite_misuse() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let result = conn.execute("SELECT this is not sql", []);
        let err: GatewayError = result.unwrap_err().into();
        assert!(matches!(err, GatewayError::DbError { .. }));
    }

    #[test]
    fn unknown_vfs_becomes_a_misuse_db_error() {
        let err: GatewayError = VfsError::UnknownVfs("nonexistent".to_string()).into();
        match err {
            GatewayError::DbError { code, message } => {
                assert_eq!(code, 21);
                assert_eq!(message, "unknown vfs nonexistent");
            }
            other => panic!("expected DbError, got {other:?}"),
        }
    }

    #[test]
    fn replication_not_leader_rejection_maps_to_not_leader() {
        let err: GatewayError = VfsError::ReplicationRejected(ReplicationError::NotLeader).into();
        assert!(matches!(err, GatewayError::NotLeader { .. }));
    }
}
