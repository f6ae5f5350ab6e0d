//! Dispatch classification for each request kind.
//!
//! Grounded on
//! `other_examples/3b0091e1_sergeidart-sqlite_daemon__daemon-src-worker.rs.rs`,
//! which splits incoming requests between ones handled directly and ones
//! that hand off to a per-database worker. `SPEC_FULL.md` §4.6 assigns HELO/
//! HEARTBEAT/PREPARE/FINALIZE to the loop thread and EXEC/QUERY to the pool,
//! ordered by database id; OPEN is loop-thread work that may still touch the
//! file system, so it is synchronous here too (this crate's VFS abstracts
//! that, rather than submitting an UNORD item for it).

use crate::wire::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Handled on the calling thread without a pool hop.
    Sync,
    /// Submitted as an ordered work item, class = db id.
    PoolOrdered,
}

pub fn classify(req: &Request) -> Dispatch {
    match req {
        Request::Helo { .. }
        | Request::Heartbeat { .. }
        | Request::Open { .. }
        | Request::Prepare { .. }
        | Request::Finalize { .. } => Dispatch::Sync,
        Request::Exec { .. } | Request::Query { .. } => Dispatch::PoolOrdered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_and_query_go_through_the_pool() {
        assert_eq!(
            classify(&Request::Exec {
                db_id: 0,
                stmt_id: 0,
                params: vec![]
            }),
            Dispatch::PoolOrdered
        );
        assert_eq!(
            classify(&Request::Query {
                db_id: 0,
                stmt_id: 0,
                params: vec![]
            }),
            Dispatch::PoolOrdered
        );
    }

    #[test]
    fn open_and_prepare_are_synchronous() {
        assert_eq!(
            classify(&Request::Open {
                name: "x".into(),
                flags: crate::wire::OpenFlags::READWRITE_CREATE,
                vfs_name: "volatile".into()
            }),
            Dispatch::Sync
        );
        assert_eq!(
            classify(&Request::Prepare {
                db_id: 0,
                sql: "SELECT 1".into()
            }),
            Dispatch::Sync
        );
    }
}
