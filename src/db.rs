//! Database connection helpers.
//!
//! This is the crate's only direct caller of `rusqlite::Connection::open`;
//! every other module goes through a worker's `DatabaseHandle` so that writes
//! stay serialized by the pool and intercepted by the VFS layer (component D).

use crate::error::GatewayError;
use rusqlite::Connection;
use std::time::Duration;

/// Open a SQLite connection with this crate's standard configuration:
/// WAL journaling, foreign keys enforced, and a 5-second busy timeout.
pub fn open_connection(path: &str) -> Result<Connection, GatewayError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

/// Open an in-memory connection for tests and the loopback collaborators.
/// Foreign keys are still enforced; WAL mode has no effect on `:memory:`.
pub fn open_memory_connection() -> Result<Connection, GatewayError> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}
