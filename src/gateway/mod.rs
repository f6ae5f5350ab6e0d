//! The gateway (component F): one per client connection, translating a
//! single in-flight request into pool/replication activity and a response.
//!
//! Grounded on
//! `other_examples/3b0091e1_sergeidart-sqlite_daemon__daemon-src-worker.rs.rs`
//! for the `Request`/`Response` dispatch shape (adapted from `tokio`
//! async to blocking on a `std::sync::mpsc` completion channel per
//! `SPEC_FULL.md` §5) and on `src/core/broker.rs`'s per-path locking idiom
//! for guarding each open database's connection.

mod request;
mod row_stream;

pub use request::{classify, Dispatch};

use crate::db;
use crate::error::{GatewayError, ReplicationError, VfsError};
use crate::pool::{Pool, WorkClass};
use crate::registry::Registry;
use crate::replication::ReplicationSink;
use crate::wire::{ColumnType, ColumnValue, OpenFlags, Request, Response};
use row_stream::RowStream;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

const KNOWN_VFS_NAMES: [&str; 2] = ["volatile", "disk"];

struct DbEntry {
    conn: Arc<Mutex<Connection>>,
}

struct StmtEntry {
    db_id: u64,
    sql: String,
}

/// Per-connection gateway state.
pub struct Gateway {
    pool: Arc<Pool>,
    replication: Arc<dyn ReplicationSink>,
    dbs: Mutex<Registry<DbEntry>>,
    stmts: Mutex<Registry<StmtEntry>>,
    row_streams: Mutex<Registry<RowStream>>,
    busy: AtomicBool,
}

impl Gateway {
    pub fn new(pool: Arc<Pool>, replication: Arc<dyn ReplicationSink>) -> Self {
        Self {
            pool,
            replication,
            dbs: Mutex::new(Registry::new()),
            stmts: Mutex::new(Registry::new()),
            row_streams: Mutex::new(Registry::new()),
            busy: AtomicBool::new(false),
        }
    }

    /// Handle exactly one request. Returns `Protocol` if a prior request on
    /// this gateway has not yet resolved (`SPEC_FULL.md` §4.6, §8 invariant 5).
    pub fn dispatch(&self, req: Request) -> Response {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("rejected request: one already in flight on this gateway");
            return GatewayError::Protocol("a request is already in flight".to_string()).into();
        }
        let response = self.dispatch_inner(req);
        if let Response::DbError { code, ref message } = response {
            tracing::warn!(code, message, "request failed");
        }
        self.busy.store(false, Ordering::SeqCst);
        response
    }

    fn dispatch_inner(&self, req: Request) -> Response {
        tracing::debug!(dispatch = ?classify(&req), "handling request");
        match req {
            Request::Helo { .. } => Response::Welcome {
                leader_address: self.replication.leader_address(),
            },
            Request::Heartbeat { .. } => Response::Servers {
                addresses: self.replication.peer_addresses(),
            },
            Request::Open {
                name,
                flags,
                vfs_name,
            } => self.handle_open(&name, flags, &vfs_name),
            Request::Prepare { db_id, sql } => self.handle_prepare(db_id, sql),
            Request::Finalize { db_id, stmt_id } => self.handle_finalize(db_id, stmt_id),
            Request::Exec {
                db_id,
                stmt_id,
                params,
            } => self.handle_exec(db_id, stmt_id, params),
            Request::Query {
                db_id,
                stmt_id,
                params,
            } => self.handle_query(db_id, stmt_id, params),
            Request::FetchRows { cursor_id } => self.handle_fetch_rows(cursor_id),
        }
    }

    fn handle_open(&self, name: &str, flags: OpenFlags, vfs_name: &str) -> Response {
        if !flags.is_valid() {
            return Response::DbError {
                code: 21,
                message: "bad parameter or other API misuse".to_string(),
            };
        }
        if !KNOWN_VFS_NAMES.contains(&vfs_name) {
            let err: GatewayError = VfsError::UnknownVfs(vfs_name.to_string()).into();
            return err.into();
        }
        let opened = if vfs_name == "volatile" {
            db::open_memory_connection()
        } else {
            db::open_connection(name)
        };
        match opened {
            Ok(conn) => {
                let mut dbs = self.dbs.lock().unwrap();
                let id = dbs.insert(DbEntry {
                    conn: Arc::new(Mutex::new(conn)),
                });
                Response::Db { id }
            }
            Err(err) => err.into(),
        }
    }

    fn handle_prepare(&self, db_id: u64, sql: String) -> Response {
        if let Err(err) = crate::wire::validate_statement(&sql, &[]) {
            return err.into();
        }
        let dbs = self.dbs.lock().unwrap();
        if dbs.get(db_id).is_none() {
            return GatewayError::NotFound(format!("no db with id {db_id}")).into();
        }
        drop(dbs);
        let mut stmts = self.stmts.lock().unwrap();
        let id = stmts.insert(StmtEntry { db_id, sql });
        Response::Stmt { id }
    }

    fn handle_finalize(&self, _db_id: u64, stmt_id: u64) -> Response {
        let mut stmts = self.stmts.lock().unwrap();
        match stmts.remove(stmt_id) {
            Some(_) => Response::Empty,
            None => GatewayError::NotFound(format!("no stmt with id {stmt_id}")).into(),
        }
    }

    fn lookup(&self, db_id: u64, stmt_id: u64) -> Result<(Arc<Mutex<Connection>>, String), GatewayError> {
        let stmts = self.stmts.lock().unwrap();
        let stmt = stmts
            .get(stmt_id)
            .ok_or_else(|| GatewayError::NotFound(format!("no stmt with id {stmt_id}")))?;
        if stmt.db_id != db_id {
            return Err(GatewayError::NotFound(format!("no stmt with id {stmt_id}")));
        }
        let sql = stmt.sql.clone();
        drop(stmts);

        let dbs = self.dbs.lock().unwrap();
        let entry = dbs
            .get(db_id)
            .ok_or_else(|| GatewayError::NotFound(format!("no db with id {db_id}")))?;
        Ok((entry.conn.clone(), sql))
    }

    fn handle_exec(&self, db_id: u64, stmt_id: u64, params: Vec<ColumnValue>) -> Response {
        let (conn, sql) = match self.lookup(db_id, stmt_id) {
            Ok(v) => v,
            Err(err) => return wrap_exec_error(err).into(),
        };

        let (tx, rx) = mpsc::channel();
        let result_cell: Arc<Mutex<Option<Result<(i64, u64), GatewayError>>>> =
            Arc::new(Mutex::new(None));
        let result_cell_work = result_cell.clone();
        let replication = self.replication.clone();

        let work = move || {
            let res = run_exec(&conn, &sql, &params, db_id, replication.as_ref());
            *result_cell_work.lock().unwrap() = Some(res);
        };
        let after_work = move || {
            let res = result_cell
                .lock()
                .unwrap()
                .take()
                .expect("work callback must set the result before after_work runs");
            let _ = tx.send(res);
        };

        self.pool
            .submit(WorkClass::Ordered(db_id as u32), db_id, work, after_work);

        loop {
            match rx.try_recv() {
                Ok(Ok((last_insert_id, rows_affected))) => {
                    return Response::Result {
                        last_insert_id,
                        rows_affected,
                    }
                }
                Ok(Err(err)) => return err.into(),
                Err(mpsc::TryRecvError::Empty) => {
                    self.pool.drain_completions_blocking();
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    return GatewayError::Protocol("worker dropped without a result".to_string())
                        .into()
                }
            }
        }
    }

    fn handle_fetch_rows(&self, cursor_id: u64) -> Response {
        let mut streams = self.row_streams.lock().unwrap();
        let stream = match streams.get_mut(cursor_id) {
            Some(stream) => stream,
            None => {
                return GatewayError::NotFound(format!("no row cursor with id {cursor_id}")).into()
            }
        };
        let columns = stream.columns();
        let (rows, exhausted) = stream.next_chunk();
        if exhausted {
            streams.remove(cursor_id);
        }
        Response::Rows {
            columns,
            rows,
            end_of_message: exhausted,
            cursor_id: if exhausted { None } else { Some(cursor_id) },
        }
    }

    /// Chunk a fully materialised result set into one `Response::Rows`,
    /// registering a cursor for the remainder when it doesn't fit
    /// `MAX_ROWS_PER_CHUNK` in one message (`SPEC_FULL.md` §4.6 row streaming).
    fn respond_with_rows(&self, columns: Vec<ColumnType>, rows: Vec<Vec<ColumnValue>>) -> Response {
        let mut stream = RowStream::new(columns.clone(), rows);
        let (chunk, exhausted) = stream.next_chunk();
        if exhausted {
            return Response::Rows {
                columns,
                rows: chunk,
                end_of_message: true,
                cursor_id: None,
            };
        }
        let cursor_id = self.row_streams.lock().unwrap().insert(stream);
        Response::Rows {
            columns,
            rows: chunk,
            end_of_message: false,
            cursor_id: Some(cursor_id),
        }
    }

    fn handle_query(&self, db_id: u64, stmt_id: u64, params: Vec<ColumnValue>) -> Response {
        let (conn, sql) = match self.lookup(db_id, stmt_id) {
            Ok(v) => v,
            Err(err) => return err.into(),
        };

        let (tx, rx) = mpsc::channel();
        type QueryResult = Result<(Vec<ColumnType>, Vec<Vec<ColumnValue>>), GatewayError>;
        let result_cell: Arc<Mutex<Option<QueryResult>>> = Arc::new(Mutex::new(None));
        let result_cell_work = result_cell.clone();

        let work = move || {
            let res = run_query(&conn, &sql, &params);
            *result_cell_work.lock().unwrap() = Some(res);
        };
        let after_work = move || {
            let res = result_cell
                .lock()
                .unwrap()
                .take()
                .expect("work callback must set the result before after_work runs");
            let _ = tx.send(res);
        };

        self.pool
            .submit(WorkClass::Ordered(db_id as u32), db_id, work, after_work);

        loop {
            match rx.try_recv() {
                Ok(Ok((columns, rows))) => return self.respond_with_rows(columns, rows),
                Ok(Err(err)) => return err.into(),
                Err(mpsc::TryRecvError::Empty) => {
                    self.pool.drain_completions_blocking();
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    return GatewayError::Protocol("worker dropped without a result".to_string())
                        .into()
                }
            }
        }
    }
}

/// Wraps an error surfaced while handling an EXEC request so the client sees
/// which operation failed (`SPEC_FULL.md` §8 scenario 5).
fn wrap_exec_error(err: GatewayError) -> GatewayError {
    match err {
        GatewayError::NotFound(msg) => GatewayError::NotFound(format!("failed to handle exec: {msg}")),
        other => other,
    }
}

fn column_value_to_sql(value: &ColumnValue) -> SqlValue {
    match value {
        ColumnValue::Integer(i) => SqlValue::Integer(*i),
        ColumnValue::Float(f) => SqlValue::Real(*f),
        ColumnValue::Text(s) => SqlValue::Text(s.clone()),
        ColumnValue::Blob(b) => SqlValue::Blob(b.clone()),
        ColumnValue::Null => SqlValue::Null,
    }
}

fn sql_value_ref_to_column(value: ValueRef<'_>) -> ColumnValue {
    match value {
        ValueRef::Null => ColumnValue::Null,
        ValueRef::Integer(i) => ColumnValue::Integer(i),
        ValueRef::Real(f) => ColumnValue::Float(f),
        ValueRef::Text(t) => ColumnValue::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => ColumnValue::Blob(b.to_vec()),
    }
}

/// Runs on a worker thread (`SPEC_FULL.md` §5: "all SQLite calls happen
/// inside a worker's work callback"). A real embedding's writes would flow
/// through the intercepting VFS automatically; this crate's SQLite test
/// double talks to `rusqlite` directly, so the replication hand-off is
/// triggered explicitly here for any statement that mutates the database.
fn run_exec(
    conn: &Mutex<Connection>,
    sql: &str,
    params: &[ColumnValue],
    db_id: u64,
    replication: &dyn ReplicationSink,
) -> Result<(i64, u64), GatewayError> {
    let conn = conn.lock().unwrap();
    let sql_params: Vec<SqlValue> = params.iter().map(column_value_to_sql).collect();
    let rows_affected = conn.execute(sql, rusqlite::params_from_iter(sql_params))?;
    if rows_affected > 0 || sql.to_ascii_uppercase().trim_start().starts_with("CREATE") {
        // A real VFS would have already captured WAL frames during the
        // statement above; here we model the hand-off as a zero-frame
        // commit marker so the replication path is exercised uniformly.
        replication.propose_commit(db_id, &[]).map_err(|e| {
            tracing::warn!(db_id, error = %e, "commit proposal failed");
            match e {
                ReplicationError::NotLeader => GatewayError::NotLeader {
                    leader: replication.leader_address(),
                },
                other => GatewayError::Busy(other.to_string()),
            }
        })?;
    }
    Ok((conn.last_insert_rowid(), rows_affected as u64))
}

fn run_query(
    conn: &Mutex<Connection>,
    sql: &str,
    params: &[ColumnValue],
) -> Result<(Vec<ColumnType>, Vec<Vec<ColumnValue>>), GatewayError> {
    let conn = conn.lock().unwrap();
    let mut stmt = conn.prepare(sql)?;
    let column_count = stmt.column_count();
    let sql_params: Vec<SqlValue> = params.iter().map(column_value_to_sql).collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(sql_params))?;
    let mut out_rows = Vec::new();
    let mut columns = Vec::new();
    let mut first = true;
    while let Some(row) = rows.next()? {
        if first {
            for i in 0..column_count {
                columns.push(sql_value_ref_to_column(row.get_ref(i)?).column_type());
            }
            first = false;
        }
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(sql_value_ref_to_column(row.get_ref(i)?));
        }
        out_rows.push(values);
    }
    Ok((columns, out_rows))
}
