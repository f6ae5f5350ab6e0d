//! Wire protocol data shapes (component F's external interface).
//!
//! Grounded on
//! `other_examples/3b0091e1_sergeidart-sqlite_daemon__daemon-src-worker.rs.rs`
//! for the `Request`/`Response` enum shapes, the `serde_json::Value`
//! parameter-binding idiom, and the statement-validation rules
//! (`validate_statement`). Byte-level framing onto a socket is out of
//! scope; `Codec` is the named collaborator trait an external transport
//! implements against these types.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

const MAX_SQL_BYTES: usize = 100 * 1024;
const MAX_PARAMS: usize = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
}

impl OpenFlags {
    pub const READWRITE_CREATE: OpenFlags = OpenFlags {
        read: true,
        write: true,
        create: true,
    };

    /// SQLite rejects `CREATE` without `READ`/`WRITE` as misuse (code 21).
    pub fn is_valid(&self) -> bool {
        self.read || self.write
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Helo {
        client_id: String,
    },
    Heartbeat {
        timestamp: i64,
    },
    Open {
        name: String,
        flags: OpenFlags,
        vfs_name: String,
    },
    Prepare {
        db_id: u64,
        sql: String,
    },
    Exec {
        db_id: u64,
        stmt_id: u64,
        params: Vec<ColumnValue>,
    },
    Query {
        db_id: u64,
        stmt_id: u64,
        params: Vec<ColumnValue>,
    },
    Finalize {
        db_id: u64,
        stmt_id: u64,
    },
    /// Continuation request for a QUERY whose result set did not fit in one
    /// chunk (`end_of_message: false`); fetches the next chunk of `cursor_id`.
    FetchRows {
        cursor_id: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Welcome { leader_address: String },
    Servers { addresses: Vec<String> },
    Db { id: u64 },
    Stmt { id: u64 },
    Result { last_insert_id: i64, rows_affected: u64 },
    Rows {
        columns: Vec<ColumnType>,
        rows: Vec<Vec<ColumnValue>>,
        end_of_message: bool,
        /// `Some` when `end_of_message` is false: the id to pass back in the
        /// next `Request::FetchRows` to continue this result set.
        cursor_id: Option<u64>,
    },
    Empty,
    DbError { code: i32, message: String },
}

impl From<GatewayError> for Response {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::DbError { code, message } => Response::DbError { code, message },
            GatewayError::NotFound(msg) => Response::DbError { code: 0, message: msg },
            GatewayError::NotLeader { leader } => Response::DbError {
                code: 0,
                message: format!("not leader, current leader is {leader}"),
            },
            GatewayError::Busy(msg) => Response::DbError { code: 5, message: msg },
            GatewayError::Protocol(msg) => Response::DbError { code: 0, message: msg },
            GatewayError::Io(e) => Response::DbError {
                code: 0,
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Blob,
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Null,
}

impl ColumnValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::Integer(_) => ColumnType::Integer,
            ColumnValue::Float(_) => ColumnType::Float,
            ColumnValue::Text(_) => ColumnType::Text,
            ColumnValue::Blob(_) => ColumnType::Blob,
            ColumnValue::Null => ColumnType::Null,
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ColumnValue::Null,
            serde_json::Value::Bool(b) => ColumnValue::Integer(*b as i64),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ColumnValue::Integer(i)
                } else {
                    ColumnValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => ColumnValue::Text(s.clone()),
            other => ColumnValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ColumnValue::Integer(i) => serde_json::json!(i),
            ColumnValue::Float(f) => serde_json::json!(f),
            ColumnValue::Text(s) => serde_json::json!(s),
            ColumnValue::Blob(b) => serde_json::json!(b),
            ColumnValue::Null => serde_json::Value::Null,
        }
    }
}

/// Reject oversized SQL text, too many bound parameters, and pragmas that
/// would change journaling semantics out from under the replication layer.
pub fn validate_statement(sql: &str, params: &[ColumnValue]) -> Result<(), GatewayError> {
    if sql.len() > MAX_SQL_BYTES {
        return Err(GatewayError::Protocol(format!(
            "statement exceeds {MAX_SQL_BYTES} bytes"
        )));
    }
    if params.len() > MAX_PARAMS {
        return Err(GatewayError::Protocol(format!(
            "statement has {} params, exceeds limit of {MAX_PARAMS}",
            params.len()
        )));
    }
    let lowered = sql.to_ascii_lowercase();
    for forbidden in ["pragma journal_mode", "pragma foreign_keys"] {
        if lowered.contains(forbidden) {
            return Err(GatewayError::Protocol(format!(
                "statement may not alter {forbidden}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_only_flags_are_invalid() {
        let flags = OpenFlags {
            read: false,
            write: false,
            create: true,
        };
        assert!(!flags.is_valid());
    }

    #[test]
    fn readwrite_create_is_valid() {
        assert!(OpenFlags::READWRITE_CREATE.is_valid());
    }

    #[test]
    fn validate_statement_rejects_oversized_sql() {
        let sql = "a".repeat(MAX_SQL_BYTES + 1);
        assert!(validate_statement(&sql, &[]).is_err());
    }

    #[test]
    fn validate_statement_rejects_too_many_params() {
        let params = vec![ColumnValue::Null; MAX_PARAMS + 1];
        assert!(validate_statement("SELECT 1", &params).is_err());
    }

    #[test]
    fn validate_statement_rejects_journal_mode_pragma() {
        let err = validate_statement("PRAGMA journal_mode=DELETE;", &[]).unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[test]
    fn validate_statement_accepts_ordinary_sql() {
        assert!(validate_statement("SELECT * FROM foo WHERE n = ?", &[ColumnValue::Integer(1)]).is_ok());
    }

    #[test]
    fn column_value_from_json_number_picks_integer_when_exact() {
        let v = serde_json::json!(42);
        assert_eq!(ColumnValue::from_json(&v), ColumnValue::Integer(42));
    }
}
