//! SQLite executor using `rusqlite`.
//!
//! [`SqliteExecutor`] runs commands compiled for the SQLite dialect. The
//! connection sits behind a `tokio` mutex and every statement runs in
//! `spawn_blocking`. Named parameters are bound by placeholder text,
//! positional ones by occurrence.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tessera_core::{TesseraError, TesseraResult};
use tessera_db::{EmittedCommand, ParameterStyle, Row, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::base::{placeholder_text, CommandExecutor};

/// The identity select the SQLite dialect appends to inserts.
const IDENTITY_SUFFIX: &str = "; SELECT last_insert_rowid()";

fn db_error(e: rusqlite::Error) -> TesseraError {
    TesseraError::DatabaseError(e.to_string())
}

fn check_style(command: &EmittedCommand) -> TesseraResult<()> {
    match command.style {
        ParameterStyle::Named('?') => Err(TesseraError::ConfigurationError(
            "SQLite cannot bind ?name placeholders; compile with the Sqlite dialect".to_string(),
        )),
        _ => Ok(()),
    }
}

/// A SQLite database.
pub struct SqliteExecutor {
    path: PathBuf,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteExecutor {
    /// Opens a database file, or an in-memory database for `:memory:`.
    ///
    /// File databases are switched to WAL journaling.
    pub fn open(path: impl Into<PathBuf>) -> TesseraResult<Self> {
        let path = path.into();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| TesseraError::DatabaseError(format!("SQLite open failed: {e}")))?;

        let pragmas = if in_memory {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| TesseraError::DatabaseError(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database.
    pub fn memory() -> TesseraResult<Self> {
        Self::open(":memory:")
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs a batch of statements without parameters, e.g. schema setup.
    pub async fn execute_batch(&self, sql: &str) -> TesseraResult<()> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || conn.blocking_lock().execute_batch(&sql).map_err(db_error))
            .await
            .map_err(|e| TesseraError::DatabaseError(format!("task join error: {e}")))?
    }

    fn bind_params(
        stmt: &mut rusqlite::Statement<'_>,
        command: &EmittedCommand,
    ) -> TesseraResult<()> {
        for (i, (name, value)) in command.parameters.iter().enumerate() {
            let idx = match placeholder_text(command.style, name) {
                Some(text) => stmt.parameter_index(&text).map_err(db_error)?.ok_or_else(|| {
                    TesseraError::DatabaseError(format!(
                        "statement has no parameter named {text}"
                    ))
                })?,
                None => i + 1,
            };
            Self::bind_value(stmt, idx, value)?;
        }
        Ok(())
    }

    fn bind_value(stmt: &mut rusqlite::Statement<'_>, idx: usize, value: &Value) -> TesseraResult<()> {
        match value {
            Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
            Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
            Value::Int(v) => stmt.raw_bind_parameter(idx, v),
            Value::Float(v) => stmt.raw_bind_parameter(idx, v),
            Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
            Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
            Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string()),
            Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string()),
            Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339()),
            Value::Time(t) => stmt.raw_bind_parameter(idx, t.to_string()),
            Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string()),
            Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
            Value::List(_) => {
                return Err(TesseraError::DatabaseError(format!(
                    "parameter {idx} is a list; lists only appear inside IN (...)"
                )))
            }
        }
        .map_err(|e| TesseraError::DatabaseError(format!("bind error: {e}")))
    }

    fn convert_row(sqlite_row: &rusqlite::Row<'_>, columns: &[String]) -> TesseraResult<Row> {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let value = match sqlite_row.get_ref(i).map_err(db_error)? {
                rusqlite::types::ValueRef::Null => Value::Null,
                rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                rusqlite::types::ValueRef::Text(b) => {
                    Value::String(String::from_utf8_lossy(b).into_owned())
                }
                rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
            };
            values.push(value);
        }
        Row::new(columns.to_vec(), values)
    }

    fn apply_timeout(conn: &rusqlite::Connection, command: &EmittedCommand) -> TesseraResult<()> {
        if let Some(seconds) = command.timeout_seconds {
            conn.busy_timeout(Duration::from_secs(u64::from(seconds)))
                .map_err(db_error)?;
        }
        Ok(())
    }

    fn run_query(conn: &rusqlite::Connection, command: &EmittedCommand) -> TesseraResult<Vec<Row>> {
        Self::apply_timeout(conn, command)?;

        // An insert with an identity fetch is two statements; run the insert
        // and read the rowid from the same connection.
        if let Some(insert) = command.sql.strip_suffix(IDENTITY_SUFFIX) {
            let mut stmt = conn.prepare(insert).map_err(db_error)?;
            Self::bind_params(&mut stmt, command)?;
            stmt.raw_execute().map_err(db_error)?;
            let id = conn.last_insert_rowid();
            return Ok(vec![Row::new(
                vec!["last_insert_rowid()".to_string()],
                vec![Value::Int(id)],
            )?]);
        }

        let mut stmt = conn.prepare(&command.sql).map_err(db_error)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        Self::bind_params(&mut stmt, command)?;

        let mut raw_rows = stmt.raw_query();
        let mut rows = Vec::new();
        while let Some(row) = raw_rows.next().map_err(db_error)? {
            rows.push(Self::convert_row(row, &columns)?);
        }
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl CommandExecutor for SqliteExecutor {
    fn vendor(&self) -> &str {
        "sqlite"
    }

    fn provider(&self) -> &str {
        "Sqlite"
    }

    async fn execute(&self, command: &EmittedCommand) -> TesseraResult<u64> {
        check_style(command)?;
        let conn = Arc::clone(&self.conn);
        let command = command.clone();
        debug!(parameters = command.parameters.len(), "sqlite execute");

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::apply_timeout(&conn, &command)?;
            let sql = command.sql.strip_suffix(IDENTITY_SUFFIX).unwrap_or(&command.sql);
            let mut stmt = conn.prepare(sql).map_err(db_error)?;
            Self::bind_params(&mut stmt, &command)?;
            let count = stmt.raw_execute().map_err(db_error)?;
            Ok(count as u64)
        })
        .await
        .map_err(|e| TesseraError::DatabaseError(format!("task join error: {e}")))?
    }

    async fn query(&self, command: &EmittedCommand) -> TesseraResult<Vec<Row>> {
        check_style(command)?;
        let conn = Arc::clone(&self.conn);
        let command = command.clone();
        debug!(parameters = command.parameters.len(), "sqlite query");

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::run_query(&conn, &command)
        })
        .await
        .map_err(|e| TesseraError::DatabaseError(format!("task join error: {e}")))?
    }
}
