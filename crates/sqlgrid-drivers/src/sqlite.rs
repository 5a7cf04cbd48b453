//! SQLite backend.
//!
//! rusqlite's calls are synchronous, so every operation moves onto the
//! blocking thread pool. Each handle keeps an [`InterruptHandle`]; when a
//! caller abandons an in-flight call (timeout, dropped request), the guard
//! interrupts the running statement so the blocking thread is released
//! promptly instead of finishing a doomed query.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection as SqliteConnection, InterruptHandle, OpenFlags};
use tokio::task;
use tracing::debug;

use sqlgrid_pool::{Driver, Dsn, Handle, PoolError, PoolResult, QueryResult, StatementResult};

/// Driver for `sqlite://` / `sqlite3://` / `file://` DSNs.
#[derive(Debug, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn open(&self, dsn: &Dsn) -> PoolResult<Box<dyn Handle>> {
        // `sqlite://relative.db` parses its target into the host position;
        // joining host and path covers every DSN form.
        let target = format!("{}{}", dsn.host(), dsn.database());
        if target.starts_with('~') {
            return Err(PoolError::Open(
                "home directory paths are not supported; use an absolute path".into(),
            ));
        }

        let conn = run_blocking(move || open_database(&target)).await?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Box::new(SqliteHandle {
            conn: Arc::new(Mutex::new(Some(conn))),
            interrupt,
        }))
    }
}

fn open_database(target: &str) -> PoolResult<SqliteConnection> {
    debug!(path = %target, "opening SQLite database");

    let conn = if target == ":memory:" {
        SqliteConnection::open_in_memory()
            .map_err(|e| PoolError::Open(format!("in-memory database: {e}")))?
    } else {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        SqliteConnection::open_with_flags(target, flags)
            .map_err(|e| PoolError::Open(format!("{target}: {e}")))?
    };

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| PoolError::Open(format!("enable foreign keys: {e}")))?;

    Ok(conn)
}

/// An open SQLite database. The connection is taken out of the option on
/// close; later calls observe `None` and fail with [`PoolError::Closed`].
struct SqliteHandle {
    conn: Arc<Mutex<Option<SqliteConnection>>>,
    interrupt: Arc<InterruptHandle>,
}

#[async_trait]
impl Handle for SqliteHandle {
    async fn ping(&self) -> PoolResult<()> {
        let conn = self.conn.clone();
        run_blocking(move || {
            let guard = lock(&conn);
            let conn = guard.as_ref().ok_or(PoolError::Closed)?;
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| PoolError::Unreachable(e.to_string()))
        })
        .await
    }

    async fn query(&self, sql: &str, args: &[serde_json::Value]) -> PoolResult<QueryResult> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let args = args.to_vec();

        let guard = InterruptOnDrop::arm(self.interrupt.clone());
        let result = run_blocking(move || run_query(&conn, &sql, &args)).await;
        guard.disarm();
        result
    }

    async fn exec(&self, sql: &str, args: &[serde_json::Value]) -> PoolResult<StatementResult> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let args = args.to_vec();

        let guard = InterruptOnDrop::arm(self.interrupt.clone());
        let result = run_blocking(move || run_exec(&conn, &sql, &args)).await;
        guard.disarm();
        result
    }

    async fn close(&self) -> PoolResult<()> {
        let conn = self.conn.clone();
        run_blocking(move || {
            let taken = lock(&conn).take();
            match taken {
                Some(conn) => conn
                    .close()
                    .map_err(|(_, e)| PoolError::Close(e.to_string())),
                None => Ok(()),
            }
        })
        .await
    }
}

fn run_query(
    conn: &Mutex<Option<SqliteConnection>>,
    sql: &str,
    args: &[serde_json::Value],
) -> PoolResult<QueryResult> {
    let guard = lock(conn);
    let conn = guard.as_ref().ok_or(PoolError::Closed)?;

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| PoolError::Query(e.to_string()))?;

    // Column metadata comes from the prepared statement so empty result
    // sets still carry their column layout. The declared type is whatever
    // the schema says; expression columns have none.
    let mut columns = Vec::with_capacity(stmt.column_count());
    let mut column_types = Vec::with_capacity(stmt.column_count());
    for col in stmt.columns() {
        columns.push(col.name().to_string());
        column_types.push(col.decl_type().unwrap_or("DYNAMIC").to_string());
    }

    let params: Vec<rusqlite::types::Value> = args.iter().map(json_to_sql).collect();
    let mut raw_rows = stmt
        .query(params_from_iter(params))
        .map_err(|e| PoolError::Query(e.to_string()))?;

    let mut rows = Vec::new();
    loop {
        match raw_rows.next() {
            Ok(Some(row)) => {
                let mut values = Vec::with_capacity(columns.len());
                for idx in 0..columns.len() {
                    let cell = row
                        .get_ref(idx)
                        .map_err(|e| PoolError::RowDecode(e.to_string()))?;
                    values.push(sql_to_json(cell));
                }
                rows.push(values);
            }
            Ok(None) => break,
            Err(e) => return Err(PoolError::RowIteration(e.to_string())),
        }
    }

    Ok(QueryResult {
        columns,
        column_types,
        rows,
    })
}

fn run_exec(
    conn: &Mutex<Option<SqliteConnection>>,
    sql: &str,
    args: &[serde_json::Value],
) -> PoolResult<StatementResult> {
    let guard = lock(conn);
    let conn = guard.as_ref().ok_or(PoolError::Closed)?;

    let params: Vec<rusqlite::types::Value> = args.iter().map(json_to_sql).collect();
    let rows_affected = conn
        .execute(sql, params_from_iter(params))
        .map_err(|e| PoolError::Statement(e.to_string()))?;

    Ok(StatementResult {
        rows_affected: rows_affected as i64,
        last_insert_id: conn.last_insert_rowid(),
    })
}

/// Bind a JSON argument as a SQLite value. Arrays and objects travel as
/// their JSON text.
fn json_to_sql(value: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as SqlValue;
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a result cell to its JSON transport form. Blobs are converted
/// to text; everything else passes through in its native shape.
fn sql_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

async fn run_blocking<T, F>(op: F) -> PoolResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> PoolResult<T> + Send + 'static,
{
    match task::spawn_blocking(op).await {
        Ok(result) => result,
        Err(join_err) => Err(PoolError::Query(format!("blocking task failed: {join_err}"))),
    }
}

fn lock(conn: &Mutex<Option<SqliteConnection>>) -> MutexGuard<'_, Option<SqliteConnection>> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Interrupts the running statement if dropped while armed, releasing the
/// blocking thread when the async caller has gone away.
struct InterruptOnDrop {
    interrupt: Arc<InterruptHandle>,
    armed: bool,
}

impl InterruptOnDrop {
    fn arm(interrupt: Arc<InterruptHandle>) -> Self {
        Self {
            interrupt,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            debug!("interrupting abandoned SQLite call");
            self.interrupt.interrupt();
        }
    }
}
