//! SQLite connection and statement implementation.
//!
//! Statements share ownership of the database handle, so a statement kept by
//! a reuse or batch executor stays valid until it is closed or dropped, even
//! after the connection object itself is gone.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::types;
mod ffi {
    pub use libsqlite3_sys::*;

    // The prebuilt bundled bindings omit `sqlite3_close_v2`, but the bundled
    // amalgamation exports it.
    unsafe extern "C" {
        pub fn sqlite3_close_v2(db: *mut sqlite3) -> std::ffi::c_int;
    }
}
use sqlmapper_core::error::{BatchUpdateError, ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use sqlmapper_core::{ColumnInfo, Connection, Error, Result, Row, Statement, StatementOptions, Value};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Run every statement in its own implicit transaction instead of
    /// opening one lazily on first use.
    pub auto_commit: bool,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode (connections not shared between threads).
    pub no_mutex: bool,
    /// Open in serialized mode (connections can be shared).
    pub full_mutex: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            full_mutex: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            full_mutex: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            full_mutex: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        if self.private_cache {
            flags |= ffi::SQLITE_OPEN_PRIVATECACHE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            auto_commit: false,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// The raw database handle, closed when the last owner lets go.
struct DbHandle {
    db: *mut ffi::sqlite3,
    auto_commit: bool,
    /// Set when the owning connection is closed; statements refuse to run.
    closed: AtomicBool,
}

// SAFETY: connections are opened in serialized mode (SQLITE_OPEN_FULLMUTEX)
// by default, in which SQLite synchronizes every call on the handle itself.
unsafe impl Send for DbHandle {}
unsafe impl Sync for DbHandle {}

impl DbHandle {
    /// The most recent error code and message on this handle.
    fn error_parts(&self) -> (c_int, String) {
        // SAFETY: db is valid for the lifetime of the handle
        unsafe {
            let msg = CStr::from_ptr(ffi::sqlite3_errmsg(self.db))
                .to_string_lossy()
                .into_owned();
            (ffi::sqlite3_errcode(self.db), msg)
        }
    }

    fn last_error(&self, sql: Option<&str>) -> Error {
        let (code, message) = self.error_parts();
        query_error(error_code_to_kind(code), sql, message)
    }

    fn exec(&self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql)
            .map_err(|_| query_error(QueryErrorKind::Syntax, Some(sql), "SQL contains null byte".to_string()))?;
        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe { ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

        if rc != ffi::SQLITE_OK {
            let message = if errmsg.is_null() {
                error_string(rc)
            } else {
                // SAFETY: errmsg was allocated by SQLite and is freed exactly once
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(query_error(error_code_to_kind(rc), Some(sql), message));
        }
        Ok(())
    }

    /// Is an explicit transaction open?
    fn in_transaction(&self) -> bool {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_get_autocommit(self.db) == 0 }
    }

    /// Open a transaction unless one is already open or the connection runs
    /// in autocommit mode. Called before every execution, so statements kept
    /// across a commit join the next unit of work.
    fn begin_if_needed(&self) -> Result<()> {
        if !self.auto_commit && !self.in_transaction() {
            self.exec("BEGIN DEFERRED")?;
            tracing::trace!("BEGIN");
        }
        Ok(())
    }

    fn changes(&self) -> u64 {
        // SAFETY: db is valid
        u64::try_from(unsafe { ffi::sqlite3_changes(self.db) }).unwrap_or(0)
    }

    fn last_insert_rowid(&self) -> i64 {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }
}

impl Drop for DbHandle {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid and no statement outlives the handle
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A connection to a SQLite database.
///
/// Unless `auto_commit` is set, the first statement executed after a commit
/// or rollback issues `BEGIN`, so each unit of work runs in one transaction.
pub struct SqliteConnection {
    handle: Arc<DbHandle>,
    path: String,
    closed: bool,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = CStr::from_ptr(ffi::sqlite3_errmsg(db)).to_string_lossy().into_owned();
                    ffi::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX));
            }
        }

        tracing::debug!(path = %config.path, auto_commit = config.auto_commit, "opened sqlite connection");
        Ok(Self {
            handle: Arc::new(DbHandle {
                db,
                auto_commit: config.auto_commit,
                closed: AtomicBool::new(false),
            }),
            path: config.path.clone(),
            closed: false,
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Is a transaction open on this connection?
    pub fn in_transaction(&self) -> bool {
        self.handle.in_transaction()
    }

    /// Execute SQL directly without preparing (for DDL, etc.)
    ///
    /// Runs outside the lazy transaction bookkeeping; use it before the
    /// first mapped statement or between units of work.
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        self.handle.exec(sql)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        self.handle.last_insert_rowid()
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> u64 {
        self.handle.changes()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                message: format!("Connection to {} is closed", self.path),
                source: None,
            }));
        }
        Ok(())
    }

    fn end_transaction(&mut self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        if !self.handle.in_transaction() {
            return Ok(());
        }
        let result = self.handle.exec(sql);
        tracing::debug!(path = %self.path, ok = result.is_ok(), "{}", sql);
        result
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("auto_commit", &self.handle.auto_commit)
            .field("in_transaction", &self.handle.in_transaction())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Connection for SqliteConnection {
    type Statement = SqliteStatement;

    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> Result<SqliteStatement> {
        self.ensure_open()?;
        let stmt = prepare_stmt(&self.handle, sql)?;
        tracing::trace!(sql, "prepared statement");
        Ok(SqliteStatement {
            handle: Arc::clone(&self.handle),
            stmt,
            sql: sql.to_string(),
            params: Vec::new(),
            queued: Vec::new(),
            columns: None,
            exhausted: true,
            return_keys: options.return_generated_keys,
            keys: Vec::new(),
        })
    }

    fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK")
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = if self.handle.in_transaction() {
            self.handle.exec("ROLLBACK")
        } else {
            Ok(())
        };
        self.closed = true;
        self.handle.closed.store(true, Ordering::Release);
        tracing::debug!(path = %self.path, "closed sqlite connection");
        result
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ============================================================================
// Statement
// ============================================================================

/// A prepared statement that owns a share of the database handle.
pub struct SqliteStatement {
    handle: Arc<DbHandle>,
    stmt: *mut ffi::sqlite3_stmt,
    sql: String,
    params: Vec<Value>,
    queued: Vec<Vec<Value>>,
    columns: Option<Arc<ColumnInfo>>,
    /// No query is in progress; `next_row` must not step again, since
    /// stepping a finished statement would silently re-run it.
    exhausted: bool,
    return_keys: bool,
    keys: Vec<Value>,
}

// SAFETY: the statement is only used through `&mut self` and its handle is
// shared with a connection opened in serialized mode.
unsafe impl Send for SqliteStatement {}

impl SqliteStatement {
    fn ensure_open(&self) -> Result<()> {
        if self.stmt.is_null() {
            return Err(query_error(
                QueryErrorKind::Database,
                Some(&self.sql),
                "Statement is closed".to_string(),
            ));
        }
        if self.handle.closed.load(Ordering::Acquire) {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                message: "Statement used after its connection was closed".to_string(),
                source: None,
            }));
        }
        Ok(())
    }

    /// Reset the statement and bind `params`.
    fn rebind(&mut self, params: &[Value]) -> Result<()> {
        self.ensure_open()?;
        // SAFETY: stmt is valid
        let expected = unsafe {
            ffi::sqlite3_reset(self.stmt);
            ffi::sqlite3_clear_bindings(self.stmt);
            ffi::sqlite3_bind_parameter_count(self.stmt)
        };
        self.exhausted = true;
        if usize::try_from(expected).unwrap_or(0) != params.len() {
            return Err(query_error(
                QueryErrorKind::Bind,
                Some(&self.sql),
                format!("Statement expects {} parameters but {} were bound", expected, params.len()),
            ));
        }
        for (i, param) in params.iter().enumerate() {
            let index = c_int::try_from(i + 1).unwrap_or(c_int::MAX);
            // SAFETY: stmt is valid, index is 1-based and within the count
            let rc = unsafe { types::bind_value(self.stmt, index, param) };
            if rc != ffi::SQLITE_OK {
                let (_, message) = self.handle.error_parts();
                return Err(query_error(
                    QueryErrorKind::Bind,
                    Some(&self.sql),
                    format!("Failed to bind parameter {}: {}", i + 1, message),
                ));
            }
        }
        Ok(())
    }

    /// Step a write to completion and return the affected row count.
    fn step_update(&mut self) -> Result<u64> {
        // SAFETY: stmt is valid and freshly bound
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        let outcome = match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => Ok(self.handle.changes()),
            _ => Err(self.handle.last_error(Some(&self.sql))),
        };
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_reset(self.stmt) };
        outcome
    }

    fn generated_key(&self, changed: u64) -> Option<Value> {
        (self.return_keys && changed > 0).then(|| Value::BigInt(self.handle.last_insert_rowid()))
    }
}

impl std::fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .field("closed", &self.stmt.is_null())
            .field("queued", &self.queued.len())
            .finish_non_exhaustive()
    }
}

impl Statement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&mut self, params: &[Value]) -> Result<()> {
        self.ensure_open()?;
        self.params = params.to_vec();
        Ok(())
    }

    fn execute_update(&mut self) -> Result<u64> {
        self.ensure_open()?;
        self.handle.begin_if_needed()?;
        let params = std::mem::take(&mut self.params);
        let bound = self.rebind(&params);
        self.params = params;
        bound?;
        let changed = self.step_update()?;
        self.keys = self.generated_key(changed).into_iter().collect();
        Ok(changed)
    }

    fn execute_query(&mut self) -> Result<Arc<ColumnInfo>> {
        self.ensure_open()?;
        self.handle.begin_if_needed()?;
        let params = std::mem::take(&mut self.params);
        let bound = self.rebind(&params);
        self.params = params;
        bound?;

        if self.columns.is_none() {
            // SAFETY: stmt is valid
            let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
            let mut names = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
            let mut jdbc_types = Vec::with_capacity(names.capacity());
            for i in 0..count {
                // SAFETY: stmt is valid, i is within the column count
                let name = unsafe { types::column_name(self.stmt, i) }.unwrap_or_else(|| format!("col{}", i));
                names.push(name);
                // SAFETY: as above
                jdbc_types.push(unsafe { types::declared_type(self.stmt, i) });
            }
            self.columns = Some(Arc::new(ColumnInfo::with_types(names, jdbc_types)));
        }
        self.exhausted = false;
        self.columns
            .clone()
            .ok_or_else(|| query_error(QueryErrorKind::Database, Some(&self.sql), "No column metadata".to_string()))
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.exhausted {
            return Ok(None);
        }
        self.ensure_open()?;
        let Some(columns) = self.columns.clone() else {
            return Ok(None);
        };
        // SAFETY: stmt is valid and a query is in progress
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    let index = c_int::try_from(i).unwrap_or(c_int::MAX);
                    // SAFETY: stmt is valid, we just got SQLITE_ROW
                    values.push(unsafe { types::read_column(self.stmt, index, columns.jdbc_type_at(i)) });
                }
                Ok(Some(Row::with_columns(columns, values)))
            }
            ffi::SQLITE_DONE => {
                self.exhausted = true;
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_reset(self.stmt) };
                Ok(None)
            }
            _ => {
                self.exhausted = true;
                let err = self.handle.last_error(Some(&self.sql));
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_reset(self.stmt) };
                Err(err)
            }
        }
    }

    fn add_batch(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.queued.push(self.params.clone());
        Ok(())
    }

    /// SQLite has no batch protocol; each queued item is stepped in turn
    /// and the first failure aborts the rest.
    fn execute_batch(&mut self) -> std::result::Result<Vec<u64>, BatchUpdateError> {
        self.ensure_open()?;
        let queued = std::mem::take(&mut self.queued);
        if !queued.is_empty() {
            self.handle.begin_if_needed()?;
        }
        let mut counts = Vec::with_capacity(queued.len());
        let mut keys = Vec::new();
        for params in &queued {
            match self.rebind(params).and_then(|()| self.step_update()) {
                Ok(changed) => {
                    counts.push(changed);
                    keys.extend(self.generated_key(changed));
                }
                Err(source) => {
                    tracing::trace!(sql = %self.sql, item = counts.len(), "batch item failed");
                    self.keys = keys;
                    return Err(BatchUpdateError::new(counts, source));
                }
            }
        }
        self.keys = keys;
        tracing::trace!(sql = %self.sql, items = counts.len(), "stepped batch");
        Ok(counts)
    }

    fn generated_keys(&self) -> Vec<Value> {
        self.keys.clone()
    }

    fn close(&mut self) -> Result<()> {
        if self.stmt.is_null() {
            return Ok(());
        }
        // SAFETY: stmt is valid and finalized exactly once
        unsafe { ffi::sqlite3_finalize(self.stmt) };
        self.stmt = ptr::null_mut();
        self.queued.clear();
        Ok(())
    }
}

impl Drop for SqliteStatement {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn prepare_stmt(handle: &DbHandle, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql)
        .map_err(|_| query_error(QueryErrorKind::Syntax, Some(sql), "SQL contains null byte".to_string()))?;
    let len = c_int::try_from(c_sql.as_bytes().len())
        .map_err(|_| query_error(QueryErrorKind::Syntax, Some(sql), "SQL is too long".to_string()))?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_prepare_v2(handle.db, c_sql.as_ptr(), len, &mut stmt, ptr::null_mut()) };

    if rc != ffi::SQLITE_OK {
        return Err(handle.last_error(Some(sql)));
    }
    if stmt.is_null() {
        return Err(query_error(QueryErrorKind::Syntax, Some(sql), "SQL contains no statement".to_string()));
    }
    Ok(stmt)
}

fn query_error(kind: QueryErrorKind, sql: Option<&str>, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        sql: sql.map(str::to_string),
        statement_id: None,
        message,
        source: None,
    })
}

fn error_string(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe { CStr::from_ptr(ffi::sqlite3_errstr(code)).to_string_lossy().into_owned() }
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        ffi::SQLITE_RANGE | ffi::SQLITE_MISMATCH => QueryErrorKind::Bind,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmapper_core::JdbcType;

    fn memory() -> SqliteConnection {
        let conn = SqliteConnection::open(&SqliteConfig::memory().auto_commit(true)).unwrap();
        conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, data JSON)")
            .unwrap();
        conn
    }

    fn options() -> StatementOptions {
        StatementOptions::new().return_generated_keys(true)
    }

    #[test]
    fn flags_default_to_read_write_create() {
        let flags = OpenFlags::default().to_sqlite_flags();
        assert_ne!(flags & ffi::SQLITE_OPEN_READWRITE, 0);
        assert_ne!(flags & ffi::SQLITE_OPEN_CREATE, 0);
        let ro = OpenFlags::read_only().to_sqlite_flags();
        assert_eq!(ro & ffi::SQLITE_OPEN_READWRITE, 0);
    }

    #[test]
    fn insert_reports_count_and_key() {
        let mut conn = memory();
        let mut stmt = conn.prepare("INSERT INTO users (name) VALUES (?)", &options()).unwrap();
        stmt.bind(&[Value::Text("ada".into())]).unwrap();
        assert_eq!(stmt.execute_update().unwrap(), 1);
        assert_eq!(stmt.generated_keys(), vec![Value::BigInt(1)]);
        stmt.bind(&[Value::Text("grace".into())]).unwrap();
        stmt.execute_update().unwrap();
        assert_eq!(stmt.generated_keys(), vec![Value::BigInt(2)]);
        assert_eq!(conn.last_insert_rowid(), 2);
    }

    #[test]
    fn keys_are_only_kept_when_asked() {
        let mut conn = memory();
        let mut stmt = conn
            .prepare("INSERT INTO users (name) VALUES (?)", &StatementOptions::new())
            .unwrap();
        stmt.bind(&[Value::Text("ada".into())]).unwrap();
        stmt.execute_update().unwrap();
        assert!(stmt.generated_keys().is_empty());
    }

    #[test]
    fn query_streams_rows_with_declared_types() {
        let mut conn = memory();
        conn.execute_raw(r#"INSERT INTO users (name, score, data) VALUES ('ada', 1.5, '{"a":1}'), ('bob', NULL, NULL)"#)
            .unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, score, data, 1 + 1 AS two FROM users ORDER BY id", &options())
            .unwrap();
        stmt.bind(&[]).unwrap();
        let columns = stmt.execute_query().unwrap();
        assert_eq!(columns.jdbc_type_at(0), JdbcType::BigInt);
        assert_eq!(columns.jdbc_type_at(1), JdbcType::Varchar);
        assert_eq!(columns.jdbc_type_at(4), JdbcType::Undefined);

        let first = stmt.next_row().unwrap().unwrap();
        assert_eq!(first.get_by_name("name"), Some(&Value::Text("ada".into())));
        assert_eq!(first.get_by_name("score"), Some(&Value::Double(1.5)));
        assert_eq!(first.get_by_name("data"), Some(&Value::Json(serde_json::json!({"a": 1}))));
        assert_eq!(first.get_by_name("two"), Some(&Value::BigInt(2)));
        let second = stmt.next_row().unwrap().unwrap();
        assert_eq!(second.get_by_name("score"), Some(&Value::Null));
        assert!(stmt.next_row().unwrap().is_none());
        assert!(stmt.next_row().unwrap().is_none());
    }

    #[test]
    fn statement_can_be_reexecuted() {
        let mut conn = memory();
        conn.execute_raw("INSERT INTO users (name) VALUES ('ada'), ('bob')").unwrap();
        let mut stmt = conn.prepare("SELECT name FROM users WHERE id = ?", &options()).unwrap();
        for (id, name) in [(1, "ada"), (2, "bob")] {
            stmt.bind(&[Value::BigInt(id)]).unwrap();
            stmt.execute_query().unwrap();
            let row = stmt.next_row().unwrap().unwrap();
            assert_eq!(row.get(0), Some(&Value::Text(name.into())));
        }
    }

    #[test]
    fn parameter_count_mismatch_is_a_bind_error() {
        let mut conn = memory();
        let mut stmt = conn.prepare("SELECT * FROM users WHERE id = ?", &options()).unwrap();
        stmt.bind(&[]).unwrap();
        match stmt.execute_query() {
            Err(Error::Query(err)) => assert_eq!(err.kind, QueryErrorKind::Bind),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn batch_steps_every_item() {
        let mut conn = memory();
        let mut stmt = conn.prepare("INSERT INTO users (name) VALUES (?)", &options()).unwrap();
        for name in ["a", "b", "c"] {
            stmt.bind(&[Value::Text(name.into())]).unwrap();
            stmt.add_batch().unwrap();
        }
        assert_eq!(stmt.execute_batch().unwrap(), vec![1, 1, 1]);
        assert_eq!(
            stmt.generated_keys(),
            vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]
        );
        assert!(stmt.execute_batch().unwrap().is_empty());
    }

    #[test]
    fn failed_batch_item_keeps_earlier_counts() {
        let mut conn = memory();
        let mut stmt = conn.prepare("INSERT INTO users (name) VALUES (?)", &options()).unwrap();
        for name in [Value::Text("a".into()), Value::Null, Value::Text("c".into())] {
            stmt.bind(&[name]).unwrap();
            stmt.add_batch().unwrap();
        }
        let err = stmt.execute_batch().unwrap_err();
        assert_eq!(err.update_counts, vec![1]);
        assert_eq!(err.failed_item(), 1);
        assert!(matches!(&err.source, Error::Query(q) if q.kind == QueryErrorKind::Constraint));
        assert_eq!(stmt.generated_keys(), vec![Value::BigInt(1)]);

        let mut count = conn.prepare("SELECT COUNT(*) FROM users", &options()).unwrap();
        count.execute_query().unwrap();
        let row = count.next_row().unwrap().unwrap();
        assert_eq!(row.get(0), Some(&Value::BigInt(1)));
    }

    #[test]
    fn constraint_violation_is_classified() {
        let mut conn = memory();
        let mut stmt = conn.prepare("INSERT INTO users (name) VALUES (?)", &options()).unwrap();
        stmt.bind(&[Value::Null]).unwrap();
        match stmt.execute_update() {
            Err(Error::Query(err)) => {
                assert_eq!(err.kind, QueryErrorKind::Constraint);
                assert_eq!(err.sql.as_deref(), Some("INSERT INTO users (name) VALUES (?)"));
            }
            other => panic!("expected constraint error, got {:?}", other),
        }
    }

    #[test]
    fn syntax_errors_surface_at_prepare() {
        let mut conn = memory();
        match conn.prepare("SELEKT 1", &options()) {
            Err(Error::Query(err)) => assert_eq!(err.kind, QueryErrorKind::Syntax),
            other => panic!("expected syntax error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn closed_statement_rejects_use() {
        let mut conn = memory();
        let mut stmt = conn.prepare("SELECT 1", &options()).unwrap();
        stmt.close().unwrap();
        stmt.close().unwrap();
        assert!(stmt.bind(&[]).is_err());
        assert!(stmt.execute_query().is_err());
    }

    #[test]
    fn lazy_transaction_commits_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.db").to_string_lossy().into_owned();
        let setup = SqliteConnection::open(&SqliteConfig::file(&path).auto_commit(true)).unwrap();
        setup.execute_raw("CREATE TABLE t (v INTEGER)").unwrap();

        let mut conn = SqliteConnection::open(&SqliteConfig::file(&path)).unwrap();
        assert!(!conn.in_transaction());
        let mut stmt = conn.prepare("INSERT INTO t (v) VALUES (?)", &options()).unwrap();
        assert!(!conn.in_transaction());
        stmt.bind(&[Value::BigInt(1)]).unwrap();
        stmt.execute_update().unwrap();
        assert!(conn.in_transaction());
        drop(stmt);
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());

        let mut stmt = conn.prepare("INSERT INTO t (v) VALUES (?)", &options()).unwrap();
        stmt.bind(&[Value::BigInt(2)]).unwrap();
        stmt.execute_update().unwrap();
        drop(stmt);
        conn.commit().unwrap();

        let mut check = SqliteConnection::open(&SqliteConfig::file(&path).auto_commit(true)).unwrap();
        let mut stmt = check.prepare("SELECT v FROM t", &options()).unwrap();
        stmt.bind(&[]).unwrap();
        stmt.execute_query().unwrap();
        assert_eq!(stmt.next_row().unwrap().unwrap().get(0), Some(&Value::BigInt(2)));
        assert!(stmt.next_row().unwrap().is_none());
    }

    #[test]
    fn closed_connection_rejects_prepare() {
        let mut conn = memory();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.prepare("SELECT 1", &options()),
            Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                ..
            }))
        ));
        assert!(conn.close().is_ok());
    }

    #[test]
    fn closing_the_connection_invalidates_statements() {
        let mut conn = memory();
        let mut stmt = conn.prepare("SELECT 42", &options()).unwrap();
        stmt.bind(&[]).unwrap();
        stmt.execute_query().unwrap();
        assert_eq!(stmt.next_row().unwrap().unwrap().get(0), Some(&Value::BigInt(42)));

        drop(conn);
        assert!(matches!(stmt.execute_query(), Err(Error::Connection(_))));
        assert!(stmt.close().is_ok());
    }

    #[test]
    fn kept_statements_begin_the_next_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reuse.db").to_string_lossy().into_owned();
        let mut conn = SqliteConnection::open(&SqliteConfig::file(&path)).unwrap();
        conn.execute_raw("CREATE TABLE t (v INTEGER)").unwrap();
        let mut stmt = conn.prepare("INSERT INTO t (v) VALUES (?)", &options()).unwrap();

        stmt.bind(&[Value::BigInt(1)]).unwrap();
        stmt.execute_update().unwrap();
        conn.commit().unwrap();
        stmt.bind(&[Value::BigInt(2)]).unwrap();
        stmt.execute_update().unwrap();
        assert!(conn.in_transaction());
        conn.rollback().unwrap();

        let mut count = conn.prepare("SELECT COUNT(*) FROM t", &options()).unwrap();
        count.bind(&[]).unwrap();
        count.execute_query().unwrap();
        assert_eq!(count.next_row().unwrap().unwrap().get(0), Some(&Value::BigInt(1)));
    }
}
