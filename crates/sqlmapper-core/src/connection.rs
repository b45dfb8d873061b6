//! Synchronous driver contract.
//!
//! The mapping engine talks to a database only through these two traits.
//! Statements are owned values: a connection hands one out from `prepare`
//! and the executor decides how long to keep it (one call, one session, or
//! one batch). Dropping a statement must release its driver resources.

use crate::error::{BatchUpdateError, Result};
use crate::row::{ColumnInfo, Row};
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;

/// Options passed to the driver when preparing a statement.
///
/// Timeouts and fetch sizes are advisory; drivers may ignore them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementOptions {
    pub timeout: Option<Duration>,
    pub fetch_size: Option<u32>,
    /// Ask the driver to keep generated keys after each update.
    pub return_generated_keys: bool,
}

impl StatementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn fetch_size(mut self, size: u32) -> Self {
        self.fetch_size = Some(size);
        self
    }

    pub fn return_generated_keys(mut self, enabled: bool) -> Self {
        self.return_generated_keys = enabled;
        self
    }
}

/// A prepared statement owned by the caller.
pub trait Statement {
    /// The SQL this statement was prepared from.
    fn sql(&self) -> &str;

    /// Bind positional parameters, replacing any previous binding.
    fn bind(&mut self, params: &[Value]) -> Result<()>;

    /// Execute a write and return the number of affected rows.
    fn execute_update(&mut self) -> Result<u64>;

    /// Start a query. Rows are then pulled with `next_row`.
    fn execute_query(&mut self) -> Result<Arc<ColumnInfo>>;

    /// Fetch the next row of the current query, or `None` when exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Queue the currently bound parameters as one batch item.
    fn add_batch(&mut self) -> Result<()>;

    /// Execute every queued item in order, returning per-item update counts.
    ///
    /// Execution stops at the first failing item; the error carries the
    /// counts of the items applied before it.
    fn execute_batch(&mut self) -> std::result::Result<Vec<u64>, BatchUpdateError>;

    /// Keys generated by the most recent `execute_update` or `execute_batch`.
    fn generated_keys(&self) -> Vec<Value>;

    /// Release driver resources. Further use is an error.
    fn close(&mut self) -> Result<()>;
}

/// A database connection scoped to one transaction at a time.
pub trait Connection {
    type Statement: Statement;

    /// Prepare a statement.
    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> Result<Self::Statement>;

    /// Commit the current transaction, if any.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction, if any.
    fn rollback(&mut self) -> Result<()>;

    /// Close the connection.
    fn close(&mut self) -> Result<()>;

    /// Has `close` been called?
    fn is_closed(&self) -> bool;
}
