//! The executor contract shared by the statement strategies and the
//! second-level cache decorator.

use crate::config::Configuration;
use crate::cursor::Cursor;
use crate::mapping::{MappedStatement, RowBounds};
use crate::result::ResultHandler;
use sqlmapper_cache::{CacheKey, CachedResult};
use sqlmapper_core::error::ExecutorErrorKind;
use sqlmapper_core::{BatchResult, Error, Object, Result, Statement, Value};
use sqlmapper_dynamic::BoundSql;
use std::sync::Arc;

/// Outcome of an insert, update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    /// Rows affected, as reported by the driver.
    Affected(u64),
    /// Queued in a batch; counts arrive with `flush_statements`.
    Deferred,
}

impl RowCount {
    /// The affected row count, if the statement already ran.
    pub fn affected(self) -> Option<u64> {
        match self {
            RowCount::Affected(n) => Some(n),
            RowCount::Deferred => None,
        }
    }
}

/// Runs mapped statements against one connection.
///
/// An executor is single-threaded and scoped to one transaction at a time.
/// Every operation fails with an executor error once `close` has run.
pub trait Executor {
    type Stmt: Statement;

    fn configuration(&self) -> &Arc<Configuration>;

    /// Run an insert, update or delete. Generated keys are written back into
    /// `parameter`.
    fn update(&mut self, statement: &MappedStatement, parameter: &mut Object) -> Result<RowCount>;

    /// Run a select, answering from the caches when possible.
    fn query(&mut self, statement: &MappedStatement, parameter: &Object, bounds: RowBounds) -> Result<CachedResult> {
        self.ensure_open()?;
        let database_id = self.configuration().settings().database_id.clone();
        let bound = statement.bound_sql(parameter, database_id.as_deref())?;
        let key = self.create_cache_key(statement, bounds, &bound)?;
        self.query_with_key(statement, bounds, &key, &bound)
    }

    /// Run a select whose SQL and cache key are already built.
    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        bounds: RowBounds,
        key: &CacheKey,
        bound: &BoundSql,
    ) -> Result<CachedResult>;

    /// Stream mapped rows into `handler`. Nothing is cached.
    fn query_with_handler(
        &mut self,
        statement: &MappedStatement,
        parameter: &Object,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<()>;

    /// Open a lazy cursor over a select. Caches are bypassed.
    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: &Object,
        bounds: RowBounds,
    ) -> Result<Cursor<Self::Stmt>>;

    /// Execute queued batches, or discard them when `is_rollback`.
    fn flush_statements(&mut self, is_rollback: bool) -> Result<Vec<BatchResult>>;

    fn commit(&mut self, required: bool) -> Result<()>;

    fn rollback(&mut self, required: bool) -> Result<()>;

    /// The key a query with this SQL and these bounds is cached under.
    fn create_cache_key(&self, statement: &MappedStatement, bounds: RowBounds, bound: &BoundSql) -> Result<CacheKey>;

    /// Does the local cache hold (or is it loading) this key?
    fn is_cached(&self, key: &CacheKey) -> bool;

    fn clear_local_cache(&mut self);

    /// Roll back when `force_rollback`, release statements and the
    /// connection.
    fn close(&mut self, force_rollback: bool) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Fail with a usage error once `close` has run.
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::executor(ExecutorErrorKind::Closed, "Executor was closed."));
        }
        Ok(())
    }

    /// Keys generated by the most recent non-batched update.
    fn last_generated_keys(&self) -> &[Value];
}
