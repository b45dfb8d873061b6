//! The statement-owning executor.
//!
//! `BaseExecutor` owns one connection, the session-local cache and whatever
//! statements its strategy keeps alive between calls:
//!
//! - `Simple`: a statement per call, closed right after.
//! - `Reuse`: statements kept by SQL text until the next flush.
//! - `Batch`: updates queued into driver batches, grouped while consecutive
//!   calls share SQL text and statement id.

use crate::config::{Configuration, ExecutorType, LocalCacheScope};
use crate::cursor::Cursor;
use crate::executor::{Executor, RowCount};
use crate::mapping::{KeyGenerator, MappedStatement, RowBounds};
use crate::parameter::{ParameterHandler, key_values};
use crate::result::{DefaultResultHandler, NestedQuery, ResultHandler, ResultMapper};
use sqlmapper_cache::{CacheKey, CachedResult};
use sqlmapper_core::error::{BatchError, CacheErrorKind, ExecutorErrorKind};
use sqlmapper_core::{BatchResult, Connection, Error, Object, Result, Statement, StatementOptions, Value};
use sqlmapper_dynamic::BoundSql;
use std::collections::HashMap;
use std::sync::Arc;

/// A local cache slot.
#[derive(Debug)]
enum LocalEntry {
    /// The query is running; seeing this again means it re-entered itself.
    InFlight,
    Ready(CachedResult),
}

/// One queued native batch.
struct PendingBatch<S> {
    statement: S,
    result: BatchResult,
    key_property: Option<String>,
}

enum Strategy<S> {
    Simple,
    Reuse(HashMap<String, S>),
    Batch(Vec<PendingBatch<S>>),
}

impl<S> Strategy<S> {
    fn new(executor_type: ExecutorType) -> Self {
        match executor_type {
            ExecutorType::Simple => Strategy::Simple,
            ExecutorType::Reuse => Strategy::Reuse(HashMap::new()),
            ExecutorType::Batch => Strategy::Batch(Vec::new()),
        }
    }

    fn executor_type(&self) -> ExecutorType {
        match self {
            Strategy::Simple => ExecutorType::Simple,
            Strategy::Reuse(_) => ExecutorType::Reuse,
            Strategy::Batch(_) => ExecutorType::Batch,
        }
    }
}

/// Executes statements on one connection with a local cache.
pub struct BaseExecutor<C: Connection> {
    config: Arc<Configuration>,
    connection: C,
    strategy: Strategy<C::Statement>,
    local_cache: HashMap<CacheKey, LocalEntry>,
    query_stack: usize,
    closed: bool,
    last_generated_keys: Vec<Value>,
}

impl<C: Connection> BaseExecutor<C> {
    pub fn new(config: Arc<Configuration>, connection: C, executor_type: ExecutorType) -> Self {
        tracing::debug!(executor_type = ?executor_type, "opening executor");
        Self {
            config,
            connection,
            strategy: Strategy::new(executor_type),
            local_cache: HashMap::new(),
            query_stack: 0,
            closed: false,
            last_generated_keys: Vec::new(),
        }
    }

    pub fn simple(config: Arc<Configuration>, connection: C) -> Self {
        Self::new(config, connection, ExecutorType::Simple)
    }

    pub fn reuse(config: Arc<Configuration>, connection: C) -> Self {
        Self::new(config, connection, ExecutorType::Reuse)
    }

    pub fn batch(config: Arc<Configuration>, connection: C) -> Self {
        Self::new(config, connection, ExecutorType::Batch)
    }

    pub fn executor_type(&self) -> ExecutorType {
        self.strategy.executor_type()
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Number of entries in the local cache, in-flight markers included.
    pub fn local_cache_size(&self) -> usize {
        self.local_cache.len()
    }

    fn database_id(&self) -> Option<String> {
        self.config.settings().database_id.clone()
    }

    // ========================================================================
    // Statement lifecycle
    // ========================================================================

    /// Get a statement for `sql`, reusing a kept one when the strategy allows.
    fn acquire(&mut self, statement: &MappedStatement, sql: &str) -> Result<C::Statement> {
        if let Strategy::Reuse(kept) = &mut self.strategy {
            if let Some(stmt) = kept.remove(sql) {
                tracing::trace!(statement = statement.id(), "reusing prepared statement");
                return Ok(stmt);
            }
        }
        self.connection
            .prepare(sql, &statement_options(statement))
            .map_err(|e| e.with_statement(statement.id(), sql))
    }

    /// Hand a statement back after a call: kept for reuse, else closed.
    fn release(&mut self, mut stmt: C::Statement) -> Result<()> {
        match &mut self.strategy {
            Strategy::Reuse(kept) => {
                kept.insert(stmt.sql().to_string(), stmt);
                Ok(())
            }
            _ => stmt.close(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn query_local(
        &mut self,
        statement: &MappedStatement,
        bounds: RowBounds,
        key: &CacheKey,
        bound: &BoundSql,
    ) -> Result<CachedResult> {
        match self.local_cache.get(key) {
            Some(LocalEntry::Ready(result)) => {
                tracing::debug!(statement = statement.id(), rows = result.len(), "local cache hit");
                return Ok(Arc::clone(result));
            }
            Some(LocalEntry::InFlight) => {
                return Err(Error::cache(
                    CacheErrorKind::CircularReference,
                    Some(statement.id()),
                    format!(
                        "Statement '{}' was queried again while its first load was in progress; nested selects form a cycle",
                        statement.id()
                    ),
                ));
            }
            None => {}
        }

        self.local_cache.insert(key.clone(), LocalEntry::InFlight);
        let mut collector = DefaultResultHandler::new();
        let outcome = self.do_query(statement, bounds, bound, &mut collector);
        self.local_cache.remove(key);
        outcome?;

        let result: CachedResult = Arc::new(collector.into_results());
        self.local_cache
            .insert(key.clone(), LocalEntry::Ready(Arc::clone(&result)));
        Ok(result)
    }

    fn do_query(
        &mut self,
        statement: &MappedStatement,
        bounds: RowBounds,
        bound: &BoundSql,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        let result_map = ResultMapper::result_map_for(statement)?;
        let params = ParameterHandler::new(&self.config, bound).parameters()?;
        if matches!(self.strategy, Strategy::Batch(_)) {
            self.flush_statements(false)?;
        }

        let mut stmt = self.acquire(statement, bound.sql())?;
        let outcome = self
            .run_query(&mut stmt, statement, bounds, &result_map, &params, handler)
            .map_err(|e| e.with_statement(statement.id(), bound.sql()));
        let released = self.release(stmt);
        outcome?;
        released
    }

    fn run_query(
        &mut self,
        stmt: &mut C::Statement,
        statement: &MappedStatement,
        bounds: RowBounds,
        result_map: &Arc<crate::mapping::ResultMap>,
        params: &[Value],
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        stmt.bind(params)?;
        tracing::debug!(statement = statement.id(), sql = %stmt.sql(), "executing query");
        tracing::trace!(params = ?params, "bound parameters");
        let columns = stmt.execute_query()?;
        let mut mapper = ResultMapper::new(Arc::clone(&self.config), columns);
        mapper.handle_rows(result_map, bounds, || stmt.next_row(), self, handler)
    }

    // ========================================================================
    // Updates
    // ========================================================================

    fn run_update(
        &mut self,
        stmt: &mut C::Statement,
        statement: &MappedStatement,
        params: &[Value],
        parameter: &mut Object,
    ) -> Result<u64> {
        stmt.bind(params)?;
        tracing::debug!(statement = statement.id(), sql = %stmt.sql(), "executing update");
        tracing::trace!(params = ?params, "bound parameters");
        let affected = stmt.execute_update()?;
        if let KeyGenerator::Generated { key_property, .. } = statement.key_generator() {
            let keys = stmt.generated_keys();
            if let Some(key) = keys.first() {
                apply_generated_key(parameter, key_property, key.clone())?;
            }
            self.last_generated_keys = keys;
        }
        Ok(affected)
    }

    fn batch_update(
        &mut self,
        statement: &MappedStatement,
        bound: &BoundSql,
        params: &[Value],
        parameter: &Object,
    ) -> Result<RowCount> {
        let Strategy::Batch(pending) = &mut self.strategy else {
            return Err(Error::Custom("batch update on a non-batch executor".to_string()));
        };
        let sql = bound.sql();
        let mut batch = match pending.pop() {
            Some(last) if last.result.matches(statement.id(), sql) => last,
            other => {
                pending.extend(other);
                let stmt = self
                    .connection
                    .prepare(sql, &statement_options(statement))
                    .map_err(|e| e.with_statement(statement.id(), sql))?;
                tracing::debug!(statement = statement.id(), sql, "starting batch");
                PendingBatch {
                    statement: stmt,
                    result: BatchResult::new(statement.id(), sql),
                    key_property: match statement.key_generator() {
                        KeyGenerator::Generated { key_property, .. } => Some(key_property.clone()),
                        KeyGenerator::None => None,
                    },
                }
            }
        };

        let outcome = batch
            .statement
            .bind(params)
            .and_then(|()| batch.statement.add_batch());
        if outcome.is_ok() {
            tracing::trace!(params = ?params, "queued batch item");
            batch.result.add_parameter(parameter.clone());
        }
        if batch.result.is_empty() {
            close_quietly(&mut batch.statement);
        } else {
            pending.push(batch);
        }
        outcome.map_err(|e| e.with_statement(statement.id(), sql))?;
        Ok(RowCount::Deferred)
    }
}

impl<C: Connection> NestedQuery for BaseExecutor<C> {
    fn query_nested(&mut self, statement: &MappedStatement, parameter: &Object) -> Result<CachedResult> {
        self.query(statement, parameter, RowBounds::DEFAULT)
    }
}

impl<C: Connection> Executor for BaseExecutor<C> {
    type Stmt = C::Statement;

    fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    fn update(&mut self, statement: &MappedStatement, parameter: &mut Object) -> Result<RowCount> {
        self.ensure_open()?;
        if statement.flush_cache() {
            self.clear_local_cache();
        }
        let bound = statement.bound_sql(parameter, self.database_id().as_deref())?;
        let params = ParameterHandler::new(&self.config, &bound).parameters()?;

        if matches!(self.strategy, Strategy::Batch(_)) {
            return self.batch_update(statement, &bound, &params, parameter);
        }
        let mut stmt = self.acquire(statement, bound.sql())?;
        let outcome = self
            .run_update(&mut stmt, statement, &params, parameter)
            .map_err(|e| e.with_statement(statement.id(), bound.sql()));
        let released = self.release(stmt);
        let affected = outcome?;
        released?;
        Ok(RowCount::Affected(affected))
    }

    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        bounds: RowBounds,
        key: &CacheKey,
        bound: &BoundSql,
    ) -> Result<CachedResult> {
        self.ensure_open()?;
        if self.query_stack == 0 && statement.flush_cache() {
            self.clear_local_cache();
        }
        self.query_stack += 1;
        let result = self.query_local(statement, bounds, key, bound);
        self.query_stack -= 1;
        if self.query_stack == 0 && self.config.settings().local_cache_scope == LocalCacheScope::Statement {
            self.clear_local_cache();
        }
        result
    }

    fn query_with_handler(
        &mut self,
        statement: &MappedStatement,
        parameter: &Object,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        self.ensure_open()?;
        let bound = statement.bound_sql(parameter, self.database_id().as_deref())?;
        if self.query_stack == 0 && statement.flush_cache() {
            self.clear_local_cache();
        }
        self.query_stack += 1;
        let result = self.do_query(statement, bounds, &bound, handler);
        self.query_stack -= 1;
        result
    }

    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: &Object,
        bounds: RowBounds,
    ) -> Result<Cursor<Self::Stmt>> {
        self.ensure_open()?;
        let result_map = ResultMapper::result_map_for(statement)?;
        if statement.has_nested_queries() {
            return Err(Error::config(format!(
                "Statement '{}' maps nested selects, which cursors cannot run",
                statement.id()
            )));
        }
        let bound = statement.bound_sql(parameter, self.database_id().as_deref())?;
        let params = ParameterHandler::new(&self.config, &bound).parameters()?;
        if matches!(self.strategy, Strategy::Batch(_)) {
            self.flush_statements(false)?;
        }

        let sql = bound.sql();
        let mut stmt = self
            .connection
            .prepare(sql, &statement_options(statement))
            .map_err(|e| e.with_statement(statement.id(), sql))?;
        let columns = match stmt.bind(&params).and_then(|()| stmt.execute_query()) {
            Ok(columns) => columns,
            Err(e) => {
                close_quietly(&mut stmt);
                return Err(e.with_statement(statement.id(), sql));
            }
        };
        tracing::debug!(statement = statement.id(), sql, "opened cursor");
        Ok(Cursor::new(stmt, Arc::clone(&self.config), columns, result_map, bounds))
    }

    fn flush_statements(&mut self, is_rollback: bool) -> Result<Vec<BatchResult>> {
        self.ensure_open()?;
        match &mut self.strategy {
            Strategy::Simple => Ok(Vec::new()),
            Strategy::Reuse(kept) => {
                let mut first_error = None;
                for (_, mut stmt) in kept.drain() {
                    if let Err(e) = stmt.close() {
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(Vec::new()), Err)
            }
            Strategy::Batch(pending) => {
                let batches = std::mem::take(pending);
                if is_rollback {
                    if !batches.is_empty() {
                        tracing::debug!(batches = batches.len(), "discarding queued batches");
                    }
                    for mut batch in batches {
                        close_quietly(&mut batch.statement);
                    }
                    return Ok(Vec::new());
                }
                execute_batches(batches)
            }
        }
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Err(Error::executor(
                ExecutorErrorKind::Closed,
                "Cannot commit, transaction is already closed",
            ));
        }
        self.clear_local_cache();
        self.flush_statements(false)?;
        if required {
            self.connection.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        let flushed = self.flush_statements(true);
        let rolled_back = if required { self.connection.rollback() } else { Ok(()) };
        flushed?;
        rolled_back
    }

    fn create_cache_key(&self, statement: &MappedStatement, bounds: RowBounds, bound: &BoundSql) -> Result<CacheKey> {
        self.ensure_open()?;
        let mut key = CacheKey::new();
        key.update(statement.id());
        if !bounds.is_default() {
            key.update(i64::try_from(bounds.offset).unwrap_or(i64::MAX));
            key.update(i64::try_from(bounds.limit).unwrap_or(i64::MAX));
        }
        key.update(bound.sql());
        key.update_all(key_values(bound)?);
        if let Some(environment) = &self.config.settings().environment_id {
            key.update(environment.as_str());
        }
        Ok(key)
    }

    fn is_cached(&self, key: &CacheKey) -> bool {
        self.local_cache.contains_key(key)
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
        }
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let rolled_back = self.rollback(force_rollback);
        let closed = self.connection.close();
        self.closed = true;
        self.local_cache.clear();
        tracing::debug!(force_rollback, "closed executor");
        rolled_back.and(closed)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn last_generated_keys(&self) -> &[Value] {
        &self.last_generated_keys
    }
}

impl<C: Connection> std::fmt::Debug for BaseExecutor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseExecutor")
            .field("executor_type", &self.executor_type())
            .field("local_cache", &self.local_cache.len())
            .field("query_stack", &self.query_stack)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn statement_options(statement: &MappedStatement) -> StatementOptions {
    StatementOptions {
        timeout: statement.timeout(),
        fetch_size: statement.fetch_size(),
        return_generated_keys: statement.key_generator().is_generated(),
    }
}

fn close_quietly<S: Statement>(stmt: &mut S) {
    if let Err(e) = stmt.close() {
        tracing::trace!(error = %e, "ignoring statement close failure");
    }
}

/// Store a generated key on a map parameter. Scalar parameters have nowhere
/// to receive it and are left as they are.
fn apply_generated_key(parameter: &mut Object, key_property: &str, key: Value) -> Result<()> {
    if parameter.as_map().is_some() {
        parameter.set_path(key_property, Object::Value(key))?;
    }
    Ok(())
}

/// Run queued batches in order. Batches before a failing one stay applied.
fn execute_batches<S: Statement>(batches: Vec<PendingBatch<S>>) -> Result<Vec<BatchResult>> {
    let mut results = Vec::with_capacity(batches.len());
    let mut remaining = batches.into_iter().enumerate();
    while let Some((position, mut batch)) = remaining.next() {
        match batch.statement.execute_batch() {
            Ok(counts) => {
                let keys = batch.statement.generated_keys();
                apply_batch_keys(&mut batch, &keys)?;
                tracing::debug!(
                    statement = batch.result.statement_id(),
                    items = counts.len(),
                    "executed batch"
                );
                batch.result.set_update_counts(counts);
                batch.result.set_generated_keys(keys);
                close_quietly(&mut batch.statement);
                results.push(batch.result);
            }
            Err(partial) => {
                let item = partial.failed_item();
                tracing::warn!(
                    statement = batch.result.statement_id(),
                    index = position + 1,
                    item,
                    succeeded = results.len(),
                    error = %partial.source,
                    "batch execution failed"
                );
                if !partial.update_counts.is_empty() {
                    let keys = batch.statement.generated_keys();
                    apply_batch_keys(&mut batch, &keys)?;
                    batch.result.set_generated_keys(keys);
                }
                batch.result.set_update_counts(partial.update_counts);
                close_quietly(&mut batch.statement);
                for (_, mut rest) in remaining {
                    close_quietly(&mut rest.statement);
                }
                let source = partial.source.with_statement(batch.result.statement_id(), batch.result.sql());
                return Err(Error::Batch(BatchError {
                    index: position + 1,
                    item,
                    statement_id: batch.result.statement_id().to_string(),
                    sql: batch.result.sql().to_string(),
                    succeeded: results,
                    failed: batch.result,
                    source: Box::new(source),
                }));
            }
        }
    }
    Ok(results)
}

/// Copy generated keys onto the parameter objects they were produced for.
fn apply_batch_keys<S: Statement>(batch: &mut PendingBatch<S>, keys: &[Value]) -> Result<()> {
    if let Some(property) = &batch.key_property {
        for (parameter, key) in batch.result.parameters_mut().iter_mut().zip(keys) {
            apply_generated_key(parameter, property, key.clone())?;
        }
    }
    Ok(())
}
