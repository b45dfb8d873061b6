//! The public unit of work: one connection, one executor, one transaction
//! at a time.
//!
//! A session tracks whether it has written anything since the last
//! commit or rollback. Closing a dirty session that does not auto-commit
//! rolls its work back.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut session = factory.open_session()?;
//! let mut user = Object::from_serialize(&NewUser { name: "ann" })?;
//! session.insert("users.insert", &mut user)?;
//! let found = session.select_one("users.find", &user)?;
//! session.commit()?;
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlmapper_cache::CachedResult;
use sqlmapper_core::error::ExecutorErrorKind;
use sqlmapper_core::{BatchResult, Connection, Error, Object, ObjectMap, Result, Value};
use sqlmapper_executor::{Configuration, Cursor, Executor, ExecutorType, ResultHandler, RowBounds, RowCount};
use std::sync::Arc;

/// A session over one connection.
pub struct SqlSession<C: Connection + 'static> {
    config: Arc<Configuration>,
    executor: Box<dyn Executor<Stmt = C::Statement>>,
    executor_type: ExecutorType,
    auto_commit: bool,
    dirty: bool,
}

impl<C: Connection + 'static> SqlSession<C> {
    /// Wrap an already-built executor. `SqlSessionFactory` is the usual way
    /// to get a session.
    pub fn new(
        config: Arc<Configuration>,
        executor: Box<dyn Executor<Stmt = C::Statement>>,
        executor_type: ExecutorType,
        auto_commit: bool,
    ) -> Self {
        Self {
            config,
            executor,
            executor_type,
            auto_commit,
            dirty: false,
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn executor_type(&self) -> ExecutorType {
        self.executor_type
    }

    /// Has the session written since its last commit or rollback?
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }

    /// Keys generated by the most recent non-batched insert.
    pub fn last_generated_keys(&self) -> &[Value] {
        self.executor.last_generated_keys()
    }

    // ========================================================================
    // Selects
    // ========================================================================

    /// Run a select expected to return at most one row.
    #[tracing::instrument(level = "debug", skip(self, parameter))]
    pub fn select_one(&mut self, statement_id: &str, parameter: &Object) -> Result<Option<Object>> {
        let rows = self.select_list(statement_id, parameter)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.first().cloned()),
            n => Err(Error::executor(
                ExecutorErrorKind::TooManyResults,
                format!(
                    "Expected one result (or none) to be returned by '{}', but found: {}",
                    statement_id, n
                ),
            )),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, parameter))]
    pub fn select_list(&mut self, statement_id: &str, parameter: &Object) -> Result<CachedResult> {
        self.select_list_with_bounds(statement_id, parameter, RowBounds::DEFAULT)
    }

    /// Run a select, skipping `bounds.offset` rows and keeping at most
    /// `bounds.limit`.
    pub fn select_list_with_bounds(
        &mut self,
        statement_id: &str,
        parameter: &Object,
        bounds: RowBounds,
    ) -> Result<CachedResult> {
        let statement = self.config.mapped_statement(statement_id)?;
        self.executor.query(&statement, parameter, bounds)
    }

    /// Run a select and key each row by the value of `map_key`.
    ///
    /// Later rows overwrite earlier rows with the same key. Rows without the
    /// property are keyed by the empty string.
    #[tracing::instrument(level = "debug", skip(self, parameter))]
    pub fn select_map(&mut self, statement_id: &str, parameter: &Object, map_key: &str) -> Result<ObjectMap> {
        self.select_map_with_bounds(statement_id, parameter, map_key, RowBounds::DEFAULT)
    }

    pub fn select_map_with_bounds(
        &mut self,
        statement_id: &str,
        parameter: &Object,
        map_key: &str,
        bounds: RowBounds,
    ) -> Result<ObjectMap> {
        let rows = self.select_list_with_bounds(statement_id, parameter, bounds)?;
        Ok(key_rows(&rows, map_key))
    }

    /// Open a cursor that maps rows as they are read. Caches are bypassed.
    #[tracing::instrument(level = "debug", skip(self, parameter))]
    pub fn select_cursor(
        &mut self,
        statement_id: &str,
        parameter: &Object,
        bounds: RowBounds,
    ) -> Result<Cursor<C::Statement>> {
        let statement = self.config.mapped_statement(statement_id)?;
        self.executor.query_cursor(&statement, parameter, bounds)
    }

    /// Hand each mapped row to `handler` until the rows run out or the
    /// handler stops the context.
    #[tracing::instrument(level = "debug", skip(self, parameter, handler))]
    pub fn select_with_handler(
        &mut self,
        statement_id: &str,
        parameter: &Object,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        let statement = self.config.mapped_statement(statement_id)?;
        self.executor.query_with_handler(&statement, parameter, bounds, handler)
    }

    /// `select_one` with a serializable parameter and a deserialized row.
    pub fn select_one_as<T, P>(&mut self, statement_id: &str, parameter: &P) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let parameter = Object::from_serialize(parameter)?;
        self.select_one(statement_id, &parameter)?
            .map(|row| row.deserialize())
            .transpose()
    }

    /// `select_list` with a serializable parameter and deserialized rows.
    pub fn select_list_as<T, P>(&mut self, statement_id: &str, parameter: &P) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let parameter = Object::from_serialize(parameter)?;
        self.select_list(statement_id, &parameter)?
            .iter()
            .map(Object::deserialize)
            .collect()
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Run an insert. Generated keys are written back into `parameter`.
    #[tracing::instrument(level = "debug", skip(self, parameter))]
    pub fn insert(&mut self, statement_id: &str, parameter: &mut Object) -> Result<RowCount> {
        self.update(statement_id, parameter)
    }

    /// Run an insert, update or delete.
    #[tracing::instrument(level = "debug", skip(self, parameter))]
    pub fn update(&mut self, statement_id: &str, parameter: &mut Object) -> Result<RowCount> {
        let statement = self.config.mapped_statement(statement_id)?;
        self.dirty = true;
        self.executor.update(&statement, parameter)
    }

    #[tracing::instrument(level = "debug", skip(self, parameter))]
    pub fn delete(&mut self, statement_id: &str, parameter: &mut Object) -> Result<RowCount> {
        self.update(statement_id, parameter)
    }

    /// Run an update with a serializable parameter. Generated keys are
    /// dropped; use `insert` with an `Object` to read them back.
    pub fn update_as<P: Serialize + ?Sized>(&mut self, statement_id: &str, parameter: &P) -> Result<RowCount> {
        let mut parameter = Object::from_serialize(parameter)?;
        self.update(statement_id, &mut parameter)
    }

    /// Execute queued batches and report one result per statement group.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.executor.flush_statements(false)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Commit when the session has written anything.
    pub fn commit(&mut self) -> Result<()> {
        self.commit_with(false)
    }

    /// Commit; `force` commits even a clean session.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit_with(&mut self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor.commit(required)?;
        self.dirty = false;
        Ok(())
    }

    /// Roll back when the session has written anything.
    pub fn rollback(&mut self) -> Result<()> {
        self.rollback_with(false)
    }

    /// Roll back; `force` rolls back even a clean session.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback_with(&mut self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor.rollback(required)?;
        self.dirty = false;
        Ok(())
    }

    /// Drop everything in the session's local cache.
    pub fn clear_cache(&mut self) {
        self.executor.clear_local_cache();
    }

    /// Release the connection. Uncommitted writes are rolled back.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn close(&mut self) -> Result<()> {
        if self.executor.is_closed() {
            return Ok(());
        }
        let force_rollback = self.commit_or_rollback_required(false);
        let result = self.executor.close(force_rollback);
        self.dirty = false;
        result
    }

    fn commit_or_rollback_required(&self, force: bool) -> bool {
        (!self.auto_commit && self.dirty) || force
    }
}

impl<C: Connection + 'static> Drop for SqlSession<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close session on drop");
        }
    }
}

impl<C: Connection + 'static> std::fmt::Debug for SqlSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession")
            .field("executor_type", &self.executor_type)
            .field("auto_commit", &self.auto_commit)
            .field("dirty", &self.dirty)
            .field("closed", &self.executor.is_closed())
            .finish_non_exhaustive()
    }
}

/// Key rows by a property value; later rows win.
pub(crate) fn key_rows(rows: &[Object], map_key: &str) -> ObjectMap {
    let mut map = ObjectMap::new();
    for row in rows {
        let key = row.path_value(map_key).map(|v| v.to_string()).unwrap_or_default();
        map.insert(key, row.clone());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, name: &str) -> Object {
        [("id", Value::BigInt(id)), ("name", Value::Text(name.to_string()))]
            .into_iter()
            .collect()
    }

    #[test]
    fn keyed_rows_overwrite_duplicates() {
        let rows = vec![row(1, "a"), row(2, "b"), row(1, "c")];
        let map = key_rows(&rows, "id");
        assert_eq!(map.len(), 2);
        assert_eq!(map["1"].path_value("name"), Some(Value::Text("c".into())));
        assert_eq!(map["2"].path_value("name"), Some(Value::Text("b".into())));
    }

    #[test]
    fn rows_without_the_key_share_the_empty_key() {
        let rows = vec![row(1, "a"), Object::map()];
        let map = key_rows(&rows, "email");
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(""));
    }
}
