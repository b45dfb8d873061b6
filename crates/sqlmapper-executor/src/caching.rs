//! Second-level cache decorator.

use crate::config::Configuration;
use crate::cursor::Cursor;
use crate::executor::{Executor, RowCount};
use crate::mapping::{MappedStatement, RowBounds, StatementType};
use crate::result::ResultHandler;
use sqlmapper_cache::{CacheKey, CachedResult, TransactionalCacheManager};
use sqlmapper_core::error::CacheErrorKind;
use sqlmapper_core::{BatchResult, Error, Object, Result, Value};
use sqlmapper_dynamic::BoundSql;
use std::sync::Arc;

/// Consults the shared cache of a statement's group before delegating.
///
/// Results loaded inside a transaction are staged and only published to
/// other sessions when the transaction commits.
#[derive(Debug)]
pub struct CachingExecutor<E: Executor> {
    delegate: E,
    tcm: TransactionalCacheManager,
}

impl<E: Executor> CachingExecutor<E> {
    pub fn new(delegate: E) -> Self {
        Self {
            delegate,
            tcm: TransactionalCacheManager::new(),
        }
    }

    pub fn delegate(&self) -> &E {
        &self.delegate
    }

    /// Are staged writes or clears waiting for commit?
    pub fn has_pending_cache_writes(&self) -> bool {
        self.tcm.has_pending()
    }

    fn flush_cache_if_required(&mut self, statement: &MappedStatement) {
        if let Some(cache) = statement.cache() {
            if statement.flush_cache() {
                self.tcm.clear(cache);
            }
        }
    }
}

/// Callable statements returning values through parameters cannot be
/// answered from a cache.
fn ensure_no_out_params(statement: &MappedStatement, bound: &BoundSql) -> Result<()> {
    if statement.statement_type() == StatementType::Callable && bound.has_output_parameters() {
        return Err(Error::cache(
            CacheErrorKind::OutParameters,
            Some(statement.id()),
            format!(
                "Caching stored procedures with OUT params is not supported. Please configure useCache=false in '{}' statement.",
                statement.id()
            ),
        ));
    }
    Ok(())
}

impl<E: Executor> Executor for CachingExecutor<E> {
    type Stmt = E::Stmt;

    fn configuration(&self) -> &Arc<Configuration> {
        self.delegate.configuration()
    }

    fn update(&mut self, statement: &MappedStatement, parameter: &mut Object) -> Result<RowCount> {
        self.ensure_open()?;
        self.flush_cache_if_required(statement);
        self.delegate.update(statement, parameter)
    }

    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        bounds: RowBounds,
        key: &CacheKey,
        bound: &BoundSql,
    ) -> Result<CachedResult> {
        self.ensure_open()?;
        if let Some(cache) = statement.cache() {
            self.flush_cache_if_required(statement);
            if statement.use_cache() {
                ensure_no_out_params(statement, bound)?;
                if let Some(hit) = self.tcm.get_object(cache, key) {
                    tracing::debug!(statement = statement.id(), cache = cache.id(), "second-level cache hit");
                    return Ok(hit);
                }
                let result = self.delegate.query_with_key(statement, bounds, key, bound)?;
                self.tcm.put_object(cache, key.clone(), Arc::clone(&result));
                return Ok(result);
            }
        }
        self.delegate.query_with_key(statement, bounds, key, bound)
    }

    fn query_with_handler(
        &mut self,
        statement: &MappedStatement,
        parameter: &Object,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        self.ensure_open()?;
        self.flush_cache_if_required(statement);
        self.delegate.query_with_handler(statement, parameter, bounds, handler)
    }

    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: &Object,
        bounds: RowBounds,
    ) -> Result<Cursor<Self::Stmt>> {
        self.ensure_open()?;
        self.flush_cache_if_required(statement);
        self.delegate.query_cursor(statement, parameter, bounds)
    }

    fn flush_statements(&mut self, is_rollback: bool) -> Result<Vec<BatchResult>> {
        self.delegate.flush_statements(is_rollback)
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.delegate.commit(required)?;
        self.tcm.commit();
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        let result = self.delegate.rollback(required);
        if required {
            self.tcm.rollback();
        }
        result
    }

    fn create_cache_key(&self, statement: &MappedStatement, bounds: RowBounds, bound: &BoundSql) -> Result<CacheKey> {
        self.delegate.create_cache_key(statement, bounds, bound)
    }

    fn is_cached(&self, key: &CacheKey) -> bool {
        self.delegate.is_cached(key)
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        if force_rollback {
            self.tcm.rollback();
        } else {
            self.tcm.commit();
        }
        self.delegate.close(force_rollback)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }

    fn last_generated_keys(&self) -> &[Value] {
        self.delegate.last_generated_keys()
    }
}
