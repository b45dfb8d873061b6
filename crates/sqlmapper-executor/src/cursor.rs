//! Lazy, forward-only query results.

use crate::config::Configuration;
use crate::mapping::{ResultMap, RowBounds};
use crate::result::{NoNestedQueries, ResultMapper};
use sqlmapper_core::{ColumnInfo, Object, Result, Statement};
use std::sync::Arc;

/// Iterates mapped rows straight off a live statement.
///
/// The cursor owns its statement. It is closed when the rows run out, when
/// the row limit is reached, on the first error, or when the cursor is
/// dropped, whichever comes first.
pub struct Cursor<S: Statement> {
    statement: Option<S>,
    mapper: ResultMapper,
    result_map: Arc<ResultMap>,
    bounds: RowBounds,
    skipped: bool,
    fetched: usize,
}

impl<S: Statement> Cursor<S> {
    pub(crate) fn new(
        statement: S,
        config: Arc<Configuration>,
        columns: Arc<ColumnInfo>,
        result_map: Arc<ResultMap>,
        bounds: RowBounds,
    ) -> Self {
        Self {
            statement: Some(statement),
            mapper: ResultMapper::new(config, columns),
            result_map,
            bounds,
            skipped: false,
            fetched: 0,
        }
    }

    /// Has the underlying statement been released?
    pub fn is_closed(&self) -> bool {
        self.statement.is_none()
    }

    /// Rows handed out so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Release the statement now.
    pub fn close(&mut self) -> Result<()> {
        match self.statement.take() {
            Some(mut statement) => {
                tracing::trace!(sql = %statement.sql(), fetched = self.fetched, "closing cursor");
                statement.close()
            }
            None => Ok(()),
        }
    }

    fn fetch(&mut self) -> Result<Option<Object>> {
        let Some(statement) = self.statement.as_mut() else {
            return Ok(None);
        };
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.bounds.offset {
                if statement.next_row()?.is_none() {
                    return Ok(None);
                }
            }
        }
        if self.fetched >= self.bounds.limit {
            return Ok(None);
        }
        let Some(row) = statement.next_row()? else {
            return Ok(None);
        };
        let object = self.mapper.map_row(&row, &self.result_map, &mut NoNestedQueries)?;
        self.fetched += 1;
        Ok(Some(object))
    }
}

impl<S: Statement> Iterator for Cursor<S> {
    type Item = Result<Object>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.fetch() {
            Ok(Some(object)) => Some(Ok(object)),
            Ok(None) => {
                self.close().err().map(Err)
            }
            Err(e) => {
                let _ = self.close();
                Some(Err(e))
            }
        }
    }
}

impl<S: Statement> Drop for Cursor<S> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl<S: Statement> std::fmt::Debug for Cursor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("result_map", &self.result_map.id())
            .field("bounds", &self.bounds)
            .field("fetched", &self.fetched)
            .field("closed", &self.is_closed())
            .finish()
    }
}
