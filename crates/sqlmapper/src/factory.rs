//! Opening sessions against a shared configuration.

use crate::session::SqlSession;
use sqlmapper_core::{Connection, Result};
use sqlmapper_executor::{BaseExecutor, CachingExecutor, Configuration, Executor, ExecutorType};
use std::sync::Arc;

/// Produces a fresh connection for each session.
pub trait ConnectionFactory {
    type Connection: Connection + 'static;

    fn connect(&self) -> Result<Self::Connection>;
}

impl<F, C> ConnectionFactory for F
where
    F: Fn() -> Result<C>,
    C: Connection + 'static,
{
    type Connection = C;

    fn connect(&self) -> Result<C> {
        self()
    }
}

/// Builds sessions that share one frozen `Configuration`, and with it the
/// second-level caches.
pub struct SqlSessionFactory<F: ConnectionFactory> {
    config: Arc<Configuration>,
    connections: F,
}

impl<F: ConnectionFactory> SqlSessionFactory<F> {
    pub fn new(config: Arc<Configuration>, connections: F) -> Self {
        Self { config, connections }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Open a session with the configured default executor type.
    pub fn open_session(&self) -> Result<SqlSession<F::Connection>> {
        self.open_session_with(self.config.settings().default_executor_type, false)
    }

    /// Open a session with an explicit executor type.
    ///
    /// `auto_commit` only tells the session that the connection commits on
    /// its own, so `commit`/`rollback` and `close` skip the driver unless
    /// forced.
    pub fn open_session_with(
        &self,
        executor_type: ExecutorType,
        auto_commit: bool,
    ) -> Result<SqlSession<F::Connection>> {
        let connection = self.connections.connect()?;
        let config = Arc::clone(&self.config);
        let base = BaseExecutor::new(Arc::clone(&config), connection, executor_type);
        let executor: Box<dyn Executor<Stmt = <F::Connection as Connection>::Statement>> =
            if config.settings().cache_enabled {
                Box::new(CachingExecutor::new(base))
            } else {
                Box::new(base)
            };
        tracing::debug!(
            executor_type = ?executor_type,
            auto_commit,
            second_level_cache = config.settings().cache_enabled,
            "opened session"
        );
        Ok(SqlSession::new(config, executor, executor_type, auto_commit))
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for SqlSessionFactory<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSessionFactory")
            .field("statements", &self.config.statement_ids().count())
            .finish_non_exhaustive()
    }
}
