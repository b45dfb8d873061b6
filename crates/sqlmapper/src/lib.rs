//! SQLMapper Rust: run named SQL statements against a database and map the
//! rows back into objects.
//!
//! Statements are registered once on a `Configuration`, each with an id, a
//! (possibly dynamic) SQL source, result maps, and cache settings. Sessions
//! then execute them by id:
//!
//! - Dynamic SQL (`if`, `choose`, `where`, `set`, `trim`, `foreach`, `bind`)
//!   is composed per call into SQL text plus ordered bindings
//! - Each session keeps a local cache that lives until its next write,
//!   commit or rollback
//! - Statement groups may share a second-level cache whose writes become
//!   visible to other sessions on commit
//! - Simple, reuse and batch executors trade statement reuse against
//!   round trips
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlmapper::prelude::*;
//! use sqlmapper_sqlite::SqliteConnection;
//!
//! let config = Configuration::builder()
//!     .cache("users", CacheConfig::new())
//!     .statement(
//!         MappedStatement::builder(
//!             "users.find",
//!             SqlCommandType::Select,
//!             SqlSource::from_sql("SELECT id, name FROM users WHERE id = #{id}")?,
//!         )
//!         .result_type(RustType::Object)
//!         .cache("users"),
//!     )
//!     .build()?;
//!
//! let factory = SqlSessionFactory::new(config, || SqliteConnection::open_file("app.db"));
//! let mut session = factory.open_session()?;
//! let user = session.select_one("users.find", &Object::from_iter([("id", 1_i64)]))?;
//! session.commit()?;
//! ```

pub mod factory;
pub mod mapper;
pub mod params;
pub mod session;

pub use factory::{ConnectionFactory, SqlSessionFactory};
pub use mapper::{
    Collection, CountKind, MapperMethod, MethodArgs, MethodParam, MethodResult, MethodSignature, ReturnShape,
};
pub use params::{ParamMap, ParamNameResolver};
pub use session::SqlSession;

pub use sqlmapper_cache::{CacheConfig, CacheKey, CachedResult, Eviction};
pub use sqlmapper_core::{
    BatchResult, ColumnInfo, Connection, Error, JdbcType, Object, ObjectMap, Result, Row, RustType, Statement,
    StatementOptions, TypeHandler, TypeHandlerRegistry, Value,
};
pub use sqlmapper_dynamic::{BoundSql, SqlNode, SqlSource};
pub use sqlmapper_executor::{
    AutoMapping, AutoMappingBehavior, Configuration, ConfigurationBuilder, Cursor, Discriminator, Executor,
    ExecutorType, KeyGenerator, LocalCacheScope, MappedStatement, ResultContext, ResultHandler, ResultMap,
    ResultMapping, RowBounds, RowCount, Settings, SqlCommandType, StatementType,
};

/// Everything a typical caller needs.
///
/// ```ignore
/// use sqlmapper::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CacheConfig, Configuration, Error, ExecutorType, KeyGenerator, MappedStatement, MapperMethod, MethodArgs,
        MethodSignature, Object, Result, ResultMap, ResultMapping, ReturnShape, RowBounds, RowCount, RustType,
        Settings, SqlCommandType, SqlSession, SqlSessionFactory, SqlSource, Value,
    };
}
