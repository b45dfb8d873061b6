//! Statement execution for SQLMapper Rust.
//!
//! - `Configuration`: the frozen registry of mapped statements, result maps
//!   and second-level caches, plus engine `Settings`
//! - `Executor`: the execution contract, implemented by `BaseExecutor`
//!   (simple, reuse and batch strategies with a session-local cache) and by
//!   `CachingExecutor`, which layers the transactional second-level cache on
//!   top of any executor
//! - `ResultMapper`: turns driver rows into `Object`s through result maps
//!   and per-column type handlers
//! - `Cursor`: lazy row streaming over a live statement

pub mod base;
pub mod caching;
pub mod config;
pub mod cursor;
pub mod executor;
pub mod mapping;
pub mod parameter;
pub mod result;

pub use base::BaseExecutor;
pub use caching::CachingExecutor;
pub use config::{AutoMappingBehavior, Configuration, ConfigurationBuilder, ExecutorType, LocalCacheScope, Settings};
pub use cursor::Cursor;
pub use executor::{Executor, RowCount};
pub use mapping::{
    AutoMapping, Discriminator, KeyGenerator, MappedStatement, MappedStatementBuilder, ResultMap, ResultMapping,
    RowBounds, SqlCommandType, StatementType,
};
pub use parameter::ParameterHandler;
pub use result::{
    DefaultResultHandler, NestedQuery, ResultContext, ResultHandler, ResultMapper, ResultSetWrapper,
    underscore_to_camel,
};
