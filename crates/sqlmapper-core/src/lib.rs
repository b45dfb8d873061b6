//! Core types for SQLMapper Rust.
//!
//! This crate holds everything the mapping engine shares across layers:
//!
//! - `Value` and `Object` for scalar values and parameter/result object trees
//! - `Row` and `ColumnInfo` for driver result sets
//! - `Connection` and `Statement`, the synchronous driver contract
//! - `TypeHandler` and `TypeHandlerRegistry` for per-column value conversion
//! - `Error`, shared by every crate in the workspace

pub mod batch;
pub mod connection;
pub mod error;
pub mod object;
pub mod row;
pub mod type_handler;
pub mod types;
pub mod value;

pub use batch::BatchResult;
pub use connection::{Connection, Statement, StatementOptions};
pub use error::{BatchUpdateError, Error, Result};
pub use object::{Object, ObjectMap};
pub use row::{ColumnInfo, Row};
pub use type_handler::{TypeHandler, TypeHandlerRegistry, TypeHandlerRegistryBuilder};
pub use types::{JdbcType, RustType};
pub use value::Value;
