//! SQLite driver for SQLMapper Rust.
//!
//! Implements the synchronous `Connection`/`Statement` contract from
//! sqlmapper-core on top of libsqlite3.
//!
//! # Features
//!
//! - Owned prepared statements that stay valid for as long as the caller
//!   keeps them (reuse and batch executors hold them across calls)
//! - Lazy transactions: the first statement of a unit of work issues `BEGIN`
//! - Emulated batches: queued parameter sets are stepped one by one
//! - Generated keys from `last_insert_rowid`
//! - Configurable open flags and busy timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlmapper_core::{Connection, Statement, StatementOptions, Value};
//! use sqlmapper_sqlite::SqliteConnection;
//!
//! let mut conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let mut stmt = conn.prepare("INSERT INTO users (name) VALUES (?)", &StatementOptions::new())?;
//! stmt.bind(&[Value::Text("Alice".into())])?;
//! stmt.execute_update()?;
//! conn.commit()?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `TinyInt` .. `BigInt` | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Text`, `Decimal` | TEXT |
//! | `Bytes`, `Uuid` | BLOB |
//! | `Date`, `Time`, `Timestamp` | TEXT (ISO-8601) |
//! | `Json`, `Array` | TEXT (JSON) |

// FFI bindings
#![allow(unsafe_code)]

pub mod connection;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteStatement};

/// The SQLite library version.
pub fn sqlite_version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = libsqlite3_sys::sqlite3_libversion();
        std::ffi::CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// The SQLite library version as a number, e.g. 3045000.
pub fn sqlite_version_number() -> i32 {
    // SAFETY: always safe to call
    unsafe { libsqlite3_sys::sqlite3_libversion_number() }
}
