//! Type encoding and decoding between `Value` and SQLite.
//!
//! SQLite has five storage classes (INTEGER, REAL, TEXT, BLOB, NULL). Values
//! are written to the closest class and read back without guessing; the
//! declared column type is reported separately through `declared_type` so
//! the mapping layer can pick a type handler for it.

#![allow(clippy::cast_possible_truncation)]

use libsqlite3_sys as ffi;
use sqlmapper_core::value::{format_date, format_time, format_timestamp};
use sqlmapper_core::{JdbcType, Value};
use std::ffi::{CStr, c_int};

/// Bind a Value to a prepared statement parameter.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: forwarded from the caller
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::TinyInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::SmallInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Decimal(s) | Value::Text(s) => bind_text(stmt, index, s),
            Value::Bytes(b) => bind_blob(stmt, index, b),
            Value::Date(days) => bind_text(stmt, index, &format_date(*days)),
            Value::Time(micros) => bind_text(stmt, index, &format_time(*micros)),
            Value::Timestamp(micros) | Value::TimestampTz(micros) => {
                bind_text(stmt, index, &format_timestamp(*micros))
            }
            Value::Uuid(bytes) => bind_blob(stmt, index, bytes),
            Value::Json(json) => bind_text(stmt, index, &json.to_string()),
            Value::Array(_) => bind_text(stmt, index, &value.to_json().to_string()),
        }
    }
}

unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    let Ok(len) = c_int::try_from(text.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the buffer before returning
    unsafe { ffi::sqlite3_bind_text(stmt, index, text.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT()) }
}

unsafe fn bind_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int, bytes: &[u8]) -> c_int {
    let Ok(len) = c_int::try_from(bytes.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the buffer before returning
    unsafe { ffi::sqlite3_bind_blob(stmt, index, bytes.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT()) }
}

/// Read a column value from the current row.
///
/// INTEGER storage is always read as `BigInt`; SQLite integers are 64-bit.
/// TEXT in a column declared `JSON` is parsed when it is valid JSON.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int, declared: JdbcType) -> Value {
    // SAFETY: forwarded from the caller
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => Value::BigInt(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    return Value::Null;
                }
                let slice = std::slice::from_raw_parts(ptr, usize::try_from(len).unwrap_or(0));
                let text = String::from_utf8_lossy(slice).into_owned();
                if declared == JdbcType::Other {
                    if let Ok(json) = serde_json::from_str(&text) {
                        return Value::Json(json);
                    }
                }
                Value::Text(text)
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len <= 0 {
                    Value::Bytes(Vec::new())
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Bytes(slice.to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from the caller; SQLite owns the returned string
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok().map(String::from)
        }
    }
}

/// The JDBC type of a result column, from its declared SQL type.
///
/// Expression columns have no declared type and report `Undefined`.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn declared_type(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> JdbcType {
    // SAFETY: forwarded from the caller; SQLite owns the returned string
    let decl = unsafe {
        let ptr = ffi::sqlite3_column_decltype(stmt, index);
        if ptr.is_null() {
            return JdbcType::Undefined;
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    };
    jdbc_type_for_decl(&decl)
}

/// Map a declared type using SQLite affinity rules.
///
/// Every integer affinity maps to `BigInt`, since SQLite stores 64-bit
/// integers regardless of the declared width. `JSON` maps to `Other`.
pub fn jdbc_type_for_decl(decl: &str) -> JdbcType {
    let upper = decl.trim().to_ascii_uppercase();
    if upper == "JSON" || upper == "JSONB" {
        return JdbcType::Other;
    }
    if upper.contains("INT") {
        return JdbcType::BigInt;
    }
    match JdbcType::from_declared(&upper) {
        JdbcType::Float | JdbcType::Real => JdbcType::Double,
        other => other,
    }
}
