//! Column and property type descriptors used for type-handler resolution.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Driver-level column types.
///
/// Names follow the JDBC type constants so mapping definitions written
/// against other SQL mappers (`jdbcType=VARCHAR`) parse unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JdbcType {
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    NVarchar,
    Clob,
    Date,
    Time,
    Timestamp,
    TimestampWithTimezone,
    Binary,
    VarBinary,
    Blob,
    Array,
    Other,
    Null,
    Undefined,
}

impl JdbcType {
    /// Parse a JDBC type name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name.trim().to_ascii_uppercase().as_str() {
            "BIT" => JdbcType::Bit,
            "BOOLEAN" | "BOOL" => JdbcType::Boolean,
            "TINYINT" => JdbcType::TinyInt,
            "SMALLINT" => JdbcType::SmallInt,
            "INTEGER" | "INT" => JdbcType::Integer,
            "BIGINT" => JdbcType::BigInt,
            "FLOAT" => JdbcType::Float,
            "REAL" => JdbcType::Real,
            "DOUBLE" => JdbcType::Double,
            "NUMERIC" => JdbcType::Numeric,
            "DECIMAL" => JdbcType::Decimal,
            "CHAR" => JdbcType::Char,
            "VARCHAR" | "TEXT" => JdbcType::Varchar,
            "LONGVARCHAR" => JdbcType::LongVarchar,
            "NVARCHAR" => JdbcType::NVarchar,
            "CLOB" => JdbcType::Clob,
            "DATE" => JdbcType::Date,
            "TIME" => JdbcType::Time,
            "TIMESTAMP" | "DATETIME" => JdbcType::Timestamp,
            "TIMESTAMP_WITH_TIMEZONE" => JdbcType::TimestampWithTimezone,
            "BINARY" => JdbcType::Binary,
            "VARBINARY" => JdbcType::VarBinary,
            "BLOB" => JdbcType::Blob,
            "ARRAY" => JdbcType::Array,
            "OTHER" => JdbcType::Other,
            "NULL" => JdbcType::Null,
            "UNDEFINED" => JdbcType::Undefined,
            _ => return None,
        };
        Some(t)
    }

    /// Map a declared SQL column type (as reported by a driver) to the
    /// closest JDBC type, using SQLite-style affinity rules for names that
    /// are not exact matches.
    pub fn from_declared(decl: &str) -> Self {
        if let Some(t) = Self::from_name(decl.split('(').next().unwrap_or(decl)) {
            return t;
        }
        let upper = decl.to_ascii_uppercase();
        if upper.contains("INT") {
            JdbcType::BigInt
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            JdbcType::Varchar
        } else if upper.contains("BLOB") || upper.is_empty() {
            JdbcType::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            JdbcType::Double
        } else {
            JdbcType::Numeric
        }
    }

    /// The canonical upper-case name.
    pub const fn name(self) -> &'static str {
        match self {
            JdbcType::Bit => "BIT",
            JdbcType::Boolean => "BOOLEAN",
            JdbcType::TinyInt => "TINYINT",
            JdbcType::SmallInt => "SMALLINT",
            JdbcType::Integer => "INTEGER",
            JdbcType::BigInt => "BIGINT",
            JdbcType::Float => "FLOAT",
            JdbcType::Real => "REAL",
            JdbcType::Double => "DOUBLE",
            JdbcType::Numeric => "NUMERIC",
            JdbcType::Decimal => "DECIMAL",
            JdbcType::Char => "CHAR",
            JdbcType::Varchar => "VARCHAR",
            JdbcType::LongVarchar => "LONGVARCHAR",
            JdbcType::NVarchar => "NVARCHAR",
            JdbcType::Clob => "CLOB",
            JdbcType::Date => "DATE",
            JdbcType::Time => "TIME",
            JdbcType::Timestamp => "TIMESTAMP",
            JdbcType::TimestampWithTimezone => "TIMESTAMP_WITH_TIMEZONE",
            JdbcType::Binary => "BINARY",
            JdbcType::VarBinary => "VARBINARY",
            JdbcType::Blob => "BLOB",
            JdbcType::Array => "ARRAY",
            JdbcType::Other => "OTHER",
            JdbcType::Null => "NULL",
            JdbcType::Undefined => "UNDEFINED",
        }
    }
}

impl fmt::Display for JdbcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The property-side type a value is converted to or from.
///
/// This plays the role a host-language class plays in reflective mappers:
/// handlers are registered per `(RustType, JdbcType)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RustType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    String,
    Bytes,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    /// Any value; resolved through the pass-through handler.
    Object,
    /// A user-defined type registered with a custom handler.
    Named(String),
}

impl RustType {
    /// Parse a type alias as written in mapping definitions.
    ///
    /// Unknown names become `RustType::Named`.
    pub fn from_alias(alias: &str) -> Self {
        match alias.trim() {
            "bool" | "boolean" => RustType::Bool,
            "i8" | "byte" => RustType::I8,
            "i16" | "short" => RustType::I16,
            "i32" | "int" | "integer" => RustType::I32,
            "i64" | "long" => RustType::I64,
            "f32" | "float" => RustType::F32,
            "f64" | "double" => RustType::F64,
            "decimal" | "bigdecimal" => RustType::Decimal,
            "string" | "String" => RustType::String,
            "bytes" | "Vec<u8>" | "byte[]" => RustType::Bytes,
            "date" => RustType::Date,
            "time" => RustType::Time,
            "timestamp" | "datetime" => RustType::Timestamp,
            "uuid" => RustType::Uuid,
            "json" => RustType::Json,
            "object" | "map" | "_" => RustType::Object,
            other => RustType::Named(other.to_string()),
        }
    }

    /// The natural property type of a runtime value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => RustType::Object,
            Value::Bool(_) => RustType::Bool,
            Value::TinyInt(_) => RustType::I8,
            Value::SmallInt(_) => RustType::I16,
            Value::Int(_) => RustType::I32,
            Value::BigInt(_) => RustType::I64,
            Value::Float(_) => RustType::F32,
            Value::Double(_) => RustType::F64,
            Value::Decimal(_) => RustType::Decimal,
            Value::Text(_) => RustType::String,
            Value::Bytes(_) => RustType::Bytes,
            Value::Date(_) => RustType::Date,
            Value::Time(_) => RustType::Time,
            Value::Timestamp(_) | Value::TimestampTz(_) => RustType::Timestamp,
            Value::Uuid(_) => RustType::Uuid,
            Value::Json(_) | Value::Array(_) => RustType::Json,
        }
    }

    /// The property type a driver's native storage for `jdbc_type` reads as.
    pub fn native_for(jdbc_type: JdbcType) -> Self {
        match jdbc_type {
            JdbcType::Bit | JdbcType::Boolean => RustType::Bool,
            JdbcType::TinyInt => RustType::I8,
            JdbcType::SmallInt => RustType::I16,
            JdbcType::Integer => RustType::I32,
            JdbcType::BigInt => RustType::I64,
            JdbcType::Float | JdbcType::Real => RustType::F32,
            JdbcType::Double => RustType::F64,
            JdbcType::Numeric | JdbcType::Decimal => RustType::Decimal,
            JdbcType::Char
            | JdbcType::Varchar
            | JdbcType::LongVarchar
            | JdbcType::NVarchar
            | JdbcType::Clob => RustType::String,
            JdbcType::Date => RustType::Date,
            JdbcType::Time => RustType::Time,
            JdbcType::Timestamp | JdbcType::TimestampWithTimezone => RustType::Timestamp,
            JdbcType::Binary | JdbcType::VarBinary | JdbcType::Blob => RustType::Bytes,
            JdbcType::Array | JdbcType::Other | JdbcType::Null | JdbcType::Undefined => {
                RustType::Object
            }
        }
    }
}

impl fmt::Display for RustType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RustType::Named(name) => f.write_str(name),
            other => write!(f, "{:?}", other),
        }
    }
}
