//! Type handlers and the handler registry.
//!
//! A `TypeHandler` converts one scalar between its property form and the
//! form bound to or read from the driver. The registry resolves a handler
//! for a `(RustType, JdbcType)` pair; it is built once at startup and is
//! read-only afterwards.

use crate::error::{Error, Result, TypeError};
use crate::types::{JdbcType, RustType};
use crate::value::{Value, parse_date, parse_time, parse_timestamp};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts a single scalar value in both directions.
pub trait TypeHandler: Send + Sync + fmt::Debug {
    /// Handler name, used for `typeHandler=` references and logging.
    fn name(&self) -> &str;

    /// Convert a property value into the value bound on a statement.
    fn set_parameter(&self, value: &Value, jdbc_type: Option<JdbcType>) -> Result<Value>;

    /// Convert a column value read from the driver into the property value.
    fn get_result(&self, value: Value, column: &str) -> Result<Value>;
}

/// Built-in handler that coerces values to one property type.
#[derive(Debug, Clone)]
pub struct ScalarTypeHandler {
    name: &'static str,
    target: RustType,
}

impl ScalarTypeHandler {
    pub const fn new(name: &'static str, target: RustType) -> Self {
        Self { name, target }
    }

    pub fn target(&self) -> &RustType {
        &self.target
    }
}

impl TypeHandler for ScalarTypeHandler {
    fn name(&self) -> &str {
        self.name
    }

    fn set_parameter(&self, value: &Value, _jdbc_type: Option<JdbcType>) -> Result<Value> {
        coerce(value.clone(), &self.target, None)
    }

    fn get_result(&self, value: Value, column: &str) -> Result<Value> {
        coerce(value, &self.target, Some(column))
    }
}

/// Pass-through handler used when nothing more specific is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectTypeHandler;

impl TypeHandler for ObjectTypeHandler {
    fn name(&self) -> &str {
        "ObjectTypeHandler"
    }

    fn set_parameter(&self, value: &Value, _jdbc_type: Option<JdbcType>) -> Result<Value> {
        Ok(value.clone())
    }

    fn get_result(&self, value: Value, _column: &str) -> Result<Value> {
        Ok(value)
    }
}

fn mismatch(expected: &'static str, value: &Value, column: Option<&str>) -> Error {
    Error::Type(TypeError {
        expected,
        actual: format!("{} ({})", value.type_name(), value),
        column: column.map(str::to_string),
        rust_type: Some(expected),
    })
}

fn int_in_range<T: TryFrom<i64>>(
    expected: &'static str,
    value: &Value,
    column: Option<&str>,
) -> Result<T> {
    let wide = match value {
        Value::Text(s) | Value::Decimal(s) => s.trim().parse::<i64>().ok(),
        Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
        other => other.as_i64(),
    };
    wide.and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(expected, value, column))
}

/// Coerce a value to the given property type. NULL passes through.
pub fn coerce(value: Value, target: &RustType, column: Option<&str>) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let converted = match target {
        RustType::Object | RustType::Named(_) => value,
        RustType::Bool => match value {
            Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "t" | "yes" => Value::Bool(true),
                "false" | "0" | "f" | "no" => Value::Bool(false),
                _ => return Err(mismatch("bool", &value, column)),
            },
            ref other => Value::Bool(
                other
                    .as_bool()
                    .ok_or_else(|| mismatch("bool", &value, column))?,
            ),
        },
        RustType::I8 => Value::TinyInt(int_in_range("i8", &value, column)?),
        RustType::I16 => Value::SmallInt(int_in_range("i16", &value, column)?),
        RustType::I32 => Value::Int(int_in_range("i32", &value, column)?),
        RustType::I64 => Value::BigInt(int_in_range("i64", &value, column)?),
        RustType::F32 | RustType::F64 => {
            let v = match &value {
                Value::Text(s) => s.trim().parse::<f64>().ok(),
                other => other.as_f64(),
            }
            .ok_or_else(|| mismatch("float", &value, column))?;
            if *target == RustType::F32 {
                #[allow(clippy::cast_possible_truncation)]
                let narrow = v as f32;
                Value::Float(narrow)
            } else {
                Value::Double(v)
            }
        }
        RustType::Decimal => match value {
            Value::Decimal(_) => value,
            Value::Text(ref s) if s.trim().parse::<f64>().is_ok() => Value::Decimal(s.trim().to_string()),
            ref other if other.is_numeric() => Value::Decimal(other.to_string()),
            other => return Err(mismatch("decimal", &other, column)),
        },
        RustType::String => match value {
            Value::Text(_) => value,
            Value::Bytes(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
            other => Value::Text(other.to_string()),
        },
        RustType::Bytes => match value {
            Value::Bytes(_) => value,
            Value::Text(s) => Value::Bytes(s.into_bytes()),
            Value::Uuid(b) => Value::Bytes(b.to_vec()),
            other => return Err(mismatch("bytes", &other, column)),
        },
        RustType::Date => match value {
            Value::Date(_) => value,
            Value::Text(ref s) => Value::Date(
                parse_date(s).ok_or_else(|| mismatch("date", &value, column))?,
            ),
            Value::Timestamp(us) | Value::TimestampTz(us) => {
                #[allow(clippy::cast_possible_truncation)]
                let days = us.div_euclid(86_400_000_000) as i32;
                Value::Date(days)
            }
            other => return Err(mismatch("date", &other, column)),
        },
        RustType::Time => match value {
            Value::Time(_) => value,
            Value::Text(ref s) => Value::Time(
                parse_time(s).ok_or_else(|| mismatch("time", &value, column))?,
            ),
            other => return Err(mismatch("time", &other, column)),
        },
        RustType::Timestamp => match value {
            Value::Timestamp(_) | Value::TimestampTz(_) => value,
            Value::Text(ref s) => Value::Timestamp(
                parse_timestamp(s).ok_or_else(|| mismatch("timestamp", &value, column))?,
            ),
            Value::Date(days) => Value::Timestamp(i64::from(days) * 86_400_000_000),
            Value::BigInt(us) => Value::Timestamp(us),
            other => return Err(mismatch("timestamp", &other, column)),
        },
        RustType::Uuid => match value {
            Value::Uuid(_) => value,
            Value::Bytes(ref b) => Value::Uuid(
                <[u8; 16]>::try_from(b.as_slice())
                    .map_err(|_| mismatch("uuid", &value, column))?,
            ),
            Value::Text(ref s) => {
                Value::Uuid(parse_uuid(s).ok_or_else(|| mismatch("uuid", &value, column))?)
            }
            other => return Err(mismatch("uuid", &other, column)),
        },
        RustType::Json => match value {
            Value::Json(_) => value,
            Value::Text(ref s) => Value::Json(
                serde_json::from_str(s).map_err(|_| mismatch("json", &value, column))?,
            ),
            other => Value::Json(other.to_json()),
        },
    };
    Ok(converted)
}

fn parse_uuid(s: &str) -> Option<[u8; 16]> {
    let hex: String = s.chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(out)
}

// ============================================================================
// Registry
// ============================================================================

type HandlerRef = Arc<dyn TypeHandler>;

/// Resolves type handlers by property type, JDBC type or name.
#[derive(Debug, Clone)]
pub struct TypeHandlerRegistry {
    type_handlers: HashMap<RustType, HashMap<Option<JdbcType>, HandlerRef>>,
    jdbc_handlers: HashMap<JdbcType, HandlerRef>,
    named: HashMap<String, HandlerRef>,
    object_handler: HandlerRef,
}

static GLOBAL: OnceCell<Arc<TypeHandlerRegistry>> = OnceCell::new();

impl TypeHandlerRegistry {
    /// Start a builder seeded with the built-in handlers.
    pub fn builder() -> TypeHandlerRegistryBuilder {
        TypeHandlerRegistryBuilder::new()
    }

    /// The process-wide registry.
    ///
    /// Initialised with the built-in handlers on first use unless
    /// `install_global` ran earlier.
    pub fn global() -> Arc<TypeHandlerRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::builder().build())))
    }

    /// Install the process-wide registry. Fails if it is already set.
    pub fn install_global(registry: TypeHandlerRegistry) -> Result<()> {
        GLOBAL
            .set(Arc::new(registry))
            .map_err(|_| Error::config("the global type handler registry is already initialised"))
    }

    /// Resolve a handler for a property type, preferring an exact JDBC match,
    /// then the type's default, then its only registered handler.
    pub fn resolve(&self, rust_type: &RustType, jdbc_type: Option<JdbcType>) -> Option<HandlerRef> {
        let by_jdbc = self.type_handlers.get(rust_type)?;
        if let Some(jdbc) = jdbc_type {
            if let Some(h) = by_jdbc.get(&Some(jdbc)) {
                return Some(Arc::clone(h));
            }
        }
        if let Some(h) = by_jdbc.get(&None) {
            return Some(Arc::clone(h));
        }
        if by_jdbc.len() == 1 {
            return by_jdbc.values().next().cloned();
        }
        None
    }

    /// Is any handler registered for this property type?
    pub fn has_handler(&self, rust_type: &RustType) -> bool {
        self.type_handlers.contains_key(rust_type)
    }

    /// Handler registered for a JDBC type alone.
    pub fn by_jdbc(&self, jdbc_type: JdbcType) -> Option<HandlerRef> {
        self.jdbc_handlers.get(&jdbc_type).cloned()
    }

    /// Handler registered under a name.
    pub fn by_name(&self, name: &str) -> Option<HandlerRef> {
        self.named.get(name).cloned()
    }

    /// The pass-through handler.
    pub fn object_handler(&self) -> HandlerRef {
        Arc::clone(&self.object_handler)
    }

    /// Handler for a runtime value whose property type is not declared.
    pub fn for_value(&self, value: &Value) -> HandlerRef {
        self.resolve(&RustType::of(value), None)
            .unwrap_or_else(|| self.object_handler())
    }
}

impl Default for TypeHandlerRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for `TypeHandlerRegistry`.
#[derive(Debug)]
pub struct TypeHandlerRegistryBuilder {
    registry: TypeHandlerRegistry,
}

const BUILTINS: &[(&str, RustType)] = &[
    ("BoolTypeHandler", RustType::Bool),
    ("I8TypeHandler", RustType::I8),
    ("I16TypeHandler", RustType::I16),
    ("I32TypeHandler", RustType::I32),
    ("I64TypeHandler", RustType::I64),
    ("F32TypeHandler", RustType::F32),
    ("F64TypeHandler", RustType::F64),
    ("DecimalTypeHandler", RustType::Decimal),
    ("StringTypeHandler", RustType::String),
    ("BytesTypeHandler", RustType::Bytes),
    ("DateTypeHandler", RustType::Date),
    ("TimeTypeHandler", RustType::Time),
    ("TimestampTypeHandler", RustType::Timestamp),
    ("UuidTypeHandler", RustType::Uuid),
    ("JsonTypeHandler", RustType::Json),
];

const JDBC_TYPES: &[JdbcType] = &[
    JdbcType::Bit,
    JdbcType::Boolean,
    JdbcType::TinyInt,
    JdbcType::SmallInt,
    JdbcType::Integer,
    JdbcType::BigInt,
    JdbcType::Float,
    JdbcType::Real,
    JdbcType::Double,
    JdbcType::Numeric,
    JdbcType::Decimal,
    JdbcType::Char,
    JdbcType::Varchar,
    JdbcType::LongVarchar,
    JdbcType::NVarchar,
    JdbcType::Clob,
    JdbcType::Date,
    JdbcType::Time,
    JdbcType::Timestamp,
    JdbcType::TimestampWithTimezone,
    JdbcType::Binary,
    JdbcType::VarBinary,
    JdbcType::Blob,
];

impl TypeHandlerRegistryBuilder {
    fn new() -> Self {
        let object_handler: HandlerRef = Arc::new(ObjectTypeHandler);
        let mut registry = TypeHandlerRegistry {
            type_handlers: HashMap::new(),
            jdbc_handlers: HashMap::new(),
            named: HashMap::new(),
            object_handler: Arc::clone(&object_handler),
        };
        registry
            .named
            .insert(object_handler.name().to_string(), Arc::clone(&object_handler));
        registry
            .type_handlers
            .entry(RustType::Object)
            .or_default()
            .insert(None, object_handler);

        let mut builder = Self { registry };
        for (name, rust_type) in BUILTINS {
            let handler: HandlerRef = Arc::new(ScalarTypeHandler::new(*name, rust_type.clone()));
            builder = builder
                .register(rust_type.clone(), None, Arc::clone(&handler))
                .register_named(*name, handler);
        }
        for jdbc in JDBC_TYPES {
            let native = RustType::native_for(*jdbc);
            if let Some(handler) = builder.registry.resolve(&native, None) {
                builder = builder.register_jdbc(*jdbc, handler);
            }
        }
        builder
    }

    /// Register a handler for a property type, optionally narrowed to one
    /// JDBC type.
    pub fn register(
        mut self,
        rust_type: RustType,
        jdbc_type: Option<JdbcType>,
        handler: HandlerRef,
    ) -> Self {
        self.registry
            .type_handlers
            .entry(rust_type)
            .or_default()
            .insert(jdbc_type, handler);
        self
    }

    /// Register a handler used when only the JDBC type is known.
    pub fn register_jdbc(mut self, jdbc_type: JdbcType, handler: HandlerRef) -> Self {
        self.registry.jdbc_handlers.insert(jdbc_type, handler);
        self
    }

    /// Register a handler under a name for `typeHandler=` references.
    pub fn register_named(mut self, name: impl Into<String>, handler: HandlerRef) -> Self {
        self.registry.named.insert(name.into(), handler);
        self
    }

    pub fn build(self) -> TypeHandlerRegistry {
        tracing::debug!(
            types = self.registry.type_handlers.len(),
            named = self.registry.named.len(),
            "Type handler registry built"
        );
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct UpperCase;

    impl TypeHandler for UpperCase {
        fn name(&self) -> &str {
            "UpperCase"
        }

        fn set_parameter(&self, value: &Value, _jdbc: Option<JdbcType>) -> Result<Value> {
            Ok(match value {
                Value::Text(s) => Value::Text(s.to_uppercase()),
                other => other.clone(),
            })
        }

        fn get_result(&self, value: Value, _column: &str) -> Result<Value> {
            Ok(match value {
                Value::Text(s) => Value::Text(s.to_lowercase()),
                other => other,
            })
        }
    }

    #[test]
    fn builtins_resolve_by_type() {
        let registry = TypeHandlerRegistry::default();
        let h = registry.resolve(&RustType::I64, Some(JdbcType::Integer)).unwrap();
        assert_eq!(h.name(), "I64TypeHandler");
        assert_eq!(h.get_result(Value::Int(4), "id").unwrap(), Value::BigInt(4));
        assert!(registry.resolve(&RustType::Named("Money".into()), None).is_none());
    }

    #[test]
    fn jdbc_specific_registration_wins() {
        let registry = TypeHandlerRegistry::builder()
            .register(RustType::String, Some(JdbcType::Char), Arc::new(UpperCase))
            .build();
        let exact = registry.resolve(&RustType::String, Some(JdbcType::Char)).unwrap();
        assert_eq!(exact.name(), "UpperCase");
        let default = registry.resolve(&RustType::String, Some(JdbcType::Varchar)).unwrap();
        assert_eq!(default.name(), "StringTypeHandler");
    }

    #[test]
    fn sole_handler_is_used_for_any_jdbc_type() {
        let registry = TypeHandlerRegistry::builder()
            .register(
                RustType::Named("Code".into()),
                Some(JdbcType::Varchar),
                Arc::new(UpperCase),
            )
            .build();
        let h = registry
            .resolve(&RustType::Named("Code".into()), Some(JdbcType::Char))
            .unwrap();
        assert_eq!(h.name(), "UpperCase");
    }

    #[test]
    fn jdbc_and_named_lookup() {
        let registry = TypeHandlerRegistry::default();
        assert_eq!(
            registry.by_jdbc(JdbcType::Varchar).unwrap().name(),
            "StringTypeHandler"
        );
        assert!(registry.by_jdbc(JdbcType::Other).is_none());
        assert!(registry.by_name("DateTypeHandler").is_some());
        assert_eq!(registry.for_value(&Value::Null).name(), "ObjectTypeHandler");
    }

    #[test]
    fn coercions() {
        assert_eq!(
            coerce(Value::Text("2024-01-01".into()), &RustType::Date, None).unwrap(),
            Value::Date(19_723)
        );
        assert_eq!(
            coerce(Value::Int(1), &RustType::Bool, None).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            coerce(Value::Text("{\"a\":1}".into()), &RustType::Json, None).unwrap(),
            Value::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            coerce(Value::Null, &RustType::I32, Some("age")).unwrap(),
            Value::Null
        );
        let err = coerce(Value::BigInt(i64::MAX), &RustType::I32, Some("age")).unwrap_err();
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn uuid_from_text() {
        let v = coerce(
            Value::Text("01020304-0506-0708-090a-0b0c0d0e0f10".into()),
            &RustType::Uuid,
            None,
        )
        .unwrap();
        assert_eq!(
            v,
            Value::Uuid([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16])
        );
    }

    #[test]
    fn global_registry_is_shared() {
        let a = TypeHandlerRegistry::global();
        let b = TypeHandlerRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
