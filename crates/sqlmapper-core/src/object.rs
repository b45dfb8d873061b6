//! Dynamic parameter and result objects.
//!
//! An `Object` is either a scalar `Value`, an ordered list, or a string-keyed
//! map. Parameter objects are navigated by property path (`user.address.city`,
//! `ids[2]`) and mapped result rows are built as maps. Typed structs enter
//! and leave through serde.

use crate::error::{Error, Result};
use crate::value::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Map form of an `Object`.
pub type ObjectMap = BTreeMap<String, Object>;

/// A dynamically-typed object tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Value(Value),
    List(Vec<Object>),
    Map(ObjectMap),
}

/// One step of a property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment<'a> {
    Property(&'a str),
    Index(usize),
}

impl Object {
    /// The NULL object.
    pub const fn null() -> Self {
        Object::Value(Value::Null)
    }

    /// An empty map.
    pub fn map() -> Self {
        Object::Map(ObjectMap::new())
    }

    /// Is this a NULL scalar?
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Value(Value::Null))
    }

    /// The scalar value, if this is a scalar.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Object::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Consume into a scalar value. Lists and maps become JSON.
    pub fn into_value(self) -> Value {
        match self {
            Object::Value(v) => v,
            other => Value::Json(other.to_json()),
        }
    }

    pub fn as_map(&self) -> Option<&ObjectMap> {
        match self {
            Object::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ObjectMap> {
        match self {
            Object::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Object]> {
        match self {
            Object::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get a direct map entry.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Insert a map entry. Non-map objects are left untouched and `false`
    /// is returned.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Object>) -> bool {
        match self {
            Object::Map(m) => {
                m.insert(key.into(), value.into());
                true
            }
            _ => false,
        }
    }

    /// Does a map entry exist for `key`?
    pub fn has_key(&self, key: &str) -> bool {
        self.as_map().is_some_and(|m| m.contains_key(key))
    }

    /// Number of elements for lists, maps, arrays and strings.
    pub fn len(&self) -> usize {
        match self {
            Object::List(items) => items.len(),
            Object::Map(m) => m.len(),
            Object::Value(Value::Array(items)) => items.len(),
            Object::Value(Value::Text(s)) => s.chars().count(),
            Object::Value(Value::Bytes(b)) => b.len(),
            Object::Value(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a property path such as `order.items[0].sku`.
    ///
    /// Returns `None` when any segment is missing.
    pub fn path(&self, path: &str) -> Option<&Object> {
        let mut current = self;
        for segment in parse_path(path)? {
            current = match (segment, current) {
                (PathSegment::Property(name), Object::Map(m)) => m.get(name)?,
                (PathSegment::Index(i), Object::List(items)) => items.get(i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve a path to a scalar, reading through `Value::Array` elements.
    pub fn path_value(&self, path: &str) -> Option<Value> {
        self.segments_value(&parse_path(path)?)
    }

    /// Like [`Object::path_value`], for segments that are already parsed.
    pub fn segments_value(&self, segments: &[PathSegment<'_>]) -> Option<Value> {
        let mut current = self;
        for (pos, segment) in segments.iter().enumerate() {
            match (segment, current) {
                (PathSegment::Property(name), Object::Map(m)) => current = m.get(*name)?,
                (PathSegment::Index(i), Object::List(items)) => current = items.get(*i)?,
                (PathSegment::Index(i), Object::Value(Value::Array(items)))
                    if pos + 1 == segments.len() =>
                {
                    return items.get(*i).cloned();
                }
                _ => return None,
            }
        }
        Some(current.clone().into_value())
    }

    /// Set a value at a dotted path, creating intermediate maps.
    pub fn set_path(&mut self, path: &str, value: Object) -> Result<()> {
        let mut parts = path.split('.').peekable();
        let mut current = self;
        while let Some(part) = parts.next() {
            let map = current.as_map_mut().ok_or_else(|| {
                Error::Custom(format!("cannot set '{}': '{}' is not a map", path, part))
            })?;
            if parts.peek().is_none() {
                map.insert(part.to_string(), value);
                return Ok(());
            }
            current = map.entry(part.to_string()).or_insert_with(Object::map);
        }
        Ok(())
    }

    /// Build an object from any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::from(serde_json::to_value(value)?))
    }

    /// Deserialize this object into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| Error::Serde(e.to_string()))
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Object::Value(v) => v.to_json(),
            Object::List(items) => serde_json::Value::Array(items.iter().map(Object::to_json).collect()),
            Object::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Iterate the elements of a collection-like object as (index, item).
    ///
    /// Maps yield their keys as the index; lists and arrays yield positions.
    /// Returns `None` for scalars.
    pub fn entries(&self) -> Option<Vec<(Object, Object)>> {
        match self {
            Object::List(items) => Some(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (Object::from(i as i64), item.clone()))
                    .collect(),
            ),
            Object::Value(Value::Array(items)) => Some(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (Object::from(i as i64), Object::Value(item.clone())))
                    .collect(),
            ),
            Object::Map(m) => Some(
                m.iter()
                    .map(|(k, v)| (Object::from(k.as_str()), v.clone()))
                    .collect(),
            ),
            Object::Value(_) => None,
        }
    }
}

/// Split a property path into segments.
///
/// Returns `None` for malformed paths (unbalanced brackets, empty names).
pub fn parse_path(path: &str) -> Option<Vec<PathSegment<'_>>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            segments.push(PathSegment::Property(name));
        } else if rest.is_empty() {
            return None;
        }
        while !rest.is_empty() {
            let close = rest.find(']')?;
            let inner = &rest[1..close];
            match inner.parse::<usize>() {
                Ok(i) => segments.push(PathSegment::Index(i)),
                Err(_) => segments.push(PathSegment::Property(inner.trim_matches(['\'', '"']))),
            }
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }
    Some(segments)
}

impl From<serde_json::Value> for Object {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Object::null(),
            serde_json::Value::Bool(b) => Object::Value(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Object::Value(Value::BigInt(i))
                } else {
                    Object::Value(Value::Double(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            serde_json::Value::String(s) => Object::Value(Value::Text(s)),
            serde_json::Value::Array(items) => {
                Object::List(items.into_iter().map(Object::from).collect())
            }
            serde_json::Value::Object(m) => {
                Object::Map(m.into_iter().map(|(k, v)| (k, Object::from(v))).collect())
            }
        }
    }
}

impl From<Value> for Object {
    fn from(v: Value) -> Self {
        Object::Value(v)
    }
}

impl From<Vec<Object>> for Object {
    fn from(items: Vec<Object>) -> Self {
        Object::List(items)
    }
}

impl From<ObjectMap> for Object {
    fn from(m: ObjectMap) -> Self {
        Object::Map(m)
    }
}

macro_rules! scalar_into_object {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Object {
                fn from(v: $t) -> Self {
                    Object::Value(Value::from(v))
                }
            }
        )*
    };
}

scalar_into_object!(bool, i8, i16, i32, i64, f32, f64, String, &str, Vec<u8>);

impl<K: Into<String>, V: Into<Object>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Object::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
