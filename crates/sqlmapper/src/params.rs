//! Turning mapper method arguments into a single parameter object.
//!
//! A method with one unnamed argument passes that argument straight through,
//! so statements can address its properties directly (`#{id}`). Every other
//! shape becomes a map keyed by the declared names, plus the generic
//! `param1`..`paramN` aliases.

use sqlmapper_core::error::BindingErrorKind;
use sqlmapper_core::{Error, Object, ObjectMap, Result};
use std::collections::HashSet;

/// Prefix of the positional aliases added to every parameter map.
pub const GENERIC_NAME_PREFIX: &str = "param";

/// Key under which a lone list argument is exposed.
pub const LIST_KEY: &str = "list";

/// Alias of `LIST_KEY` for statements written against any collection.
pub const COLLECTION_KEY: &str = "collection";

/// Resolves argument names for one method signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamNameResolver {
    names: Vec<String>,
    has_named: bool,
}

impl ParamNameResolver {
    /// One entry per argument; `None` falls back to `arg{index}`.
    pub fn new<S: AsRef<str>>(names: &[Option<S>]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            let name = match name {
                Some(name) => name.as_ref().to_string(),
                None => format!("arg{}", index),
            };
            if !seen.insert(name.clone()) {
                return Err(Error::binding(
                    BindingErrorKind::AmbiguousParameter,
                    format!("Parameter name '{}' is declared more than once", name),
                ));
            }
            resolved.push(name);
        }
        Ok(Self {
            names: resolved,
            has_named: names.iter().any(Option::is_some),
        })
    }

    /// A resolver for `count` unnamed arguments.
    pub fn positional(count: usize) -> Self {
        Self {
            names: (0..count).map(|i| format!("arg{}", i)).collect(),
            has_named: false,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn arity(&self) -> usize {
        self.names.len()
    }

    /// Does a single argument pass through unwrapped?
    fn passes_through(&self) -> bool {
        self.names.len() == 1 && !self.has_named
    }

    /// Build the parameter object for one call.
    pub fn resolve(&self, args: Vec<Object>) -> Result<Object> {
        if args.len() != self.names.len() {
            return Err(Error::binding(
                BindingErrorKind::MissingParameter,
                format!("Expected {} argument(s), got {}", self.names.len(), args.len()),
            ));
        }
        if args.is_empty() {
            return Ok(Object::null());
        }
        if self.passes_through() {
            let mut args = args;
            return Ok(wrap_collection(args.remove(0)));
        }

        let mut params = ParamMap::new();
        for (index, (name, value)) in self.names.iter().zip(args).enumerate() {
            params.insert(name.clone(), value.clone());
            let generic = format!("{}{}", GENERIC_NAME_PREFIX, index + 1);
            if !params.contains(&generic) {
                params.insert(generic, value);
            }
        }
        Ok(params.into_object())
    }

    /// Copy values written into a resolved parameter (generated keys) back
    /// onto the caller's arguments.
    pub fn write_back(&self, parameter: Object, args: &mut [Object]) {
        if args.len() != self.names.len() || args.is_empty() {
            return;
        }
        if self.passes_through() {
            if !matches!(args[0], Object::List(_)) {
                args[0] = parameter;
            }
            return;
        }
        let Object::Map(mut map) = parameter else {
            return;
        };
        for (name, arg) in self.names.iter().zip(args.iter_mut()) {
            if let Some(value) = map.remove(name) {
                *arg = value;
            }
        }
    }
}

/// Expose a lone list under the `list` and `collection` keys.
pub fn wrap_collection(value: Object) -> Object {
    match value {
        Object::List(items) => {
            let mut map = ObjectMap::new();
            map.insert(COLLECTION_KEY.to_string(), Object::List(items.clone()));
            map.insert(LIST_KEY.to_string(), Object::List(items));
            Object::Map(map)
        }
        other => other,
    }
}

/// Named arguments of a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    entries: ObjectMap,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Object>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Look up a parameter, listing the available names when it is missing.
    pub fn get(&self, name: &str) -> Result<&Object> {
        self.entries.get(name).ok_or_else(|| {
            let available: Vec<&str> = self.entries.keys().map(String::as_str).collect();
            Error::binding(
                BindingErrorKind::MissingParameter,
                format!(
                    "Parameter '{}' not found. Available parameters are [{}]",
                    name,
                    available.join(", ")
                ),
            )
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_object(self) -> Object {
        Object::Map(self.entries)
    }
}

impl From<ParamMap> for Object {
    fn from(params: ParamMap) -> Self {
        params.into_object()
    }
}
