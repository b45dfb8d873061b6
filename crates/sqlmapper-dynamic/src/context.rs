//! Per-call composition state.

use crate::bound::ParameterMapping;
use crate::expression::Scope;
use sqlmapper_core::{Object, ObjectMap, Result, Value};

/// Binding name of the whole parameter object.
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";
/// Binding name of the configured environment id.
pub const DATABASE_ID_KEY: &str = "_databaseId";

/// Accumulates SQL text, bindings and variables while a fragment tree is
/// applied to one parameter object.
#[derive(Debug)]
pub struct DynamicContext {
    parameter: Object,
    bindings: ObjectMap,
    sql: String,
    mappings: Vec<ParameterMapping>,
    unique: usize,
    /// Active foreach renames, innermost last: (variable, binding name).
    renames: Vec<(String, String)>,
}

impl DynamicContext {
    pub fn new(parameter: Object, database_id: Option<&str>) -> Self {
        let mut bindings = ObjectMap::new();
        bindings.insert(PARAMETER_OBJECT_KEY.to_string(), parameter.clone());
        bindings.insert(
            DATABASE_ID_KEY.to_string(),
            database_id.map_or_else(Object::null, Object::from),
        );
        Self {
            parameter,
            bindings,
            sql: String::new(),
            mappings: Vec::new(),
            unique: 0,
            renames: Vec::new(),
        }
    }

    pub fn parameter(&self) -> &Object {
        &self.parameter
    }

    pub fn bindings(&self) -> &ObjectMap {
        &self.bindings
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Object) {
        self.bindings.insert(name.into(), value);
    }

    /// Remove a binding, returning its previous value.
    pub fn unbind(&mut self, name: &str) -> Option<Object> {
        self.bindings.remove(name)
    }

    /// Append a piece of SQL, separated from the previous one by a space.
    pub fn append_sql(&mut self, piece: &str) {
        let piece = piece.trim();
        if piece.is_empty() {
            return;
        }
        if !self.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(piece);
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Register a placeholder binding, applying active foreach renames.
    pub fn add_mapping(&mut self, mut mapping: ParameterMapping) {
        for (variable, binding) in self.renames.iter().rev() {
            if let Some(rest) = mapping.property.strip_prefix(variable.as_str()) {
                if rest.is_empty() || rest.starts_with('.') || rest.starts_with('[') {
                    mapping.property = format!("{}{}", binding, rest);
                    break;
                }
            }
        }
        self.mappings.push(mapping);
    }

    pub fn mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }

    /// A number unique within this call, used to name foreach bindings.
    pub fn next_unique(&mut self) -> usize {
        let n = self.unique;
        self.unique += 1;
        n
    }

    pub(crate) fn push_rename(&mut self, variable: &str, binding: String) {
        self.renames.push((variable.to_string(), binding));
    }

    pub(crate) fn pop_rename(&mut self) {
        self.renames.pop();
    }

    /// Run `f` with a fresh SQL buffer and return what it appended.
    ///
    /// Bindings and mappings registered by `f` are kept.
    pub fn capture(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<String> {
        let saved = std::mem::take(&mut self.sql);
        let result = f(self);
        let captured = std::mem::replace(&mut self.sql, saved);
        result.map(|()| captured)
    }

    /// Tear down into (sql, mappings, bindings).
    pub fn into_parts(self) -> (String, Vec<ParameterMapping>, ObjectMap) {
        (self.sql, self.mappings, self.bindings)
    }
}

impl Scope for DynamicContext {
    fn lookup(&self, name: &str) -> Option<&Object> {
        if let Some(obj) = self.bindings.get(name) {
            return Some(obj);
        }
        match &self.parameter {
            Object::Map(m) => m.get(name),
            Object::Value(Value::Null) => None,
            // A single scalar or list parameter answers to any name.
            other => Some(other),
        }
    }
}
