//! Bound SQL: final text plus ordered parameter bindings.

use sqlmapper_core::error::BindingErrorKind;
use sqlmapper_core::object::parse_path;
use sqlmapper_core::{Error, JdbcType, Object, ObjectMap, Result, RustType, Value};

/// Direction of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParameterMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(ParameterMode::In),
            "OUT" => Some(ParameterMode::Out),
            "INOUT" => Some(ParameterMode::InOut),
            _ => None,
        }
    }

    /// Does this mode return a value from the database?
    pub fn is_output(self) -> bool {
        matches!(self, ParameterMode::Out | ParameterMode::InOut)
    }
}

/// One positional binding, in marker order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMapping {
    pub property: String,
    pub rust_type: Option<RustType>,
    pub jdbc_type: Option<JdbcType>,
    pub mode: ParameterMode,
    pub numeric_scale: Option<u32>,
    pub type_handler: Option<String>,
}

impl ParameterMapping {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            rust_type: None,
            jdbc_type: None,
            mode: ParameterMode::In,
            numeric_scale: None,
            type_handler: None,
        }
    }

    pub fn jdbc_type(mut self, jdbc_type: JdbcType) -> Self {
        self.jdbc_type = Some(jdbc_type);
        self
    }

    pub fn rust_type(mut self, rust_type: RustType) -> Self {
        self.rust_type = Some(rust_type);
        self
    }

    pub fn mode(mut self, mode: ParameterMode) -> Self {
        self.mode = mode;
        self
    }
}

/// The result of composing a statement for one call.
#[derive(Debug, Clone)]
pub struct BoundSql {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
    parameter_object: Object,
    additional_parameters: ObjectMap,
}

impl BoundSql {
    pub fn new(sql: String, parameter_mappings: Vec<ParameterMapping>, parameter_object: Object) -> Self {
        Self {
            sql,
            parameter_mappings,
            parameter_object,
            additional_parameters: ObjectMap::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    pub fn parameter_object(&self) -> &Object {
        &self.parameter_object
    }

    /// Parameters produced while composing (foreach items, bind variables).
    pub fn additional_parameters(&self) -> &ObjectMap {
        &self.additional_parameters
    }

    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: Object) {
        self.additional_parameters.insert(name.into(), value);
    }

    /// Does any binding return a value (OUT or INOUT)?
    pub fn has_output_parameters(&self) -> bool {
        self.parameter_mappings.iter().any(|m| m.mode.is_output())
    }

    /// Resolve the value of a property path for binding.
    ///
    /// Additional parameters shadow the parameter object. A scalar (or null)
    /// parameter object is the value of every property.
    pub fn resolve_value(&self, property: &str) -> Result<Value> {
        if let Some(entry) = self.additional_parameters.get(root_name(property)) {
            return parse_path(property)
                .and_then(|segments| entry.segments_value(segments.get(1..)?))
                .ok_or_else(|| unresolved(property, self.additional_parameters.keys()));
        }
        match &self.parameter_object {
            Object::Value(v) => Ok(v.clone()),
            obj => obj.path_value(property).ok_or_else(|| {
                let names = obj.as_map().into_iter().flat_map(ObjectMap::keys);
                unresolved(property, names)
            }),
        }
    }
}

fn root_name(path: &str) -> &str {
    let end = path.find(['.', '[']).unwrap_or(path.len());
    &path[..end]
}

fn unresolved<'a>(property: &str, names: impl Iterator<Item = &'a String>) -> Error {
    let available = names.map(String::as_str).collect::<Vec<_>>().join(", ");
    Error::binding(
        BindingErrorKind::UnresolvedProperty,
        format!(
            "Property '{}' not found in parameter object. Available parameters are [{}]",
            property, available
        ),
    )
}
