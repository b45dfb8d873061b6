//! Resolves and converts the values bound on a statement.

use crate::config::Configuration;
use sqlmapper_core::{Error, Result, TypeHandler, Value};
use sqlmapper_dynamic::{BoundSql, ParameterMapping};
use std::sync::Arc;

/// Turns a `BoundSql`'s mappings into driver values, in binding order.
#[derive(Debug)]
pub struct ParameterHandler<'a> {
    config: &'a Configuration,
    bound: &'a BoundSql,
}

impl<'a> ParameterHandler<'a> {
    pub fn new(config: &'a Configuration, bound: &'a BoundSql) -> Self {
        Self { config, bound }
    }

    /// Resolve every binding.
    ///
    /// OUT parameters are bound as NULL; their values are never read back.
    pub fn parameters(&self) -> Result<Vec<Value>> {
        self.bound
            .parameter_mappings()
            .iter()
            .map(|mapping| self.parameter(mapping))
            .collect()
    }

    fn parameter(&self, mapping: &ParameterMapping) -> Result<Value> {
        if mapping.mode == sqlmapper_dynamic::ParameterMode::Out {
            return Ok(Value::Null);
        }
        let value = self.bound.resolve_value(&mapping.property)?;
        let handler = self.handler(mapping, &value)?;
        let jdbc_type = if value.is_null() {
            Some(mapping.jdbc_type.unwrap_or(self.config.settings().jdbc_type_for_null))
        } else {
            mapping.jdbc_type
        };
        handler.set_parameter(&value, jdbc_type)
    }

    fn handler(&self, mapping: &ParameterMapping, value: &Value) -> Result<Arc<dyn TypeHandler>> {
        let registry = self.config.type_handlers();
        if let Some(name) = &mapping.type_handler {
            return registry
                .by_name(name)
                .ok_or_else(|| Error::config(format!("Unknown type handler '{}' for parameter '{}'", name, mapping.property)));
        }
        if let Some(rust_type) = &mapping.rust_type {
            if let Some(handler) = registry.resolve(rust_type, mapping.jdbc_type) {
                return Ok(handler);
            }
        }
        Ok(registry.for_value(value))
    }
}

/// Values that contribute to a cache key, in binding order.
///
/// OUT parameters are skipped.
pub(crate) fn key_values(bound: &BoundSql) -> Result<Vec<Value>> {
    bound
        .parameter_mappings()
        .iter()
        .filter(|m| m.mode != sqlmapper_dynamic::ParameterMode::Out)
        .map(|m| bound.resolve_value(&m.property))
        .collect()
}
