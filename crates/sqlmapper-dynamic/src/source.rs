//! Statement SQL sources.

use crate::bound::{BoundSql, ParameterMapping};
use crate::context::DynamicContext;
use crate::node::SqlNode;
use sqlmapper_core::{Object, Result};

/// SQL assembled once at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSqlSource {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
}

impl StaticSqlSource {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }
}

/// Where a statement's SQL comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlSource {
    /// No conditional fragments and no `${}`: compiled eagerly.
    Static(StaticSqlSource),
    /// Assembled per call.
    Dynamic(SqlNode),
}

impl SqlSource {
    /// Choose static or dynamic assembly for a fragment tree.
    pub fn new(root: SqlNode) -> Result<Self> {
        if root.is_dynamic() {
            return Ok(SqlSource::Dynamic(root));
        }
        let mut ctx = DynamicContext::new(Object::null(), None);
        root.apply(&mut ctx)?;
        let (sql, parameter_mappings, _) = ctx.into_parts();
        Ok(SqlSource::Static(StaticSqlSource {
            sql: sql.trim().to_string(),
            parameter_mappings,
        }))
    }

    /// Parse a single SQL text.
    pub fn from_sql(sql: &str) -> Result<Self> {
        Self::new(SqlNode::text(sql)?)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, SqlSource::Dynamic(_))
    }

    /// Compose the SQL for one call.
    pub fn bound_sql(&self, parameter: &Object) -> Result<BoundSql> {
        self.bound_sql_for(parameter, None)
    }

    /// Compose the SQL for one call with `_databaseId` bound.
    pub fn bound_sql_for(&self, parameter: &Object, database_id: Option<&str>) -> Result<BoundSql> {
        match self {
            SqlSource::Static(source) => Ok(BoundSql::new(
                source.sql.clone(),
                source.parameter_mappings.clone(),
                parameter.clone(),
            )),
            SqlSource::Dynamic(root) => {
                let mut ctx = DynamicContext::new(parameter.clone(), database_id);
                root.apply(&mut ctx)?;
                let (sql, mappings, bindings) = ctx.into_parts();
                let mut bound = BoundSql::new(sql.trim().to_string(), mappings, parameter.clone());
                for (name, value) in bindings {
                    bound.set_additional_parameter(name, value);
                }
                tracing::trace!(sql = %bound.sql(), bindings = bound.parameter_mappings().len(), "composed dynamic SQL");
                Ok(bound)
            }
        }
    }
}
