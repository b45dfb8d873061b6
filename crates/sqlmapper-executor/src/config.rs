//! Engine settings and the statement registry.

use crate::mapping::{MappedStatement, MappedStatementBuilder, ResultMap};
use serde::Deserialize;
use sqlmapper_cache::{CacheConfig, SharedCache};
use sqlmapper_core::error::BindingErrorKind;
use sqlmapper_core::{Error, JdbcType, Result, TypeHandlerRegistry};
use sqlmapper_dynamic::SqlSource;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Settings
// ============================================================================

/// Statement strategy of a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorType {
    /// A fresh statement per call.
    #[default]
    Simple,
    /// Statements kept per SQL text for the whole session.
    Reuse,
    /// Updates queued into driver batches until flushed.
    Batch,
}

/// Lifetime of local cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalCacheScope {
    /// Entries live until commit, rollback, update or explicit clear.
    #[default]
    Session,
    /// Entries only live for the duration of one top-level query.
    Statement,
}

/// Which unmapped columns are copied onto result objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMappingBehavior {
    None,
    #[default]
    Partial,
    Full,
}

/// Engine-wide settings.
///
/// Deserializable from JSON; missing fields take their defaults.
///
/// ```json
/// { "cache_enabled": true, "default_executor_type": "batch", "map_underscore_to_camel_case": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch for second-level caches.
    pub cache_enabled: bool,
    pub local_cache_scope: LocalCacheScope,
    pub default_executor_type: ExecutorType,
    /// Statement timeout used when a statement declares none.
    pub default_statement_timeout_ms: Option<u64>,
    pub default_fetch_size: Option<u32>,
    /// Auto-map `user_name` columns onto `userName` properties.
    pub map_underscore_to_camel_case: bool,
    pub auto_mapping_behavior: AutoMappingBehavior,
    /// JDBC type used when binding a null parameter without a declared type.
    pub jdbc_type_for_null: JdbcType,
    /// Contributes to every cache key when set.
    pub environment_id: Option<String>,
    /// Bound as `_databaseId` in dynamic SQL.
    pub database_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            local_cache_scope: LocalCacheScope::Session,
            default_executor_type: ExecutorType::Simple,
            default_statement_timeout_ms: None,
            default_fetch_size: None,
            map_underscore_to_camel_case: false,
            auto_mapping_behavior: AutoMappingBehavior::Partial,
            jdbc_type_for_null: JdbcType::Other,
            environment_id: None,
            database_id: None,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serde(e.to_string()))
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn local_cache_scope(mut self, scope: LocalCacheScope) -> Self {
        self.local_cache_scope = scope;
        self
    }

    pub fn default_executor_type(mut self, executor_type: ExecutorType) -> Self {
        self.default_executor_type = executor_type;
        self
    }

    pub fn default_statement_timeout(mut self, timeout: Duration) -> Self {
        self.default_statement_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn default_fetch_size(mut self, size: u32) -> Self {
        self.default_fetch_size = Some(size);
        self
    }

    pub fn map_underscore_to_camel_case(mut self, enabled: bool) -> Self {
        self.map_underscore_to_camel_case = enabled;
        self
    }

    pub fn auto_mapping_behavior(mut self, behavior: AutoMappingBehavior) -> Self {
        self.auto_mapping_behavior = behavior;
        self
    }

    pub fn jdbc_type_for_null(mut self, jdbc_type: JdbcType) -> Self {
        self.jdbc_type_for_null = jdbc_type;
        self
    }

    pub fn environment_id(mut self, id: impl Into<String>) -> Self {
        self.environment_id = Some(id.into());
        self
    }

    pub fn database_id(mut self, id: impl Into<String>) -> Self {
        self.database_id = Some(id.into());
        self
    }

    pub fn default_statement_timeout_duration(&self) -> Option<Duration> {
        self.default_statement_timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// The frozen registry of statements, result maps and caches.
#[derive(Debug)]
pub struct Configuration {
    settings: Settings,
    type_handlers: Arc<TypeHandlerRegistry>,
    statements: HashMap<String, Arc<MappedStatement>>,
    result_maps: HashMap<String, Arc<ResultMap>>,
    caches: HashMap<String, SharedCache>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn type_handlers(&self) -> &Arc<TypeHandlerRegistry> {
        &self.type_handlers
    }

    /// Look up a statement by id.
    pub fn mapped_statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.statements.get(id).cloned().ok_or_else(|| {
            Error::binding(
                BindingErrorKind::StatementNotFound,
                format!("Mapped statement '{}' is not registered", id),
            )
        })
    }

    pub fn has_statement(&self, id: &str) -> bool {
        self.statements.contains_key(id)
    }

    pub fn result_map(&self, id: &str) -> Result<Arc<ResultMap>> {
        self.result_maps
            .get(id)
            .cloned()
            .ok_or_else(|| Error::config(format!("Result map '{}' is not registered", id)))
    }

    /// The shared cache of a namespace.
    pub fn cache(&self, namespace: &str) -> Option<&SharedCache> {
        self.caches.get(namespace)
    }

    pub fn caches(&self) -> impl Iterator<Item = &SharedCache> {
        self.caches.values()
    }

    pub fn statement_ids(&self) -> impl Iterator<Item = &str> {
        self.statements.keys().map(String::as_str)
    }
}

/// Collects definitions and validates their cross references in `build`.
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    settings: Settings,
    type_handlers: Option<Arc<TypeHandlerRegistry>>,
    caches: Vec<(String, CacheConfig)>,
    result_maps: Vec<ResultMap>,
    statements: Vec<MappedStatementBuilder>,
}

impl ConfigurationBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Use this registry instead of the process-wide one.
    pub fn type_handlers(mut self, registry: Arc<TypeHandlerRegistry>) -> Self {
        self.type_handlers = Some(registry);
        self
    }

    /// Declare a second-level cache for a statement group.
    pub fn cache(mut self, namespace: impl Into<String>, config: CacheConfig) -> Self {
        self.caches.push((namespace.into(), config));
        self
    }

    pub fn result_map(mut self, result_map: ResultMap) -> Self {
        self.result_maps.push(result_map);
        self
    }

    pub fn statement(mut self, statement: MappedStatementBuilder) -> Self {
        self.statements.push(statement);
        self
    }

    /// Validate every reference and freeze the registry.
    pub fn build(self) -> Result<Arc<Configuration>> {
        let type_handlers = self.type_handlers.unwrap_or_else(TypeHandlerRegistry::global);

        let mut caches = HashMap::new();
        for (namespace, config) in &self.caches {
            if caches.contains_key(namespace) {
                return Err(Error::config(format!("Cache '{}' is declared twice", namespace)));
            }
            caches.insert(namespace.clone(), config.build(namespace));
        }

        let mut result_maps: HashMap<String, Arc<ResultMap>> = HashMap::new();
        for rm in self.result_maps {
            if result_maps.contains_key(rm.id()) {
                return Err(Error::config(format!("Result map '{}' is declared twice", rm.id())));
            }
            result_maps.insert(rm.id().to_string(), Arc::new(rm));
        }

        let statement_ids: Vec<&str> = self.statements.iter().map(MappedStatementBuilder::id).collect();
        for rm in result_maps.values() {
            check_result_map(rm, &result_maps, &statement_ids, &type_handlers)?;
        }

        let mut statements = HashMap::new();
        for builder in self.statements {
            if statements.contains_key(&builder.id) {
                return Err(Error::config(format!("Mapped statement '{}' is declared twice", builder.id)));
            }
            check_parameter_handlers(&builder.id, &builder.sql_source, &type_handlers)?;
            let statement = resolve_statement(builder, &result_maps, &caches, &self.settings)?;
            statements.insert(statement.id.clone(), Arc::new(statement));
        }

        tracing::debug!(
            statements = statements.len(),
            result_maps = result_maps.len(),
            caches = caches.len(),
            "built mapping configuration"
        );

        Ok(Arc::new(Configuration {
            settings: self.settings,
            type_handlers,
            statements,
            result_maps,
            caches,
        }))
    }
}

fn check_result_map(
    rm: &ResultMap,
    result_maps: &HashMap<String, Arc<ResultMap>>,
    statement_ids: &[&str],
    registry: &TypeHandlerRegistry,
) -> Result<()> {
    for mapping in rm.mappings() {
        if let Some(name) = &mapping.type_handler {
            if registry.by_name(name).is_none() {
                return Err(Error::config(format!(
                    "Result map '{}' references unknown type handler '{}'",
                    rm.id(),
                    name
                )));
            }
        }
        if let Some(select) = &mapping.nested_select {
            if !statement_ids.contains(&select.as_str()) {
                return Err(Error::config(format!(
                    "Result map '{}' property '{}' references unknown statement '{}'",
                    rm.id(),
                    mapping.property,
                    select
                )));
            }
        }
    }
    if let Some(discriminator) = rm.get_discriminator() {
        for target in discriminator.cases.values() {
            if !result_maps.contains_key(target) {
                return Err(Error::config(format!(
                    "Result map '{}' discriminates to unknown result map '{}'",
                    rm.id(),
                    target
                )));
            }
        }
    }
    Ok(())
}

fn check_parameter_handlers(id: &str, source: &SqlSource, registry: &TypeHandlerRegistry) -> Result<()> {
    let SqlSource::Static(source) = source else {
        return Ok(());
    };
    for mapping in source.parameter_mappings() {
        if let Some(name) = &mapping.type_handler {
            if registry.by_name(name).is_none() {
                return Err(Error::config(format!(
                    "Statement '{}' parameter '{}' references unknown type handler '{}'",
                    id, mapping.property, name
                )));
            }
        }
    }
    Ok(())
}

fn resolve_statement(
    builder: MappedStatementBuilder,
    result_maps: &HashMap<String, Arc<ResultMap>>,
    caches: &HashMap<String, SharedCache>,
    settings: &Settings,
) -> Result<MappedStatement> {
    let mut maps = Vec::with_capacity(builder.result_map_ids.len() + 1);
    for id in &builder.result_map_ids {
        let rm = result_maps.get(id).ok_or_else(|| {
            Error::config(format!(
                "Statement '{}' references unknown result map '{}'",
                builder.id, id
            ))
        })?;
        maps.push(Arc::clone(rm));
    }
    if let Some(result_type) = builder.result_type {
        if !maps.is_empty() {
            return Err(Error::config(format!(
                "Statement '{}' declares both a result map and a result type",
                builder.id
            )));
        }
        maps.push(Arc::new(ResultMap::inline(&builder.id, result_type)));
    }

    let cache = match &builder.cache_ref {
        Some(namespace) => {
            let cache = caches.get(namespace).ok_or_else(|| {
                Error::config(format!(
                    "Statement '{}' references unknown cache '{}'",
                    builder.id, namespace
                ))
            })?;
            settings.cache_enabled.then(|| Arc::clone(cache))
        }
        None => None,
    };

    Ok(MappedStatement {
        id: builder.id,
        command: builder.command,
        statement_type: builder.statement_type,
        sql_source: builder.sql_source,
        result_maps: maps,
        parameter_type: builder.parameter_type,
        use_cache: builder.use_cache,
        flush_cache: builder.flush_cache,
        fetch_size: builder.fetch_size.or(settings.default_fetch_size),
        timeout: builder.timeout.or_else(|| settings.default_statement_timeout_duration()),
        key_generator: builder.key_generator,
        cache,
    })
}
