//! Statement and result-shape definitions.
//!
//! These are registered once on a `ConfigurationBuilder` and shared
//! read-only afterwards.

use sqlmapper_cache::SharedCache;
use sqlmapper_core::{JdbcType, Object, Result, RustType};
use sqlmapper_dynamic::{BoundSql, SqlSource};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Statements
// ============================================================================

/// What a statement does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlCommandType {
    Select,
    Insert,
    Update,
    Delete,
    Flush,
}

impl SqlCommandType {
    pub fn is_select(self) -> bool {
        matches!(self, SqlCommandType::Select)
    }
}

/// How a statement is sent to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementType {
    Statement,
    #[default]
    Prepared,
    Callable,
}

/// Where generated keys go after an insert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyGenerator {
    #[default]
    None,
    /// Read the driver's generated key and store it at `key_property`.
    Generated {
        key_property: String,
        key_column: Option<String>,
    },
}

impl KeyGenerator {
    pub fn generated(key_property: impl Into<String>) -> Self {
        KeyGenerator::Generated {
            key_property: key_property.into(),
            key_column: None,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, KeyGenerator::Generated { .. })
    }
}

/// Paging applied while mapping rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: usize = 0;
    pub const NO_ROW_LIMIT: usize = usize::MAX;

    pub const DEFAULT: RowBounds = RowBounds {
        offset: Self::NO_ROW_OFFSET,
        limit: Self::NO_ROW_LIMIT,
    };

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// An immutable, registered statement.
#[derive(Debug)]
pub struct MappedStatement {
    pub(crate) id: String,
    pub(crate) command: SqlCommandType,
    pub(crate) statement_type: StatementType,
    pub(crate) sql_source: SqlSource,
    pub(crate) result_maps: Vec<Arc<ResultMap>>,
    pub(crate) parameter_type: Option<RustType>,
    pub(crate) use_cache: bool,
    pub(crate) flush_cache: bool,
    pub(crate) fetch_size: Option<u32>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) key_generator: KeyGenerator,
    pub(crate) cache: Option<SharedCache>,
}

impl MappedStatement {
    /// Start defining a statement.
    pub fn builder(id: impl Into<String>, command: SqlCommandType, sql_source: SqlSource) -> MappedStatementBuilder {
        MappedStatementBuilder::new(id, command, sql_source)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> SqlCommandType {
        self.command
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn sql_source(&self) -> &SqlSource {
        &self.sql_source
    }

    pub fn result_maps(&self) -> &[Arc<ResultMap>] {
        &self.result_maps
    }

    pub fn parameter_type(&self) -> Option<&RustType> {
        self.parameter_type.as_ref()
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn flush_cache(&self) -> bool {
        self.flush_cache
    }

    pub fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn key_generator(&self) -> &KeyGenerator {
        &self.key_generator
    }

    /// The shared cache of this statement's group, if it has one.
    pub fn cache(&self) -> Option<&SharedCache> {
        self.cache.as_ref()
    }

    /// Does any result map of this statement run nested selects?
    pub fn has_nested_queries(&self) -> bool {
        self.result_maps.iter().any(|rm| rm.has_nested_queries())
    }

    /// Compose the SQL for one call.
    pub fn bound_sql(&self, parameter: &Object, database_id: Option<&str>) -> Result<BoundSql> {
        self.sql_source.bound_sql_for(parameter, database_id)
    }
}

/// Builder for `MappedStatement`. References to result maps and caches are
/// resolved by `ConfigurationBuilder::build`.
#[derive(Debug)]
pub struct MappedStatementBuilder {
    pub(crate) id: String,
    pub(crate) command: SqlCommandType,
    pub(crate) statement_type: StatementType,
    pub(crate) sql_source: SqlSource,
    pub(crate) result_map_ids: Vec<String>,
    pub(crate) result_type: Option<RustType>,
    pub(crate) parameter_type: Option<RustType>,
    pub(crate) use_cache: bool,
    pub(crate) flush_cache: bool,
    pub(crate) fetch_size: Option<u32>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) key_generator: KeyGenerator,
    pub(crate) cache_ref: Option<String>,
}

impl MappedStatementBuilder {
    fn new(id: impl Into<String>, command: SqlCommandType, sql_source: SqlSource) -> Self {
        let is_select = command.is_select();
        Self {
            id: id.into(),
            command,
            statement_type: StatementType::Prepared,
            sql_source,
            result_map_ids: Vec::new(),
            result_type: None,
            parameter_type: None,
            use_cache: is_select,
            flush_cache: !is_select,
            fetch_size: None,
            timeout: None,
            key_generator: KeyGenerator::None,
            cache_ref: None,
        }
    }

    pub fn statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement_type = statement_type;
        self
    }

    /// Map rows with a registered result map. May be repeated.
    pub fn result_map(mut self, id: impl Into<String>) -> Self {
        self.result_map_ids.push(id.into());
        self
    }

    /// Map rows by auto-mapping into `result_type`.
    pub fn result_type(mut self, result_type: RustType) -> Self {
        self.result_type = Some(result_type);
        self
    }

    pub fn parameter_type(mut self, parameter_type: RustType) -> Self {
        self.parameter_type = Some(parameter_type);
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn flush_cache(mut self, flush_cache: bool) -> Self {
        self.flush_cache = flush_cache;
        self
    }

    pub fn fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn key_generator(mut self, key_generator: KeyGenerator) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// Attach the statement to a cache namespace declared on the configuration.
    pub fn cache(mut self, namespace: impl Into<String>) -> Self {
        self.cache_ref = Some(namespace.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Result maps
// ============================================================================

/// Per-result-map override of auto-mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMapping {
    Enabled,
    Disabled,
}

/// Maps one column (or a nested select) onto one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMapping {
    pub property: String,
    pub column: Option<String>,
    pub rust_type: Option<RustType>,
    pub jdbc_type: Option<JdbcType>,
    pub type_handler: Option<String>,
    /// Statement id of a nested select filling this property.
    pub nested_select: Option<String>,
    /// `(parameter property, column)` pairs for a multi-column nested select.
    pub composites: Vec<(String, String)>,
    /// The nested select fills a list rather than a single object.
    pub collection: bool,
    /// Part of the row's identity.
    pub id: bool,
}

impl ResultMapping {
    pub fn new(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column: Some(column.into()),
            rust_type: None,
            jdbc_type: None,
            type_handler: None,
            nested_select: None,
            composites: Vec::new(),
            collection: false,
            id: false,
        }
    }

    /// An identity column mapping.
    pub fn id(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            id: true,
            ..Self::new(property, column)
        }
    }

    /// A property filled by running `statement_id` with the value of `column`.
    pub fn nested(property: impl Into<String>, column: impl Into<String>, statement_id: impl Into<String>) -> Self {
        Self {
            nested_select: Some(statement_id.into()),
            ..Self::new(property, column)
        }
    }

    /// A property filled by running `statement_id` with a map built from
    /// several columns.
    pub fn nested_composite(
        property: impl Into<String>,
        composites: &[(&str, &str)],
        statement_id: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            column: None,
            nested_select: Some(statement_id.into()),
            composites: composites
                .iter()
                .map(|(p, c)| ((*p).to_string(), (*c).to_string()))
                .collect(),
            ..Self::new("", "")
        }
    }

    pub fn rust_type(mut self, rust_type: RustType) -> Self {
        self.rust_type = Some(rust_type);
        self
    }

    pub fn jdbc_type(mut self, jdbc_type: JdbcType) -> Self {
        self.jdbc_type = Some(jdbc_type);
        self
    }

    pub fn type_handler(mut self, name: impl Into<String>) -> Self {
        self.type_handler = Some(name.into());
        self
    }

    pub fn collection(mut self, collection: bool) -> Self {
        self.collection = collection;
        self
    }

    /// Columns this mapping consumes, upper-cased.
    fn consumed_columns(&self) -> impl Iterator<Item = String> + '_ {
        self.column
            .iter()
            .map(|c| c.to_ascii_uppercase())
            .chain(self.composites.iter().map(|(_, c)| c.to_ascii_uppercase()))
    }
}

/// Picks a result map per row from a column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminator {
    pub column: String,
    pub rust_type: Option<RustType>,
    pub jdbc_type: Option<JdbcType>,
    /// Column value (as text) to result map id.
    pub cases: BTreeMap<String, String>,
}

impl Discriminator {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            rust_type: None,
            jdbc_type: None,
            cases: BTreeMap::new(),
        }
    }

    pub fn case(mut self, value: impl Into<String>, result_map: impl Into<String>) -> Self {
        self.cases.insert(value.into(), result_map.into());
        self
    }

    pub fn rust_type(mut self, rust_type: RustType) -> Self {
        self.rust_type = Some(rust_type);
        self
    }
}

/// How rows become objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMap {
    id: String,
    result_type: RustType,
    mappings: Vec<ResultMapping>,
    discriminator: Option<Discriminator>,
    auto_mapping: Option<AutoMapping>,
    mapped_columns: HashSet<String>,
}

impl ResultMap {
    pub fn new(id: impl Into<String>, result_type: RustType) -> Self {
        Self {
            id: id.into(),
            result_type,
            mappings: Vec::new(),
            discriminator: None,
            auto_mapping: None,
            mapped_columns: HashSet::new(),
        }
    }

    /// The implicit map behind a statement's `result_type`.
    pub(crate) fn inline(statement_id: &str, result_type: RustType) -> Self {
        Self::new(format!("{}-Inline", statement_id), result_type)
    }

    pub fn mapping(mut self, mapping: ResultMapping) -> Self {
        self.mapped_columns.extend(mapping.consumed_columns());
        self.mappings.push(mapping);
        self
    }

    pub fn discriminator(mut self, discriminator: Discriminator) -> Self {
        self.mapped_columns.insert(discriminator.column.to_ascii_uppercase());
        self.discriminator = Some(discriminator);
        self
    }

    pub fn auto_mapping(mut self, auto_mapping: AutoMapping) -> Self {
        self.auto_mapping = Some(auto_mapping);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn result_type(&self) -> &RustType {
        &self.result_type
    }

    pub fn mappings(&self) -> &[ResultMapping] {
        &self.mappings
    }

    pub fn get_discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn auto_mapping_override(&self) -> Option<AutoMapping> {
        self.auto_mapping
    }

    /// Is this column consumed by an explicit mapping? Case-insensitive.
    pub fn is_mapped_column(&self, column: &str) -> bool {
        self.mapped_columns.contains(&column.to_ascii_uppercase())
    }

    pub fn has_nested_queries(&self) -> bool {
        self.mappings.iter().any(|m| m.nested_select.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_and_write_defaults() {
        let source = SqlSource::from_sql("SELECT 1").unwrap();
        let select = MappedStatement::builder("a", SqlCommandType::Select, source.clone());
        assert!(select.use_cache);
        assert!(!select.flush_cache);
        let update = MappedStatement::builder("b", SqlCommandType::Update, source);
        assert!(!update.use_cache);
        assert!(update.flush_cache);
    }

    #[test]
    fn result_map_tracks_mapped_columns() {
        let rm = ResultMap::new("user", RustType::Object)
            .mapping(ResultMapping::id("id", "user_id"))
            .mapping(ResultMapping::nested_composite("dept", &[("id", "dept_id"), ("org", "ORG")], "dept.find"))
            .discriminator(Discriminator::new("kind").case("1", "admin"));
        assert!(rm.is_mapped_column("USER_ID"));
        assert!(rm.is_mapped_column("dept_id"));
        assert!(rm.is_mapped_column("org"));
        assert!(rm.is_mapped_column("Kind"));
        assert!(!rm.is_mapped_column("name"));
        assert!(rm.has_nested_queries());
    }

    #[test]
    fn row_bounds_default() {
        assert!(RowBounds::default().is_default());
        assert!(!RowBounds::new(1, 10).is_default());
    }
}
