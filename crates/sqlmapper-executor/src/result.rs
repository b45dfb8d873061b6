//! Row-to-object mapping.
//!
//! A `ResultSetWrapper` sits over the column metadata of one result set and
//! caches the type handler chosen for each `(property type, column)` pair.
//! `ResultMapper` applies a result map to each row: discriminator, explicit
//! mappings, nested selects, then auto-mapping of the remaining columns.

use crate::config::{AutoMappingBehavior, Configuration};
use crate::mapping::{AutoMapping, MappedStatement, ResultMap, ResultMapping, RowBounds};
use sqlmapper_cache::CachedResult;
use sqlmapper_core::error::ExecutorErrorKind;
use sqlmapper_core::{ColumnInfo, Error, JdbcType, Object, ObjectMap, Result, Row, RustType, TypeHandler, TypeHandlerRegistry, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// Result handlers
// ============================================================================

/// The row handed to a `ResultHandler`.
#[derive(Debug)]
pub struct ResultContext {
    object: Object,
    count: usize,
    stopped: bool,
}

impl ResultContext {
    fn new() -> Self {
        Self {
            object: Object::null(),
            count: 0,
            stopped: false,
        }
    }

    fn next(&mut self, object: Object) {
        self.object = object;
        self.count += 1;
    }

    /// The mapped object of the current row.
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// Take ownership of the current row's object.
    pub fn take_object(&mut self) -> Object {
        std::mem::replace(&mut self.object, Object::null())
    }

    /// Rows delivered so far, including the current one.
    pub fn result_count(&self) -> usize {
        self.count
    }

    /// Stop fetching after this row.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Receives mapped rows one at a time instead of collecting a list.
pub trait ResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext);
}

impl<F> ResultHandler for F
where
    F: FnMut(&mut ResultContext),
{
    fn handle_result(&mut self, context: &mut ResultContext) {
        self(context);
    }
}

/// Collects every row into a list.
#[derive(Debug, Default)]
pub struct DefaultResultHandler {
    results: Vec<Object>,
}

impl DefaultResultHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[Object] {
        &self.results
    }

    pub fn into_results(self) -> Vec<Object> {
        self.results
    }
}

impl ResultHandler for DefaultResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext) {
        self.results.push(context.take_object());
    }
}

/// Runs the nested selects named by result mappings.
pub trait NestedQuery {
    fn query_nested(&mut self, statement: &MappedStatement, parameter: &Object) -> Result<CachedResult>;
}

/// Nested selects in a context that cannot run them.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NoNestedQueries;

impl NestedQuery for NoNestedQueries {
    fn query_nested(&mut self, statement: &MappedStatement, _parameter: &Object) -> Result<CachedResult> {
        Err(Error::config(format!(
            "Nested select '{}' cannot run while streaming a cursor",
            statement.id()
        )))
    }
}

// ============================================================================
// Result set wrapper
// ============================================================================

/// Column metadata of one result set plus the handlers resolved for it.
#[derive(Debug)]
pub struct ResultSetWrapper {
    columns: Arc<ColumnInfo>,
    registry: Arc<TypeHandlerRegistry>,
    handlers: HashMap<(RustType, String), Arc<dyn TypeHandler>>,
}

impl ResultSetWrapper {
    pub fn new(columns: Arc<ColumnInfo>, registry: Arc<TypeHandlerRegistry>) -> Self {
        Self {
            columns,
            registry,
            handlers: HashMap::new(),
        }
    }

    pub fn columns(&self) -> &ColumnInfo {
        &self.columns
    }

    /// Handler for reading `column` into `property_type`.
    ///
    /// Tries the declared property type, then the column's native type,
    /// then the JDBC type alone, and finally the pass-through handler. The
    /// choice is cached per `(property type, column)`.
    pub fn handler_for(
        &mut self,
        property_type: &RustType,
        column: &str,
        declared_jdbc: Option<JdbcType>,
    ) -> Arc<dyn TypeHandler> {
        let key = (property_type.clone(), column.to_ascii_uppercase());
        if let Some(handler) = self.handlers.get(&key) {
            return Arc::clone(handler);
        }

        let jdbc = declared_jdbc.unwrap_or_else(|| self.columns.jdbc_type_of(column));
        let jdbc = (jdbc != JdbcType::Undefined).then_some(jdbc);
        let handler = Some(property_type)
            .filter(|t| **t != RustType::Object)
            .and_then(|t| self.registry.resolve(t, jdbc))
            .or_else(|| {
                let native = self.columns.native_type_of(column);
                if native == RustType::Object {
                    None
                } else {
                    self.registry.resolve(&native, jdbc)
                }
            })
            .or_else(|| jdbc.and_then(|j| self.registry.by_jdbc(j)))
            .unwrap_or_else(|| self.registry.object_handler());

        tracing::trace!(column, property_type = %property_type, handler = handler.name(), "resolved column handler");
        self.handlers.insert(key, Arc::clone(&handler));
        handler
    }

    /// Number of `(property type, column)` pairs resolved so far.
    pub fn resolved_handlers(&self) -> usize {
        self.handlers.len()
    }
}

// ============================================================================
// Result mapper
// ============================================================================

/// Maps the rows of one result set.
#[derive(Debug)]
pub struct ResultMapper {
    config: Arc<Configuration>,
    wrapper: ResultSetWrapper,
}

impl ResultMapper {
    pub fn new(config: Arc<Configuration>, columns: Arc<ColumnInfo>) -> Self {
        let registry = Arc::clone(config.type_handlers());
        Self {
            config,
            wrapper: ResultSetWrapper::new(columns, registry),
        }
    }

    pub fn wrapper(&self) -> &ResultSetWrapper {
        &self.wrapper
    }

    /// The single result map a statement maps rows with.
    ///
    /// Multiple result sets are not supported, so only the first map is used.
    pub fn result_map_for(statement: &MappedStatement) -> Result<Arc<ResultMap>> {
        statement.result_maps().first().cloned().ok_or_else(|| {
            Error::config(format!(
                "A query was run for statement '{}' but it declares no result map or result type",
                statement.id()
            ))
        })
    }

    /// Pull rows from `next_row`, skipping and limiting per `bounds`, and
    /// hand each mapped object to `handler`.
    pub fn handle_rows(
        &mut self,
        result_map: &Arc<ResultMap>,
        bounds: RowBounds,
        mut next_row: impl FnMut() -> Result<Option<Row>>,
        nested: &mut dyn NestedQuery,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        for _ in 0..bounds.offset {
            if next_row()?.is_none() {
                return Ok(());
            }
        }
        let mut context = ResultContext::new();
        while context.result_count() < bounds.limit && !context.is_stopped() {
            let Some(row) = next_row()? else {
                break;
            };
            let object = self.map_row(&row, result_map, nested)?;
            context.next(object);
            handler.handle_result(&mut context);
        }
        Ok(())
    }

    /// Map one row.
    pub fn map_row(&mut self, row: &Row, result_map: &Arc<ResultMap>, nested: &mut dyn NestedQuery) -> Result<Object> {
        let result_map = self.resolve_discriminated(row, result_map)?;
        if self.is_simple(&result_map) {
            return self.map_simple(row, &result_map);
        }

        let mut object = Object::map();
        let mut found = false;
        for mapping in result_map.mappings() {
            let value = if mapping.nested_select.is_some() {
                self.nested_value(row, mapping, nested)?
            } else {
                self.column_value(row, mapping)?
            };
            if let Some(value) = value.filter(|v| !v.is_null()) {
                object.set_path(&mapping.property, value)?;
                found = true;
            }
        }

        if self.auto_mapping_enabled(&result_map) {
            found |= self.auto_map(row, &result_map, &mut object)?;
        }

        Ok(if found { object } else { Object::null() })
    }

    fn is_simple(&self, result_map: &ResultMap) -> bool {
        result_map.mappings().is_empty()
            && result_map.get_discriminator().is_none()
            && *result_map.result_type() != RustType::Object
            && self.config.type_handlers().has_handler(result_map.result_type())
    }

    fn map_simple(&mut self, row: &Row, result_map: &ResultMap) -> Result<Object> {
        let columns = row.column_info();
        let (Some(name), Some(value)) = (columns.name_at(0), row.get(0)) else {
            return Ok(Object::null());
        };
        let handler = self.wrapper.handler_for(result_map.result_type(), name, None);
        Ok(Object::Value(handler.get_result(value.clone(), name)?))
    }

    fn resolve_discriminated(&mut self, row: &Row, result_map: &Arc<ResultMap>) -> Result<Arc<ResultMap>> {
        let mut current = Arc::clone(result_map);
        let mut visited = HashSet::new();
        visited.insert(current.id().to_string());
        while let Some(discriminator) = current.get_discriminator() {
            let raw = row.get_by_name(&discriminator.column).cloned().unwrap_or(Value::Null);
            let property_type = discriminator.rust_type.clone().unwrap_or(RustType::Object);
            let handler = self
                .wrapper
                .handler_for(&property_type, &discriminator.column, discriminator.jdbc_type);
            let value = handler.get_result(raw, &discriminator.column)?;
            let Some(target) = discriminator.cases.get(&value.to_string()) else {
                break;
            };
            if !visited.insert(target.clone()) {
                break;
            }
            tracing::trace!(from = current.id(), to = %target, "discriminated result map");
            current = self.config.result_map(target)?;
        }
        Ok(current)
    }

    fn column_value(&mut self, row: &Row, mapping: &ResultMapping) -> Result<Option<Object>> {
        let Some(column) = &mapping.column else {
            return Ok(None);
        };
        let Some(raw) = row.get_by_name(column) else {
            return Ok(None);
        };
        let handler = match &mapping.type_handler {
            Some(name) => self
                .config
                .type_handlers()
                .by_name(name)
                .ok_or_else(|| Error::config(format!("Unknown type handler '{}'", name)))?,
            None => {
                let property_type = mapping.rust_type.clone().unwrap_or(RustType::Object);
                self.wrapper.handler_for(&property_type, column, mapping.jdbc_type)
            }
        };
        Ok(Some(Object::Value(handler.get_result(raw.clone(), column)?)))
    }

    fn nested_value(
        &mut self,
        row: &Row,
        mapping: &ResultMapping,
        nested: &mut dyn NestedQuery,
    ) -> Result<Option<Object>> {
        let Some(select) = &mapping.nested_select else {
            return Ok(None);
        };
        let parameter = if mapping.composites.is_empty() {
            let column = mapping.column.as_deref().unwrap_or_default();
            Object::Value(row.get_by_name(column).cloned().unwrap_or(Value::Null))
        } else {
            let mut map = ObjectMap::new();
            for (property, column) in &mapping.composites {
                let value = row.get_by_name(column).cloned().unwrap_or(Value::Null);
                if !value.is_null() {
                    map.insert(property.clone(), Object::Value(value));
                }
            }
            if map.is_empty() { Object::null() } else { Object::Map(map) }
        };
        if parameter.is_null() {
            return Ok(None);
        }

        let statement = self.config.mapped_statement(select)?;
        let results = nested.query_nested(&statement, &parameter)?;
        if mapping.collection {
            return Ok(Some(Object::List(results.to_vec())));
        }
        match results.len() {
            0 => Ok(None),
            1 => Ok(results.first().cloned()),
            n => Err(Error::executor(
                ExecutorErrorKind::TooManyResults,
                format!(
                    "Nested select '{}' for property '{}' returned {} rows, expected one",
                    select, mapping.property, n
                ),
            )),
        }
    }

    fn auto_mapping_enabled(&self, result_map: &ResultMap) -> bool {
        match result_map.auto_mapping_override() {
            Some(AutoMapping::Enabled) => true,
            Some(AutoMapping::Disabled) => false,
            None => self.config.settings().auto_mapping_behavior != AutoMappingBehavior::None,
        }
    }

    fn auto_map(&mut self, row: &Row, result_map: &ResultMap, object: &mut Object) -> Result<bool> {
        let camel = self.config.settings().map_underscore_to_camel_case;
        let mut found = false;
        for (column, raw) in row.iter() {
            if result_map.is_mapped_column(column) || raw.is_null() {
                continue;
            }
            let property = if camel { underscore_to_camel(column) } else { column.to_string() };
            if object.has_key(&property) {
                continue;
            }
            let handler = self.wrapper.handler_for(&RustType::Object, column, None);
            let value = handler.get_result(raw.clone(), column)?;
            if !value.is_null() {
                object.set(property, value);
                found = true;
            }
        }
        Ok(found)
    }
}

/// `user_name` → `userName`, `USER_ID` → `userId`.
pub fn underscore_to_camel(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut upper_next = false;
    for c in column.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::mapping::{Discriminator, SqlCommandType};
    use sqlmapper_dynamic::SqlSource;

    struct Lookup(HashMap<String, Vec<Object>>);

    impl NestedQuery for Lookup {
        fn query_nested(&mut self, statement: &MappedStatement, parameter: &Object) -> Result<CachedResult> {
            let key = format!("{}:{}", statement.id(), parameter.to_json());
            Ok(Arc::new(self.0.get(&key).cloned().unwrap_or_default()))
        }
    }

    fn columns(names: &[&str], types: &[JdbcType]) -> Arc<ColumnInfo> {
        Arc::new(ColumnInfo::with_types(
            names.iter().map(|s| (*s).to_string()).collect(),
            types.to_vec(),
        ))
    }

    fn row(columns: &Arc<ColumnInfo>, values: Vec<Value>) -> Row {
        Row::with_columns(Arc::clone(columns), values)
    }

    #[test]
    fn handler_resolution_falls_back_and_caches() {
        let registry = Arc::new(TypeHandlerRegistry::default());
        let cols = columns(&["id", "blob", "misc"], &[JdbcType::BigInt, JdbcType::Blob, JdbcType::Undefined]);
        let mut wrapper = ResultSetWrapper::new(cols, registry);

        assert_eq!(wrapper.handler_for(&RustType::String, "id", None).name(), "StringTypeHandler");
        assert_eq!(wrapper.handler_for(&RustType::Object, "id", None).name(), "I64TypeHandler");
        assert_eq!(wrapper.handler_for(&RustType::Object, "blob", None).name(), "BytesTypeHandler");
        assert_eq!(wrapper.handler_for(&RustType::Object, "misc", None).name(), "ObjectTypeHandler");
        assert_eq!(wrapper.resolved_handlers(), 4);

        wrapper.handler_for(&RustType::Object, "ID", None);
        assert_eq!(wrapper.resolved_handlers(), 4);
    }

    #[test]
    fn explicit_and_auto_mapping() {
        let config = Configuration::builder()
            .settings(Settings::new().map_underscore_to_camel_case(true))
            .build()
            .unwrap();
        let rm = Arc::new(
            ResultMap::new("user", RustType::Object)
                .mapping(ResultMapping::id("id", "user_id").rust_type(RustType::I64))
                .mapping(ResultMapping::new("address.city", "city")),
        );
        let cols = columns(
            &["user_id", "city", "first_name", "nick"],
            &[JdbcType::Varchar, JdbcType::Varchar, JdbcType::Varchar, JdbcType::Varchar],
        );
        let mut mapper = ResultMapper::new(Arc::clone(&config), Arc::clone(&cols));
        let obj = mapper
            .map_row(
                &row(&cols, vec!["7".into(), "Oslo".into(), "Ada".into(), Value::Null]),
                &rm,
                &mut NoNestedQueries,
            )
            .unwrap();
        assert_eq!(obj.path("id"), Some(&Object::from(7i64)));
        assert_eq!(obj.path("address.city"), Some(&Object::from("Oslo")));
        assert_eq!(obj.path("firstName"), Some(&Object::from("Ada")));
        assert!(!obj.has_key("nick"));
    }

    #[test]
    fn all_null_row_maps_to_null() {
        let config = Configuration::builder().build().unwrap();
        let rm = Arc::new(ResultMap::new("r", RustType::Object));
        let cols = columns(&["a"], &[JdbcType::Integer]);
        let mut mapper = ResultMapper::new(Arc::clone(&config), Arc::clone(&cols));
        let obj = mapper.map_row(&row(&cols, vec![Value::Null]), &rm, &mut NoNestedQueries).unwrap();
        assert!(obj.is_null());
    }

    #[test]
    fn simple_result_type_reads_first_column() {
        let config = Configuration::builder().build().unwrap();
        let rm = Arc::new(ResultMap::new("count", RustType::I32));
        let cols = columns(&["n", "other"], &[JdbcType::BigInt, JdbcType::Varchar]);
        let mut mapper = ResultMapper::new(Arc::clone(&config), Arc::clone(&cols));
        let obj = mapper
            .map_row(&row(&cols, vec![Value::BigInt(3), "x".into()]), &rm, &mut NoNestedQueries)
            .unwrap();
        assert_eq!(obj, Object::Value(Value::Int(3)));
    }

    #[test]
    fn discriminator_switches_result_map() {
        let config = Configuration::builder()
            .result_map(
                ResultMap::new("vehicle", RustType::Object)
                    .mapping(ResultMapping::new("id", "id"))
                    .discriminator(Discriminator::new("kind").case("car", "car")),
            )
            .result_map(
                ResultMap::new("car", RustType::Object)
                    .mapping(ResultMapping::new("id", "id"))
                    .mapping(ResultMapping::new("doors", "extra"))
                    .auto_mapping(AutoMapping::Disabled),
            )
            .build()
            .unwrap();
        let vehicle = config.result_map("vehicle").unwrap();
        let cols = columns(&["id", "kind", "extra"], &[JdbcType::Integer, JdbcType::Varchar, JdbcType::Integer]);
        let mut mapper = ResultMapper::new(Arc::clone(&config), Arc::clone(&cols));

        let car = mapper
            .map_row(&row(&cols, vec![Value::Int(1), "car".into(), Value::Int(4)]), &vehicle, &mut NoNestedQueries)
            .unwrap();
        assert_eq!(car.path("doors"), Some(&Object::from(4i32)));
        assert!(!car.has_key("kind"));

        let truck = mapper
            .map_row(&row(&cols, vec![Value::Int(2), "truck".into(), Value::Int(9)]), &vehicle, &mut NoNestedQueries)
            .unwrap();
        assert!(!truck.has_key("doors"));
        assert_eq!(truck.path("extra"), Some(&Object::from(9i32)));
    }

    #[test]
    fn nested_selects_single_and_collection() {
        let config = Configuration::builder()
            .statement(
                MappedStatement::builder("dept.find", SqlCommandType::Select, SqlSource::from_sql("SELECT 1").unwrap())
                    .result_type(RustType::Object),
            )
            .build()
            .unwrap();
        let mut lookup = Lookup(HashMap::new());
        lookup.0.insert(
            "dept.find:10".into(),
            vec![[("name", "R&D")].into_iter().collect()],
        );
        lookup.0.insert(
            "dept.find:20".into(),
            vec![Object::from(1i64), Object::from(2i64)],
        );

        let single = Arc::new(
            ResultMap::new("emp", RustType::Object).mapping(ResultMapping::nested("dept", "dept_id", "dept.find")),
        );
        let many = Arc::new(
            ResultMap::new("emp", RustType::Object)
                .mapping(ResultMapping::nested("depts", "dept_id", "dept.find").collection(true)),
        );
        let cols = columns(&["dept_id"], &[JdbcType::BigInt]);
        let mut mapper = ResultMapper::new(Arc::clone(&config), Arc::clone(&cols));

        let obj = mapper.map_row(&row(&cols, vec![Value::BigInt(10)]), &single, &mut lookup).unwrap();
        assert_eq!(obj.path("dept.name"), Some(&Object::from("R&D")));

        let obj = mapper.map_row(&row(&cols, vec![Value::BigInt(20)]), &many, &mut lookup).unwrap();
        assert_eq!(obj.path("depts").and_then(Object::as_list).map(<[Object]>::len), Some(2));

        let err = mapper.map_row(&row(&cols, vec![Value::BigInt(20)]), &single, &mut lookup).unwrap_err();
        assert!(matches!(err, Error::Executor(_)));
    }

    #[test]
    fn bounds_and_stop() {
        let config = Configuration::builder().build().unwrap();
        let rm = Arc::new(ResultMap::new("n", RustType::I64));
        let cols = columns(&["n"], &[JdbcType::BigInt]);
        let rows: Vec<Row> = (1..=10).map(|i| row(&cols, vec![Value::BigInt(i)])).collect();

        let mut source = rows.clone().into_iter();
        let mut collected = DefaultResultHandler::new();
        ResultMapper::new(Arc::clone(&config), Arc::clone(&cols))
            .handle_rows(&rm, RowBounds::new(2, 3), || Ok(source.next()), &mut NoNestedQueries, &mut collected)
            .unwrap();
        let got: Vec<_> = collected.results().iter().map(|o| o.as_value().and_then(Value::as_i64)).collect();
        assert_eq!(got, vec![Some(3), Some(4), Some(5)]);

        let mut source = rows.into_iter();
        let mut seen = 0;
        let mut stop_after_two = |ctx: &mut ResultContext| {
            seen += 1;
            if ctx.result_count() == 2 {
                ctx.stop();
            }
        };
        ResultMapper::new(Arc::clone(&config), cols)
            .handle_rows(&rm, RowBounds::default(), || Ok(source.next()), &mut NoNestedQueries, &mut stop_after_two)
            .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn camel_case() {
        assert_eq!(underscore_to_camel("user_name"), "userName");
        assert_eq!(underscore_to_camel("USER_ID"), "userId");
        assert_eq!(underscore_to_camel("_x"), "x");
    }
}
