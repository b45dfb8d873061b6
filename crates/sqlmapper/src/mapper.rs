//! Mapper methods: a statement bound once to a declared call shape.
//!
//! A `MapperMethod` pairs a statement id with the argument list and return
//! shape of the method that calls it. Mismatches (a row count from a select,
//! a list from an update, a result handler on a statement with nothing to
//! map) are rejected when the method is bound rather than when it runs.

use crate::params::ParamNameResolver;
use crate::session::SqlSession;
use sqlmapper_core::error::{BindingErrorKind, TypeError};
use sqlmapper_core::{BatchResult, Connection, Error, Object, ObjectMap, Result, Statement};
use sqlmapper_executor::{Configuration, Cursor, ResultHandler, RowBounds, RowCount, SqlCommandType};
use std::sync::Arc;

/// Container a `Many` method collects rows into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    List,
    Array,
    /// Equal rows collapse; the first occurrence keeps its position.
    Set,
}

/// How an update method reports affected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Int,
    Long,
    /// Whether any row was affected.
    Bool,
    Unit,
}

/// Declared return type of a mapper method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    Unit,
    /// Exactly one row.
    One,
    /// Zero or one row.
    Optional,
    Many(Collection),
    /// Rows keyed by a property.
    Map { key: String },
    Cursor,
    RowCount(CountKind),
    BatchResults,
}

/// One declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodParam {
    Named(String),
    Unnamed,
    RowBounds,
    ResultHandler,
}

/// Parameter list of a mapper method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSignature {
    params: Vec<MethodParam>,
}

impl MethodSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(MethodParam::Named(name.into()));
        self
    }

    pub fn unnamed(mut self) -> Self {
        self.params.push(MethodParam::Unnamed);
        self
    }

    pub fn row_bounds(mut self) -> Self {
        self.params.push(MethodParam::RowBounds);
        self
    }

    pub fn result_handler(mut self) -> Self {
        self.params.push(MethodParam::ResultHandler);
        self
    }

    pub fn params(&self) -> &[MethodParam] {
        &self.params
    }

    fn count(&self, special: &MethodParam) -> usize {
        self.params.iter().filter(|p| *p == special).count()
    }

    fn value_names(&self) -> Vec<Option<&str>> {
        self.params
            .iter()
            .filter_map(|p| match p {
                MethodParam::Named(name) => Some(Some(name.as_str())),
                MethodParam::Unnamed => Some(None),
                MethodParam::RowBounds | MethodParam::ResultHandler => None,
            })
            .collect()
    }
}

/// Arguments of one mapper method call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodArgs {
    values: Vec<Object>,
    bounds: Option<RowBounds>,
}

impl MethodArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Object>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn bounds(mut self, bounds: RowBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// The argument values, with generated keys applied after an insert.
    pub fn values(&self) -> &[Object] {
        &self.values
    }
}

/// What a mapper method call produced.
pub enum MethodResult<S: Statement> {
    Unit,
    One(Object),
    Optional(Option<Object>),
    Many(Vec<Object>),
    Map(ObjectMap),
    Cursor(Cursor<S>),
    Count(RowCount),
    Bool(bool),
    BatchResults(Vec<BatchResult>),
}

impl<S: Statement> MethodResult<S> {
    pub fn into_one(self) -> Option<Object> {
        match self {
            MethodResult::One(row) => Some(row),
            MethodResult::Optional(row) => row,
            _ => None,
        }
    }

    pub fn into_many(self) -> Option<Vec<Object>> {
        match self {
            MethodResult::Many(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_cursor(self) -> Option<Cursor<S>> {
        match self {
            MethodResult::Cursor(cursor) => Some(cursor),
            _ => None,
        }
    }
}

impl<S: Statement> std::fmt::Debug for MethodResult<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodResult::Unit => f.write_str("Unit"),
            MethodResult::One(row) => f.debug_tuple("One").field(row).finish(),
            MethodResult::Optional(row) => f.debug_tuple("Optional").field(row).finish(),
            MethodResult::Many(rows) => f.debug_tuple("Many").field(rows).finish(),
            MethodResult::Map(map) => f.debug_tuple("Map").field(map).finish(),
            MethodResult::Cursor(cursor) => f.debug_tuple("Cursor").field(cursor).finish(),
            MethodResult::Count(count) => f.debug_tuple("Count").field(count).finish(),
            MethodResult::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            MethodResult::BatchResults(results) => f.debug_tuple("BatchResults").field(results).finish(),
        }
    }
}

/// A statement bound to a method signature and return shape.
#[derive(Debug, Clone)]
pub struct MapperMethod {
    statement_id: String,
    command: SqlCommandType,
    shape: ReturnShape,
    resolver: ParamNameResolver,
    has_row_bounds: bool,
    has_result_handler: bool,
}

impl MapperMethod {
    /// Resolve the statement and check the signature and shape against it.
    pub fn bind(
        config: &Arc<Configuration>,
        statement_id: &str,
        signature: &MethodSignature,
        shape: ReturnShape,
    ) -> Result<Self> {
        let statement = config.mapped_statement(statement_id)?;

        for special in [MethodParam::RowBounds, MethodParam::ResultHandler] {
            if signature.count(&special) > 1 {
                return Err(Error::binding(
                    BindingErrorKind::DuplicateSpecialParameter,
                    format!("Method for '{}' cannot have multiple {:?} parameters", statement_id, special),
                ));
            }
        }
        let has_row_bounds = signature.count(&MethodParam::RowBounds) == 1;
        let has_result_handler = signature.count(&MethodParam::ResultHandler) == 1;
        let resolver = ParamNameResolver::new(&signature.value_names())?;

        let command = statement.command();
        let unsupported = || {
            Error::config(format!(
                "Mapper method for '{}' ({:?}) has an unsupported return shape: {:?}",
                statement_id, command, shape
            ))
        };
        match command {
            SqlCommandType::Select => {
                if matches!(shape, ReturnShape::RowCount(_) | ReturnShape::BatchResults) {
                    return Err(unsupported());
                }
                if has_result_handler {
                    if shape != ReturnShape::Unit {
                        return Err(Error::config(format!(
                            "Mapper method for '{}' takes a result handler and must return nothing",
                            statement_id
                        )));
                    }
                    if statement.result_maps().is_empty() {
                        return Err(Error::config(format!(
                            "Statement '{}' needs a result map or a result type so a result handler can be used",
                            statement_id
                        )));
                    }
                }
                if shape == ReturnShape::Cursor && statement.has_nested_queries() {
                    return Err(Error::config(format!(
                        "Statement '{}' uses nested selects, which cursors cannot map",
                        statement_id
                    )));
                }
            }
            SqlCommandType::Insert | SqlCommandType::Update | SqlCommandType::Delete => {
                if !matches!(shape, ReturnShape::RowCount(_) | ReturnShape::Unit) {
                    return Err(unsupported());
                }
                if has_result_handler {
                    return Err(Error::config(format!(
                        "Result handlers only apply to selects, not '{}'",
                        statement_id
                    )));
                }
            }
            SqlCommandType::Flush => {
                if !matches!(shape, ReturnShape::BatchResults | ReturnShape::Unit) {
                    return Err(unsupported());
                }
            }
        }

        Ok(Self {
            statement_id: statement_id.to_string(),
            command,
            shape,
            resolver,
            has_row_bounds,
            has_result_handler,
        })
    }

    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    pub fn command(&self) -> SqlCommandType {
        self.command
    }

    pub fn shape(&self) -> &ReturnShape {
        &self.shape
    }

    /// Run the method. Generated keys are copied back into `args`.
    pub fn execute<C: Connection + 'static>(
        &self,
        session: &mut SqlSession<C>,
        args: &mut MethodArgs,
    ) -> Result<MethodResult<C::Statement>> {
        if self.has_result_handler {
            return Err(Error::binding(
                BindingErrorKind::MissingParameter,
                format!("Method for '{}' expects a result handler", self.statement_id),
            ));
        }
        let id = self.statement_id.as_str();
        let bounds = self.bounds(args);
        let mut parameter = self.resolver.resolve(args.values.clone())?;

        match self.command {
            SqlCommandType::Insert | SqlCommandType::Update | SqlCommandType::Delete => {
                let count = session.update(id, &mut parameter)?;
                self.resolver.write_back(parameter, &mut args.values);
                Ok(self.row_count_result(count))
            }
            SqlCommandType::Flush => {
                let results = session.flush_statements()?;
                Ok(match self.shape {
                    ReturnShape::BatchResults => MethodResult::BatchResults(results),
                    _ => MethodResult::Unit,
                })
            }
            SqlCommandType::Select => match &self.shape {
                ReturnShape::Unit => {
                    session.select_list_with_bounds(id, &parameter, bounds)?;
                    Ok(MethodResult::Unit)
                }
                ReturnShape::One => match session.select_one(id, &parameter)? {
                    Some(row) => Ok(MethodResult::One(row)),
                    None => Err(Error::Type(TypeError {
                        expected: "exactly one row",
                        actual: format!("no rows from '{}'", id),
                        column: None,
                        rust_type: None,
                    })),
                },
                ReturnShape::Optional => Ok(MethodResult::Optional(session.select_one(id, &parameter)?)),
                ReturnShape::Many(collection) => {
                    let rows = session.select_list_with_bounds(id, &parameter, bounds)?;
                    Ok(MethodResult::Many(collect_rows(&rows, *collection)))
                }
                ReturnShape::Map { key } => Ok(MethodResult::Map(
                    session.select_map_with_bounds(id, &parameter, key, bounds)?,
                )),
                ReturnShape::Cursor => Ok(MethodResult::Cursor(session.select_cursor(id, &parameter, bounds)?)),
                ReturnShape::RowCount(_) | ReturnShape::BatchResults => Err(Error::config(format!(
                    "Mapper method for '{}' has an unsupported return shape: {:?}",
                    id, self.shape
                ))),
            },
        }
    }

    /// Run a select that streams rows into `handler`.
    pub fn execute_with_handler<C: Connection + 'static>(
        &self,
        session: &mut SqlSession<C>,
        args: &MethodArgs,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        if !self.has_result_handler {
            return Err(Error::config(format!(
                "Method for '{}' does not take a result handler",
                self.statement_id
            )));
        }
        let parameter = self.resolver.resolve(args.values.clone())?;
        session.select_with_handler(&self.statement_id, &parameter, self.bounds(args), handler)
    }

    fn bounds(&self, args: &MethodArgs) -> RowBounds {
        if self.has_row_bounds {
            args.bounds.unwrap_or_default()
        } else {
            RowBounds::DEFAULT
        }
    }

    fn row_count_result<S: Statement>(&self, count: RowCount) -> MethodResult<S> {
        match (&self.shape, count) {
            (ReturnShape::RowCount(CountKind::Unit) | ReturnShape::Unit, _) => MethodResult::Unit,
            (ReturnShape::RowCount(CountKind::Bool), RowCount::Affected(n)) => MethodResult::Bool(n > 0),
            (_, count) => MethodResult::Count(count),
        }
    }
}

fn collect_rows(rows: &[Object], collection: Collection) -> Vec<Object> {
    match collection {
        Collection::List | Collection::Array => rows.to_vec(),
        Collection::Set => {
            let mut unique: Vec<Object> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(row) {
                    unique.push(row.clone());
                }
            }
            unique
        }
    }
}
