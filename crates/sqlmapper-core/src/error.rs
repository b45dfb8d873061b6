//! Error types for SQLMapper operations.

use crate::batch::BatchResult;
use std::fmt;

/// The primary error type for all SQLMapper operations.
#[derive(Debug)]
pub enum Error {
    /// Parameter binding errors, raised before the driver is touched
    Binding(BindingError),
    /// Driver-level statement failures
    Query(QueryError),
    /// A batch flush failed part way through
    Batch(BatchError),
    /// Local or shared cache consistency violations
    Cache(CacheError),
    /// Configuration errors (statements, result maps, return shapes)
    Config(ConfigError),
    /// Type conversion errors
    Type(TypeError),
    /// Executor lifecycle and usage errors
    Executor(ExecutorError),
    /// Connection-related errors
    Connection(ConnectionError),
    /// Transaction errors
    Transaction(TransactionError),
    /// I/O errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct BindingError {
    pub kind: BindingErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingErrorKind {
    /// A property path could not be resolved against the parameter object
    UnresolvedProperty,
    /// A named parameter was not supplied
    MissingParameter,
    /// Two method parameters resolve to the same name
    AmbiguousParameter,
    /// More than one special parameter of the same type was supplied
    DuplicateSpecialParameter,
    /// No statement is registered under the requested id
    StatementNotFound,
    /// A foreach collection was null or not iterable
    InvalidCollection,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub statement_id: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Database busy or locked
    Busy,
    /// Permission denied
    Permission,
    /// Parameter count or index mismatch
    Bind,
    /// Other database error
    Database,
}

/// A batch flush that failed on one of its statements.
///
/// Statements executed before the failing one are not rolled back; their
/// results are carried in `succeeded` so the caller can decide what to do.
#[derive(Debug)]
pub struct BatchError {
    /// 1-based position of the failing statement within the flush.
    pub index: usize,
    /// 0-based position of the failing item within that statement's batch.
    /// Items before it were applied and have counts in `failed`.
    pub item: usize,
    pub statement_id: String,
    pub sql: String,
    /// Results of the statements that executed before the failure.
    pub succeeded: Vec<BatchResult>,
    /// The accumulated batch that failed, with update counts for the items
    /// that ran before the failure.
    pub failed: BatchResult,
    pub source: Box<Error>,
}

/// A driver batch that stopped part way.
///
/// `update_counts` holds one entry per item applied before the failure, so
/// its length is the index of the failing item.
#[derive(Debug)]
pub struct BatchUpdateError {
    pub update_counts: Vec<u64>,
    pub source: Error,
}

impl BatchUpdateError {
    pub fn new(update_counts: Vec<u64>, source: Error) -> Self {
        Self { update_counts, source }
    }

    /// 0-based index of the item that failed.
    pub fn failed_item(&self) -> usize {
        self.update_counts.len()
    }
}

#[derive(Debug)]
pub struct CacheError {
    pub kind: CacheErrorKind,
    pub statement_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheErrorKind {
    /// A query re-entered itself while its first load was still in flight
    CircularReference,
    /// A callable statement with OUT parameters was eligible for caching
    OutParameters,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct ExecutorError {
    pub kind: ExecutorErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorKind {
    /// The executor was used after `close`
    Closed,
    /// A single-row select returned more than one row
    TooManyResults,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// The connection was already closed
    Closed,
}

#[derive(Debug)]
pub struct TransactionError {
    pub message: String,
}

impl Error {
    /// Build a binding error.
    pub fn binding(kind: BindingErrorKind, message: impl Into<String>) -> Self {
        Error::Binding(BindingError {
            kind,
            message: message.into(),
        })
    }

    /// Build a configuration error without a source.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Build a cache consistency error.
    pub fn cache(
        kind: CacheErrorKind,
        statement_id: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::Cache(CacheError {
            kind,
            statement_id: statement_id.map(str::to_string),
            message: message.into(),
        })
    }

    /// Build an executor usage error.
    pub fn executor(kind: ExecutorErrorKind, message: impl Into<String>) -> Self {
        Error::Executor(ExecutorError {
            kind,
            message: message.into(),
        })
    }

    /// Is this a binding error (raised before any driver interaction)?
    pub fn is_binding(&self) -> bool {
        matches!(self, Error::Binding(_))
    }

    /// Is this a cache consistency error?
    pub fn is_cache_consistency(&self) -> bool {
        matches!(self, Error::Cache(_))
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Batch(b) => Some(&b.sql),
            _ => None,
        }
    }

    /// Get the id of the statement that caused this error, if available
    pub fn statement_id(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.statement_id.as_deref(),
            Error::Batch(b) => Some(&b.statement_id),
            Error::Cache(c) => c.statement_id.as_deref(),
            _ => None,
        }
    }

    /// Attach the statement id and SQL to a driver error that lacks them.
    #[must_use]
    pub fn with_statement(self, statement_id: &str, sql: &str) -> Self {
        match self {
            Error::Query(mut q) => {
                if q.statement_id.is_none() {
                    q.statement_id = Some(statement_id.to_string());
                }
                if q.sql.is_none() {
                    q.sql = Some(sql.to_string());
                }
                Error::Query(q)
            }
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Binding(e) => write!(f, "Binding error: {}", e.message),
            Error::Query(e) => match &e.statement_id {
                Some(id) => write!(f, "Query error in '{}': {}", id, e.message),
                None => write!(f, "Query error: {}", e.message),
            },
            Error::Batch(e) => write!(f, "Batch error: {}", e),
            Error::Cache(e) => write!(f, "Cache error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Executor(e) => write!(f, "Executor error: {}", e.message),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Batch(e) => Some(e.source.as_ref()),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} (SQL: {})", self.message, sql),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "statement '{}' failed at batch {} item {} after {} successful batch(es): {}",
            self.statement_id,
            self.index,
            self.item,
            self.succeeded.len(),
            self.source
        )
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

impl From<BindingError> for Error {
    fn from(err: BindingError) -> Self {
        Error::Binding(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<BatchError> for Error {
    fn from(err: BatchError) -> Self {
        Error::Batch(err)
    }
}

impl From<Error> for BatchUpdateError {
    fn from(source: Error) -> Self {
        BatchUpdateError::new(Vec::new(), source)
    }
}

impl fmt::Display for BatchUpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch item {} failed: {}", self.failed_item(), self.source)
    }
}

impl std::error::Error for BatchUpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::Cache(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ExecutorError> for Error {
    fn from(err: ExecutorError) -> Self {
        Error::Executor(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

/// Result type alias for SQLMapper operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_error() -> Error {
        Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: None,
            statement_id: None,
            message: "UNIQUE constraint failed".to_string(),
            source: None,
        })
    }

    #[test]
    fn with_statement_fills_missing_context() {
        let err = driver_error().with_statement("users.insert", "INSERT INTO users VALUES (?)");
        assert_eq!(err.statement_id(), Some("users.insert"));
        assert_eq!(err.sql(), Some("INSERT INTO users VALUES (?)"));
        assert!(err.to_string().contains("users.insert"));
    }

    #[test]
    fn with_statement_keeps_other_kinds() {
        let err = Error::config("bad").with_statement("a", "b");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.statement_id(), None);
    }

    #[test]
    fn batch_error_reports_index_and_successes() {
        let ok = BatchResult::new("users.insert", "INSERT INTO users VALUES (?)");
        let failed = BatchResult::new("orders.insert", "INSERT INTO orders VALUES (?)");
        let err = Error::Batch(BatchError {
            index: 2,
            item: 1,
            statement_id: "orders.insert".to_string(),
            sql: "INSERT INTO orders VALUES (?)".to_string(),
            succeeded: vec![ok],
            failed,
            source: Box::new(driver_error()),
        });

        let msg = err.to_string();
        assert!(msg.contains("batch 2 item 1"));
        assert!(msg.contains("after 1 successful"));
        assert_eq!(err.statement_id(), Some("orders.insert"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn kind_predicates() {
        let circular = Error::cache(CacheErrorKind::CircularReference, Some("a.b"), "loop");
        assert!(circular.is_cache_consistency());
        assert_eq!(circular.statement_id(), Some("a.b"));

        let missing = Error::binding(BindingErrorKind::MissingParameter, "no 'id'");
        assert!(missing.is_binding());
        assert!(!missing.is_cache_consistency());
    }
}
