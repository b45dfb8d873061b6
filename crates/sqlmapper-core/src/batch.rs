//! Accumulated batch results.

use crate::object::Object;
use crate::value::Value;

/// One accumulated native batch: consecutive updates that shared the same
/// SQL text and statement id.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    statement_id: String,
    sql: String,
    parameters: Vec<Object>,
    update_counts: Vec<u64>,
    generated_keys: Vec<Value>,
}

impl BatchResult {
    /// Start an empty batch for a statement.
    pub fn new(statement_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            statement_id: statement_id.into(),
            sql: sql.into(),
            parameters: Vec::new(),
            update_counts: Vec::new(),
            generated_keys: Vec::new(),
        }
    }

    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter objects in submission order.
    pub fn parameters(&self) -> &[Object] {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut [Object] {
        &mut self.parameters
    }

    /// Per-item update counts, filled in when the batch is flushed.
    pub fn update_counts(&self) -> &[u64] {
        &self.update_counts
    }

    /// Keys generated by the driver for each item, when requested.
    pub fn generated_keys(&self) -> &[Value] {
        &self.generated_keys
    }

    pub fn add_parameter(&mut self, parameter: Object) {
        self.parameters.push(parameter);
    }

    pub fn set_update_counts(&mut self, counts: Vec<u64>) {
        self.update_counts = counts;
    }

    pub fn set_generated_keys(&mut self, keys: Vec<Value>) {
        self.generated_keys = keys;
    }

    /// Number of submitted items.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Does a new update with this SQL and statement id extend this batch?
    pub fn matches(&self, statement_id: &str, sql: &str) -> bool {
        self.statement_id == statement_id && self.sql == sql
    }
}
