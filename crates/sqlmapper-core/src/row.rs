//! Database row representation.

use crate::types::{JdbcType, RustType};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
///
/// Besides names, a driver reports each column's JDBC type and the property
/// type its native storage reads as; the result mapper uses both when it
/// falls back from declared mappings.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    names: Vec<String>,
    jdbc_types: Vec<JdbcType>,
    native_types: Vec<RustType>,
    /// Upper-cased name -> index mapping for case-insensitive lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create column info from names alone; every column is `Undefined`.
    pub fn new(names: Vec<String>) -> Self {
        let n = names.len();
        Self::with_types(names, vec![JdbcType::Undefined; n])
    }

    /// Create column info with per-column JDBC types.
    pub fn with_types(names: Vec<String>, jdbc_types: Vec<JdbcType>) -> Self {
        let native_types = jdbc_types.iter().map(|t| RustType::native_for(*t)).collect();
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            name_to_index.entry(name.to_ascii_uppercase()).or_insert(i);
        }
        Self {
            names,
            jdbc_types,
            native_types,
            name_to_index,
        }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name, ignoring case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(&name.to_ascii_uppercase()).copied()
    }

    /// Get the name of a column by index.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Check if a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// JDBC type reported for a column.
    pub fn jdbc_type_at(&self, index: usize) -> JdbcType {
        self.jdbc_types
            .get(index)
            .copied()
            .unwrap_or(JdbcType::Undefined)
    }

    /// JDBC type reported for a named column.
    pub fn jdbc_type_of(&self, name: &str) -> JdbcType {
        self.index_of(name)
            .map_or(JdbcType::Undefined, |i| self.jdbc_type_at(i))
    }

    /// Native property type reported for a named column.
    pub fn native_type_of(&self, name: &str) -> RustType {
        self.index_of(name)
            .and_then(|i| self.native_types.get(i).cloned())
            .unwrap_or(RustType::Object)
    }
}

/// A single row returned from a database query.
///
/// Rows provide both index-based and name-based access to column values.
/// Column metadata is shared via `Arc` for memory efficiency.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given column names and values.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Get the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name, ignoring case.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Get all values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consume the row into its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lookup_ignores_case() {
        let info = ColumnInfo::with_types(
            vec!["ID".to_string(), "user_name".to_string()],
            vec![JdbcType::BigInt, JdbcType::Varchar],
        );
        assert_eq!(info.index_of("id"), Some(0));
        assert_eq!(info.index_of("USER_NAME"), Some(1));
        assert_eq!(info.jdbc_type_of("user_name"), JdbcType::Varchar);
        assert_eq!(info.native_type_of("id"), RustType::I64);
        assert_eq!(info.native_type_of("missing"), RustType::Object);
    }

    #[test]
    fn test_duplicate_names_resolve_to_first() {
        let info = ColumnInfo::new(vec!["id".to_string(), "ID".to_string()]);
        assert_eq!(info.index_of("id"), Some(0));
    }

    #[test]
    fn test_row_access() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Int(1), Value::Text("Alice".to_string())],
        );
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert_eq!(row.get_by_name("NAME"), Some(&Value::Text("Alice".to_string())));
        assert!(row.get_by_name("missing").is_none());

        let pairs: Vec<_> = row.iter().collect();
        assert_eq!(pairs[0].0, "id");
        assert_eq!(row.into_values().len(), 2);
    }
}
