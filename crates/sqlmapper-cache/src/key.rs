//! Composite cache keys.

use sqlmapper_core::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

const DEFAULT_MULTIPLIER: i32 = 37;
const DEFAULT_HASHCODE: i32 = 17;

/// A key built from every input that determines a query's result: statement
/// id, SQL text, bound parameter values, paging bounds and environment id.
///
/// Two keys are equal when they were fed equal values in the same order.
#[derive(Debug, Clone)]
pub struct CacheKey {
    multiplier: i32,
    hashcode: i32,
    checksum: i64,
    count: i32,
    update_list: Vec<Value>,
}

impl CacheKey {
    pub fn new() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
        }
    }

    /// Build a key from a sequence of values.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut key = Self::new();
        key.update_all(values);
        key
    }

    /// Fold one value into the key.
    pub fn update(&mut self, value: impl Into<Value>) {
        let value = value.into();
        let mut base = if value.is_null() { 1 } else { value.hash_code() };
        self.count = self.count.wrapping_add(1);
        self.checksum = self.checksum.wrapping_add(i64::from(base));
        base = base.wrapping_mul(self.count);
        self.hashcode = self.multiplier.wrapping_mul(self.hashcode).wrapping_add(base);
        self.update_list.push(value);
    }

    pub fn update_all<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for value in values {
            self.update(value);
        }
    }

    pub fn hashcode(&self) -> i32 {
        self.hashcode
    }

    pub fn checksum(&self) -> i64 {
        self.checksum
    }

    /// Number of values folded in.
    pub fn update_count(&self) -> usize {
        self.update_list.len()
    }

    pub fn values(&self) -> &[Value] {
        &self.update_list
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.update_list.len() == other.update_list.len()
            && self
                .update_list
                .iter()
                .zip(&other.update_list)
                .all(|(a, b)| a.equivalent(b))
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hashcode);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for value in &self.update_list {
            if value.is_null() {
                f.write_str(":null")?;
            } else {
                write!(f, ":{}", value)?;
            }
        }
        Ok(())
    }
}
