//! # Cache Module
//!
//! A persistent table of per-photo metadata, one row per photo.
//!
//! ## Benefits
//! - Subsequent runs only compute values that are still missing
//! - New filters widen the table instead of invalidating it
//! - Checkpoints bound the work lost to a crash or Ctrl+C
//!
//! ## Layout
//! Every row is keyed by the photo's canonical absolute path and carries
//! a `checked_time` (when the photo was first seen) plus any number of
//! derived columns. A derived value that has not been computed yet is
//! simply absent from the row ("unset").
//!
//! ## Backends
//! - `SqliteStore` - Persistent storage using SQLite
//! - `MemoryStore` - For testing

mod memory;
mod sqlite;
mod table;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use table::Cache;
pub use traits::CacheStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the primary key column
pub const PATH_COLUMN: &str = "path";

/// Name of the first-seen timestamp column
pub const CHECKED_TIME_COLUMN: &str = "checked_time";

/// Canonical absolute path of a photo, the primary key of the cache
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic type of a cache column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Signed 64-bit integer
    Integer,
    /// 64-bit float
    Float,
    /// UTF-8 text
    Text,
    /// UTC timestamp with nanosecond precision
    Timestamp,
    /// Pair of integers, e.g. (width, height)
    IntPair,
}

impl ColumnType {
    /// Stable name used in the persisted schema
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Timestamp => "timestamp",
            ColumnType::IntPair => "int_pair",
        }
    }

    /// Parse a persisted schema name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "integer" => Some(ColumnType::Integer),
            "float" => Some(ColumnType::Float),
            "text" => Some(ColumnType::Text),
            "timestamp" => Some(ColumnType::Timestamp),
            "int_pair" => Some(ColumnType::IntPair),
            _ => None,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A settled cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    IntPair(i64, i64),
}

impl Value {
    /// The column type this value belongs in
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Text(_) => ColumnType::Text,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::IntPair(..) => ColumnType::IntPair,
        }
    }

    /// Whether the value survives a round trip through the cache file.
    ///
    /// Timestamps must fit in i64 nanoseconds (years 1677 to 2262) and
    /// floats must not be NaN.
    pub fn check_storable(&self) -> Result<(), String> {
        match self {
            Value::Timestamp(time) if time.timestamp_nanos_opt().is_none() => Err(format!(
                "timestamp {} is outside the storable range",
                time
            )),
            Value::Float(v) if v.is_nan() => Err("NaN cannot be stored".to_string()),
            _ => Ok(()),
        }
    }

    /// Order two values.
    ///
    /// Integers and floats compare with each other; pairs compare
    /// lexicographically. Values of unrelated types are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Some(a.total_cmp(b)),
            (Value::Integer(a), Value::Float(b)) => Some((*a as f64).total_cmp(b)),
            (Value::Float(a), Value::Integer(b)) => Some(a.total_cmp(&(*b as f64))),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::IntPair(a0, a1), Value::IntPair(b0, b1)) => Some((a0, a1).cmp(&(b0, b1))),
            _ => None,
        }
    }

    /// Whether two values are the same settled value (same type, equal)
    pub fn same_as(&self, other: &Value) -> bool {
        self.column_type() == other.column_type() && self.compare(other) == Some(Ordering::Equal)
    }

    /// Element of an integer pair (0 or 1)
    pub fn element(&self, index: usize) -> Option<Value> {
        match (self, index) {
            (Value::IntPair(a, _), 0) => Some(Value::Integer(*a)),
            (Value::IntPair(_, b), 1) => Some(Value::Integer(*b)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::IntPair(a, b) => write!(f, "{}x{}", a, b),
        }
    }
}

/// One cache row (the key lives outside the row)
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    values: BTreeMap<String, Value>,
}

impl CacheRow {
    /// Create a row first seen at `checked_time` with every derived column unset
    pub fn new(checked_time: DateTime<Utc>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(CHECKED_TIME_COLUMN.to_string(), Value::Timestamp(checked_time));
        Self { values }
    }

    pub fn checked_time(&self) -> Option<DateTime<Utc>> {
        self.values
            .get(CHECKED_TIME_COLUMN)
            .and_then(Value::as_timestamp)
    }

    /// The value of a column, `None` when unset
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn is_set(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Derived (non-key, non-checked-time) values that are set
    pub fn derived(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values
            .iter()
            .filter(|(name, _)| name.as_str() != CHECKED_TIME_COLUMN)
    }

    pub(crate) fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    /// Clear a derived value; `checked_time` is never cleared
    pub(crate) fn unset(&mut self, column: &str) -> bool {
        column != CHECKED_TIME_COLUMN && self.values.remove(column).is_some()
    }
}

/// Newly computed values for one row
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub key: CacheKey,
    pub values: BTreeMap<String, Value>,
}

impl RowUpdate {
    pub fn new(key: CacheKey) -> Self {
        Self {
            key,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.values.insert(column.into(), value);
        self
    }
}

/// The full table as plain data, as handed to and from stores
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheTable {
    /// Derived columns and their types
    pub schema: BTreeMap<String, ColumnType>,
    /// Id of the build each computed column's values came from
    pub builds: BTreeMap<String, String>,
    pub rows: BTreeMap<CacheKey, CacheRow>,
}

/// Every cache row restricted to a set of columns
#[derive(Debug, Clone, Default)]
pub struct Projection {
    columns: Vec<String>,
    rows: BTreeMap<CacheKey, BTreeMap<String, Value>>,
}

impl Projection {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Add a row, keeping only the projected columns
    pub fn insert(&mut self, key: CacheKey, values: impl IntoIterator<Item = (String, Value)>) {
        let kept = values
            .into_iter()
            .filter(|(name, _)| self.columns.iter().any(|c| c == name))
            .collect();
        self.rows.insert(key, kept);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn value(&self, key: &CacheKey, column: &str) -> Option<&Value> {
        self.rows.get(key).and_then(|row| row.get(column))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &BTreeMap<String, Value>)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
