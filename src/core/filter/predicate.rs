//! Row predicates for fast filters.

use crate::core::cache::{CacheKey, CacheRow, Value, PATH_COLUMN};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied row test
pub type RowFn = dyn Fn(&CacheKey, &CacheRow) -> bool + Send + Sync;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// What a comparison reads from a row
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A whole column
    Column(String),
    /// One element of an integer-pair column
    Element(String, usize),
}

impl Field {
    pub fn column(name: impl Into<String>) -> Self {
        Field::Column(name.into())
    }

    pub fn element(name: impl Into<String>, index: usize) -> Self {
        Field::Element(name.into(), index)
    }

    /// The column this field reads
    pub fn column_name(&self) -> &str {
        match self {
            Field::Column(name) | Field::Element(name, _) => name,
        }
    }

    fn read(&self, key: &CacheKey, row: &CacheRow) -> Option<Value> {
        match self {
            Field::Column(name) if name == PATH_COLUMN => Some(Value::Text(key.to_string())),
            Field::Column(name) => row.get(name).cloned(),
            Field::Element(name, index) => row.get(name).and_then(|v| v.element(*index)),
        }
    }
}

/// A boolean expression over one cache row.
///
/// A comparison against an unset cell, or against a value it can't be
/// ordered with, is false. `Not` negates that, so `Not(x > 5)` holds
/// for rows where `x` is unset.
#[derive(Clone)]
pub enum Predicate {
    Compare {
        field: Field,
        op: CompareOp,
        value: Value,
    },
    /// All hold (true when empty)
    And(Vec<Predicate>),
    /// Any holds (false when empty)
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Custom(Arc<RowFn>),
}

impl Predicate {
    pub fn compare(field: Field, op: CompareOp, value: Value) -> Self {
        Predicate::Compare { field, op, value }
    }

    /// Holds for rows where `column` has a value
    pub fn is_set(column: impl Into<String>) -> Self {
        let column = column.into();
        Predicate::custom(move |_, row| row.is_set(&column))
    }

    pub fn custom<F>(test: F) -> Self
    where
        F: Fn(&CacheKey, &CacheRow) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom(Arc::new(test))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn evaluate(&self, key: &CacheKey, row: &CacheRow) -> bool {
        match self {
            Predicate::Compare { field, op, value } => field
                .read(key, row)
                .and_then(|actual| actual.compare(value))
                .is_some_and(|ordering| op.accepts(ordering)),
            Predicate::And(parts) => parts.iter().all(|p| p.evaluate(key, row)),
            Predicate::Or(parts) => parts.iter().any(|p| p.evaluate(key, row)),
            Predicate::Not(inner) => !inner.evaluate(key, row),
            Predicate::Custom(test) => test(key, row),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { field, op, value } => f
                .debug_struct("Compare")
                .field("field", field)
                .field("op", op)
                .field("value", value)
                .finish(),
            Predicate::And(parts) => f.debug_tuple("And").field(parts).finish(),
            Predicate::Or(parts) => f.debug_tuple("Or").field(parts).finish(),
            Predicate::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Predicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
