//! Filters assembled by the caller.

use super::columns::ColumnSpec;
use super::predicate::Predicate;

/// A fast filter with caller-declared columns and predicate.
///
/// The columns may carry their own build expressions, which makes this
/// the way to teach the cache a new per-photo value.
#[derive(Debug, Clone)]
pub struct CustomFilter {
    name: String,
    columns: Vec<ColumnSpec>,
    predicate: Predicate,
}

impl CustomFilter {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            columns,
            predicate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        self.columns.clone()
    }

    pub fn predicate(&self) -> Predicate {
        self.predicate.clone()
    }
}
