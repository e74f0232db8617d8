//! File size bounds.

use super::columns::{self, ColumnSpec, FILE_SIZE};
use super::predicate::{CompareOp, Field, Predicate};
use crate::core::cache::Value;
use crate::error::FilterError;

/// Keeps photos whose size in bytes lies within `[min_bytes, max_bytes]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSizeFilter {
    min_bytes: Option<u64>,
    max_bytes: Option<u64>,
}

impl FileSizeFilter {
    pub fn new(min_bytes: Option<u64>, max_bytes: Option<u64>) -> Result<Self, FilterError> {
        if let (Some(min), Some(max)) = (min_bytes, max_bytes) {
            if min > max {
                return Err(FilterError::InvalidRange {
                    parameter: "file size",
                    reason: format!("minimum {} bytes is larger than maximum {} bytes", min, max),
                });
            }
        }
        for bound in [min_bytes, max_bytes].into_iter().flatten() {
            if i64::try_from(bound).is_err() {
                return Err(FilterError::InvalidRange {
                    parameter: "file size",
                    reason: format!("{} bytes is out of range", bound),
                });
            }
        }
        Ok(Self {
            min_bytes,
            max_bytes,
        })
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        vec![columns::file_size()]
    }

    pub fn predicate(&self) -> Predicate {
        let bound = |op, bytes: u64| {
            Predicate::compare(
                Field::column(FILE_SIZE),
                op,
                Value::Integer(i64::try_from(bytes).unwrap_or(i64::MAX)),
            )
        };

        let mut bounds = Vec::new();
        if let Some(min) = self.min_bytes {
            bounds.push(bound(CompareOp::Ge, min));
        }
        if let Some(max) = self.max_bytes {
            bounds.push(bound(CompareOp::Le, max));
        }
        Predicate::And(bounds)
    }
}
