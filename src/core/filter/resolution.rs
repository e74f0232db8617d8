//! Minimum and maximum image dimensions.

use super::columns::{self, ColumnSpec, RESOLUTION};
use super::predicate::{CompareOp, Field, Predicate};
use crate::core::cache::Value;
use crate::error::FilterError;

/// Keeps photos whose width and height both lie within `[min, max]`.
///
/// Photos whose resolution could not be read are dropped as soon as
/// either bound is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFilter {
    min: Option<u32>,
    max: Option<u32>,
}

impl ResolutionFilter {
    pub fn new(min: Option<u32>, max: Option<u32>) -> Result<Self, FilterError> {
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(FilterError::InvalidRange {
                    parameter: "resolution",
                    reason: format!("minimum {} is larger than maximum {}", min, max),
                });
            }
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> Option<u32> {
        self.min
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        vec![columns::resolution()]
    }

    pub fn predicate(&self) -> Predicate {
        let mut bounds = Vec::new();
        for side in 0..2 {
            if let Some(min) = self.min {
                bounds.push(Predicate::compare(
                    Field::element(RESOLUTION, side),
                    CompareOp::Ge,
                    Value::Integer(i64::from(min)),
                ));
            }
            if let Some(max) = self.max {
                bounds.push(Predicate::compare(
                    Field::element(RESOLUTION, side),
                    CompareOp::Le,
                    Value::Integer(i64::from(max)),
                ));
            }
        }
        Predicate::And(bounds)
    }
}
