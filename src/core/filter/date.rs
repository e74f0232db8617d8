//! Date range over modification or capture time.

use super::columns::{self, ColumnSpec, MODIFIED_TIME, TAKEN_TIME};
use super::predicate::{CompareOp, Field, Predicate};
use crate::core::cache::Value;
use crate::error::FilterError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which timestamp a date filter reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateField {
    /// Filesystem modification time
    #[default]
    Modified,
    /// EXIF DateTimeOriginal
    Taken,
}

impl DateField {
    pub fn column(&self) -> ColumnSpec {
        match self {
            DateField::Modified => columns::modified_time(),
            DateField::Taken => columns::taken_time(),
        }
    }

    pub fn column_name(&self) -> &'static str {
        match self {
            DateField::Modified => MODIFIED_TIME,
            DateField::Taken => TAKEN_TIME,
        }
    }
}

impl FromStr for DateField {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "modified" | "mtime" => Ok(DateField::Modified),
            "taken" | "exif" => Ok(DateField::Taken),
            _ => Err(FilterError::InvalidChoice {
                parameter: "date field",
                value: s.to_string(),
                expected: "modified, taken".to_string(),
            }),
        }
    }
}

/// Keeps photos dated within `[after, before]` (both inclusive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFilter {
    field: DateField,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
}

impl DateFilter {
    pub fn new(
        field: DateField,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Self, FilterError> {
        if let (Some(after), Some(before)) = (after, before) {
            if after > before {
                return Err(FilterError::InvalidRange {
                    parameter: "date",
                    reason: format!(
                        "{} is later than {}",
                        after.to_rfc3339(),
                        before.to_rfc3339()
                    ),
                });
            }
        }
        Ok(Self {
            field,
            after,
            before,
        })
    }

    pub fn field(&self) -> DateField {
        self.field
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        vec![self.field.column()]
    }

    pub fn predicate(&self) -> Predicate {
        let column = self.field.column_name();
        let mut bounds = Vec::new();
        if let Some(after) = self.after {
            bounds.push(Predicate::compare(
                Field::column(column),
                CompareOp::Ge,
                Value::Timestamp(after),
            ));
        }
        if let Some(before) = self.before {
            bounds.push(Predicate::compare(
                Field::column(column),
                CompareOp::Le,
                Value::Timestamp(before),
            ));
        }
        Predicate::And(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{CacheKey, CacheRow};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn row(column: &str, time: DateTime<Utc>) -> CacheRow {
        let mut row = CacheRow::new(Utc::now());
        row.set(column, Value::Timestamp(time));
        row
    }

    #[test]
    fn bounds_are_inclusive() {
        let filter = DateFilter::new(DateField::Modified, Some(at(100)), Some(at(200))).unwrap();
        let predicate = filter.predicate();
        let key = CacheKey::new("/a.jpg");

        assert!(predicate.evaluate(&key, &row(MODIFIED_TIME, at(100))));
        assert!(predicate.evaluate(&key, &row(MODIFIED_TIME, at(200))));
        assert!(!predicate.evaluate(&key, &row(MODIFIED_TIME, at(99))));
        assert!(!predicate.evaluate(&key, &row(MODIFIED_TIME, at(201))));
    }

    #[test]
    fn taken_field_reads_exif_column() {
        let filter = DateFilter::new(DateField::Taken, Some(at(100)), None).unwrap();
        let predicate = filter.predicate();
        let key = CacheKey::new("/a.jpg");

        assert_eq!(filter.columns()[0].name, TAKEN_TIME);
        assert!(predicate.evaluate(&key, &row(TAKEN_TIME, at(150))));
        assert!(!predicate.evaluate(&key, &row(MODIFIED_TIME, at(150))));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let result = DateFilter::new(DateField::Modified, Some(at(200)), Some(at(100)));

        assert!(matches!(result, Err(FilterError::InvalidRange { .. })));
    }

    #[test]
    fn field_names_parse() {
        assert_eq!("taken".parse::<DateField>().unwrap(), DateField::Taken);
        assert!(matches!(
            "created".parse::<DateField>(),
            Err(FilterError::InvalidChoice { .. })
        ));
    }
}
