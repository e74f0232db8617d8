//! # Filter Module
//!
//! Selection criteria applied to cached photo metadata.
//!
//! ## Evaluation Modes
//! - **Fast** - a [`Predicate`] over one row at a time, evaluated in
//!   parallel and free to reorder with other fast filters
//! - **Comparable** - reasons across rows (e.g. "newest wins among
//!   duplicates") and sees the whole cache projected onto its columns
//!
//! ## Columns
//! Every filter declares the columns it reads as [`ColumnSpec`]s. A
//! column with a [`BuildExpr`] is computed for rows missing it when the
//! cache is populated; one without is assumed to be filled elsewhere.

pub mod columns;
mod custom;
mod date;
mod hash;
mod predicate;
mod resolution;
mod size;

pub use columns::{BuildExpr, ColumnSpec, ComputeFn};
pub use custom::CustomFilter;
pub use date::{DateField, DateFilter};
pub use hash::{HashFilter, Resolver};
pub use predicate::{CompareOp, Field, Predicate, RowFn};
pub use resolution::ResolutionFilter;
pub use size::FileSizeFilter;

use crate::core::cache::{CacheKey, Projection};
use std::collections::BTreeSet;

/// A filter that needs to look across rows
pub trait Comparable: Send + Sync {
    /// Keys from `candidates` that survive.
    ///
    /// `projection` holds every cached row, not just the candidates,
    /// restricted to the filter's declared columns.
    fn survivors(
        &self,
        candidates: &BTreeSet<CacheKey>,
        projection: &Projection,
    ) -> BTreeSet<CacheKey>;
}

/// How the pipeline runs a filter
pub enum Evaluation<'a> {
    Fast(Predicate),
    Comparable(&'a dyn Comparable),
}

/// Any selection criterion the pipeline can run
#[derive(Debug, Clone)]
pub enum Filter {
    Resolution(ResolutionFilter),
    Date(DateFilter),
    FileSize(FileSizeFilter),
    Hash(HashFilter),
    Custom(CustomFilter),
}

impl Filter {
    /// Short name for logs and events
    pub fn name(&self) -> String {
        match self {
            Filter::Resolution(_) => "resolution".to_string(),
            Filter::Date(f) => format!("date:{}", f.field().column_name()),
            Filter::FileSize(_) => "file_size".to_string(),
            Filter::Hash(f) => format!("hash:{}:{}", f.algorithm(), f.resolver()),
            Filter::Custom(f) => f.name().to_string(),
        }
    }

    /// Columns this filter reads
    pub fn columns(&self) -> Vec<ColumnSpec> {
        match self {
            Filter::Resolution(f) => f.columns(),
            Filter::Date(f) => f.columns(),
            Filter::FileSize(f) => f.columns(),
            Filter::Hash(f) => f.columns(),
            Filter::Custom(f) => f.columns(),
        }
    }

    pub fn evaluation(&self) -> Evaluation<'_> {
        match self {
            Filter::Resolution(f) => Evaluation::Fast(f.predicate()),
            Filter::Date(f) => Evaluation::Fast(f.predicate()),
            Filter::FileSize(f) => Evaluation::Fast(f.predicate()),
            Filter::Hash(f) => Evaluation::Comparable(f),
            Filter::Custom(f) => Evaluation::Fast(f.predicate()),
        }
    }

    pub fn is_fast(&self) -> bool {
        matches!(self.evaluation(), Evaluation::Fast(_))
    }
}

impl From<ResolutionFilter> for Filter {
    fn from(filter: ResolutionFilter) -> Self {
        Filter::Resolution(filter)
    }
}

impl From<DateFilter> for Filter {
    fn from(filter: DateFilter) -> Self {
        Filter::Date(filter)
    }
}

impl From<FileSizeFilter> for Filter {
    fn from(filter: FileSizeFilter) -> Self {
        Filter::FileSize(filter)
    }
}

impl From<HashFilter> for Filter {
    fn from(filter: HashFilter) -> Self {
        Filter::Hash(filter)
    }
}

impl From<CustomFilter> for Filter {
    fn from(filter: CustomFilter) -> Self {
        Filter::Custom(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{ColumnType, Value};

    #[test]
    fn hash_filter_is_comparable() {
        let filter: Filter = HashFilter::new("mean", "newest").unwrap().into();

        assert!(!filter.is_fast());
        assert_eq!(filter.name(), "hash:mean:newest");
    }

    #[test]
    fn custom_filter_exposes_its_columns() {
        let filter: Filter = CustomFilter::new(
            "has_caption",
            vec![ColumnSpec::assumed("caption", ColumnType::Text)],
            Predicate::is_set("caption"),
        )
        .into();

        assert!(filter.is_fast());
        assert_eq!(filter.columns()[0].name, "caption");
        assert!(filter.columns()[0].build.is_none());
    }

    #[test]
    fn builtin_fast_filters_declare_computed_columns() {
        let filters: Vec<Filter> = vec![
            ResolutionFilter::new(Some(1), None).unwrap().into(),
            DateFilter::new(DateField::Modified, None, None).unwrap().into(),
            FileSizeFilter::new(None, Some(10)).unwrap().into(),
        ];

        for filter in filters {
            assert!(filter.is_fast());
            assert!(filter.columns().iter().all(|c| c.build.is_some()));
        }
    }

    #[test]
    fn evaluation_exposes_predicate() {
        let filter: Filter = FileSizeFilter::new(Some(5), None).unwrap().into();
        let mut row = crate::core::cache::CacheRow::new(chrono::Utc::now());
        row.set(columns::FILE_SIZE, Value::Integer(6));

        match filter.evaluation() {
            Evaluation::Fast(predicate) => {
                assert!(predicate.evaluate(&CacheKey::new("/a.jpg"), &row))
            }
            Evaluation::Comparable(_) => panic!("file size filter should be fast"),
        }
    }
}
