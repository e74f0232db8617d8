//! Column declarations and the built-in columns.

use crate::core::cache::{ColumnType, Value};
use crate::core::hasher::{HashAlgorithmKind, PhotoHasher};
use crate::core::metadata;
use crate::error::ComputeError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const RESOLUTION: &str = "resolution";
pub const MODIFIED_TIME: &str = "modified_time";
pub const TAKEN_TIME: &str = "taken_time";
pub const FILE_SIZE: &str = "file_size";
pub const HASH: &str = "hash";

/// Per-file computation behind a column
pub type ComputeFn = dyn Fn(&Path) -> Result<Value, ComputeError> + Send + Sync;

/// How a column is computed for rows that are missing it.
///
/// Two build expressions are the same when their ids are equal; the id
/// is what the schema registry compares to detect conflicting
/// definitions, so it must change whenever the computation does.
#[derive(Clone)]
pub struct BuildExpr {
    id: String,
    func: Arc<ComputeFn>,
}

impl BuildExpr {
    pub fn new<F>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Path) -> Result<Value, ComputeError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(func),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Compute the value for the photo at `path` (a cache key).
    ///
    /// A value the cache file can't hold is a failure for this photo
    /// only, like any other.
    pub fn compute(&self, path: &Path) -> Result<Value, ComputeError> {
        let value = (self.func)(path)?;
        value
            .check_storable()
            .map_err(|reason| ComputeError::Unstorable {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(value)
    }
}

impl PartialEq for BuildExpr {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BuildExpr {}

impl fmt::Debug for BuildExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BuildExpr").field(&self.id).finish()
    }
}

/// A column a filter needs
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    /// `None` when the column is expected to be filled by someone else
    pub build: Option<BuildExpr>,
}

impl ColumnSpec {
    pub fn computed(name: impl Into<String>, column_type: ColumnType, build: BuildExpr) -> Self {
        Self {
            name: name.into(),
            column_type,
            build: Some(build),
        }
    }

    /// A column this filter reads but doesn't know how to compute
    pub fn assumed(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            build: None,
        }
    }
}

pub fn resolution() -> ColumnSpec {
    ColumnSpec::computed(
        RESOLUTION,
        ColumnType::IntPair,
        BuildExpr::new(RESOLUTION, |path| {
            let (width, height) = metadata::resolution(path)?;
            Ok(Value::IntPair(i64::from(width), i64::from(height)))
        }),
    )
}

pub fn modified_time() -> ColumnSpec {
    ColumnSpec::computed(
        MODIFIED_TIME,
        ColumnType::Timestamp,
        BuildExpr::new(MODIFIED_TIME, |path| {
            metadata::modified_time(path).map(Value::Timestamp)
        }),
    )
}

pub fn taken_time() -> ColumnSpec {
    ColumnSpec::computed(
        TAKEN_TIME,
        ColumnType::Timestamp,
        BuildExpr::new(TAKEN_TIME, |path| {
            metadata::date_taken(path).map(Value::Timestamp)
        }),
    )
}

pub fn file_size() -> ColumnSpec {
    ColumnSpec::computed(
        FILE_SIZE,
        ColumnType::Integer,
        BuildExpr::new(FILE_SIZE, |path| {
            let bytes = metadata::file_size(path)?;
            i64::try_from(bytes)
                .map(Value::Integer)
                .map_err(|_| ComputeError::Other(format!("{} is too large", path.display())))
        }),
    )
}

/// The `hash` column for one algorithm.
///
/// Different algorithms produce incompatible hashes, so each gets its
/// own build id and two filters that disagree on the algorithm conflict.
pub fn hash(kind: HashAlgorithmKind) -> ColumnSpec {
    let hasher = Arc::new(PhotoHasher::new(kind));
    ColumnSpec::computed(
        HASH,
        ColumnType::Text,
        BuildExpr::new(format!("{}:{}", HASH, kind), move |path| {
            hasher.hash_file(path).map(Value::Text)
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    #[test]
    fn build_exprs_compare_by_id() {
        let a = BuildExpr::new("size", |_| Ok(Value::Integer(1)));
        let b = BuildExpr::new("size", |_| Ok(Value::Integer(2)));
        let c = BuildExpr::new("other", |_| Ok(Value::Integer(1)));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn values_the_cache_cannot_hold_are_compute_errors() {
        let far_future = BuildExpr::new("future", |_| {
            Ok(Value::Timestamp(Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap()))
        });
        let not_a_number = BuildExpr::new("nan", |_| Ok(Value::Float(f64::NAN)));
        let path = Path::new("/photos/a.jpg");

        assert!(matches!(
            far_future.compute(path),
            Err(ComputeError::Unstorable { .. })
        ));
        assert!(matches!(
            not_a_number.compute(path),
            Err(ComputeError::Unstorable { .. })
        ));
    }

    #[test]
    fn hash_columns_differ_by_algorithm() {
        let mean = hash(HashAlgorithmKind::Mean);
        let gradient = hash(HashAlgorithmKind::Gradient);

        assert_eq!(mean.name, gradient.name);
        assert_ne!(mean.build, gradient.build);
        assert_eq!(mean.build.unwrap().id(), "hash:mean");
    }

    #[test]
    fn builtin_columns_compute_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.png");
        ImageBuffer::from_fn(30, 10, |_, _| Rgb([10u8, 20, 30]))
            .save(&path)
            .unwrap();

        let res = resolution().build.unwrap().compute(&path).unwrap();
        assert_eq!(res, Value::IntPair(30, 10));

        let size = file_size().build.unwrap().compute(&path).unwrap();
        assert!(matches!(size, Value::Integer(n) if n > 0));

        let modified = modified_time().build.unwrap().compute(&path).unwrap();
        assert_eq!(modified.column_type(), ColumnType::Timestamp);

        let digest = hash(HashAlgorithmKind::Perceptual).build.unwrap().compute(&path).unwrap();
        assert_eq!(digest.column_type(), ColumnType::Text);
    }
}
