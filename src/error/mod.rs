//! # Error Module
//!
//! Error types for the photo sieve.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, column names, what went wrong
//! - **Isolate per-file failures** - one bad photo never aborts a batch
//! - **Recovery hints** - suggest how to fix when possible

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum SieveError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("Cannot sort by unknown column '{column}'")]
    UnknownSortColumn { column: String },

    #[error("Interrupted after {completed_rows} rows ({checkpointed_rows} saved to cache)")]
    Interrupted {
        completed_rows: usize,
        checkpointed_rows: usize,
    },
}

/// Errors that occur while discovering or resolving photo paths
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-path resolution failures reported by the path index
#[derive(Error, Debug)]
pub enum PathError {
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Path is not valid UTF-8: {path}")]
    NonUtf8 { path: PathBuf },

    #[error("{path} resolves to {key}, which is already indexed")]
    Duplicate { path: PathBuf, key: String },

    #[error("Failed to resolve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while constructing filters
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid {parameter} '{value}' (expected one of: {expected})")]
    InvalidChoice {
        parameter: &'static str,
        value: String,
        expected: String,
    },

    #[error("Invalid {parameter} range: {reason}")]
    InvalidRange {
        parameter: &'static str,
        reason: String,
    },
}

/// Errors raised while merging filter column declarations
#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("Column '{column}' is already defined by '{existing}', cannot redefine it as '{incoming}'")]
    Conflict {
        column: String,
        existing: String,
        incoming: String,
    },

    #[error("Column name '{column}' is reserved")]
    Reserved { column: String },

    #[error("Column name must not be empty")]
    EmptyName,
}

/// Errors that occur with the metadata cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to open cache database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Cache corruption detected at {path} ({reason}). Delete this file and try again.")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Failed to serialize cache data: {0}")]
    SerializationFailed(String),

    #[error("Failed to write cache to {path}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Column '{column}' holds {expected} values, got {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Refusing to overwrite settled value of '{column}' for {key}")]
    ValueConflict { key: String, column: String },

    #[error("Value of '{column}' for {key} cannot be cached: {reason}")]
    Unstorable {
        key: String,
        column: String,
        reason: String,
    },

    #[error("No cache row for {key}")]
    UnknownKey { key: String },

    #[error("No cache column '{column}'")]
    UnknownColumn { column: String },
}

/// Errors computing a single derived value for a single photo
#[derive(Error, Debug, Clone)]
pub enum ComputeError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("No {field} metadata in {path}")]
    Missing { path: PathBuf, field: &'static str },

    #[error("Value for {path} cannot be cached: {reason}")]
    Unstorable { path: PathBuf, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Errors loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(String),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, SieveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_error_includes_path() {
        let error = PathError::NotFound {
            path: PathBuf::from("/photos/vacation.jpg"),
        };
        assert!(error.to_string().contains("/photos/vacation.jpg"));
    }

    #[test]
    fn schema_conflict_names_both_definitions() {
        let error = SchemaError::Conflict {
            column: "hash".to_string(),
            existing: "hash:gradient".to_string(),
            incoming: "hash:mean".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("hash:gradient"));
        assert!(message.contains("hash:mean"));
    }

    #[test]
    fn cache_error_suggests_recovery() {
        let error = CacheError::Corrupted {
            path: PathBuf::from("/cache/cache.db"),
            reason: "file is not a database".to_string(),
        };
        assert!(error.to_string().contains("Delete this file"));
    }

    #[test]
    fn nested_errors_convert_to_top_level() {
        let error: SieveError = SchemaError::EmptyName.into();
        assert!(matches!(error, SieveError::Schema(SchemaError::EmptyName)));
    }
}
