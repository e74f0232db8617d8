//! Mapping between caller-supplied paths and cache keys.

use crate::core::cache::CacheKey;
use crate::error::PathError;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Bijective mapping from canonical cache keys to the paths a caller used.
///
/// Keys are the canonical absolute form of `origin.join(path)`, so the
/// same file reached through a symlink or a `..` detour always lands on
/// the same cache row.
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    to_relative: BTreeMap<CacheKey, PathBuf>,
}

impl PathIndex {
    /// Resolve `paths` (relative to `origin`, or absolute) to cache keys.
    ///
    /// Paths that cannot be resolved are reported individually and left
    /// out of the index; the rest of the batch is unaffected. When two
    /// paths resolve to the same file, the first one wins and the second
    /// is reported as a duplicate.
    pub fn resolve<P: AsRef<Path>>(
        origin: impl AsRef<Path>,
        paths: &[P],
    ) -> (Self, Vec<PathError>) {
        let origin = origin.as_ref();
        let mut index = Self::default();
        let mut errors = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match canonical_key(&origin.join(path)) {
                Ok(key) => {
                    if index.to_relative.contains_key(&key) {
                        errors.push(PathError::Duplicate {
                            path: path.to_path_buf(),
                            key: key.to_string(),
                        });
                    } else {
                        index.to_relative.insert(key, path.to_path_buf());
                    }
                }
                Err(error) => errors.push(error.with_path(path)),
            }
        }

        if !errors.is_empty() {
            tracing::debug!(
                resolved = index.len(),
                unresolved = errors.len(),
                "Some paths could not be resolved"
            );
        }

        (index, errors)
    }

    /// The caller's path for a key
    pub fn relative(&self, key: &CacheKey) -> Option<&Path> {
        self.to_relative.get(key).map(PathBuf::as_path)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.to_relative.contains_key(key)
    }

    /// Cache keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.to_relative.keys()
    }

    pub fn len(&self) -> usize {
        self.to_relative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_relative.is_empty()
    }
}

/// Canonical absolute key for an existing file
fn canonical_key(path: &Path) -> Result<CacheKey, PathError> {
    let canonical = std::fs::canonicalize(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => PathError::NotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => PathError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PathError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    match canonical.to_str() {
        Some(key) => Ok(CacheKey::new(key)),
        None => Err(PathError::NonUtf8 { path: canonical }),
    }
}

impl PathError {
    /// Report the error against the caller's spelling of the path
    fn with_path(self, caller_path: &Path) -> Self {
        let path = caller_path.to_path_buf();
        match self {
            PathError::NotFound { .. } => PathError::NotFound { path },
            PathError::PermissionDenied { .. } => PathError::PermissionDenied { path },
            PathError::NonUtf8 { .. } => PathError::NonUtf8 { path },
            PathError::Io { source, .. } => PathError::Io { path, source },
            duplicate @ PathError::Duplicate { .. } => duplicate,
        }
    }
}
