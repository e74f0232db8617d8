//! In-memory cache store for testing.

use super::{CacheStore, CacheTable};
use crate::error::CacheError;
use std::path::PathBuf;
use std::sync::RwLock;

/// In-memory cache store
///
/// Useful for testing and dry runs where persistence isn't needed.
pub struct MemoryStore {
    saved: RwLock<Option<CacheTable>>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self {
            saved: RwLock::new(None),
        }
    }

    fn poisoned() -> CacheError {
        CacheError::Corrupted {
            path: PathBuf::from("memory"),
            reason: "lock poisoned".to_string(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<Option<CacheTable>, CacheError> {
        let saved = self.saved.read().map_err(|_| Self::poisoned())?;
        Ok(saved.clone())
    }

    fn save(&self, table: &CacheTable) -> Result<(), CacheError> {
        let mut saved = self.saved.write().map_err(|_| Self::poisoned())?;
        *saved = Some(table.clone());
        Ok(())
    }

    fn disk_size(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{CacheKey, CacheRow, ColumnType};
    use chrono::Utc;

    #[test]
    fn empty_store_loads_nothing() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn saved_table_is_loaded_back() {
        let store = MemoryStore::new();
        let mut table = CacheTable::default();
        table.schema.insert("hash".to_string(), ColumnType::Text);
        table
            .rows
            .insert(CacheKey::new("/a.jpg"), CacheRow::new(Utc::now()));

        store.save(&table).unwrap();

        assert_eq!(store.load().unwrap(), Some(table));
    }
}
