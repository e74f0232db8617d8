//! The in-memory cache table and its durable store.

use super::{
    CacheKey, CacheRow, CacheStore, CacheTable, ColumnType, MemoryStore, Projection, RowUpdate,
    SqliteStore, Value, CHECKED_TIME_COLUMN, PATH_COLUMN,
};
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// The photo metadata cache.
///
/// Holds the whole table in memory and writes it back to its store on
/// `persist`. Columns and rows only ever grow, except through `trim`.
pub struct Cache {
    table: CacheTable,
    store: Box<dyn CacheStore>,
    dirty: bool,
}

impl Cache {
    /// Open the SQLite cache at `path`, or start empty if the file doesn't exist
    ///
    /// An unreadable file is an error; the caller decides whether to
    /// delete it and start over.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        Self::with_store(Box::new(SqliteStore::new(path)))
    }

    /// A cache that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            table: CacheTable::default(),
            store: Box::new(MemoryStore::new()),
            dirty: false,
        }
    }

    /// Load the cache from an arbitrary store
    pub fn with_store(store: Box<dyn CacheStore>) -> Result<Self, CacheError> {
        let table = store.load()?.unwrap_or_default();
        Ok(Self {
            table,
            store,
            dirty: false,
        })
    }

    /// Derived columns and their types
    pub fn schema(&self) -> &BTreeMap<String, ColumnType> {
        &self.table.schema
    }

    /// Whether `column` exists, including `path` and `checked_time`
    pub fn has_column(&self, column: &str) -> bool {
        column == PATH_COLUMN
            || column == CHECKED_TIME_COLUMN
            || self.table.schema.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.table.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.rows.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.table.rows.contains_key(key)
    }

    pub fn row(&self, key: &CacheKey) -> Option<&CacheRow> {
        self.table.rows.get(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&CacheKey, &CacheRow)> {
        self.table.rows.iter()
    }

    /// The whole table as plain data
    pub fn table(&self) -> &CacheTable {
        &self.table
    }

    /// Whether there are changes that haven't been persisted
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Widen the table to include every column of `schema`.
    ///
    /// New columns start unset in every row. Returns the number of
    /// columns added.
    pub fn ensure_columns(
        &mut self,
        schema: &BTreeMap<String, ColumnType>,
    ) -> Result<usize, CacheError> {
        for (name, column_type) in schema {
            if let Some(existing) = self.table.schema.get(name) {
                if existing != column_type {
                    return Err(CacheError::TypeMismatch {
                        column: name.clone(),
                        expected: existing.to_string(),
                        found: column_type.to_string(),
                    });
                }
            }
        }

        let mut added = 0;
        for (name, column_type) in schema {
            if !self.table.schema.contains_key(name) {
                self.table.schema.insert(name.clone(), *column_type);
                added += 1;
            }
        }

        if added > 0 {
            tracing::debug!(added, total = self.table.schema.len(), "Widened cache schema");
            self.dirty = true;
        }
        Ok(added)
    }

    /// Id of the build that computed the stored values of `column`
    pub fn build_id(&self, column: &str) -> Option<&str> {
        self.table.builds.get(column).map(String::as_str)
    }

    /// Record that `column` is computed by the build `id`.
    ///
    /// If the column was recorded under a different build, its stored
    /// values are cleared so they are computed again. Returns the number
    /// of values cleared.
    pub fn record_build(&mut self, column: &str, id: &str) -> Result<usize, CacheError> {
        if !self.table.schema.contains_key(column) {
            return Err(CacheError::UnknownColumn {
                column: column.to_string(),
            });
        }
        if self.build_id(column) == Some(id) {
            return Ok(0);
        }

        let replaced = self.table.builds.insert(column.to_string(), id.to_string());
        let mut cleared = 0;
        if replaced.is_some() {
            for row in self.table.rows.values_mut() {
                if row.unset(column) {
                    cleared += 1;
                }
            }
        }
        self.dirty = true;
        Ok(cleared)
    }

    /// Add a row for every key not already cached. Returns the number added.
    pub fn ensure_rows<'a>(&mut self, keys: impl IntoIterator<Item = &'a CacheKey>) -> usize {
        self.ensure_rows_at(keys, Utc::now())
    }

    pub(crate) fn ensure_rows_at<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a CacheKey>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut added = 0;
        for key in keys {
            if !self.table.rows.contains_key(key) {
                self.table.rows.insert(key.clone(), CacheRow::new(now));
                added += 1;
            }
        }

        if added > 0 {
            tracing::debug!(added, total = self.table.rows.len(), "Added cache rows");
            self.dirty = true;
        }
        added
    }

    /// Keys of rows where at least one of `columns` is unset, in key order
    pub fn rows_missing_any(&self, columns: &[String]) -> Vec<CacheKey> {
        self.table
            .rows
            .iter()
            .filter(|(_, row)| columns.iter().any(|c| !row.is_set(c)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Merge computed values into matching rows.
    ///
    /// Unset cells are filled; re-applying an identical value is a no-op.
    /// A different value for an already settled cell is rejected, and so
    /// are two different values for one cell within the batch. Values of
    /// the wrong type, values the cache file can't hold (NaN, timestamps
    /// past 2262) and unknown rows or columns are errors too. The batch
    /// is validated before anything is written.
    ///
    /// Returns the number of cells filled.
    pub fn update(&mut self, updates: &[RowUpdate]) -> Result<usize, CacheError> {
        let mut staged: BTreeMap<(&CacheKey, &str), &Value> = BTreeMap::new();
        for update in updates {
            let row = self
                .table
                .rows
                .get(&update.key)
                .ok_or_else(|| CacheError::UnknownKey {
                    key: update.key.to_string(),
                })?;

            for (column, value) in &update.values {
                let column_type =
                    self.table
                        .schema
                        .get(column)
                        .ok_or_else(|| CacheError::UnknownColumn {
                            column: column.clone(),
                        })?;

                if value.column_type() != *column_type {
                    return Err(CacheError::TypeMismatch {
                        column: column.clone(),
                        expected: column_type.to_string(),
                        found: value.column_type().to_string(),
                    });
                }

                value
                    .check_storable()
                    .map_err(|reason| CacheError::Unstorable {
                        key: update.key.to_string(),
                        column: column.clone(),
                        reason,
                    })?;

                let settled = row
                    .get(column)
                    .or_else(|| staged.get(&(&update.key, column.as_str())).copied());
                if let Some(existing) = settled {
                    if !existing.same_as(value) {
                        return Err(CacheError::ValueConflict {
                            key: update.key.to_string(),
                            column: column.clone(),
                        });
                    }
                }
                staged.insert((&update.key, column.as_str()), value);
            }
        }

        let mut filled = 0;
        for update in updates {
            if let Some(row) = self.table.rows.get_mut(&update.key) {
                for (column, value) in &update.values {
                    if !row.is_set(column) {
                        row.set(column.as_str(), value.clone());
                        filled += 1;
                    }
                }
            }
        }

        if filled > 0 {
            self.dirty = true;
        }
        Ok(filled)
    }

    /// Write the table to its store if anything changed.
    ///
    /// Returns whether a write happened.
    pub fn persist(&mut self) -> Result<bool, CacheError> {
        if !self.dirty {
            return Ok(false);
        }

        self.store.save(&self.table)?;
        self.dirty = false;
        tracing::debug!(rows = self.table.rows.len(), "Persisted cache");
        Ok(true)
    }

    /// Size of the persisted cache in bytes
    pub fn disk_size(&self) -> u64 {
        self.store.disk_size()
    }

    /// Every row restricted to `columns`
    pub fn project(&self, columns: &[String]) -> Projection {
        let mut projection = Projection::new(columns.to_vec());
        for (key, row) in &self.table.rows {
            let values = columns
                .iter()
                .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())));
            projection.insert(key.clone(), values);
        }
        projection
    }

    /// Remove rows first seen more than `max_age` ago.
    ///
    /// This is an explicit maintenance step; trimmed photos get fresh rows
    /// (and fresh values) the next time they are seen. Returns the number
    /// of rows removed.
    pub fn trim(&mut self, max_age: Duration) -> usize {
        self.trim_at(max_age, Utc::now())
    }

    pub(crate) fn trim_at(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            None => return 0,
        };

        let before = self.table.rows.len();
        self.table.rows.retain(|_, row| match row.checked_time() {
            Some(checked) => checked >= cutoff,
            None => false,
        });
        let removed = before - self.table.rows.len();

        if removed > 0 {
            tracing::info!(removed, "Trimmed stale cache rows");
            self.dirty = true;
        }
        removed
    }

    /// Value lookup that also answers for `checked_time`
    pub fn value(&self, key: &CacheKey, column: &str) -> Option<&Value> {
        self.table.rows.get(key).and_then(|row| row.get(column))
    }
}
