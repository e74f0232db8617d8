//! Cache store trait definition.

use super::CacheTable;
use crate::error::CacheError;

/// Durable home of a cache table.
///
/// Stores deal in whole tables: `save` replaces the previous snapshot
/// atomically, so a reader never observes a half-written table.
pub trait CacheStore: Send + Sync {
    /// Read the last saved table, `None` if nothing was saved yet
    fn load(&self) -> Result<Option<CacheTable>, CacheError>;

    /// Replace the saved table with `table`
    fn save(&self, table: &CacheTable) -> Result<(), CacheError>;

    /// Size of the saved representation in bytes
    fn disk_size(&self) -> u64;
}
