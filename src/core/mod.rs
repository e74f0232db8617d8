//! # Core Module
//!
//! The photo selection engine.
//!
//! ## Modules
//! - `scanner` - Discovers photos and maps them to cache keys
//! - `cache` - Persistent table of derived values per photo
//! - `schema` - Merges the columns filters declare
//! - `metadata` - Reads dimensions, sizes and dates from photos
//! - `hasher` - Computes perceptual hashes
//! - `filter` - Resolution, date, size, hash and custom filters
//! - `pipeline` - Populates the cache and applies filters

pub mod cache;
pub mod filter;
pub mod hasher;
pub mod metadata;
pub mod pipeline;
pub mod scanner;
pub mod schema;

// Re-export commonly used types
pub use cache::{Cache, CacheKey, ColumnType, Value};
pub use filter::Filter;
pub use hasher::{HashAlgorithmKind, PhotoHasher};
pub use pipeline::{Builder, CancellationToken, PopulateReport, SieveOutcome};
pub use scanner::PathIndex;
pub use schema::SchemaRegistry;
