//! # Photo Sieve
//!
//! Selects photos from a directory by resolution, date, file size and
//! perceptual-hash duplication, backed by a persistent metadata cache.
//!
//! ## Core Philosophy
//! - **Compute once** - every derived value is cached and reused across runs
//! - **Survive interruption** - population checkpoints so a crash loses little
//! - **Never fail the batch** - unreadable photos are reported, not fatal
//!
//! ## Architecture
//! - `core` - The cache, filters and pipeline
//! - `config` - Layered settings (defaults, TOML file, environment)
//! - `events` - Event-driven progress reporting
//! - `error` - User-friendly error types

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{Result, SieveError};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. Log output goes
/// to stderr and is controlled by `RUST_LOG`. Calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
