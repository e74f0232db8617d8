//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the sieve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Scanning phase events
    Scan(ScanEvent),
    /// Cache population events
    Populate(PopulateEvent),
    /// Filtering events
    Filter(FilterEvent),
}

/// Events while discovering candidate photos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { root: PathBuf },
    /// A path could not be scanned or resolved, scanning continues
    Error { path: PathBuf, message: String },
    /// Scanning completed
    Completed { total_photos: usize },
}

/// Events while filling missing cache columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PopulateEvent {
    /// Population has started
    Started {
        /// Rows in the cache after new paths were added
        total_rows: usize,
        /// Rows missing at least one computable column
        unfinished_rows: usize,
    },
    /// A chunk of rows was computed
    Progress(PopulateProgress),
    /// A single derived value could not be computed
    RowFailed {
        path: PathBuf,
        column: String,
        message: String,
    },
    /// Accumulated rows were merged and written to disk
    Checkpoint { rows: usize, disk_bytes: u64 },
    /// Population stopped early after saving what it had
    Interrupted { completed_rows: usize },
    /// Population completed
    Completed(PopulateSummary),
}

/// Progress information during population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulateProgress {
    /// Rows computed so far
    pub completed: usize,
    /// Rows to compute in this run
    pub total: usize,
    /// Number of derived values that failed so far
    pub failures: usize,
}

/// Summary of a population run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulateSummary {
    /// Rows that were missing values at the start of the run
    pub computed_rows: usize,
    /// Derived values written into the cache
    pub filled_cells: usize,
    /// Derived values that failed and stay unset
    pub failures: usize,
    /// Number of times the cache was written to disk
    pub checkpoints: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Events while applying filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FilterEvent {
    /// Filtering has started
    Started { candidates: usize },
    /// A filter finished reducing the working set
    Applied {
        filter: String,
        before: usize,
        after: usize,
    },
    /// Filtering completed
    Completed { survivors: usize },
}
