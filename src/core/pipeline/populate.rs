//! Population: compute missing column values and checkpoint them.

use super::Builder;
use crate::core::cache::{Cache, CacheKey, RowUpdate};
use crate::core::filter::BuildExpr;
use crate::core::scanner::PathIndex;
use crate::error::{ComputeError, PathError, Result, SieveError};
use crate::events::{Event, PopulateEvent, PopulateProgress, PopulateSummary, ScanEvent};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One value that could not be computed; the cell stays unset and is
/// retried on the next run.
#[derive(Debug, Clone)]
pub struct RowFailure {
    pub key: CacheKey,
    pub column: String,
    pub error: ComputeError,
}

/// What a population run did
#[derive(Debug, Default)]
pub struct PopulateReport {
    /// Rows in the cache after new paths were added
    pub total_rows: usize,
    /// Rows that were missing at least one computable value
    pub computed_rows: usize,
    /// Values written into the cache
    pub filled_cells: usize,
    pub failures: Vec<RowFailure>,
    /// Paths that could not be mapped to a cache key
    pub unresolved: Vec<PathError>,
    /// Number of times the cache was written
    pub checkpoints: usize,
    pub duration_ms: u64,
}

impl Builder {
    /// Add rows for new paths and compute every value the registered
    /// filters can build but the cache is missing.
    ///
    /// Every row in the cache is considered, not only `paths`, because
    /// cross-row filters read the whole cache. Work is done in chunks of
    /// `chunksize` rows. The results are merged and the cache is saved
    /// whenever `save_interval` rows have been computed, or earlier if the
    /// next chunk would take the unsaved rows past `save_interval`. On
    /// cancellation the results so far are saved before returning
    /// `SieveError::Interrupted`.
    pub fn populate<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<PopulateReport> {
        let start_time = Instant::now();

        let (index, unresolved) = PathIndex::resolve(&self.origin, paths);
        for error in &unresolved {
            tracing::warn!(%error, "Skipping path");
            self.events.send(Event::Scan(ScanEvent::Error {
                path: error_path(error),
                message: error.to_string(),
            }));
        }

        self.cache.ensure_rows(index.keys());
        self.cache.ensure_columns(&self.registry.merged_schema())?;

        let builds = self.registry.build_exprs();
        let build_columns: Vec<String> = builds.keys().cloned().collect();
        let unfinished = self.cache.rows_missing_any(&build_columns);

        let mut report = PopulateReport {
            total_rows: self.cache.len(),
            computed_rows: unfinished.len(),
            unresolved,
            ..Default::default()
        };

        tracing::info!(
            rows = report.total_rows,
            unfinished = unfinished.len(),
            columns = build_columns.len(),
            "Populating cache"
        );
        self.events.send(Event::Populate(PopulateEvent::Started {
            total_rows: report.total_rows,
            unfinished_rows: unfinished.len(),
        }));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.unwrap_or(0))
            .build()
            .map_err(|e| SieveError::WorkerPool(e.to_string()))?;

        let mut accumulator: Vec<RowUpdate> = Vec::new();
        let mut pending_rows = 0;
        let mut completed = 0;
        let mut checkpointed = 0;

        for chunk in unfinished.chunks(self.config.chunksize) {
            if self.cancel.is_cancelled() {
                self.checkpoint(&mut accumulator, &mut report)?;
                checkpointed += pending_rows;
                tracing::warn!(completed, checkpointed, "Population interrupted");
                self.events.send(Event::Populate(PopulateEvent::Interrupted {
                    completed_rows: completed,
                }));
                return Err(SieveError::Interrupted {
                    completed_rows: completed,
                    checkpointed_rows: checkpointed,
                });
            }

            // never let a crash lose more than save_interval rows
            if pending_rows > 0 && pending_rows + chunk.len() > self.config.save_interval {
                self.checkpoint(&mut accumulator, &mut report)?;
                checkpointed += pending_rows;
                pending_rows = 0;
            }

            let cache = &self.cache;
            let results: Vec<(RowUpdate, Vec<(String, ComputeError)>)> = pool.install(|| {
                chunk
                    .par_iter()
                    .map(|key| compute_row(cache, key, &builds))
                    .collect()
            });

            for (update, failures) in results {
                for (column, error) in failures {
                    tracing::warn!(key = %update.key, %column, %error, "Failed to compute value");
                    self.events.send(Event::Populate(PopulateEvent::RowFailed {
                        path: update.key.as_path().to_path_buf(),
                        column: column.clone(),
                        message: error.to_string(),
                    }));
                    report.failures.push(RowFailure {
                        key: update.key.clone(),
                        column,
                        error,
                    });
                }
                if !update.values.is_empty() {
                    accumulator.push(update);
                }
            }

            completed += chunk.len();
            pending_rows += chunk.len();
            self.events.send(Event::Populate(PopulateEvent::Progress(PopulateProgress {
                completed,
                total: unfinished.len(),
                failures: report.failures.len(),
            })));

            if pending_rows >= self.config.save_interval {
                self.checkpoint(&mut accumulator, &mut report)?;
                checkpointed += pending_rows;
                pending_rows = 0;
            }
        }

        self.checkpoint(&mut accumulator, &mut report)?;

        report.duration_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            computed = report.computed_rows,
            filled = report.filled_cells,
            failures = report.failures.len(),
            checkpoints = report.checkpoints,
            duration_ms = report.duration_ms,
            "Population complete"
        );
        self.events.send(Event::Populate(PopulateEvent::Completed(PopulateSummary {
            computed_rows: report.computed_rows,
            filled_cells: report.filled_cells,
            failures: report.failures.len(),
            checkpoints: report.checkpoints,
            duration_ms: report.duration_ms,
        })));

        Ok(report)
    }

    /// Merge the accumulator into the cache and save it
    fn checkpoint(
        &mut self,
        accumulator: &mut Vec<RowUpdate>,
        report: &mut PopulateReport,
    ) -> Result<()> {
        let filled = self.cache.update(accumulator)?;
        accumulator.clear();
        report.filled_cells += filled;

        if self.cache.persist()? {
            report.checkpoints += 1;
            let disk_bytes = self.cache.disk_size();
            tracing::debug!(filled, disk_bytes, "Checkpoint");
            self.events.send(Event::Populate(PopulateEvent::Checkpoint {
                rows: self.cache.len(),
                disk_bytes,
            }));
        }
        Ok(())
    }
}

/// Compute the values `key` is missing. Pure apart from reading the file.
fn compute_row(
    cache: &Cache,
    key: &CacheKey,
    builds: &BTreeMap<String, BuildExpr>,
) -> (RowUpdate, Vec<(String, ComputeError)>) {
    let mut update = RowUpdate::new(key.clone());
    let mut failures = Vec::new();

    let Some(row) = cache.row(key) else {
        return (update, failures);
    };

    for (column, build) in builds {
        if row.is_set(column) {
            continue;
        }
        match build.compute(key.as_path()) {
            Ok(value) => {
                update.values.insert(column.clone(), value);
            }
            Err(error) => failures.push((column.clone(), error)),
        }
    }

    (update, failures)
}

fn error_path(error: &PathError) -> PathBuf {
    match error {
        PathError::NotFound { path }
        | PathError::PermissionDenied { path }
        | PathError::NonUtf8 { path }
        | PathError::Duplicate { path, .. }
        | PathError::Io { path, .. } => path.clone(),
    }
}
