//! Builder: owns the cache, the registered filters and the run settings.

use super::{CancellationToken, PopulateReport};
use crate::config::{CacheConfig, Settings};
use crate::core::cache::{Cache, CacheKey, CHECKED_TIME_COLUMN, PATH_COLUMN};
use crate::core::filter::{Evaluation, Filter};
use crate::core::scanner::PathIndex;
use crate::core::schema::SchemaRegistry;
use crate::error::{Result, SchemaError, SieveError};
use crate::events::{Event, EventSender, FilterEvent};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Result of `Builder::run`
#[derive(Debug)]
pub struct SieveOutcome {
    pub population: PopulateReport,
    /// Surviving paths, as the caller spelled them, in sort order
    pub selected: Vec<PathBuf>,
}

/// Populates the cache and applies filters to candidate photos.
///
/// Paths handed to `populate` and `filter` are relative to `origin`
/// (absolute paths work too).
pub struct Builder {
    pub(super) origin: PathBuf,
    pub(super) cache: Cache,
    pub(super) registry: SchemaRegistry,
    pub(super) filters: Vec<Filter>,
    pub(super) config: CacheConfig,
    pub(super) workers: Option<usize>,
    pub(super) events: EventSender,
    pub(super) cancel: CancellationToken,
}

impl Builder {
    /// Open the cache at `settings.cache.filepath`, trimming it first if
    /// `settings.cache.trim` is set.
    pub fn open(origin: impl Into<PathBuf>, settings: &Settings) -> Result<Self> {
        let cache = Cache::load(&settings.cache.filepath)?;
        tracing::info!(
            path = %settings.cache.filepath.display(),
            rows = cache.len(),
            columns = cache.schema().len(),
            "Opened cache"
        );

        let mut builder = Self::with_cache(origin, cache, settings)?;
        if settings.cache.trim {
            builder.trim()?;
        }
        Ok(builder)
    }

    /// Use an already loaded cache
    pub fn with_cache(origin: impl Into<PathBuf>, cache: Cache, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            origin: origin.into(),
            cache,
            registry: SchemaRegistry::new(),
            filters: Vec::new(),
            config: settings.cache.clone(),
            workers: settings.workers,
            events: EventSender::discard(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Register filters, in the order they will run.
    ///
    /// Either every filter is registered or, on a schema conflict,
    /// none is. A build that differs from the one the cache's values
    /// were computed with is a conflict too.
    pub fn add_filters<I>(&mut self, filters: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Filter>,
    {
        self.register(filters, false)
    }

    /// Like `add_filters`, but later build definitions replace earlier
    /// ones, and cached values from a replaced build are cleared so the
    /// next `populate` recomputes them
    pub fn add_filters_overwrite<I>(&mut self, filters: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Filter>,
    {
        self.register(filters, true)
    }

    fn register<I>(&mut self, filters: I, overwrite: bool) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Filter>,
    {
        let filters: Vec<Filter> = filters.into_iter().map(Into::into).collect();
        let mut staged = self.registry.clone();
        for filter in &filters {
            if overwrite {
                staged.register_overwrite(filter)?;
            } else {
                staged.register(filter)?;
            }
        }

        let builds = staged.build_exprs();
        if !overwrite {
            for (column, build) in &builds {
                if let Some(stored) = self.cache.build_id(column) {
                    if stored != build.id() {
                        return Err(SchemaError::Conflict {
                            column: column.clone(),
                            existing: stored.to_string(),
                            incoming: build.id().to_string(),
                        }
                        .into());
                    }
                }
            }
        }

        self.cache.ensure_columns(&staged.merged_schema())?;
        for (column, build) in &builds {
            let cleared = self.cache.record_build(column, build.id())?;
            if cleared > 0 {
                tracing::info!(%column, build = build.id(), cleared, "Cleared values of a replaced build");
            }
        }
        self.registry = staged;
        for filter in &filters {
            tracing::debug!(filter = %filter.name(), "Registered filter");
        }
        self.filters.extend(filters);
        Ok(())
    }

    /// Compute missing values, then filter. The sort column is checked
    /// before any work starts.
    pub fn run<P: AsRef<Path>>(&mut self, paths: &[P], sort_by: &str) -> Result<SieveOutcome> {
        self.check_sort_column(sort_by)?;
        let population = self.populate(paths)?;
        let selected = self.filter(paths, sort_by)?;
        Ok(SieveOutcome {
            population,
            selected,
        })
    }

    /// Apply every registered filter to the cached rows of `paths`.
    ///
    /// Paths without a cache row are left out; call `populate` first.
    /// Returns the surviving paths ordered ascending by `sort_by`, with
    /// unset values last and ties broken by path.
    pub fn filter<P: AsRef<Path>>(&self, paths: &[P], sort_by: &str) -> Result<Vec<PathBuf>> {
        self.check_sort_column(sort_by)?;

        let (index, unresolved) = PathIndex::resolve(&self.origin, paths);
        for error in &unresolved {
            tracing::debug!(%error, "Skipping unresolved path");
        }

        let mut working: BTreeSet<CacheKey> = index
            .keys()
            .filter(|key| self.cache.contains(key))
            .cloned()
            .collect();

        self.events.send(Event::Filter(FilterEvent::Started {
            candidates: working.len(),
        }));

        for filter in &self.filters {
            if working.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                return Err(SieveError::Interrupted {
                    completed_rows: 0,
                    checkpointed_rows: 0,
                });
            }

            let before = working.len();
            working = match filter.evaluation() {
                Evaluation::Fast(predicate) => working
                    .par_iter()
                    .filter(|key| {
                        self.cache
                            .row(key)
                            .is_some_and(|row| predicate.evaluate(key, row))
                    })
                    .cloned()
                    .collect(),
                Evaluation::Comparable(comparable) => {
                    let columns: Vec<String> =
                        filter.columns().into_iter().map(|spec| spec.name).collect();
                    let projection = self.cache.project(&columns);
                    comparable
                        .survivors(&working, &projection)
                        .into_iter()
                        .filter(|key| working.contains(key))
                        .collect()
                }
            };

            tracing::debug!(filter = %filter.name(), before, after = working.len(), "Applied filter");
            self.events.send(Event::Filter(FilterEvent::Applied {
                filter: filter.name(),
                before,
                after: working.len(),
            }));
        }

        let mut survivors: Vec<CacheKey> = working.into_iter().collect();
        survivors.sort_by(|a, b| self.compare_for_sort(a, b, sort_by));

        self.events.send(Event::Filter(FilterEvent::Completed {
            survivors: survivors.len(),
        }));
        tracing::info!(survivors = survivors.len(), "Filtering complete");

        Ok(survivors
            .iter()
            .filter_map(|key| index.relative(key).map(Path::to_path_buf))
            .collect())
    }

    /// Remove rows older than the configured age limit and save
    pub fn trim(&mut self) -> Result<usize> {
        let removed = self.cache.trim(self.config.trim_age());
        if removed > 0 {
            self.cache.persist()?;
        }
        Ok(removed)
    }

    /// Size of the cache file in bytes
    pub fn disk_size(&self) -> u64 {
        self.cache.disk_size()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    fn check_sort_column(&self, column: &str) -> Result<()> {
        if column == PATH_COLUMN
            || column == CHECKED_TIME_COLUMN
            || self.registry.contains(column)
            || self.cache.has_column(column)
        {
            Ok(())
        } else {
            Err(SieveError::UnknownSortColumn {
                column: column.to_string(),
            })
        }
    }

    fn compare_for_sort(&self, a: &CacheKey, b: &CacheKey, column: &str) -> Ordering {
        if column == PATH_COLUMN {
            return a.cmp(b);
        }

        let by_value = match (self.cache.value(a, column), self.cache.value(b, column)) {
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_value.then_with(|| a.cmp(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{ColumnType, RowUpdate, Value};
    use crate::core::filter::{
        BuildExpr, ColumnSpec, CompareOp, CustomFilter, Field, HashFilter, Predicate,
        ResolutionFilter,
    };
    use std::fs;
    use tempfile::TempDir;

    fn settings(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.cache.filepath = dir.join("cache.db");
        settings
    }

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), name.as_bytes()).unwrap();
        }
    }

    fn key_of(dir: &Path, name: &str) -> CacheKey {
        CacheKey::new(fs::canonicalize(dir.join(name)).unwrap().to_str().unwrap())
    }

    /// Builder over an in-memory cache with values set directly
    fn seeded(dir: &Path, column: &str, column_type: ColumnType, values: &[(&str, Value)]) -> Builder {
        let names: Vec<&str> = values.iter().map(|(name, _)| *name).collect();
        touch(dir, &names);

        let mut cache = Cache::in_memory();
        let schema = [(column.to_string(), column_type)].into_iter().collect();
        cache.ensure_columns(&schema).unwrap();
        let keys: Vec<CacheKey> = names.iter().map(|n| key_of(dir, n)).collect();
        cache.ensure_rows(&keys);
        let updates: Vec<RowUpdate> = values
            .iter()
            .map(|(name, value)| RowUpdate::new(key_of(dir, name)).with(column, value.clone()))
            .collect();
        cache.update(&updates).unwrap();

        Builder::with_cache(dir, cache, &settings(dir)).unwrap()
    }

    #[test]
    fn resolution_minimum_keeps_large_photos() {
        let temp_dir = TempDir::new().unwrap();
        let mut builder = seeded(
            temp_dir.path(),
            "resolution",
            ColumnType::IntPair,
            &[("a.jpg", Value::IntPair(100, 100)), ("b.jpg", Value::IntPair(50, 50))],
        );
        builder
            .add_filters([ResolutionFilter::new(Some(80), None).unwrap()])
            .unwrap();

        let selected = builder.filter(&["a.jpg", "b.jpg"], "path").unwrap();

        assert_eq!(selected, vec![PathBuf::from("a.jpg")]);
    }

    #[test]
    fn newest_duplicate_survives() {
        let temp_dir = TempDir::new().unwrap();
        let mut builder = seeded(
            temp_dir.path(),
            "hash",
            ColumnType::Text,
            &[("a.jpg", Value::Text("X".into())), ("b.jpg", Value::Text("X".into()))],
        );
        let times = [("a.jpg", 10), ("b.jpg", 20)];
        builder
            .cache
            .ensure_columns(&[("modified_time".to_string(), ColumnType::Timestamp)].into_iter().collect())
            .unwrap();
        for (name, secs) in times {
            builder
                .cache
                .update(&[RowUpdate::new(key_of(temp_dir.path(), name)).with(
                    "modified_time",
                    Value::Timestamp(chrono::DateTime::from_timestamp(secs, 0).unwrap()),
                )])
                .unwrap();
        }
        builder
            .add_filters([HashFilter::new("gradient", "newest").unwrap()])
            .unwrap();

        let selected = builder.filter(&["a.jpg", "b.jpg"], "path").unwrap();

        assert_eq!(selected, vec![PathBuf::from("b.jpg")]);
    }

    #[test]
    fn path_sort_is_strictly_ascending() {
        let temp_dir = TempDir::new().unwrap();
        let names = ["d.jpg", "a.jpg", "c.jpg", "b.jpg"];
        let values: Vec<(&str, Value)> = names.iter().map(|n| (*n, Value::Integer(1))).collect();
        let builder = seeded(temp_dir.path(), "file_size", ColumnType::Integer, &values);

        let selected = builder.filter(&names, "path").unwrap();

        let expected: Vec<PathBuf> = ["a.jpg", "b.jpg", "c.jpg", "d.jpg"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(selected, expected);
    }

    #[test]
    fn value_sort_puts_unset_last() {
        let temp_dir = TempDir::new().unwrap();
        let mut builder = seeded(
            temp_dir.path(),
            "file_size",
            ColumnType::Integer,
            &[("a.jpg", Value::Integer(30)), ("b.jpg", Value::Integer(10))],
        );
        touch(temp_dir.path(), &["c.jpg"]);
        builder.cache.ensure_rows([&key_of(temp_dir.path(), "c.jpg")]);

        let selected = builder.filter(&["a.jpg", "b.jpg", "c.jpg"], "file_size").unwrap();

        assert_eq!(
            selected,
            vec![PathBuf::from("b.jpg"), PathBuf::from("a.jpg"), PathBuf::from("c.jpg")]
        );
    }

    #[test]
    fn unknown_sort_column_fails_before_work() {
        let temp_dir = TempDir::new().unwrap();
        let builder = seeded(
            temp_dir.path(),
            "file_size",
            ColumnType::Integer,
            &[("a.jpg", Value::Integer(1))],
        );

        let result = builder.filter(&["a.jpg"], "megapixels");

        assert!(matches!(result, Err(SieveError::UnknownSortColumn { .. })));
    }

    #[test]
    fn uncached_paths_are_not_selected() {
        let temp_dir = TempDir::new().unwrap();
        let builder = seeded(
            temp_dir.path(),
            "file_size",
            ColumnType::Integer,
            &[("a.jpg", Value::Integer(1))],
        );
        touch(temp_dir.path(), &["new.jpg"]);

        let selected = builder.filter(&["a.jpg", "new.jpg", "missing.jpg"], "path").unwrap();

        assert_eq!(selected, vec![PathBuf::from("a.jpg")]);
    }

    #[test]
    fn conflicting_batch_registers_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut builder = Builder::with_cache(temp_dir.path(), Cache::in_memory(), &settings(temp_dir.path())).unwrap();

        let result = builder.add_filters([
            HashFilter::new("mean", "newest").unwrap(),
            HashFilter::new("median", "newest").unwrap(),
        ]);

        assert!(matches!(result, Err(SieveError::Schema(_))));
        assert!(builder.filters().is_empty());
        assert!(builder.registry().is_empty());
        assert!(builder.cache().schema().is_empty());
    }

    fn length_filter(build_id: &str) -> CustomFilter {
        CustomFilter::new(
            "length",
            vec![ColumnSpec::computed(
                "length",
                ColumnType::Integer,
                BuildExpr::new(build_id, |path| {
                    Ok(Value::Integer(fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0)))
                }),
            )],
            Predicate::And(vec![]),
        )
    }

    #[test]
    fn changed_build_conflicts_with_cached_values() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), &["a.jpg", "b.jpg"]);
        let settings = settings(temp_dir.path());

        let mut first = Builder::open(temp_dir.path(), &settings).unwrap();
        first.add_filters([length_filter("length:v1")]).unwrap();
        first.populate(&["a.jpg", "b.jpg"]).unwrap();

        let mut second = Builder::open(temp_dir.path(), &settings).unwrap();
        let result = second.add_filters([length_filter("length:v2")]);

        assert!(matches!(
            result,
            Err(SieveError::Schema(SchemaError::Conflict { .. }))
        ));
        assert!(second.filters().is_empty());
        assert_eq!(second.cache().build_id("length"), Some("length:v1"));
    }

    #[test]
    fn overwriting_a_build_recomputes_every_row() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), &["a.jpg", "b.jpg"]);
        let settings = settings(temp_dir.path());

        let mut first = Builder::open(temp_dir.path(), &settings).unwrap();
        first.add_filters([length_filter("length:v1")]).unwrap();
        first.populate(&["a.jpg", "b.jpg"]).unwrap();

        let mut second = Builder::open(temp_dir.path(), &settings).unwrap();
        second
            .add_filters_overwrite([length_filter("length:v2")])
            .unwrap();
        let report = second.populate(&["a.jpg", "b.jpg"]).unwrap();

        assert_eq!(report.computed_rows, 2);
        let reloaded = Cache::load(&settings.cache.filepath).unwrap();
        assert_eq!(reloaded.build_id("length"), Some("length:v2"));
    }

    #[test]
    fn cancellation_stops_filtering() {
        let temp_dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let mut builder = seeded(
            temp_dir.path(),
            "file_size",
            ColumnType::Integer,
            &[("a.jpg", Value::Integer(1))],
        )
        .with_cancellation(token.clone());
        builder
            .add_filters([CustomFilter::new(
                "everything",
                vec![ColumnSpec::assumed("file_size", ColumnType::Integer)],
                Predicate::And(vec![]),
            )])
            .unwrap();
        token.cancel();

        let result = builder.filter(&["a.jpg"], "path");

        assert!(matches!(result, Err(SieveError::Interrupted { .. })));
    }

    #[test]
    fn run_populates_then_filters() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("small.jpg"), vec![0u8; 10]).unwrap();
        fs::write(temp_dir.path().join("large.jpg"), vec![0u8; 1000]).unwrap();
        let mut builder = Builder::open(temp_dir.path(), &settings(temp_dir.path())).unwrap();
        builder
            .add_filters([CustomFilter::new(
                "bytes",
                vec![ColumnSpec::computed(
                    "bytes",
                    ColumnType::Integer,
                    BuildExpr::new("bytes:v1", |path| {
                        Ok(Value::Integer(fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0)))
                    }),
                )],
                Predicate::compare(Field::column("bytes"), CompareOp::Gt, Value::Integer(100)),
            )])
            .unwrap();

        let outcome = builder.run(&["small.jpg", "large.jpg"], "bytes").unwrap();

        assert_eq!(outcome.population.computed_rows, 2);
        assert_eq!(outcome.selected, vec![PathBuf::from("large.jpg")]);
        assert!(builder.disk_size() > 0);
    }

    #[test]
    fn trim_removes_stale_rows_and_saves() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), &["old.jpg"]);
        let mut settings = settings(temp_dir.path());
        settings.cache.trim_age_limit = 60;

        let mut cache = Cache::load(&settings.cache.filepath).unwrap();
        cache.ensure_rows_at(
            [&key_of(temp_dir.path(), "old.jpg")],
            chrono::DateTime::from_timestamp(1_000, 0).unwrap(),
        );
        cache.persist().unwrap();

        settings.cache.trim = true;
        let builder = Builder::open(temp_dir.path(), &settings).unwrap();

        assert!(builder.cache().is_empty());
        assert!(Cache::load(&settings.cache.filepath).unwrap().is_empty());
    }
}
