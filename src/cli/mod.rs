//! # CLI Module
//!
//! Command-line interface for the photo sieve.
//!
//! ## Usage
//! ```bash
//! # Photos at least 1000px on each side, newest copy of each duplicate
//! photo-sieve filter ~/Photos --min-resolution 1000 --dedupe gradient
//!
//! # Taken during 2023, sorted by file size, as JSON
//! photo-sieve filter ~/Photos --after 2023-01-01 --before 2023-12-31 \
//!     --date-field taken --sort-by file_size --output json
//!
//! # Inspect or trim the cache
//! photo-sieve stats
//! photo-sieve trim
//! ```

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photo_sieve::config::Settings;
use photo_sieve::core::cache::Cache;
use photo_sieve::core::filter::{
    DateField, DateFilter, FileSizeFilter, Filter, HashFilter, ResolutionFilter,
};
use photo_sieve::core::pipeline::{Builder, CancellationToken, SieveOutcome};
use photo_sieve::core::scanner::{PhotoScanner, ScanConfig, WalkDirScanner};
use photo_sieve::error::{FilterError, Result};
use photo_sieve::events::{self, Event, FilterEvent, PopulateEvent, ScanEvent};
use std::path::{Path, PathBuf};
use std::thread;

/// Photo Sieve - select photos from a persistent metadata cache
#[derive(Parser, Debug)]
#[command(name = "photo-sieve")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the photos under a directory that pass every filter
    Filter(FilterArgs),
    /// Show what the cache holds
    Stats(CacheArgs),
    /// Remove cache rows older than the configured age limit
    Trim(CacheArgs),
}

#[derive(Args, Debug)]
struct CacheArgs {
    /// Settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache database path (overrides the settings file)
    #[arg(long)]
    cache: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Directory to scan
    dir: PathBuf,

    /// Minimum width and height in pixels
    #[arg(long)]
    min_resolution: Option<u32>,

    /// Maximum width and height in pixels
    #[arg(long)]
    max_resolution: Option<u32>,

    /// Keep photos dated on or after (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_after)]
    after: Option<DateTime<Utc>>,

    /// Keep photos dated on or before (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_before)]
    before: Option<DateTime<Utc>>,

    /// Which date --after and --before compare against
    #[arg(long, default_value = "modified")]
    date_field: DateFieldArg,

    /// Minimum file size in bytes
    #[arg(long)]
    min_size: Option<u64>,

    /// Maximum file size in bytes
    #[arg(long)]
    max_size: Option<u64>,

    /// Keep one photo per perceptual hash, using this algorithm
    /// (mean, median, gradient, vertgradient, doublegradient, blockhash, perceptual)
    #[arg(long)]
    dedupe: Option<String>,

    /// Which duplicate to keep (newest, oldest, largest, smallest)
    #[arg(long, default_value = "newest")]
    resolver: String,

    /// Recompute cached values that came from a different algorithm
    #[arg(long)]
    rebuild: bool,

    /// Cache column to sort the output by
    #[arg(long, default_value = "path")]
    sort_by: String,

    /// Include hidden files
    #[arg(long)]
    include_hidden: bool,

    /// Worker threads (default: one per CPU)
    #[arg(long)]
    workers: Option<usize>,

    /// Output format
    #[arg(short, long, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    cache: CacheArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateFieldArg {
    /// Filesystem modification time
    Modified,
    /// EXIF capture time
    Taken,
}

impl From<DateFieldArg> for DateField {
    fn from(arg: DateFieldArg) -> Self {
        match arg {
            DateFieldArg::Modified => DateField::Modified,
            DateFieldArg::Taken => DateField::Taken,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (paths only)
    Minimal,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Filter(args) => run_filter(args),
        Commands::Stats(args) => run_stats(args),
        Commands::Trim(args) => run_trim(args),
    }
}

fn load_settings(args: &CacheArgs) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(ref cache) = args.cache {
        settings.cache.filepath = cache.clone();
    }
    Ok(settings)
}

fn build_filters(args: &FilterArgs) -> std::result::Result<Vec<Filter>, FilterError> {
    let mut filters: Vec<Filter> = Vec::new();

    // cheap fast filters first, the cross-row hash filter last
    if args.min_resolution.is_some() || args.max_resolution.is_some() {
        filters.push(ResolutionFilter::new(args.min_resolution, args.max_resolution)?.into());
    }
    if args.after.is_some() || args.before.is_some() {
        filters.push(DateFilter::new(args.date_field.into(), args.after, args.before)?.into());
    }
    if args.min_size.is_some() || args.max_size.is_some() {
        filters.push(FileSizeFilter::new(args.min_size, args.max_size)?.into());
    }
    if let Some(ref algorithm) = args.dedupe {
        filters.push(HashFilter::new(algorithm, &args.resolver)?.into());
    }
    Ok(filters)
}

fn run_filter(args: FilterArgs) -> Result<()> {
    let term = Term::stderr();
    let pretty = matches!(args.output, OutputFormat::Pretty);

    let mut settings = load_settings(&args.cache)?;
    if args.workers.is_some() {
        settings.workers = args.workers;
    }
    let filters = build_filters(&args)?;

    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("Photo Sieve").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Saving progress...");
        handler_token.cancel();
    }) {
        tracing::warn!(error = %e, "Could not install Ctrl+C handler");
    }

    let (sender, receiver) = events::channel();

    // Progress bar for pretty output
    let progress = if pretty {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();
    let verbose = args.verbose;

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            let Some(ref pb) = progress_clone else {
                continue;
            };
            match event {
                Event::Scan(ScanEvent::Completed { total_photos }) => {
                    pb.set_message(format!("{} photos found", total_photos));
                }
                Event::Scan(ScanEvent::Error { path, message }) if verbose => {
                    pb.println(format!("  {} {}: {}", style("!").yellow(), path.display(), message));
                }
                Event::Populate(PopulateEvent::Started {
                    unfinished_rows, ..
                }) => {
                    pb.set_length(unfinished_rows as u64);
                    pb.set_message("reading metadata");
                }
                Event::Populate(PopulateEvent::Progress(p)) => {
                    pb.set_position(p.completed as u64);
                }
                Event::Populate(PopulateEvent::RowFailed {
                    path,
                    column,
                    message,
                }) if verbose => {
                    pb.println(format!(
                        "  {} {} ({}): {}",
                        style("!").yellow(),
                        path.display(),
                        column,
                        message
                    ));
                }
                Event::Populate(PopulateEvent::Checkpoint { rows, disk_bytes }) => {
                    pb.set_message(format!("saved {} rows ({})", rows, format_bytes(disk_bytes)));
                }
                Event::Populate(PopulateEvent::Completed(_))
                | Event::Populate(PopulateEvent::Interrupted { .. }) => {
                    pb.finish_and_clear();
                }
                Event::Filter(FilterEvent::Applied {
                    filter,
                    before,
                    after,
                }) if verbose => {
                    pb.println(format!("  {} {} -> {}", style(filter).bold(), before, after));
                }
                _ => {}
            }
        }
    });

    let scanner = WalkDirScanner::new(ScanConfig {
        include_hidden: args.include_hidden,
        ..Default::default()
    });
    let scan = scanner.scan_with_events(&args.dir, &sender)?;

    let result = Builder::open(&args.dir, &settings).and_then(|builder| {
        let mut builder = builder
            .with_events(sender.clone())
            .with_cancellation(token);
        if args.rebuild {
            builder.add_filters_overwrite(filters)?;
        } else {
            builder.add_filters(filters)?;
        }
        let outcome = builder.run(&scan.photos, &args.sort_by)?;
        Ok((outcome, builder.disk_size()))
    });

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let (outcome, disk_size) = result?;
    match args.output {
        OutputFormat::Pretty => print_pretty_results(&term, &outcome, scan.photos.len(), disk_size),
        OutputFormat::Json => print_json_results(&outcome, scan.photos.len()),
        OutputFormat::Minimal => print_minimal_results(&outcome),
    }

    Ok(())
}

fn print_pretty_results(term: &Term, outcome: &SieveOutcome, scanned: usize, disk_size: u64) {
    let report = &outcome.population;
    term.write_line(&format!("{} Done", style("✓").green().bold())).ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} photos scanned, {} needed new metadata ({:.1}s)",
        style(scanned).cyan(),
        style(report.computed_rows).cyan(),
        report.duration_ms as f64 / 1000.0
    ))
    .ok();

    if !report.failures.is_empty() {
        term.write_line(&format!(
            "  {} values could not be read (will retry next run)",
            style(report.failures.len()).yellow()
        ))
        .ok();
    }

    term.write_line(&format!(
        "  {} photos selected",
        style(outcome.selected.len()).green().bold()
    ))
    .ok();
    term.write_line(&format!("  {} cache size", style(format_bytes(disk_size)).dim()))
        .ok();
    term.write_line("").ok();

    for path in &outcome.selected {
        println!("{}", path.display());
    }
}

fn print_json_results(outcome: &SieveOutcome, scanned: usize) {
    let report = &outcome.population;
    let output = serde_json::json!({
        "scanned": scanned,
        "cache_rows": report.total_rows,
        "computed_rows": report.computed_rows,
        "filled_cells": report.filled_cells,
        "checkpoints": report.checkpoints,
        "duration_ms": report.duration_ms,
        "failures": report.failures.iter().map(|f| {
            serde_json::json!({
                "path": f.key.as_str(),
                "column": f.column,
                "error": f.error.to_string(),
            })
        }).collect::<Vec<_>>(),
        "selected": outcome.selected,
    });

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to serialize results"),
    }
}

fn print_minimal_results(outcome: &SieveOutcome) {
    for path in &outcome.selected {
        println!("{}", path.display());
    }
}

fn run_stats(args: CacheArgs) -> Result<()> {
    let term = Term::stdout();
    let settings = load_settings(&args)?;
    let path = &settings.cache.filepath;
    let cache = Cache::load(path)?;

    term.write_line(&format!("{} {}", style("Cache:").bold(), path.display()))
        .ok();
    term.write_line(&format!(
        "  {} rows, {}",
        style(cache.len()).cyan(),
        format_bytes(cache.disk_size())
    ))
    .ok();

    for (column, column_type) in cache.schema() {
        let filled = cache.rows().filter(|(_, row)| row.is_set(column)).count();
        term.write_line(&format!(
            "  {:<20} {:<10} {}/{}",
            column,
            style(column_type).dim(),
            filled,
            cache.len()
        ))
        .ok();
    }
    Ok(())
}

fn run_trim(args: CacheArgs) -> Result<()> {
    let mut settings = load_settings(&args)?;
    // trim explicitly below so the removed count is reported
    settings.cache.trim = false;
    let cwd = PathBuf::from(".");
    let mut builder = Builder::open(&cwd, &settings)?;
    let removed = builder.trim()?;
    println!(
        "Removed {} rows older than {} days from {}",
        removed,
        settings.cache.trim_age_limit / 86_400,
        display_path(&settings.cache.filepath)
    );
    Ok(())
}

fn parse_after(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_date(s, NaiveTime::MIN)
}

fn parse_before(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    parse_date(s, end_of_day)
}

/// RFC 3339, or a bare date at `time` UTC
fn parse_date(s: &str, time: NaiveTime) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|date| date.and_time(time).and_utc())
        .map_err(|_| format!("'{}' is not a date (expected YYYY-MM-DD or RFC 3339)", s))
}

fn display_path(path: &Path) -> String {
    let home = dirs::home_dir().unwrap_or_default();
    match path.strip_prefix(&home) {
        Ok(rest) if !home.as_os_str().is_empty() => format!("~/{}", rest.display()),
        _ => path.display().to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn bare_dates_cover_whole_days() {
        let after = parse_after("2024-03-01").unwrap();
        let before = parse_before("2024-03-01").unwrap();

        assert_eq!(after.hour(), 0);
        assert_eq!(before.hour(), 23);
        assert_eq!(before.day(), 1);
    }

    #[test]
    fn rfc3339_dates_convert_to_utc() {
        let parsed = parse_after("2024-03-01T10:00:00+02:00").unwrap();

        assert_eq!(parsed.hour(), 8);
        assert!(parse_after("yesterday").is_err());
    }

    #[test]
    fn bytes_are_human_readable() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn cli_parses_filter_arguments() {
        let cli = Cli::parse_from([
            "photo-sieve",
            "filter",
            "/photos",
            "--min-resolution",
            "80",
            "--dedupe",
            "gradient",
            "--date-field",
            "taken",
            "--after",
            "2020-01-01",
        ]);

        match cli.command {
            Commands::Filter(args) => {
                let filters = build_filters(&args).unwrap();
                assert_eq!(filters.len(), 3);
                assert!(matches!(filters[2], Filter::Hash(_)));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn invalid_resolver_is_reported() {
        let cli = Cli::parse_from([
            "photo-sieve",
            "filter",
            "/photos",
            "--dedupe",
            "mean",
            "--resolver",
            "random",
        ]);

        match cli.command {
            Commands::Filter(args) => assert!(build_filters(&args).is_err()),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
