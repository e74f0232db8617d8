//! End-to-end tests for the `photo-sieve` binary.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use image::{ImageBuffer, Rgb};
use predicates::prelude::*;
use std::process::{Command, Output};

fn write_png(dir: &TempDir, name: &str, width: u32, height: u32) {
    let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]));
    img.save(dir.child(name).path()).unwrap();
}

fn sieve(dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_photo-sieve"))
        .args(args)
        .env("PHOTO_SIEVE_CACHE__FILEPATH", dir.path().join("cache.db"))
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn filter_prints_surviving_paths() {
    let photos = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    write_png(&photos, "big.png", 120, 120);
    write_png(&photos, "tiny.png", 10, 10);

    let dir = photos.path().to_str().unwrap();
    let output = sieve(
        &state,
        &["filter", dir, "--min-resolution", "80", "--output", "minimal"],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(predicate::str::contains("big.png").eval(&stdout));
    assert!(predicate::str::contains("tiny.png").not().eval(&stdout));
    state.child("cache.db").assert(predicate::path::is_file());
}

#[test]
fn json_output_reports_population() {
    let photos = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    write_png(&photos, "a.png", 30, 30);
    write_png(&photos, "b.png", 40, 40);

    let dir = photos.path().to_str().unwrap();
    let output = sieve(
        &state,
        &["filter", dir, "--min-size", "1", "--sort-by", "file_size", "--output", "json"],
    );
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert!(output.status.success());
    assert_eq!(json["scanned"], 2);
    assert_eq!(json["computed_rows"], 2);
    assert_eq!(json["selected"].as_array().unwrap().len(), 2);
}

#[test]
fn unknown_sort_column_fails() {
    let photos = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    write_png(&photos, "a.png", 30, 30);

    let dir = photos.path().to_str().unwrap();
    let output = sieve(&state, &["filter", dir, "--sort-by", "colour"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(predicate::str::contains("colour").eval(&stderr));
}

#[test]
fn invalid_hash_algorithm_fails() {
    let photos = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();

    let dir = photos.path().to_str().unwrap();
    let output = sieve(&state, &["filter", dir, "--dedupe", "sha256"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(predicate::str::contains("sha256").eval(&stderr));
}

#[test]
fn switching_dedupe_algorithm_needs_rebuild() {
    let photos = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    write_png(&photos, "a.png", 30, 30);

    let dir = photos.path().to_str().unwrap();
    let first = sieve(&state, &["filter", dir, "--dedupe", "mean"]);
    assert!(first.status.success());

    let refused = sieve(&state, &["filter", dir, "--dedupe", "gradient"]);
    let stderr = String::from_utf8_lossy(&refused.stderr);
    assert!(!refused.status.success());
    assert!(predicate::str::contains("hash:mean").eval(&stderr));

    let rebuilt = sieve(
        &state,
        &["filter", dir, "--dedupe", "gradient", "--rebuild", "--output", "json"],
    );
    let json: serde_json::Value = serde_json::from_slice(&rebuilt.stdout).unwrap();
    assert!(rebuilt.status.success());
    assert_eq!(json["computed_rows"], 1);
}

#[test]
fn stats_lists_cached_columns() {
    let photos = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    write_png(&photos, "a.png", 30, 30);

    let dir = photos.path().to_str().unwrap();
    let filtered = sieve(&state, &["filter", dir, "--min-resolution", "1"]);
    assert!(filtered.status.success());

    let output = sieve(&state, &["stats"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(predicate::str::contains("resolution").eval(&stdout));
    assert!(predicate::str::contains("1/1").eval(&stdout));
}
