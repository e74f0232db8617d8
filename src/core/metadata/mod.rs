//! # Metadata Module
//!
//! Per-file computations behind the built-in cache columns.
//!
//! ## Extracted Fields
//! - Image dimensions (width x height), read from the image header
//! - File size and modification time, read from the filesystem
//! - Date taken (EXIF DateTimeOriginal)
//!
//! Every function is a pure function of the file at `path`, which is
//! what lets population fan them out over a worker pool.

use crate::error::ComputeError;
use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Reader, Tag, Value};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// EXIF date format: "YYYY:MM:DD HH:MM:SS"
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Image width and height in pixels
///
/// Only the header is decoded, so this is cheap even for large files.
pub fn resolution(path: &Path) -> Result<(u32, u32), ComputeError> {
    image::image_dimensions(path).map_err(|e| match e {
        image::ImageError::IoError(io) => ComputeError::Io {
            path: path.to_path_buf(),
            reason: io.to_string(),
        },
        other => ComputeError::Decode {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })
}

/// Last modification time of the file
pub fn modified_time(path: &Path) -> Result<DateTime<Utc>, ComputeError> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| io_error(path, e))?;
    Ok(DateTime::<Utc>::from(modified))
}

/// File size in bytes
pub fn file_size(path: &Path) -> Result<u64, ComputeError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| io_error(path, e))
}

/// Original capture time from EXIF `DateTimeOriginal`
///
/// Files without EXIF data, or without that tag, yield
/// `ComputeError::Missing`.
pub fn date_taken(path: &Path) -> Result<DateTime<Utc>, ComputeError> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut bufreader = BufReader::new(&file);

    let exif = Reader::new()
        .read_from_container(&mut bufreader)
        .map_err(|e| match e {
            exif::Error::NotFound(_) => ComputeError::Missing {
                path: path.to_path_buf(),
                field: "exif",
            },
            exif::Error::Io(io) => io_error(path, io),
            other => ComputeError::Decode {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;

    let field = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .ok_or_else(|| ComputeError::Missing {
            path: path.to_path_buf(),
            field: "DateTimeOriginal",
        })?;

    let text = get_string_value(&field.value).ok_or_else(|| ComputeError::Decode {
        path: path.to_path_buf(),
        reason: "DateTimeOriginal is not ASCII".to_string(),
    })?;

    parse_exif_date(&text).ok_or_else(|| ComputeError::Decode {
        path: path.to_path_buf(),
        reason: format!("unrecognized EXIF date '{}'", text),
    })
}

/// Parse an EXIF date, treating it as UTC (EXIF carries no zone)
fn parse_exif_date(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim_end_matches('\0').trim(), EXIF_DATE_FORMAT)
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Extract string value from EXIF field
fn get_string_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec
            .first()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(|s| s.trim().to_string()),
        _ => None,
    }
}

fn io_error(path: &Path, error: std::io::Error) -> ComputeError {
    ComputeError::Io {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn resolution_reads_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_png(temp_dir.path(), "wide.png", 40, 20);

        assert_eq!(resolution(&path).unwrap(), (40, 20));
    }

    #[test]
    fn resolution_of_garbage_is_a_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fake.jpg");
        fs::write(&path, b"not an image at all").unwrap();

        assert!(matches!(resolution(&path), Err(ComputeError::Decode { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = Path::new("/nonexistent/photo.jpg");

        assert!(matches!(file_size(path), Err(ComputeError::Io { .. })));
        assert!(matches!(modified_time(path), Err(ComputeError::Io { .. })));
    }

    #[test]
    fn file_size_matches_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob.jpg");
        fs::write(&path, vec![0u8; 1234]).unwrap();

        assert_eq!(file_size(&path).unwrap(), 1234);
    }

    #[test]
    fn modified_time_is_recent() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_png(temp_dir.path(), "new.png", 4, 4);

        let modified = modified_time(&path).unwrap();
        let age = Utc::now() - modified;
        assert!(age.num_seconds().abs() < 300);
    }

    #[test]
    fn png_without_exif_has_no_date_taken() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_png(temp_dir.path(), "plain.png", 4, 4);

        assert!(date_taken(&path).is_err());
    }

    #[test]
    fn exif_dates_parse_as_utc() {
        let parsed = parse_exif_date("2023:07:14 18:30:05").unwrap();

        assert_eq!(parsed.year(), 2023);
        assert_eq!(parsed.month(), 7);
        assert_eq!(parsed.day(), 14);
        assert_eq!(parsed.hour(), 18);
        assert_eq!(parsed.second(), 5);
        assert!(parse_exif_date("0000:00:00 00:00:00").is_none());
    }
}
