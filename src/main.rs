//! # photo-sieve CLI
//!
//! Command-line interface for the photo sieve.
//!
//! ## Usage
//! ```bash
//! photo-sieve filter ~/Photos --min-resolution 1000
//! photo-sieve filter ~/Photos --dedupe gradient --resolver largest --output json
//! ```

mod cli;

use photo_sieve::SieveError;
use std::process::ExitCode;

/// Exit code for a run stopped by Ctrl+C (128 + SIGINT)
const EXIT_CODE_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    photo_sieve::init_tracing();

    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ SieveError::Interrupted { .. }) => {
            eprintln!("{}", e);
            ExitCode::from(EXIT_CODE_INTERRUPTED)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
