//! # Hasher Module
//!
//! Computes perceptual hashes for images.
//!
//! ## Supported Algorithms
//! - **mean** (aHash) - Fastest, good for exact duplicates
//! - **median** - Like mean, less sensitive to a few extreme pixels
//! - **gradient** (dHash) - Best balance of speed and accuracy
//! - **vertgradient** - dHash over columns instead of rows
//! - **doublegradient** - dHash in both directions
//! - **blockhash** - Block mean value hash
//! - **perceptual** (pHash) - DCT then mean, most robust to edits
//!
//! ## How It Works
//! 1. Resize image to small size (8x8)
//! 2. Convert to grayscale
//! 3. Compute hash based on pixel relationships
//!
//! Hashes are stored as base64 text so two photos are considered
//! duplicates exactly when their hash strings are equal.
//!
//! ## Example
//! ```rust,ignore
//! use photo_sieve::core::hasher::{HashAlgorithmKind, PhotoHasher};
//!
//! let hasher = PhotoHasher::new("gradient".parse()?);
//! let hash = hasher.hash_file(&path)?;
//! ```

use crate::error::{ComputeError, FilterError};
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Hash edge length in pixels, giving 64-bit hashes
const HASH_SIZE: u32 = 8;

/// Available hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithmKind {
    Mean,
    Median,
    Gradient,
    VertGradient,
    DoubleGradient,
    Blockhash,
    Perceptual,
}

impl HashAlgorithmKind {
    /// All algorithms, in the order they are listed to users
    pub const ALL: [HashAlgorithmKind; 7] = [
        HashAlgorithmKind::Mean,
        HashAlgorithmKind::Median,
        HashAlgorithmKind::Gradient,
        HashAlgorithmKind::VertGradient,
        HashAlgorithmKind::DoubleGradient,
        HashAlgorithmKind::Blockhash,
        HashAlgorithmKind::Perceptual,
    ];

    /// Canonical name, also used to identify the hash column's build
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithmKind::Mean => "mean",
            HashAlgorithmKind::Median => "median",
            HashAlgorithmKind::Gradient => "gradient",
            HashAlgorithmKind::VertGradient => "vertgradient",
            HashAlgorithmKind::DoubleGradient => "doublegradient",
            HashAlgorithmKind::Blockhash => "blockhash",
            HashAlgorithmKind::Perceptual => "perceptual",
        }
    }

    /// Comma-separated list of accepted names, for error messages
    pub fn expected() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for HashAlgorithmKind {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "average" => Ok(HashAlgorithmKind::Mean),
            "median" => Ok(HashAlgorithmKind::Median),
            "gradient" | "difference" => Ok(HashAlgorithmKind::Gradient),
            "vertgradient" => Ok(HashAlgorithmKind::VertGradient),
            "doublegradient" => Ok(HashAlgorithmKind::DoubleGradient),
            "blockhash" => Ok(HashAlgorithmKind::Blockhash),
            "perceptual" => Ok(HashAlgorithmKind::Perceptual),
            _ => Err(FilterError::InvalidChoice {
                parameter: "hash algorithm",
                value: s.to_string(),
                expected: Self::expected(),
            }),
        }
    }
}

impl std::fmt::Display for HashAlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Perceptual hasher backed by the image_hasher crate
pub struct PhotoHasher {
    hasher: image_hasher::Hasher,
}

impl PhotoHasher {
    pub fn new(kind: HashAlgorithmKind) -> Self {
        let config = HasherConfig::new().hash_size(HASH_SIZE, HASH_SIZE);
        let config = match kind {
            HashAlgorithmKind::Mean => config.hash_alg(HashAlg::Mean),
            HashAlgorithmKind::Median => config.hash_alg(HashAlg::Median),
            HashAlgorithmKind::Gradient => config.hash_alg(HashAlg::Gradient),
            HashAlgorithmKind::VertGradient => config.hash_alg(HashAlg::VertGradient),
            HashAlgorithmKind::DoubleGradient => config.hash_alg(HashAlg::DoubleGradient),
            HashAlgorithmKind::Blockhash => config.hash_alg(HashAlg::Blockhash),
            HashAlgorithmKind::Perceptual => config.hash_alg(HashAlg::Mean).preproc_dct(),
        };

        Self {
            hasher: config.to_hasher(),
        }
    }

    /// Hash an already-decoded image
    pub fn hash_image(&self, image: &DynamicImage) -> String {
        self.hasher.hash_image(image).to_base64()
    }

    /// Decode the file at `path` and hash it
    pub fn hash_file(&self, path: &Path) -> Result<String, ComputeError> {
        let image = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => ComputeError::Io {
                path: path.to_path_buf(),
                reason: io.to_string(),
            },
            other => ComputeError::Decode {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;
        Ok(self.hash_image(&image))
    }
}
