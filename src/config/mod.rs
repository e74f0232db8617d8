//! # Config Module
//!
//! Layered settings: built-in defaults, then an optional TOML file,
//! then `PHOTO_SIEVE_*` environment variables (nested keys separated by
//! `__`, e.g. `PHOTO_SIEVE_CACHE__CHUNKSIZE=50`).
//!
//! ```toml
//! workers = 4
//!
//! [cache]
//! filepath = "/var/cache/photo-sieve/cache.db"
//! chunksize = 100
//! save_interval = 500
//! trim = true
//! trim_age_limit = 2592000
//! ```

use crate::error::ConfigError;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PHOTO_SIEVE_";

const THIRTY_DAYS_SECS: u64 = 30 * 24 * 60 * 60;

/// Cache file and population settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Remove stale rows before each run
    pub trim: bool,
    /// Age in seconds after which a row counts as stale
    pub trim_age_limit: u64,
    /// Rows computed per chunk
    pub chunksize: usize,
    /// Computed rows between checkpoints
    pub save_interval: usize,
    /// Location of the cache database
    pub filepath: PathBuf,
}

impl CacheConfig {
    pub fn trim_age(&self) -> Duration {
        Duration::from_secs(self.trim_age_limit)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            trim: false,
            trim_age_limit: THIRTY_DAYS_SECS,
            chunksize: 100,
            save_interval: 500,
            filepath: default_cache_path(),
        }
    }
}

/// All settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheConfig,
    /// Worker threads for population (None = one per CPU)
    pub workers: Option<usize>,
}

impl Settings {
    /// Load defaults, then `config_file` if given, then the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(config_file, ENV_PREFIX)
    }

    pub(crate) fn load_with_prefix(
        config_file: Option<&Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(ConfigError::Load(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let settings: Settings = figment
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        settings.validate()?;
        tracing::debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.chunksize == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.chunksize",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.cache.save_interval == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.save_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.cache.chunksize > self.cache.save_interval {
            return Err(ConfigError::Invalid {
                key: "cache.chunksize",
                reason: format!(
                    "must not exceed cache.save_interval ({} > {})",
                    self.cache.chunksize, self.cache.save_interval
                ),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid {
                key: "workers",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// `<user cache dir>/photo-sieve/cache.db`
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("photo-sieve")
        .join("cache.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // Prefix nobody sets, so tests don't see the developer's environment
    const QUIET_PREFIX: &str = "PHOTO_SIEVE_UNIT_TEST_UNUSED_";

    #[test]
    fn defaults_match_documentation() {
        let settings = Settings::default();

        assert!(!settings.cache.trim);
        assert_eq!(settings.cache.trim_age(), Duration::from_secs(2_592_000));
        assert_eq!(settings.cache.chunksize, 100);
        assert_eq!(settings.cache.save_interval, 500);
        assert!(settings.cache.filepath.ends_with("photo-sieve/cache.db"));
        assert_eq!(settings.workers, None);
    }

    #[test]
    fn file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sieve.toml");
        fs::write(&path, "workers = 3\n[cache]\nchunksize = 25\n").unwrap();

        let settings = Settings::load_with_prefix(Some(&path), QUIET_PREFIX).unwrap();

        assert_eq!(settings.workers, Some(3));
        assert_eq!(settings.cache.chunksize, 25);
        assert_eq!(settings.cache.save_interval, 500);
    }

    #[test]
    fn environment_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sieve.toml");
        fs::write(&path, "[cache]\nchunksize = 5\nsave_interval = 40\n").unwrap();
        std::env::set_var("PHOTO_SIEVE_UNIT_TEST_ENV_CACHE__SAVE_INTERVAL", "7");

        let settings =
            Settings::load_with_prefix(Some(&path), "PHOTO_SIEVE_UNIT_TEST_ENV_").unwrap();

        assert_eq!(settings.cache.save_interval, 7);
    }

    #[test]
    fn zero_chunksize_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sieve.toml");
        fs::write(&path, "[cache]\nchunksize = 0\n").unwrap();

        let result = Settings::load_with_prefix(Some(&path), QUIET_PREFIX);

        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "cache.chunksize", .. })
        ));
    }

    #[test]
    fn chunks_larger_than_save_interval_are_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sieve.toml");
        fs::write(&path, "[cache]\nchunksize = 100\nsave_interval = 30\n").unwrap();

        let result = Settings::load_with_prefix(Some(&path), QUIET_PREFIX);

        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "cache.chunksize", .. })
        ));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let result = Settings::load_with_prefix(Some(Path::new("/nonexistent/sieve.toml")), QUIET_PREFIX);

        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
