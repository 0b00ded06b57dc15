//! Configuration for the subset client.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default root for all local state.
pub const DEFAULT_DATA_DIR: &str = ".era5";

/// Default sliding expiry window for cache entries.
pub const DEFAULT_EXPIRE_DAYS: i64 = 14;

/// Longest accepted expiry window, about a thousand years.
pub const MAX_EXPIRE_DAYS: i64 = 365 * 1000;

/// Local paths and cache policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Era5Config {
    /// Root directory for local state.
    pub data_dir: PathBuf,

    /// Directory holding `<key>_<expiry>.nc` cache entries.
    pub cache_dir: PathBuf,

    /// Domain index snapshot file.
    pub snapshot_path: PathBuf,

    /// Days added to an entry's expiry on creation and on every hit.
    pub expire_days: i64,
}

impl Default for Era5Config {
    fn default() -> Self {
        Self::with_data_dir(DEFAULT_DATA_DIR)
    }
}

impl Era5Config {
    /// Configuration rooted at `data_dir`, with the cache and snapshot
    /// placed underneath it.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            cache_dir: data_dir.join("cache").join("era5"),
            snapshot_path: data_dir.join("asset").join("full_era5.json"),
            data_dir,
            expire_days: DEFAULT_EXPIRE_DAYS,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("ERA5_DATA_DIR") {
            Ok(dir) if !dir.is_empty() => Self::with_data_dir(dir),
            _ => Self::default(),
        };

        if let Ok(val) = std::env::var("ERA5_CACHE_DIR") {
            if !val.is_empty() {
                config.cache_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("ERA5_SNAPSHOT_PATH") {
            if !val.is_empty() {
                config.snapshot_path = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("ERA5_CACHE_EXPIRE_DAYS") {
            if let Ok(days) = val.parse() {
                config.expire_days = days;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.expire_days <= 0 {
            return Err("expire_days must be > 0".to_string());
        }

        if self.expire_days > MAX_EXPIRE_DAYS {
            return Err(format!("expire_days must be <= {}", MAX_EXPIRE_DAYS));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }

        if self.snapshot_path.file_name().is_none() {
            return Err(format!(
                "snapshot_path {} does not name a file",
                self.snapshot_path.display()
            ));
        }

        Ok(())
    }

    /// The expiry window as a duration, clamped to the accepted range.
    pub fn expire_after(&self) -> chrono::Duration {
        chrono::Duration::days(self.expire_days.clamp(0, MAX_EXPIRE_DAYS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = Era5Config::default();
        assert_eq!(config.cache_dir, Path::new(".era5/cache/era5"));
        assert_eq!(config.snapshot_path, Path::new(".era5/asset/full_era5.json"));
        assert_eq!(config.expire_days, 14);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_positive_expiry() {
        let mut config = Era5Config::default();
        config.expire_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_expiry() {
        let mut config = Era5Config::default();
        config.expire_days = MAX_EXPIRE_DAYS;
        assert!(config.validate().is_ok());

        for days in [MAX_EXPIRE_DAYS + 1, 1_000_000_000, i64::MAX / 2, i64::MAX] {
            config.expire_days = days;
            assert!(config.validate().is_err());
            assert_eq!(config.expire_after(), chrono::Duration::days(MAX_EXPIRE_DAYS));
        }
    }

    #[test]
    fn test_validate_rejects_directory_snapshot() {
        let mut config = Era5Config::default();
        config.snapshot_path = PathBuf::from("/");
        assert!(config.validate().is_err());
    }
}
