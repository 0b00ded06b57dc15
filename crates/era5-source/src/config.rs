//! Configuration for the remote ERA5 store.

use serde::{Deserialize, Serialize};

/// Public ARCO ERA5 store (37 pressure levels, hourly, 0.25 degree).
pub const DEFAULT_STORE_URL: &str =
    "https://storage.googleapis.com/gcp-public-data-arco-era5/ar/full_37-1h-0p25deg-chunk-1.zarr-v3";

/// Configuration for connecting to the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the Zarr hierarchy (anonymous HTTP access).
    pub base_url: String,
    /// Per-request timeout enforced by the HTTP transport.
    pub timeout_secs: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STORE_URL.to_string(),
            timeout_secs: None,
        }
    }
}

impl SourceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("ERA5_STORE_URL") {
            config.base_url = url;
        }

        if let Ok(val) = std::env::var("ERA5_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.timeout_secs = Some(secs);
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!("base_url must be an http(s) URL, got {}", self.base_url));
        }

        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be > 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SourceConfig::default();
        assert!(config.base_url.ends_with("full_37-1h-0p25deg-chunk-1.zarr-v3"));
        assert!(config.timeout_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SourceConfig::default();
        config.base_url = "gs://bucket/path".to_string();
        assert!(config.validate().is_err());

        config = SourceConfig::default();
        config.timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
