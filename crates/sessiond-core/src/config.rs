//! Configuration management for sessiond.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default identity provider URL (can be overridden at compile time via PROVIDER_URL env var).
pub const DEFAULT_PROVIDER_URL: &str = match option_env!("PROVIDER_URL") {
    Some(url) => url,
    None => "https://auth.sessiond.dev",
};

/// Default identity provider publishable key (public, safe to expose).
pub const DEFAULT_PROVIDER_PUBLISHABLE_KEY: &str = match option_env!("PROVIDER_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "public-anon-key",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Identity provider base URL.
    #[serde(default = "default_provider_url")]
    pub provider_url: String,
    /// Identity provider publishable API key (public, safe to expose).
    #[serde(default = "default_provider_publishable_key")]
    pub provider_publishable_key: String,
}

fn default_provider_url() -> String {
    DEFAULT_PROVIDER_URL.to_string()
}

fn default_provider_publishable_key() -> String {
    DEFAULT_PROVIDER_PUBLISHABLE_KEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            provider_publishable_key: DEFAULT_PROVIDER_PUBLISHABLE_KEY.to_string(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CoreResult<()> {
        let url = Url::parse(&self.provider_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CoreError::Config(format!(
                "Provider URL must be http or https, got: {}",
                url.scheme()
            )));
        }
        if self.provider_publishable_key.trim().is_empty() {
            return Err(CoreError::Config(
                "Provider publishable key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("SESSIOND_LOG_LEVEL") {
            if !log_level.trim().is_empty() {
                self.log_level = log_level;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.provider_url, DEFAULT_PROVIDER_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.log_level = "debug".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.log_level, "debug");
        assert_eq!(loaded.provider_url, config.provider_url);
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = Config {
            provider_url: "ftp://auth.example.com".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let config = Config {
            provider_publishable_key: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"log_level":"warn"}"#).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.provider_url, DEFAULT_PROVIDER_URL);
    }
}
