//! Configuration management for Taiyaku.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "Taiyaku";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder value for unconfigured credentials.
const CREDENTIAL_PLACEHOLDER: &str = "YOUR_ACCESS_TOKEN_HERE";

/// Provider payload limit for one batched request, in characters.
pub const DEFAULT_MAX_GROUP_CHARACTERS: usize = 5000;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text provider connection settings.
    pub provider: ProviderConfig,

    /// Translation behavior settings.
    pub translation: TranslationConfig,
}

/// Connection settings for the Cloud Translation v3 endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Cloud project that owns the translation quota.
    pub project_id: String,

    /// API location, usually `global`.
    pub location: String,

    /// OAuth bearer token (e.g. from `gcloud auth print-access-token`).
    pub access_token: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: "global".to_string(),
            access_token: CREDENTIAL_PLACEHOLDER.to_string(),
            base_url: "https://translation.googleapis.com/v3".to_string(),
            timeout_secs: 60,
        }
    }
}

impl ProviderConfig {
    /// Checks if the credentials are configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        !self.project_id.is_empty()
            && !self.access_token.is_empty()
            && self.access_token != CREDENTIAL_PLACEHOLDER
    }
}

/// Translation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Language of the book.
    pub source_language_code: String,

    /// Language to add next to every paragraph.
    pub target_language_code: String,

    /// Paragraphs longer than this are segmented before grouping.
    pub max_paragraph_characters: usize,

    /// Hard ceiling for the text submitted in one provider call.
    pub max_group_characters: usize,

    /// Translate plain text instead of inline markup.
    pub clean_format: bool,

    /// Also translate paragraphs at or below `max_paragraph_characters`.
    pub translate_short_paragraphs: bool,

    /// Number of provider calls allowed in flight for one page.
    pub max_concurrent_requests: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language_code: "en".to_string(),
            target_language_code: "zh-CN".to_string(),
            max_paragraph_characters: 1000,
            max_group_characters: DEFAULT_MAX_GROUP_CHARACTERS,
            clean_format: false,
            translate_short_paragraphs: true,
            max_concurrent_requests: 1,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with_options(true)
    }

    /// Validates the configuration with optional provider credential requirements.
    pub fn validate_with_options(&self, require_provider: bool) -> Result<(), ConfigError> {
        if require_provider {
            if !self.provider.is_configured() {
                return Err(ConfigError::MissingValue(
                    "provider.project_id / provider.access_token (set them in config file)"
                        .to_string(),
                ));
            }

            if url::Url::parse(&self.provider.base_url).is_err() {
                return Err(ConfigError::InvalidValue {
                    key: "provider.base_url".to_string(),
                    message: "must be an absolute URL".to_string(),
                });
            }
        }

        let translation = &self.translation;
        for (key, value) in [
            ("translation.source_language_code", &translation.source_language_code),
            ("translation.target_language_code", &translation.target_language_code),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingValue(key.to_string()));
            }
        }

        for (key, value) in [
            ("translation.max_paragraph_characters", translation.max_paragraph_characters),
            ("translation.max_group_characters", translation.max_group_characters),
            ("translation.max_concurrent_requests", translation.max_concurrent_requests),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }
}
