//! Configuration: TOML file under `~/.tfgrpo/` plus the model credential
//!
//! The credential is read from the environment exactly once, at startup, and
//! its absence is reported as a configuration error before any episode runs.

use crate::errors::{GrpoError, Result};
use crate::models::retry::MAX_ATTEMPTS;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the model API key
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Default OpenRouter-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default extraction model
pub const DEFAULT_MODEL: &str = "google/gemma-3-4b-it:free";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Durable record location
    pub path: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            path: home_dir().join("experiences.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call timeout
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 200,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total calls including the first one
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    /// Existing experiences offered to the model as modify/delete targets
    pub candidate_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            candidate_limit: 3,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, creating a default file if missing
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_string).context("Failed to write config file")?;
        Ok(())
    }

    /// Default configuration file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".tfgrpo").join("config.toml"))
    }

    /// Reject values the rest of the crate cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(GrpoError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.max_attempts > MAX_ATTEMPTS {
            return Err(GrpoError::Config(format!(
                "retry.max_attempts must be at most {} (one call plus one retry)",
                MAX_ATTEMPTS
            )));
        }
        if self.retrieval.default_limit == 0 {
            return Err(GrpoError::Config("retrieval.default_limit must be at least 1".into()));
        }
        if self.model.timeout_secs == 0 {
            return Err(GrpoError::Config("model.timeout_secs must be at least 1".into()));
        }
        if self.model.base_url.trim().is_empty() || self.model.model.trim().is_empty() {
            return Err(GrpoError::Config("model.base_url and model.model are required".into()));
        }
        Ok(())
    }
}

/// Model API credential
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Read the API key from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_value(std::env::var(API_KEY_ENV).ok())
    }

    /// Build from an optional raw value; blank counts as missing
    pub fn from_value(value: Option<String>) -> Result<Self> {
        match value.map(|v| v.trim().to_string()) {
            Some(api_key) if !api_key.is_empty() => Ok(Self { api_key }),
            _ => Err(GrpoError::Config(format!(
                "{} is not set; experience extraction needs a model API key",
                API_KEY_ENV
            ))),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("api_key", &"<redacted>").finish()
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tfgrpo")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retrieval.default_limit, 5);
        assert_eq!(config.model.base_url, DEFAULT_BASE_URL);
        assert!(config.library.path.ends_with("experiences.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[model]\nmodel = \"moonshotai/kimi-k2\"\n\n[retry]\nbackoff_ms = 0\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model.model, "moonshotai/kimi-k2");
        assert_eq!(config.model.max_tokens, 200);
        assert_eq!(config.retry.backoff_ms, 0);
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_max_attempts_capped_at_one_retry() {
        let mut config = Config::default();
        config.retry.max_attempts = 5;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("max_attempts"));

        config.retry.max_attempts = MAX_ATTEMPTS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.model.model = "qwen/qwen3-8b".to_string();

        let toml_string = toml::to_string(&config).unwrap();
        assert!(toml_string.contains("qwen/qwen3-8b"));

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_credentials() {
        let err = Credentials::from_value(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains(API_KEY_ENV));

        let err = Credentials::from_value(Some("   ".into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let creds = Credentials::from_value(Some(" sk-test ".into())).unwrap();
        assert_eq!(creds.api_key(), "sk-test");
        assert!(!format!("{:?}", creds).contains("sk-test"));
    }
}
