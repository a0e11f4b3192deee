// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for sgpt
//!
//! Settings live in `$SGPT_HOME/settings.json` (default `~/.config/sgpt`).
//! A missing file means defaults. Environment variables named after the
//! classic sgpt configuration keys override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheWritePolicy, DEFAULT_CACHE_LENGTH};
use crate::chat::display::parse_color;
use crate::chat::DEFAULT_MAX_TOOL_ROUNDS;
use crate::error::{Result, SgptError};
use crate::llm::providers::OPENAI_API_BASE;

/// Main settings structure, stored in settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Completion API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Default request parameters
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Function calling settings
    #[serde(default)]
    pub functions: FunctionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// API key (prefer the OPENAI_API_KEY environment variable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL, or "default" for the public OpenAI API
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_api_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Custom system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Print answers only once complete
    #[serde(default)]
    pub disable_streaming: bool,

    /// Answer color, a crossterm color name or "none"
    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            top_p: default_top_p(),
            role: None,
            disable_streaming: false,
            color: default_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache directory (defaults to `$SGPT_HOME/cache`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Maximum number of entries kept
    #[serde(default = "default_cache_length")]
    pub length: usize,

    /// Whether answers requested without caching are still stored
    #[serde(default)]
    pub write_policy: CacheWritePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            length: default_cache_length(),
            write_policy: CacheWritePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionsConfig {
    /// Offer functions to the model at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Echo function output in the answer stream
    #[serde(default)]
    pub show_output: bool,

    /// Write function output here instead of discarding it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_log: Option<PathBuf>,

    /// Only offer these functions (empty = all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_functions: Vec<String>,

    /// Never offer these functions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_functions: Vec<String>,

    /// Function calls allowed per turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Shell command timeout in seconds
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout: u64,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_output: false,
            output_log: None,
            enabled_functions: Vec::new(),
            disabled_functions: Vec::new(),
            max_rounds: default_max_rounds(),
            shell_timeout: default_shell_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "default".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_top_p() -> f32 {
    1.0
}

fn default_color() -> String {
    "magenta".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_length() -> usize {
    DEFAULT_CACHE_LENGTH
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_TOOL_ROUNDS
}

fn default_shell_timeout() -> u64 {
    60
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SgptError::Config(format!("{} has an invalid value: {:?}", key, value)))
}

fn parse_env_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SgptError::Config(format!(
            "{} must be true or false, got {:?}",
            key, value
        ))),
    }
}

impl Settings {
    /// Get the sgpt home directory ($SGPT_HOME or ~/.config/sgpt).
    pub fn sgpt_home() -> PathBuf {
        if let Ok(home) = std::env::var("SGPT_HOME") {
            return PathBuf::from(home);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sgpt")
    }

    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::sgpt_home().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| SgptError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the file (or defaults), apply the process environment and validate.
    pub fn load_effective(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        settings.apply_env_overrides(std::env::vars())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from `(name, value)` pairs; unknown names are ignored.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "OPENAI_API_KEY" => self.api.api_key = Some(value.to_string()),
                "API_BASE_URL" => self.api.base_url = value.to_string(),
                "REQUEST_TIMEOUT" => self.api.request_timeout = parse_env(key, value)?,
                "DEFAULT_MODEL" => self.defaults.model = value.to_string(),
                "DISABLE_STREAMING" => self.defaults.disable_streaming = parse_env_bool(key, value)?,
                "CACHE_LENGTH" => self.cache.length = parse_env(key, value)?,
                "CACHE_PATH" => self.cache.path = Some(PathBuf::from(value)),
                "CACHE_WRITE_POLICY" => self.cache.write_policy = value.parse()?,
                "DEFAULT_COLOR" => self.defaults.color = value.trim().to_string(),
                "SHOW_FUNCTIONS_OUTPUT" => {
                    self.functions.show_output = parse_env_bool(key, value)?
                }
                "FUNCTION_OUTPUT_LOG" => self.functions.output_log = Some(PathBuf::from(value)),
                _ => continue,
            }
            tracing::debug!(target: "sgpt.config", key, "applied environment override");
        }
        Ok(())
    }

    /// Reject values the API or the cache cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            return Err(SgptError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.defaults.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.defaults.top_p) {
            return Err(SgptError::Config(format!(
                "top_p must be between 0 and 1, got {}",
                self.defaults.top_p
            )));
        }
        if self.cache.length == 0 {
            return Err(SgptError::Config(
                "cache length must be at least 1".to_string(),
            ));
        }
        if self.api.request_timeout == 0 {
            return Err(SgptError::Config(
                "request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.defaults.model.trim().is_empty() {
            return Err(SgptError::Config("model must not be empty".to_string()));
        }
        parse_color(&self.defaults.color)?;
        Ok(())
    }

    /// Effective base URL ("default" resolves to the public OpenAI API).
    pub fn api_base_url(&self) -> &str {
        match self.api.base_url.trim() {
            "" | "default" => OPENAI_API_BASE,
            url => url,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout)
    }

    /// Effective cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| Self::sgpt_home().join("cache"))
    }

    /// The API key, if configured.
    pub fn api_key(&self) -> Result<&str> {
        self.api
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                SgptError::Config(
                    "no API key configured; set OPENAI_API_KEY or api.api_key in settings.json"
                        .to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.api.base_url, "default");
        assert_eq!(settings.api.request_timeout, 60);
        assert_eq!(settings.defaults.model, "gpt-4o");
        assert_eq!(settings.defaults.top_p, 1.0);
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.length, 100);
        assert!(settings.functions.enabled);
        assert!(!settings.functions.show_output);
        assert_eq!(settings.functions.max_rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"defaults": {"model": "gpt-4o-mini"}}"#).unwrap();
        assert_eq!(settings.defaults.model, "gpt-4o-mini");
        assert_eq!(settings.defaults.top_p, 1.0);
        assert_eq!(settings.cache.length, 100);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("missing.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_invalid_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(SgptError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.defaults.temperature = 0.7;
        settings.functions.disabled_functions = vec!["execute_shell_command".to_string()];
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env_overrides([
                ("OPENAI_API_KEY", "sk-test"),
                ("API_BASE_URL", "http://localhost:8080/v1"),
                ("REQUEST_TIMEOUT", "5"),
                ("CACHE_LENGTH", "7"),
                ("CACHE_PATH", "/tmp/sgpt-cache"),
                ("SHOW_FUNCTIONS_OUTPUT", "true"),
                ("DISABLE_STREAMING", "1"),
                ("DEFAULT_MODEL", "gpt-4o-mini"),
                ("FUNCTION_OUTPUT_LOG", "/tmp/fn.log"),
                ("UNRELATED", "x"),
            ])
            .unwrap();

        assert_eq!(settings.api_key().unwrap(), "sk-test");
        assert_eq!(settings.api_base_url(), "http://localhost:8080/v1");
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.cache.length, 7);
        assert_eq!(settings.cache_dir(), PathBuf::from("/tmp/sgpt-cache"));
        assert!(settings.functions.show_output);
        assert!(settings.defaults.disable_streaming);
        assert_eq!(settings.defaults.model, "gpt-4o-mini");
        assert_eq!(
            settings.functions.output_log,
            Some(PathBuf::from("/tmp/fn.log"))
        );
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env_overrides([("CACHE_LENGTH", "lots")])
            .unwrap_err();
        assert!(err.to_string().contains("CACHE_LENGTH"));

        assert!(settings
            .apply_env_overrides([("SHOW_FUNCTIONS_OUTPUT", "maybe")])
            .is_err());
    }

    #[test]
    fn test_default_base_url_resolves() {
        assert_eq!(Settings::default().api_base_url(), OPENAI_API_BASE);
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            Settings::default().api_key(),
            Err(SgptError::Config(_))
        ));
    }

    #[test]
    fn test_validate_ranges() {
        let mut settings = Settings::default();
        settings.defaults.temperature = 2.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.defaults.top_p = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.cache.length = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.api.request_timeout = 0;
        assert!(settings.validate().is_err());
    }
}
