use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result, anyhow};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub platform_level: Option<u32>,
}

// Hand-written so the credential never reaches a log line.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("platform_level", &self.platform_level)
            .finish()
    }
}

/// Fully resolved settings handed to the Gemini client
#[derive(Clone)]
pub struct Settings {
    pub model: String,
    pub api_key: String,
    pub api_base: String,
    pub request_timeout: Option<Duration>,
    pub platform_level: Option<u32>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .field("platform_level", &self.platform_level)
            .finish()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            model: Some(DEFAULT_MODEL.to_string()),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Read a config file, falling back to defaults when it does not exist.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Invalid config file {}", config_path.display()))?;
        Ok(config)
    }

    /// Merge environment overrides into the file values.
    ///
    /// The API key comes from `GEMINI_API_KEY`, then `GOOGLE_API_KEY`, then the
    /// config file. It is required.
    pub fn resolve(&self) -> Result<Settings> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    fn resolve_with<F>(&self, env: F) -> Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = non_empty(env("GEMINI_API_KEY"))
            .or_else(|| non_empty(env("GOOGLE_API_KEY")))
            .or_else(|| non_empty(self.api_key.clone()))
            .ok_or_else(|| {
                anyhow!(
                    "No Gemini API key configured. \
                     Set GEMINI_API_KEY or add api_key to the config file"
                )
            })?;

        let api_base = non_empty(env("GEMINI_API_BASE"))
            .or_else(|| non_empty(self.api_base.clone()))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = non_empty(env("AIRB_MODEL"))
            .or_else(|| non_empty(self.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Settings {
            model,
            api_key,
            api_base,
            request_timeout: self
                .request_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            platform_level: self.platform_level,
        })
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("airb").join("config.json"))
    }
}
