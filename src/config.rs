use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// API base used when neither the embed tag nor the configuration names one.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/v1";

/// Runtime configuration for the widget runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base: String,
    /// `None` leaves the HTTP client on its platform default.
    pub request_timeout: Option<Duration>,
    pub language: Option<String>,
}

/// On-disk shape of the optional TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_base: Option<String>,
    request_timeout_ms: Option<u64>,
    language: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: None,
            language: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Defaults, then the TOML file (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let file: FileConfig = toml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            config = config.with_file(file);
        }
        config.with_env(|key| std::env::var(key).ok())
    }

    fn with_file(mut self, file: FileConfig) -> Self {
        if let Some(api_base) = file.api_base.filter(|v| !v.trim().is_empty()) {
            self.api_base = api_base.trim().to_string();
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(language) = file.language.filter(|v| !v.trim().is_empty()) {
            self.language = Some(language.trim().to_string());
        }
        self
    }

    pub fn with_env<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("INSYDR_API_BASE").filter(|v| !v.trim().is_empty()) {
            self.api_base = api_base.trim().to_string();
        }

        if let Some(raw) = lookup("INSYDR_REQUEST_TIMEOUT_MS") {
            let ms = raw
                .trim()
                .parse::<u64>()
                .context("failed to parse INSYDR_REQUEST_TIMEOUT_MS")?;
            self.request_timeout = Some(Duration::from_millis(ms));
        }

        if let Some(language) = lookup("INSYDR_LANGUAGE").filter(|v| !v.trim().is_empty()) {
            self.language = Some(language.trim().to_string());
        } else if self.language.is_none() {
            self.language = lookup("LANG").and_then(|v| normalize_locale(&v));
        }

        Ok(self)
    }
}

/// Turns a POSIX locale (`en_US.UTF-8`) into a BCP 47 tag (`en-US`).
pub fn normalize_locale(raw: &str) -> Option<String> {
    let base = raw.split(['.', '@']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}
