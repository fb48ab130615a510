use std::{fs, io, path::Path, time::Duration};

use serde::Deserialize;
use shared::domain::FileId;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_APP_ENV: &str = "development";
pub const DEFAULT_SETTINGS_FILE: &str = "policy_lens.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid api base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to read settings file '{path}': {source}")]
    ReadFile { path: String, source: io::Error },
    #[error("failed to parse settings file '{path}': {source}")]
    ParseFile {
        path: String,
        source: toml::de::Error,
    },
}

/// Endpoint configuration for the extraction backend. Built once at startup
/// and handed to the gateway by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: Url,
    pub environment: String,
    pub request_timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default api base url is valid"),
            environment: DEFAULT_APP_ENV.to_string(),
            request_timeout: None,
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            ..Self::default()
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Full URL for an API path; leading and repeated slashes are tolerated.
    pub fn endpoint(&self, path: &str) -> String {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.url_for(&segments)
    }

    pub fn upload_url(&self) -> String {
        self.url_for(&["api", "v1", "upload"])
    }

    pub fn extract_url(&self, file_id: &FileId) -> String {
        self.url_for(&["api", "v1", "extract", file_id.as_str()])
    }

    pub fn verify_url(&self) -> String {
        self.url_for(&["api", "v1", "verify"])
    }

    pub fn results_url(&self) -> String {
        self.url_for(&["api", "v1", "results"])
    }

    pub fn summary_url(&self) -> String {
        self.url_for(&["api", "v1", "summary"])
    }

    pub fn search_url(&self) -> String {
        self.url_for(&["api", "v1", "search"])
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    fn url_for(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        // http(s) urls always have a path to extend.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    api_base_url: Option<String>,
    app_env: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// Loads `policy_lens.toml` from the working directory, then applies
/// environment overrides.
pub fn load_settings() -> Result<ApiConfig, ConfigError> {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ApiConfig, ConfigError> {
    let mut settings = ApiConfig::default();

    let file_cfg = match fs::read_to_string(path) {
        Ok(raw) => {
            toml::from_str::<SettingsFile>(&raw).map_err(|source| ConfigError::ParseFile {
                path: path.display().to_string(),
                source,
            })?
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => SettingsFile::default(),
        Err(source) => {
            return Err(ConfigError::ReadFile {
                path: path.display().to_string(),
                source,
            })
        }
    };

    if let Some(v) = file_cfg.api_base_url {
        settings.base_url = parse_base_url(&v)?;
    }
    if let Some(v) = file_cfg.app_env {
        settings.environment = v;
    }
    if let Some(secs) = file_cfg.request_timeout_secs {
        settings.request_timeout = timeout_from_secs(secs);
    }

    if let Some(v) = env("API_BASE_URL") {
        settings.base_url = parse_base_url(&v)?;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.base_url = parse_base_url(&v)?;
    }

    if let Some(v) = env("APP_ENV") {
        settings.environment = v;
    }
    if let Some(v) = env("APP__APP_ENV") {
        settings.environment = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout = timeout_from_secs(parsed);
        }
    }

    Ok(settings)
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
