//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SWCACHE_*)
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SWCACHE_*)
/// 2. TOML config file (if SWCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name, the first segment of every cache store name.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Deployed worker version. Bumping it is the only cache migration.
    ///
    /// Set via SWCACHE_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Origin the application shell is served from.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite cache database.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// URLs fetched into the precache store during install.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,

    /// Host/URL fragments of the data backend that must bypass the cache.
    #[serde(default = "default_remote_data_patterns")]
    pub remote_data_patterns: Vec<String>,

    /// URL fragments identifying large model/weights downloads.
    #[serde(default = "default_model_patterns")]
    pub model_patterns: Vec<String>,

    /// Endpoint the `sync-attendance` task posts queued writes to.
    #[serde(default = "default_sync_endpoint")]
    pub sync_endpoint: String,

    /// Release manifest polled for updates. Update checks are off when unset.
    #[serde(default)]
    pub update_feed_url: Option<String>,

    /// Seconds between periodic update checks.
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,

    /// Activate a freshly installed worker without waiting for SKIP_WAITING.
    #[serde(default)]
    pub skip_waiting_on_install: bool,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_app_name() -> String {
    "absensi".into()
}

fn default_version() -> String {
    "1.0.0".into()
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_precache_urls() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/employee.html",
        "/admin.html",
        "/login.html",
        "/firebase-config.js",
        "/storage-firebase.js",
        "/admin-auth.js",
        "/password-auth.js",
        "/manifest.json",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
        "/icons/apple-touch-icon.png",
        "/icons/favicon.ico",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_remote_data_patterns() -> Vec<String> {
    ["firebaseio.com", "googleapis.com", "firebasestorage", "nominatim.openstreetmap.org", "identitytoolkit"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_model_patterns() -> Vec<String> {
    vec!["face-api".into(), "weights".into()]
}

fn default_sync_endpoint() -> String {
    "/api/sync-attendance".into()
}

fn default_update_interval_secs() -> u64 {
    30 * 60
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    52_428_800 // 50MB, model weights included
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_version(),
            origin: default_origin(),
            db_path: default_db_path(),
            precache_urls: default_precache_urls(),
            remote_data_patterns: default_remote_data_patterns(),
            model_patterns: default_model_patterns(),
            sync_endpoint: default_sync_endpoint(),
            update_feed_url: None,
            update_interval_secs: default_update_interval_secs(),
            skip_waiting_on_install: false,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval between periodic update checks.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Parsed serving origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        let parsed = url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") }),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SWCACHE_`
    /// 2. TOML file from `SWCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Same configuration deployed under another version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self { version: version.into(), ..self.clone() }
    }
}
