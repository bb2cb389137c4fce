//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FXCACHE_*)
//! 2. TOML config file (if FXCACHE_CONFIG_FILE set)
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
/// 1. Environment variables (FXCACHE_*)
/// 2. TOML config file (if FXCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via FXCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to read per upstream response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Upstream fetch timeout in milliseconds.
    ///
    /// Bounds every strategy fetch; on expiry the strategy takes its
    /// failure branch.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Origin the page is served from (scheme + host + optional port).
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Tag of the current static (app shell) generation.
    #[serde(default = "default_static_generation")]
    pub static_generation: String,

    /// Tag of the current runtime (API) generation.
    #[serde(default = "default_runtime_generation")]
    pub runtime_generation: String,

    /// Exchange-rate endpoint matcher: an absolute URL prefix with a
    /// trailing `*` wildcard.
    #[serde(default = "default_api_pattern")]
    pub api_pattern: String,

    /// Default base-currency endpoint refreshed by control commands and
    /// background sync.
    #[serde(default = "default_rates_url")]
    pub rates_url: String,

    /// Age in days after which a stored API entry no longer counts as a
    /// fallback.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u32,

    /// Remote asset origins treated as static (font and stylesheet CDNs).
    #[serde(default = "default_static_origins")]
    pub static_origins: Vec<String>,

    /// Install manifest entries that must all be stored for install to
    /// succeed. Relative paths resolve against `origin`.
    #[serde(default = "default_core_assets")]
    pub core_assets: Vec<String>,

    /// Install manifest entries stored when reachable; failures are logged.
    #[serde(default = "default_optional_assets")]
    pub optional_assets: Vec<String>,

    /// Path of the cached root document served to offline navigations.
    #[serde(default = "default_root_document")]
    pub root_document: String,

    /// Background-sync tag that triggers a rate refresh.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Buffered notifications per connected client.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./fxcache.sqlite")
}

fn default_user_agent() -> String {
    "fxcache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_static_generation() -> String {
    "currency-converter-static-v3".into()
}

fn default_runtime_generation() -> String {
    "currency-converter-runtime-v3".into()
}

fn default_api_pattern() -> String {
    "https://open.er-api.com/v6/*".into()
}

fn default_rates_url() -> String {
    "https://open.er-api.com/v6/latest/USD".into()
}

fn default_expiry_days() -> u32 {
    1
}

fn default_static_origins() -> Vec<String> {
    vec![
        "https://fonts.googleapis.com".into(),
        "https://fonts.gstatic.com".into(),
        "https://cdnjs.cloudflare.com".into(),
    ]
}

fn default_core_assets() -> Vec<String> {
    vec![
        "/".into(),
        "/index.html".into(),
        "/styles.css".into(),
        "/app.js".into(),
        "/manifest.json".into(),
    ]
}

fn default_optional_assets() -> Vec<String> {
    vec![
        "/icons/icon-192.png".into(),
        "/icons/icon-512.png".into(),
        "https://fonts.googleapis.com/css2?family=Inter:wght@400;600&display=swap".into(),
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.5.1/css/all.min.css".into(),
    ]
}

fn default_root_document() -> String {
    "/index.html".into()
}

fn default_sync_tag() -> String {
    "background-sync-currency-rates".into()
}

fn default_notification_capacity() -> usize {
    16
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            origin: default_origin(),
            static_generation: default_static_generation(),
            runtime_generation: default_runtime_generation(),
            api_pattern: default_api_pattern(),
            rates_url: default_rates_url(),
            expiry_days: default_expiry_days(),
            static_origins: default_static_origins(),
            core_assets: default_core_assets(),
            optional_assets: default_optional_assets(),
            root_document: default_root_document(),
            sync_tag: default_sync_tag(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Expiry window for API fallbacks.
    pub fn expiry_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.expiry_days))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FXCACHE_`
    /// 2. TOML file from `FXCACHE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("FXCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FXCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./fxcache.sqlite"));
        assert_eq!(config.user_agent, "fxcache/0.1");
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.expiry_days, 1);
        assert_eq!(config.api_pattern, "https://open.er-api.com/v6/*");
        assert_eq!(config.sync_tag, "background-sync-currency-rates");
        assert_ne!(config.static_generation, config.runtime_generation);
        assert!(config.core_assets.contains(&"/index.html".to_string()));
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_expiry_window() {
        let config = AppConfig { expiry_days: 3, ..Default::default() };
        assert_eq!(config.expiry_window(), chrono::Duration::days(3));
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "fxcache.toml",
                r#"
                expiry_days = 2
                static_generation = "shell-v9"
                "#,
            )?;
            jail.set_env("FXCACHE_CONFIG_FILE", "fxcache.toml");
            jail.set_env("FXCACHE_TIMEOUT_MS", "2500");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.expiry_days, 2);
            assert_eq!(config.static_generation, "shell-v9");
            assert_eq!(config.timeout_ms, 2500);
            Ok(())
        });
    }
}
