//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn is_absolute_http(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - generation names are empty or equal
    /// - `origin`, `api_pattern` or `rates_url` are not absolute http(s) URLs
    /// - `expiry_days` is outside 1..=365
    /// - an asset appears in both manifest lists
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.static_generation.is_empty() {
            return Err(invalid("static_generation", "must not be empty"));
        }
        if self.runtime_generation.is_empty() {
            return Err(invalid("runtime_generation", "must not be empty"));
        }
        if self.static_generation == self.runtime_generation {
            return Err(invalid("runtime_generation", "must differ from static_generation"));
        }

        if !is_absolute_http(&self.origin) {
            return Err(invalid("origin", "must be an absolute http(s) URL"));
        }
        if !is_absolute_http(&self.api_pattern) {
            return Err(invalid("api_pattern", "must be an absolute http(s) URL pattern"));
        }
        if !is_absolute_http(&self.rates_url) {
            return Err(invalid("rates_url", "must be an absolute http(s) URL"));
        }

        if !(1..=365).contains(&self.expiry_days) {
            return Err(invalid("expiry_days", "must be between 1 and 365"));
        }

        if self.notification_capacity == 0 {
            return Err(invalid("notification_capacity", "must be greater than 0"));
        }

        if let Some(dup) = self.core_assets.iter().find(|a| self.optional_assets.contains(a)) {
            return Err(ConfigError::Invalid {
                field: "optional_assets".into(),
                reason: format!("{dup} is already a core asset"),
            });
        }

        if self.core_assets.is_empty() {
            tracing::warn!("core_assets is empty; install will only seed best-effort assets");
        }

        Ok(())
    }
}
