//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets and per-deployment values (API key, admin email, session identity)
//! are referenced by env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::odds::format::Locale;
use crate::storage::DEFAULT_CACHE_KEY;
use crate::types::{Identity, PickslipError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSection,
    #[serde(default)]
    pub slip: SlipConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlipConfig {
    pub debounce_ms: u64,
    pub default_stake: f64,
    pub cache_path: String,
    pub cache_key: String,
}

impl Default for SlipConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            default_stake: 1000.0,
            cache_path: "pickslip_cache.json".to_string(),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
        }
    }
}

impl SlipConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    Sqlite,
    Rest,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,
    /// sqlx connection URL for the `sqlite` backend.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Service root for the `rest` backend.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AccessConfig {
    pub admin_email_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    pub user_id_env: Option<String>,
    pub email_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PickslipError> {
        match self.remote.backend {
            RemoteBackend::Sqlite if self.remote.database_url.is_none() => Err(PickslipError::Config(
                "remote.database_url is required for the sqlite backend".into(),
            )),
            RemoteBackend::Rest if self.remote.base_url.is_none() || self.remote.api_key_env.is_none() => {
                Err(PickslipError::Config(
                    "remote.base_url and remote.api_key_env are required for the rest backend".into(),
                ))
            }
            _ if !self.slip.default_stake.is_finite() || self.slip.default_stake < 0.0 => Err(
                PickslipError::Config("slip.default_stake must be a non-negative number".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an optional env-var reference, treating unset or blank as absent.
    pub fn resolve_optional(env_name: Option<&str>) -> Option<String> {
        env_name
            .and_then(|name| std::env::var(name).ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// The configured administrator email, if any.
    pub fn admin_email(&self) -> Option<String> {
        Self::resolve_optional(self.access.admin_email_env.as_deref())
    }

    /// The signed-in identity for this process, or `None` when signed out.
    pub fn session_identity(&self) -> Option<Identity> {
        let user_id = Self::resolve_optional(self.session.user_id_env.as_deref())?;
        let email = Self::resolve_optional(self.session.email_env.as_deref());
        Some(Identity::new(user_id, email))
    }
}
