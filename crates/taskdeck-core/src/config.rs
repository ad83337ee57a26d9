//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: API
//! base URL, request timeout, cache freshness, where credentials are kept,
//! and the last used username.
//!
//! Configuration is stored at `~/.config/taskdeck/config.json`. The
//! `TASKDECK_API_URL` and `TASKDECK_TIMEOUT_SECS` environment variables
//! override the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{CredentialBackend, FileBackend, KeyringBackend};
use crate::cache::DEFAULT_STALE_MINUTES;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "taskdeck";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API base URL used when neither the config file nor the environment set one
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Per-request timeout in seconds.
/// 10s fails fast enough for interactive use while tolerating slow backends.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const ENV_API_URL: &str = "TASKDECK_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "TASKDECK_TIMEOUT_SECS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackendKind {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub cache_stale_minutes: i64,
    pub credential_backend: CredentialBackendKind,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_stale_minutes: DEFAULT_STALE_MINUTES,
            credential_backend: CredentialBackendKind::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_SECS),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// The durable credential backend selected by this config.
    pub fn credential_backend(&self) -> Result<Arc<dyn CredentialBackend>> {
        Ok(match self.credential_backend {
            CredentialBackendKind::File => Arc::new(FileBackend::new(self.cache_dir()?)),
            CredentialBackendKind::Keyring => Arc::new(KeyringBackend::new()),
        })
    }
}
