//! Configuration loading
//!
//! Settings come from `~/.novapg/config.toml` (optional), then CLI flags and
//! environment variables override individual fields. The file is only ever
//! read; credentials are not written back.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::endpoints::DEFAULT_BASE_URL;
use super::gateway::DEFAULT_TIMEOUT_SECS;
use super::session::Credentials;
use crate::types::{NovaError, Result};

/// Default poll interval in minutes
pub const DEFAULT_UPDATE_INTERVAL_MINUTES: u64 = 60;

/// Years before the current one surfaced in the metric catalogue
pub const DEFAULT_HISTORY_YEARS: u32 = 1;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub email: String,
    pub password: String,
    pub update_interval_minutes: u64,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub history_years: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            update_interval_minutes: DEFAULT_UPDATE_INTERVAL_MINUTES,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            history_years: DEFAULT_HISTORY_YEARS,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("update_interval_minutes", &self.update_interval_minutes)
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("history_years", &self.history_years)
            .finish()
    }
}

/// Per-run overrides coming from the command line / environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub email: Option<String>,
    pub password: Option<String>,
    pub update_interval_minutes: Option<u64>,
    pub history_years: Option<u32>,
}

impl Config {
    /// Get the default config path (~/.novapg/config.toml)
    pub fn default_path() -> Result<PathBuf> {
        let home = directories::UserDirs::new()
            .ok_or_else(|| NovaError::Config("Failed to get home directory".into()))?
            .home_dir()
            .to_path_buf();
        Ok(home.join(".novapg").join("config.toml"))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| NovaError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Load the file (explicit path or default location), apply overrides
    /// and validate the result
    pub fn resolve(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::load(&Self::default_path()?)?,
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(email) = overrides.email {
            self.email = email;
        }
        if let Some(password) = overrides.password {
            self.password = password;
        }
        if let Some(minutes) = overrides.update_interval_minutes {
            self.update_interval_minutes = minutes;
        }
        if let Some(years) = overrides.history_years {
            self.history_years = years;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(NovaError::Config(
                "email is required (config file, --email or NOVAPG_EMAIL)".into(),
            ));
        }
        if self.password.is_empty() {
            return Err(NovaError::Config(
                "password is required (config file, --password or NOVAPG_PASSWORD)".into(),
            ));
        }
        if self.update_interval_minutes == 0 {
            return Err(NovaError::Config(
                "update_interval_minutes must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(NovaError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.email.trim(), self.password.clone())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes.saturating_mul(60))
    }
}
