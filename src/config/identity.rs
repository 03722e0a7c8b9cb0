use std::path::Path;

use chrono::Duration;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::Schedule;

/// Tunables for the claim engine, staging, holds and cleanup jobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub pending_ttl_hours: u32,
    pub hold_ttl_hours: u32,
    pub claim_attempts: u32,
    pub cleanup_batch_size: usize,
    pub pending_cleanup_interval_hours: u32,
    pub hold_cleanup_cron: String,
    pub scheduler_tick_seconds: u64,
    pub provider: Option<ProviderConfig>,
}

/// Where to look up users reported by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

fn default_provider_timeout() -> u64 {
    5
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            pending_ttl_hours: 24,
            hold_ttl_hours: 24,
            claim_attempts: 100,
            cleanup_batch_size: 100,
            pending_cleanup_interval_hours: 1,
            hold_cleanup_cron: "30 * * * *".to_string(),
            scheduler_tick_seconds: 60,
            provider: None,
        }
    }
}

impl IdentityConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid identity config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Loads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.claim_attempts == 0 {
            return Err(Error::Config("claim_attempts must be positive".to_string()));
        }
        if self.cleanup_batch_size == 0 {
            return Err(Error::Config("cleanup_batch_size must be positive".to_string()));
        }
        if self.scheduler_tick_seconds == 0 {
            return Err(Error::Config("scheduler_tick_seconds must be positive".to_string()));
        }
        self.pending_cleanup_schedule()
            .validate()
            .and_then(|()| self.hold_cleanup_schedule().validate())
            .map_err(|e| Error::Config(e.to_string()))
    }

    #[must_use]
    pub fn pending_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.pending_ttl_hours))
    }

    #[must_use]
    pub fn hold_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.hold_ttl_hours))
    }

    #[must_use]
    pub fn pending_cleanup_schedule(&self) -> Schedule {
        Schedule::Interval {
            hours: self.pending_cleanup_interval_hours,
        }
    }

    #[must_use]
    pub fn hold_cleanup_schedule(&self) -> Schedule {
        Schedule::Cron {
            spec: self.hold_cleanup_cron.clone(),
        }
    }
}
