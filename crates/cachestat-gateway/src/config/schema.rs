use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use cachestat_core::error::{CacheStatError, Result};
use cachestat_core::{CoordinatorSettings, ReloadPolicy, ToggleGate};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheStatConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    /// Global scope only; there is no per-location override.
    #[serde(default)]
    pub cache_status: CacheStatusSection,
}

impl CacheStatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CacheStatError::BadConfig(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.server.validate()?;
        self.cache_status.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            CacheStatError::BadConfig(format!("server.listen must be a valid SocketAddr: {e}"))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheStatusSection {
    #[serde(default)]
    pub enabled: bool,

    /// Directory for the shared block and lock file. Defaults to a
    /// `cachestat` directory under the system temp dir.
    #[serde(default)]
    pub runtime_dir: Option<PathBuf>,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_lock_mode")]
    pub lock_mode: u32,

    /// `null` waits for the lock indefinitely.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: Option<u64>,

    #[serde(default)]
    pub on_reload: ReloadPolicy,
}

impl Default for CacheStatusSection {
    fn default() -> Self {
        Self {
            enabled: false,
            runtime_dir: None,
            name: default_name(),
            lock_mode: default_lock_mode(),
            lock_timeout_ms: default_lock_timeout_ms(),
            on_reload: ReloadPolicy::default(),
        }
    }
}

impl CacheStatusSection {
    pub fn validate(&self) -> Result<()> {
        if self.lock_mode & !0o777 != 0 {
            return Err(CacheStatError::BadConfig(
                "cache_status.lock_mode must only contain permission bits (<= 0o777)".into(),
            ));
        }
        if self.lock_mode & 0o600 != 0o600 {
            return Err(CacheStatError::BadConfig(
                "cache_status.lock_mode must grant the owner read and write".into(),
            ));
        }
        if let Some(ms) = self.lock_timeout_ms {
            if !(1..=60_000).contains(&ms) {
                return Err(CacheStatError::BadConfig(
                    "cache_status.lock_timeout_ms must be between 1 and 60000".into(),
                ));
            }
        }
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CacheStatError::BadConfig(
                "cache_status.name must be non-empty [A-Za-z0-9_-]".into(),
            ));
        }
        if let Some(dir) = &self.runtime_dir {
            if !dir.is_absolute() {
                return Err(CacheStatError::BadConfig(
                    "cache_status.runtime_dir must be an absolute path".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn gate(&self) -> ToggleGate {
        ToggleGate::new(self.enabled)
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cachestat"))
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings::new(self.gate(), self.runtime_dir())
            .with_name(self.name.clone())
            .with_mode(self.lock_mode)
            .with_lock_timeout(self.lock_timeout())
            .with_reload_policy(self.on_reload)
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".into()
}
fn default_name() -> String {
    "cachestat".into()
}
fn default_lock_mode() -> u32 {
    0o600
}
fn default_lock_timeout_ms() -> Option<u64> {
    Some(500)
}
