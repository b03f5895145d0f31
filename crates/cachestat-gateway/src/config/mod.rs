//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use cachestat_core::error::{CacheStatError, Result};

pub use schema::{CacheStatConfig, CacheStatusSection, ServerSection};

/// Env var naming the config file; falls back to [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV: &str = "CACHESTAT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "cachestat.yaml";

pub fn load_from_file(path: &str) -> Result<CacheStatConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CacheStatError::Internal(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<CacheStatConfig> {
    let cfg: CacheStatConfig = serde_yaml::from_str(s)
        .map_err(|e| CacheStatError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Path from `CACHESTAT_CONFIG`, or the default next to the working directory.
pub fn config_path() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}
