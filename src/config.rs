use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChoreError, Result};
use crate::recurrence::MAX_EXPANSION_ITERATIONS;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "CHORELY_CONFIG";

/// Tunables for the engine. Every field has a default, so a partial or
/// missing config file is fine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// How far ahead scheduled series are pre-materialized.
    pub seed_horizon_months: u32,
    pub overdue_sweep_interval_secs: u64,
    /// Loop bound for a single expansion or seeding call, at most 366.
    pub max_expansion_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed_horizon_months: 12,
            overdue_sweep_interval_secs: 300,
            max_expansion_iterations: MAX_EXPANSION_ITERATIONS,
        }
    }
}

/// Returns the path to the engine config file (`config.json`).
///
/// The path is determined in the following order:
/// 1. `CHORELY_CONFIG` environment variable.
/// 2. `~/.config/chorely/config.json` (on Linux).
/// 3. `./config.json` (fallback).
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV).map(PathBuf::from).unwrap_or_else(|_| {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("chorely");
        p.push("config.json");
        p
    })
}

impl EngineConfig {
    /// Loads the config from [`config_path`].
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Loads the config from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| ChoreError::Config {
            message: format!("reading {}: {e}", path.display()),
            path: Some(path.to_path_buf()),
        })?;
        let config: EngineConfig = serde_json::from_str(&raw).map_err(|e| ChoreError::Config {
            message: format!("parsing {}: {e}", path.display()),
            path: Some(path.to_path_buf()),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: &str| ChoreError::Config {
            message: message.to_string(),
            path: Some(path.to_path_buf()),
        };
        if self.overdue_sweep_interval_secs == 0 {
            return Err(invalid("overdue_sweep_interval_secs must be positive"));
        }
        if self.max_expansion_iterations == 0 {
            return Err(invalid("max_expansion_iterations must be positive"));
        }
        if self.max_expansion_iterations > MAX_EXPANSION_ITERATIONS {
            return Err(invalid(&format!(
                "max_expansion_iterations must not exceed {MAX_EXPANSION_ITERATIONS}"
            )));
        }
        Ok(())
    }

    /// Period of the overdue sweep, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.overdue_sweep_interval_secs.max(1))
    }
}
