//! Configuration types, loadable from TOML.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::policy::QuotaLimits;

/// Per-agent runtime tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Cycle ceiling; cycle `max_cycles + 1` fails the run.
    pub max_cycles: u32,
    /// Whole-run wall-clock budget.
    pub timeout_ms: u64,
    /// How many history entries the decision step sees.
    pub history_limit: usize,
    /// Standing instruction injected into every decision.
    pub system_directive: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_cycles: 100,
            timeout_ms: 300_000,
            history_limit: 40,
            system_directive: String::new(),
        }
    }
}

/// Category creation limits per agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaConfig {
    pub agents: HashMap<String, QuotaLimits>,
}

/// World geometry and maintenance cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub locations: Vec<String>,
    pub tick_interval_ms: u64,
    /// A random entity spawns every this many ticks; 0 disables spawning.
    pub spawn_interval_ticks: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            locations: vec![
                "kitchen".to_string(),
                "garden".to_string(),
                "bedroom".to_string(),
            ],
            tick_interval_ms: 100,
            spawn_interval_ticks: 0,
        }
    }
}

/// Aggregate config for a whole deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CottageConfig {
    pub runtime: RuntimeConfig,
    pub world: WorldConfig,
    pub quotas: QuotaConfig,
}

impl CottageConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| CoreError::TomlParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runtime.max_cycles == 0 {
            return Err(CoreError::configuration("runtime", "max_cycles must be at least 1"));
        }
        if self.runtime.timeout_ms == 0 {
            return Err(CoreError::configuration("runtime", "timeout_ms must be nonzero"));
        }
        if self.world.locations.is_empty() {
            return Err(CoreError::configuration("world", "at least one location is required"));
        }
        Ok(())
    }
}
