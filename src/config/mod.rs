//! Configuration for the optimizer.
//!
//! A single TOML file with an `[optimization]` section (what to optimize and
//! how), a `[synchronizer]` section (report timing heuristics) and a `[retry]`
//! section (backoff for report lookups). Every section is optional.
//! `OPTIMIZER_*` environment variables override the optimization section.

mod optimization_config;
mod synchronizer_config;

pub use optimization_config::{DEFAULT_FILTER_METRIC, DEFAULT_TARGET_METRIC, OptimizationConfig};
pub use synchronizer_config::SynchronizerConfig;

use crate::infrastructure::core::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub optimization: OptimizationConfig,
    pub synchronizer: SynchronizerConfig,
    pub retry: RetryPolicy,
}

impl Config {
    /// Loads `.env`, the optional TOML file and the environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {:?}", path))?;
                toml::from_str::<Config>(&text)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?
            }
            None => Config::default(),
        };
        config.optimization = config.optimization.with_env_overrides();
        config
            .optimization
            .validate()
            .context("Invalid optimization settings")?;
        Ok(config)
    }
}
