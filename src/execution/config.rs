//! Engine configuration

use crate::core::StepDefaults;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime settings for [`ExecutionEngine`](crate::execution::ExecutionEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Step timeout when no node in the chain sets one
    pub default_timeout_secs: u64,

    /// Step retries when no node in the chain sets them
    pub default_retry: u32,

    /// Maximum number of steps dispatched at once
    pub max_parallel: usize,

    /// Wall-clock limit for the whole job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 3600,
            default_retry: 0,
            max_parallel: 4,
            job_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Load config from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse config from YAML string; an empty document yields the defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(yaml).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            anyhow::bail!("max_parallel must be at least 1");
        }
        if self.default_timeout_secs == 0 {
            anyhow::bail!("default_timeout_secs must be at least 1");
        }
        if self.job_timeout_secs == Some(0) {
            anyhow::bail!("job_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn step_defaults(&self) -> StepDefaults {
        StepDefaults {
            retry: self.default_retry,
            timeout_secs: self.default_timeout_secs,
        }
    }
}
