//! Agent response types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("No agent matches {0:?}")]
    NoAgent(Vec<String>),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result of running one step on an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub exit_code: i32,

    /// Captured log output
    pub output: String,

    /// Values of the step's exported variables
    pub exports: IndexMap<String, String>,
}

impl AgentResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
            exports: IndexMap::new(),
        }
    }

    pub fn failure(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            exports: IndexMap::new(),
        }
    }

    pub fn with_export(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.exports.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
