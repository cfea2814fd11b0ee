//! Driver that only logs what would run

use crate::agent::{AgentDriver, AgentError, AgentResponse};
use crate::core::EffectiveStepProperties;
use async_trait::async_trait;
use tracing::{debug, info};

/// Logs the resolved scripts of each step and reports success
#[derive(Debug, Clone, Default)]
pub struct DryRunDriver {
    /// Agent tags this driver pretends to provide; empty matches everything
    tags: Vec<String>,
}

impl DryRunDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    fn matches(&self, wanted: &[String]) -> bool {
        self.tags.is_empty() || wanted.is_empty() || wanted.iter().any(|w| self.tags.contains(w))
    }
}

#[async_trait]
impl AgentDriver for DryRunDriver {
    async fn dispatch(
        &self,
        step: &EffectiveStepProperties,
        attempt: u32,
    ) -> Result<AgentResponse, AgentError> {
        if !self.matches(&step.agents) {
            return Err(AgentError::NoAgent(step.agents.clone()));
        }

        info!("[dry-run] {} (attempt {})", step.path, attempt);
        if let Some(docker) = &step.docker {
            debug!("[dry-run] {} image: {:?}", step.name, docker.image);
        }

        let mut output = String::new();
        for line in step.bash.iter().chain(step.pwsh.iter()) {
            debug!("[dry-run] {} $ {}", step.name, line);
            output.push_str(line);
            output.push('\n');
        }
        if let Some(plugin) = &step.plugin {
            debug!("[dry-run] {} plugin: {}", step.name, plugin);
            output.push_str(&format!("plugin {}\n", plugin));
        }

        let mut response = AgentResponse::success(output);
        for key in &step.exports {
            if let Some(value) = step.vars.get(key) {
                response = response.with_export(key.clone(), value.clone());
            }
        }
        Ok(response)
    }
}
