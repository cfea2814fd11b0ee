//! Agent drivers that run leaf steps

pub mod dry_run;
pub mod response;

use crate::core::EffectiveStepProperties;
use async_trait::async_trait;
pub use dry_run::DryRunDriver;
pub use response::{AgentError, AgentResponse};

/// Trait for dispatching a step to an agent - allows for different implementations
#[async_trait]
pub trait AgentDriver: Send + Sync {
    /// Run one attempt of a step and wait for its result
    async fn dispatch(
        &self,
        step: &EffectiveStepProperties,
        attempt: u32,
    ) -> Result<AgentResponse, AgentError>;
}
