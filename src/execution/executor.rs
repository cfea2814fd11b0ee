//! Step executor - runs individual steps with the agent driver

use crate::{
    agent::{AgentDriver, AgentResponse},
    core::{EffectiveStepProperties, StepStatus},
    execution::engine::{EventSink, ExecutionEvent},
};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Result of executing a step, after all retries
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Success {
        response: AgentResponse,
        attempts: u32,
    },
    Failed {
        error: String,
        attempts: u32,
    },
    TimedOut {
        timeout_secs: u64,
        attempts: u32,
    },
}

impl StepOutcome {
    pub fn status(&self) -> StepStatus {
        match self {
            StepOutcome::Success { .. } => StepStatus::Success,
            StepOutcome::Failed { .. } => StepStatus::Failure,
            StepOutcome::TimedOut { .. } => StepStatus::Timeout,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            StepOutcome::Success { attempts, .. }
            | StepOutcome::Failed { attempts, .. }
            | StepOutcome::TimedOut { attempts, .. } => *attempts,
        }
    }

    pub fn error(&self) -> Option<String> {
        match self {
            StepOutcome::Success { .. } => None,
            StepOutcome::Failed { error, .. } => Some(error.clone()),
            StepOutcome::TimedOut { timeout_secs, .. } => {
                Some(format!("Timeout after {} seconds", timeout_secs))
            }
        }
    }
}

/// Executes a single step
pub struct StepExecutor<D> {
    driver: Arc<D>,
    events: EventSink,
}

impl<D: AgentDriver> StepExecutor<D> {
    pub fn new(driver: Arc<D>, events: EventSink) -> Self {
        Self { driver, events }
    }

    /// Dispatch a step, retrying up to `step.retry` more times
    pub async fn execute(&self, step: &EffectiveStepProperties) -> StepOutcome {
        let max_attempts = step.retry.saturating_add(1);
        let mut attempt = 1;

        loop {
            if attempt > 1 {
                self.events.emit(ExecutionEvent::StepRetrying {
                    step: step.name.clone(),
                    attempt,
                    max_attempts,
                });
            }

            let outcome = self.attempt(step, attempt).await;
            if matches!(outcome, StepOutcome::Success { .. }) || attempt >= max_attempts {
                return outcome;
            }

            warn!(
                "Step {} attempt {}/{} failed: {}",
                step.name,
                attempt,
                max_attempts,
                outcome.error().unwrap_or_default()
            );
            attempt += 1;
        }
    }

    async fn attempt(&self, step: &EffectiveStepProperties, attempt: u32) -> StepOutcome {
        info!("Executing step: {} (attempt {})", step.path, attempt);

        let timeout_duration = Duration::from_secs(step.timeout_secs);
        match timeout(timeout_duration, self.driver.dispatch(step, attempt)).await {
            Ok(Ok(response)) if response.is_success() => {
                debug!("Step {} output: {}", step.name, response.output);
                StepOutcome::Success {
                    response,
                    attempts: attempt,
                }
            }
            Ok(Ok(response)) => StepOutcome::Failed {
                error: format!("exited with code {}", response.exit_code),
                attempts: attempt,
            },
            Ok(Err(e)) => {
                error!("Agent error for step {}: {}", step.name, e);
                StepOutcome::Failed {
                    error: e.to_string(),
                    attempts: attempt,
                }
            }
            Err(_) => {
                error!("Timeout for step {} after {}s", step.name, step.timeout_secs);
                StepOutcome::TimedOut {
                    timeout_secs: step.timeout_secs,
                    attempts: attempt,
                }
            }
        }
    }
}
