//! Main execution engine - orchestrates one job over a compiled graph

use crate::{
    agent::AgentDriver,
    core::{EffectiveStepProperties, ExecutionGraph, JobRecord, JobStatus, NodeId, SmError, StateMachine, StepStatus},
    execution::{
        lifecycle::{advance, job_machine, JobContext, JobData},
        EngineConfig, ExecutionScheduler, StepExecutor, StepOutcome,
    },
};
use anyhow::Context as _;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during a job
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    JobStarted {
        job_id: Uuid,
        flow: String,
        steps: usize,
    },
    StepStarted {
        step: String,
        path: String,
    },
    StepRetrying {
        step: String,
        attempt: u32,
        max_attempts: u32,
    },
    StepFinished {
        step: String,
        status: StepStatus,
        attempts: u32,
        error: Option<String>,
    },
    StepSkipped {
        step: String,
        reason: String,
    },
    JobFinished {
        job_id: Uuid,
        status: JobStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to every registered handler
#[derive(Clone, Default)]
pub struct EventSink {
    handlers: Arc<Vec<EventHandler>>,
}

impl EventSink {
    pub fn new(handlers: Vec<EventHandler>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub fn emit(&self, event: ExecutionEvent) {
        for handler in self.handlers.iter() {
            handler(event.clone());
        }
    }
}

const UPSTREAM_FAILED: &str = "upstream step failed";
const JOB_TIMED_OUT: &str = "job timed out";
const JOB_ABORTED: &str = "job aborted";

/// Main job execution engine
pub struct ExecutionEngine<D> {
    driver: Arc<D>,
    config: EngineConfig,
    handlers: Vec<EventHandler>,
    machine: StateMachine<JobData>,
}

impl<D: AgentDriver + 'static> ExecutionEngine<D> {
    pub fn new(driver: D, config: EngineConfig) -> Result<Self, SmError> {
        Self::with_shared_driver(Arc::new(driver), config)
    }

    pub fn with_shared_driver(driver: Arc<D>, config: EngineConfig) -> Result<Self, SmError> {
        Ok(Self {
            driver,
            config,
            handlers: Vec::new(),
            machine: job_machine()?,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    /// Run every step of `graph` and return the final job record
    pub async fn run(&self, graph: &ExecutionGraph) -> anyhow::Result<JobRecord> {
        let events = EventSink::new(self.handlers.clone());
        let mut ctx = JobContext::new(JobData::new(JobRecord::new(graph), events.clone()));

        info!(
            "Starting job {} for flow '{}' ({} steps)",
            ctx.data.job.job_id,
            ctx.data.job.flow,
            ctx.data.job.steps.len()
        );

        advance(&self.machine, &mut ctx, JobStatus::Pending, JobStatus::Created);
        advance(&self.machine, &mut ctx, JobStatus::Created, JobStatus::Queued);
        advance(&self.machine, &mut ctx, JobStatus::Queued, JobStatus::Running);

        let job_id = ctx.data.job.job_id;
        let walk = self.walk(graph, &mut ctx.data.job, &events);
        let target = match self.config.job_timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), walk).await {
                Ok(result) => walk_outcome(job_id, result),
                Err(_) => {
                    warn!("Job {} timed out after {}s", job_id, secs);
                    JobStatus::Timeout
                }
            },
            None => walk_outcome(job_id, walk.await),
        };

        match target {
            JobStatus::Timeout => {
                abandon_unfinished(graph, &mut ctx.data.job, &events, StepStatus::Timeout, JOB_TIMED_OUT)
            }
            JobStatus::Failure => {
                abandon_unfinished(graph, &mut ctx.data.job, &events, StepStatus::Failure, JOB_ABORTED)
            }
            _ => {}
        }
        settle_stages(graph, &mut ctx.data.job);

        advance(&self.machine, &mut ctx, JobStatus::Running, target);

        if let Some(err) = ctx.take_error() {
            warn!("Job {} finished with a transition error: {:#}", job_id, err);
        }
        Ok(ctx.data.job)
    }

    /// Walk the graph: structural nodes settle immediately, leaves are dispatched
    async fn walk(
        &self,
        graph: &ExecutionGraph,
        job: &mut JobRecord,
        events: &EventSink,
    ) -> anyhow::Result<()> {
        let executor = Arc::new(StepExecutor::new(self.driver.clone(), events.clone()));
        let defaults = self.config.step_defaults();
        let limit = self.config.max_parallel.max(1);

        let mut scheduler = ExecutionScheduler::new(graph);
        let mut doomed: HashSet<NodeId> = HashSet::new();
        let mut waiting: VecDeque<NodeId> = VecDeque::new();
        let mut tasks: JoinSet<(NodeId, StepOutcome)> = JoinSet::new();

        loop {
            while let Some(id) = scheduler.pop_ready() {
                let step = graph.step(id);
                if doomed.contains(&id) {
                    debug!("Skipping {}: {}", step.path, UPSTREAM_FAILED);
                    if let Some(record) = job.record_mut(graph, id) {
                        record.skip(UPSTREAM_FAILED);
                    }
                    events.emit(ExecutionEvent::StepSkipped {
                        step: step.name.clone(),
                        reason: UPSTREAM_FAILED.to_string(),
                    });
                    scheduler.settle(graph, id);
                } else if step.is_leaf() {
                    waiting.push_back(id);
                } else {
                    debug!("Entering {}", step.path);
                    scheduler.settle(graph, id);
                }
            }

            while tasks.len() < limit {
                let Some(id) = waiting.pop_front() else {
                    break;
                };
                let props = graph.resolve(id, &defaults);
                if let Some(record) = job.record_mut(graph, id) {
                    record.start();
                }
                events.emit(ExecutionEvent::StepStarted {
                    step: props.name.clone(),
                    path: props.path.clone(),
                });

                let executor = executor.clone();
                tasks.spawn(async move {
                    let outcome = execute_isolated(executor, props).await;
                    (id, outcome)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (id, outcome) = joined.context("Step task did not complete")?;
            let step = graph.step(id);
            let status = outcome.status();

            if let Some(record) = job.record_mut(graph, id) {
                record.finish(status, outcome.attempts(), outcome.error());
            }
            events.emit(ExecutionEvent::StepFinished {
                step: step.name.clone(),
                status,
                attempts: outcome.attempts(),
                error: outcome.error(),
            });

            if status.is_failure() {
                if step.allow_failure {
                    info!("Step {} failed but is allowed to fail", step.name);
                } else {
                    warn!("Step {} failed, skipping downstream steps", step.name);
                    doomed.extend(graph.skip(id).into_iter().filter(|&d| !graph.step(d).post));
                }
            }

            scheduler.settle(graph, id);
        }

        if !scheduler.is_complete() {
            anyhow::bail!(
                "{} of {} nodes never became ready",
                graph.len() - scheduler.settled().len(),
                graph.len()
            );
        }
        Ok(())
    }
}

/// Target status of the job once the walk returned
fn walk_outcome(job_id: Uuid, result: anyhow::Result<()>) -> JobStatus {
    match result {
        Ok(()) => JobStatus::Success,
        Err(err) => {
            error!("Job {} aborted: {:#}", job_id, err);
            JobStatus::Failure
        }
    }
}

/// Run one step in its own task so a panicking driver only fails that step
async fn execute_isolated<D: AgentDriver + 'static>(
    executor: Arc<StepExecutor<D>>,
    props: EffectiveStepProperties,
) -> StepOutcome {
    let name = props.name.clone();
    let mut task = AbortOnDrop(tokio::spawn(async move { executor.execute(&props).await }));

    match (&mut task.0).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Step {} task failed: {}", name, err);
            StepOutcome::Failed {
                error: format!("step task failed: {}", err),
                attempts: 1,
            }
        }
    }
}

/// Aborts the inner step task when the job stops waiting for it
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// After the walk stopped early: running leaves get `running_status`,
/// pending leaves are skipped
fn abandon_unfinished(
    graph: &ExecutionGraph,
    job: &mut JobRecord,
    events: &EventSink,
    running_status: StepStatus,
    reason: &str,
) {
    for step in graph.tree().iter().filter(|s| s.is_leaf()) {
        let Some(record) = job.step_mut(&step.name) else {
            continue;
        };
        match record.status {
            StepStatus::Running => record.finish(running_status, record.attempts.max(1), Some(reason.to_string())),
            StepStatus::Pending => {
                record.skip(reason);
                events.emit(ExecutionEvent::StepSkipped {
                    step: step.name.clone(),
                    reason: reason.to_string(),
                });
            }
            _ => {}
        }
    }
}

/// Derive stage statuses from their children, innermost stages first
fn settle_stages(graph: &ExecutionGraph, job: &mut JobRecord) {
    for stage in graph.tree().iter().rev().filter(|s| s.is_stage()) {
        let children: Vec<_> = graph
            .tree()
            .children(stage.id)
            .filter_map(|c| job.step(&c.name))
            .cloned()
            .collect();

        let Some(record) = job.step_mut(&stage.name) else {
            continue;
        };
        if record.status == StepStatus::Skipped {
            continue;
        }

        record.started_at = children.iter().filter_map(|c| c.started_at).min();
        if children.iter().any(|c| c.is_blocking_failure()) {
            record.finish(StepStatus::Failure, 0, Some("nested step failed".to_string()));
        } else if children.iter().all(|c| c.status == StepStatus::Skipped) {
            record.skip("all nested steps skipped");
        } else {
            record.finish(StepStatus::Success, 0, None);
        }
        if let Some(finished) = children.iter().filter_map(|c| c.finished_at).max() {
            record.finished_at = Some(finished);
        }
    }
}
