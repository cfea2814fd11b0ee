//! Test utility functions for flowline

#![allow(dead_code)]

use async_trait::async_trait;
use flowline::agent::{AgentDriver, AgentError, AgentResponse};
use flowline::core::{compile, load, EffectiveStepProperties, ExecutionGraph, JobRecord, StepStatus};
use flowline::execution::{EngineConfig, ExecutionEngine, ExecutionEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock driver answers for one attempt
#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    Exit(i32),
    Error(String),
    Hang,
    Panic,
}

/// Mock driver with scripted replies per step name.
///
/// Replies are consumed by attempt number; the last one repeats. Steps
/// without a script succeed.
#[derive(Default)]
pub struct MockDriver {
    script: HashMap<String, Vec<Reply>>,
    delay: Option<Duration>,
    dispatched: Mutex<Vec<String>>,
    seen: Mutex<HashMap<String, EffectiveStepProperties>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, name: &str, replies: Vec<Reply>) -> Self {
        self.script.insert(name.to_string(), replies);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Step names in dispatch order, one entry per attempt
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatch_count(&self, name: &str) -> usize {
        self.dispatched().iter().filter(|n| n.as_str() == name).count()
    }

    /// Position of the first dispatch of `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.dispatched().iter().position(|n| n == name)
    }

    pub fn properties(&self, name: &str) -> Option<EffectiveStepProperties> {
        self.seen.lock().unwrap().get(name).cloned()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentDriver for MockDriver {
    async fn dispatch(
        &self,
        step: &EffectiveStepProperties,
        attempt: u32,
    ) -> Result<AgentResponse, AgentError> {
        self.dispatched.lock().unwrap().push(step.name.clone());
        self.seen.lock().unwrap().insert(step.name.clone(), step.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .script
            .get(&step.name)
            .and_then(|replies| replies.get(attempt as usize - 1).or(replies.last()))
            .cloned()
            .unwrap_or(Reply::Ok);

        let result = match reply {
            Reply::Ok => Ok(AgentResponse::success(format!("ran {}", step.name))),
            Reply::Exit(code) => Ok(AgentResponse::failure(code, format!("{} failed", step.name))),
            Reply::Error(message) => Err(AgentError::Dispatch(message)),
            Reply::Panic => panic!("driver crashed on {}", step.name),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(AgentResponse::success("too late"))
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Merge the documents and compile them
pub fn compile_yaml(docs: &[&str]) -> ExecutionGraph {
    let flow = load(docs.iter().copied()).expect("documents should merge");
    compile(&flow).expect("flow should compile")
}

/// Result of running a job with a mock driver
pub struct JobTestResult {
    pub job: JobRecord,
    pub events: Vec<ExecutionEvent>,
}

impl JobTestResult {
    pub fn status_of(&self, step: &str) -> StepStatus {
        self.job
            .step(step)
            .unwrap_or_else(|| panic!("no record for step {}", step))
            .status
    }

    pub fn attempts_of(&self, step: &str) -> u32 {
        self.job.step(step).map(|s| s.attempts).unwrap_or(0)
    }

    pub fn job_finished_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::JobFinished { .. }))
            .count()
    }
}

/// Run a compiled graph with the given driver
pub async fn run_with_driver(
    graph: &ExecutionGraph,
    driver: Arc<MockDriver>,
    config: EngineConfig,
) -> JobTestResult {
    let mut engine = ExecutionEngine::with_shared_driver(driver, config).expect("job machine should build");
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let job = engine.run(graph).await.expect("job should run");
    let events = events.lock().unwrap().clone();
    JobTestResult { job, events }
}

/// Assert every step in `names` has `status`
pub fn assert_statuses(result: &JobTestResult, names: &[&str], status: StepStatus) {
    for name in names {
        assert_eq!(
            result.status_of(name),
            status,
            "step {} should be {}",
            name,
            status
        );
    }
}
