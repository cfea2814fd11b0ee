//! Execution state models

use crate::core::pipeline::ExecutionGraph;
use crate::core::step::NodeId;
use crate::core::transition::Status;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Created,
    Queued,
    Running,
    Success,
    Failure,
    Cancelled,
    Timeout,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::Created,
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failure,
        JobStatus::Cancelled,
        JobStatus::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Created => "CREATED",
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Timeout => "TIMEOUT",
        }
    }

    /// Terminal statuses never transition further
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Cancelled | JobStatus::Timeout
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Success)
    }

    pub fn status(&self) -> Status {
        Status::new(self.as_str())
    }

    pub fn from_status(status: &Status) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == status.name())
    }
}

impl From<JobStatus> for Status {
    fn from(status: JobStatus) -> Self {
        status.status()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
    Timeout,
}

impl StepStatus {
    pub const ALL: [StepStatus; 6] = [
        StepStatus::Pending,
        StepStatus::Running,
        StepStatus::Success,
        StepStatus::Failure,
        StepStatus::Skipped,
        StepStatus::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Running => "RUNNING",
            StepStatus::Success => "SUCCESS",
            StepStatus::Failure => "FAILURE",
            StepStatus::Skipped => "SKIPPED",
            StepStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Success)
    }

    /// Failure or timeout
    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failure | StepStatus::Timeout)
    }

    pub fn status(&self) -> Status {
        Status::new(self.as_str())
    }

    pub fn from_status(status: &Status) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == status.name())
    }
}

impl From<StepStatus> for Status {
    fn from(status: StepStatus) -> Self {
        status.status()
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime record of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub path: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub allow_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, status: StepStatus, attempts: u32, error: Option<String>) {
        self.status = status;
        self.attempts = attempts;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Skipped;
        self.error = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    /// A failure that should fail the job
    pub fn is_blocking_failure(&self) -> bool {
        self.status.is_failure() && !self.allow_failure
    }
}

/// Runtime record of one job, i.e. one run of a compiled flow
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub flow: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// One record per step, in declaration order
    pub steps: IndexMap<String, StepRecord>,
}

impl JobRecord {
    pub fn new(graph: &ExecutionGraph) -> Self {
        let steps = graph
            .tree()
            .iter()
            .filter(|s| !s.is_root())
            .map(|s| {
                let record = StepRecord {
                    name: s.name.clone(),
                    path: s.path.to_string(),
                    status: StepStatus::Pending,
                    attempts: 0,
                    allow_failure: s.allow_failure,
                    started_at: None,
                    finished_at: None,
                    error: None,
                };
                (s.name.clone(), record)
            })
            .collect();

        Self {
            job_id: Uuid::new_v4(),
            flow: graph.tree().root().name.clone(),
            status: JobStatus::Pending,
            created_at: None,
            started_at: None,
            finished_at: None,
            steps,
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.get(name)
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut StepRecord> {
        self.steps.get_mut(name)
    }

    /// Record for a graph node; the root has none
    pub fn record_mut(&mut self, graph: &ExecutionGraph, id: NodeId) -> Option<&mut StepRecord> {
        if id == NodeId::ROOT {
            return None;
        }
        self.steps.get_mut(graph.name(id))
    }

    pub fn has_blocking_failure(&self) -> bool {
        self.steps.values().any(StepRecord::is_blocking_failure)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.values().filter(|s| s.status == status).count()
    }

    /// Fraction of steps in a terminal state (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 1.0;
        }
        let done = self.steps.values().filter(|s| s.status.is_terminal()).count();
        done as f64 / self.steps.len() as f64
    }
}
