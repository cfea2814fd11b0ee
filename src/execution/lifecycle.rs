//! Job lifecycle on top of the transition engine
//!
//! PENDING -> CREATED -> QUEUED -> RUNNING -> {SUCCESS, FAILURE, TIMEOUT}.
//! QUEUED and RUNNING may also move to CANCELLED. `RUNNING -> SUCCESS`
//! redirects to FAILURE when a step failed without `allow_failure`, so only
//! the final status reaches the finish hook.

use crate::core::{action_fn, Action, Context, JobRecord, JobStatus, SmError, StateMachine, Transition};
use crate::execution::engine::{EventSink, ExecutionEvent};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Context data of the job machine
pub struct JobData {
    pub job: JobRecord,
    pub events: EventSink,
}

impl JobData {
    pub fn new(job: JobRecord, events: EventSink) -> Self {
        Self { job, events }
    }
}

pub type JobContext = Context<JobData>;

/// Moves the job to a fixed status, unless it already finished
struct SetStatus(JobStatus);

impl Action<JobData> for SetStatus {
    fn can_run(&self, ctx: &JobContext) -> bool {
        !ctx.data.job.status.is_terminal()
    }

    fn accept(&self, _sm: &StateMachine<JobData>, ctx: &mut JobContext) -> anyhow::Result<()> {
        let job = &mut ctx.data.job;
        let now = Utc::now();
        match self.0 {
            JobStatus::Created => job.created_at = Some(now),
            JobStatus::Running => {
                job.started_at = Some(now);
                ctx.data.events.emit(ExecutionEvent::JobStarted {
                    job_id: job.job_id,
                    flow: job.flow.clone(),
                    steps: job.steps.len(),
                });
            }
            status if status.is_terminal() => job.finished_at = Some(now),
            _ => {}
        }
        job.status = self.0;
        Ok(())
    }
}

/// Build the job status machine
pub fn job_machine() -> Result<StateMachine<JobData>, SmError> {
    use JobStatus::*;

    let mut sm = StateMachine::new("job");
    sm.add(Transition::new(Pending, Created), SetStatus(Created))?;
    sm.add(Transition::new(Created, Queued), SetStatus(Queued))?;
    sm.add(Transition::new(Queued, Running), SetStatus(Running))?;
    sm.add(Transition::new(Queued, Cancelled), SetStatus(Cancelled))?;
    sm.add(Transition::new(Running, Failure), SetStatus(Failure))?;
    sm.add(Transition::new(Running, Timeout), SetStatus(Timeout))?;
    sm.add(Transition::new(Running, Cancelled), SetStatus(Cancelled))?;
    sm.add(
        Transition::new(Running, Success),
        action_fn(|sm: &StateMachine<JobData>, ctx: &mut JobContext| {
            if ctx.data.job.status.is_terminal() {
                ctx.skip = true;
                return Ok(());
            }
            if ctx.data.job.has_blocking_failure() {
                sm.execute(&Running.into(), &Failure.into(), ctx);
                return Ok(());
            }
            SetStatus(Success).accept(sm, ctx)
        }),
    )?;

    sm.add_hook(
        Arc::new(|ctx: &mut JobContext| {
            let job = &ctx.data.job;
            info!("Job {} for flow '{}' finished: {}", job.job_id, job.flow, job.status);
            ctx.data.events.emit(ExecutionEvent::JobFinished {
                job_id: job.job_id,
                status: job.status,
            });
        }),
        &[Success.into(), Failure.into(), Timeout.into(), Cancelled.into()],
    );

    Ok(sm)
}

/// Drive the job machine from `from` to `to`
pub fn advance(sm: &StateMachine<JobData>, ctx: &mut JobContext, from: JobStatus, to: JobStatus) {
    sm.execute(&from.into(), &to.into(), ctx);
}
