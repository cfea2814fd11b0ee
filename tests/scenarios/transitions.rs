//! Test: status transitions, redirects and settle hooks

use flowline::core::{
    action_fn, compile, load, Action, Context, Hook, JobRecord, JobStatus, StateMachine, Status,
    Transition,
};
use flowline::execution::lifecycle::advance;
use flowline::execution::{job_machine, EventSink, ExecutionEvent, JobData};
use std::sync::{Arc, Mutex};

type Log = Vec<String>;

fn status(name: &str) -> Status {
    Status::new(name)
}

fn recording_hook() -> Hook<Log> {
    Arc::new(|ctx: &mut Context<Log>| {
        let to = ctx.to.as_ref().map(Status::name).unwrap_or("?").to_string();
        ctx.data.push(format!("hook {}", to));
    })
}

fn record(
    step: &'static str,
) -> impl Fn(&StateMachine<Log>, &mut Context<Log>) -> anyhow::Result<()> + Send + Sync {
    move |_sm, ctx| {
        ctx.data.push(step.to_string());
        Ok(())
    }
}

/// RUNNING -> SUCCESS redirects to RUNNING -> FAILURE when `fail` is set
fn machine(fail: bool) -> StateMachine<Log> {
    let mut sm = StateMachine::new("step");
    sm.add(Transition::new("RUNNING", "FAILURE"), action_fn(record("failure"))).unwrap();
    sm.add(
        Transition::new("RUNNING", "SUCCESS"),
        action_fn(move |sm: &StateMachine<Log>, ctx: &mut Context<Log>| {
            ctx.data.push("success".to_string());
            if fail {
                sm.execute(&status("RUNNING"), &status("FAILURE"), ctx);
            }
            Ok(())
        }),
    )
    .unwrap();
    sm.add_hook(recording_hook(), &[status("SUCCESS"), status("FAILURE")]);
    sm
}

#[test]
fn test_hook_fires_once_for_plain_transition() {
    let sm = machine(false);
    let mut ctx = Context::new(Log::new());

    sm.execute(&status("RUNNING"), &status("SUCCESS"), &mut ctx);
    assert_eq!(ctx.data, vec!["success", "hook SUCCESS"]);
}

#[test]
fn test_redirect_settles_on_final_target() {
    let sm = machine(true);
    let mut ctx = Context::new(Log::new());

    sm.execute(&status("RUNNING"), &status("SUCCESS"), &mut ctx);
    assert_eq!(ctx.data, vec!["success", "failure", "hook FAILURE"]);
}

#[test]
fn test_unknown_transition_is_ignored() {
    let sm = machine(false);
    let mut ctx = Context::new(Log::new());

    sm.execute(&status("PENDING"), &status("SUCCESS"), &mut ctx);
    assert!(ctx.data.is_empty());
    assert!(!sm.has_transition(&status("PENDING"), &status("SUCCESS")));
}

struct Guarded;

impl Action<Log> for Guarded {
    fn can_run(&self, ctx: &Context<Log>) -> bool {
        !ctx.data.iter().any(|entry| entry == "locked")
    }

    fn accept(&self, _sm: &StateMachine<Log>, _ctx: &mut Context<Log>) -> anyhow::Result<()> {
        anyhow::bail!("agent went away")
    }

    fn on_finally(&self, ctx: &mut Context<Log>) {
        ctx.data.push("finally".to_string());
    }
}

#[test]
fn test_failed_action_keeps_error_and_still_settles() {
    let mut sm = StateMachine::new("guarded");
    sm.add(Transition::new("RUNNING", "SUCCESS"), Guarded).unwrap();
    sm.add_hook(recording_hook(), &[status("SUCCESS")]);

    let mut ctx = Context::new(Log::new());
    sm.execute(&status("RUNNING"), &status("SUCCESS"), &mut ctx);

    assert_eq!(ctx.data, vec!["finally", "hook SUCCESS"]);
    assert_eq!(ctx.take_error().unwrap().to_string(), "agent went away");
    assert!(!ctx.has_error());
}

#[test]
fn test_guard_blocks_action_and_hook() {
    let mut sm = StateMachine::new("guarded");
    sm.add(Transition::new("RUNNING", "SUCCESS"), Guarded).unwrap();
    sm.add_hook(recording_hook(), &[status("SUCCESS")]);

    let mut ctx = Context::new(vec!["locked".to_string()]);
    sm.execute(&status("RUNNING"), &status("SUCCESS"), &mut ctx);

    assert_eq!(ctx.data, vec!["locked"]);
    assert!(!ctx.has_error());
}

#[test]
fn test_queued_job_can_be_cancelled() {
    let flow = load(["steps:\n  a:\n    bash: a\n"]).unwrap();
    let graph = compile(&flow).unwrap();

    let finished = Arc::new(Mutex::new(Vec::new()));
    let seen = finished.clone();
    let events = EventSink::new(vec![Arc::new(move |event: ExecutionEvent| {
        if let ExecutionEvent::JobFinished { status, .. } = event {
            seen.lock().unwrap().push(status);
        }
    })]);

    let sm = job_machine().unwrap();
    let mut ctx = Context::new(JobData::new(JobRecord::new(&graph), events));
    advance(&sm, &mut ctx, JobStatus::Pending, JobStatus::Created);
    advance(&sm, &mut ctx, JobStatus::Created, JobStatus::Queued);
    advance(&sm, &mut ctx, JobStatus::Queued, JobStatus::Cancelled);

    // a cancelled job never starts
    advance(&sm, &mut ctx, JobStatus::Queued, JobStatus::Running);

    assert_eq!(ctx.data.job.status, JobStatus::Cancelled);
    assert!(ctx.data.job.started_at.is_none());
    assert_eq!(*finished.lock().unwrap(), vec![JobStatus::Cancelled]);
}
