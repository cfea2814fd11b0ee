//! Test: Failure Handling - skipping downstream steps and job outcome

use crate::helpers::*;
use flowline::core::{JobStatus, StepStatus};
use flowline::execution::{EngineConfig, ExecutionEvent};
use std::sync::Arc;

const RELEASE: &str = r#"
steps:
  build:
    bash: make
  test:
    bash: make test
  package:
    bash: make dist
  publish:
    bash: ./publish.sh
  cleanup:
    post: true
    bash: rm -rf target
"#;

/// A failed step skips everything downstream except post steps
#[tokio::test]
async fn test_failure_skips_downstream_steps() {
    let graph = compile_yaml(&[RELEASE]);
    let driver = Arc::new(MockDriver::new().with_step("test", vec![Reply::Exit(1)]));

    let result = run_with_driver(&graph, driver.clone(), EngineConfig::default()).await;

    assert_eq!(result.job.status, JobStatus::Failure);
    assert_statuses(&result, &["build"], StepStatus::Success);
    assert_statuses(&result, &["test"], StepStatus::Failure);
    assert_statuses(&result, &["package", "publish"], StepStatus::Skipped);

    // Post steps still run
    assert_statuses(&result, &["cleanup"], StepStatus::Success);
    assert_eq!(driver.dispatched(), vec!["build", "test", "cleanup"]);

    let test = result.job.step("test").unwrap();
    assert_eq!(test.error.as_deref(), Some("exited with code 1"));
    assert_eq!(result.job.step("package").unwrap().error.as_deref(), Some("upstream step failed"));
}

#[tokio::test]
async fn test_skip_events_name_the_reason() {
    let graph = compile_yaml(&[RELEASE]);
    let driver = Arc::new(MockDriver::new().with_step("build", vec![Reply::Exit(2)]));

    let result = run_with_driver(&graph, driver, EngineConfig::default()).await;

    let skipped: Vec<&str> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepSkipped { step, reason } => {
                assert_eq!(reason, "upstream step failed");
                Some(step.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["test", "package", "publish"]);
    assert_eq!(result.job_finished_count(), 1);
}

/// allow_failure keeps the job green and downstream steps running
#[tokio::test]
async fn test_allow_failure_does_not_block() {
    let yaml = r#"
steps:
  lint:
    allow_failure: true
    bash: cargo clippy
  test:
    bash: cargo test
"#;
    let graph = compile_yaml(&[yaml]);
    let driver = Arc::new(MockDriver::new().with_step("lint", vec![Reply::Exit(1)]));

    let result = run_with_driver(&graph, driver, EngineConfig::default()).await;

    assert_eq!(result.job.status, JobStatus::Success);
    assert_statuses(&result, &["lint"], StepStatus::Failure);
    assert_statuses(&result, &["test"], StepStatus::Success);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_job() {
    let yaml = "steps:\n  flaky:\n    retry: 1\n    bash: ./flaky.sh\n";
    let graph = compile_yaml(&[yaml]);
    let driver = Arc::new(MockDriver::new().with_step("flaky", vec![Reply::Exit(3)]));

    let result = run_with_driver(&graph, driver.clone(), EngineConfig::default()).await;

    assert_eq!(result.job.status, JobStatus::Failure);
    assert_eq!(result.attempts_of("flaky"), 2);
    assert_eq!(driver.dispatch_count("flaky"), 2);
}

#[tokio::test]
async fn test_step_timeout_is_recorded_as_timeout() {
    let yaml = r#"
steps:
  slow:
    timeout: 1
    bash: sleep 60
  next:
    bash: echo
"#;
    let graph = compile_yaml(&[yaml]);
    let driver = Arc::new(MockDriver::new().with_step("slow", vec![Reply::Hang]));

    let result = run_with_driver(&graph, driver, EngineConfig::default()).await;

    assert_eq!(result.job.status, JobStatus::Failure);
    assert_statuses(&result, &["slow"], StepStatus::Timeout);
    assert_statuses(&result, &["next"], StepStatus::Skipped);
    assert_eq!(
        result.job.step("slow").unwrap().error.as_deref(),
        Some("Timeout after 1 seconds")
    );
}

#[tokio::test]
async fn test_driver_error_is_a_failure() {
    let graph = compile_yaml(&["steps:\n  deploy:\n    bash: ./deploy.sh\n"]);
    let driver = Arc::new(MockDriver::new().with_step("deploy", vec![Reply::Error("no agent online".into())]));

    let result = run_with_driver(&graph, driver, EngineConfig::default()).await;

    assert_eq!(result.job.status, JobStatus::Failure);
    let deploy = result.job.step("deploy").unwrap();
    assert_eq!(deploy.status, StepStatus::Failure);
    assert!(deploy.error.as_deref().unwrap().contains("no agent online"));
}

#[tokio::test]
async fn test_nested_failure_marks_stage_failed() {
    let yaml = r#"
steps:
  build:
    steps:
      compile:
        bash: make
      link:
        bash: make link
  ship:
    bash: ./ship.sh
"#;
    let graph = compile_yaml(&[yaml]);
    let driver = Arc::new(MockDriver::new().with_step("compile", vec![Reply::Exit(1)]));

    let result = run_with_driver(&graph, driver, EngineConfig::default()).await;

    assert_eq!(result.job.status, JobStatus::Failure);
    assert_statuses(&result, &["build", "compile"], StepStatus::Failure);
    assert_statuses(&result, &["link", "ship"], StepStatus::Skipped);
    assert_eq!(result.job.step("build").unwrap().error.as_deref(), Some("nested step failed"));
}

/// A driver panic fails that step only and the job still finishes once
#[tokio::test]
async fn test_driver_panic_fails_only_that_step() {
    let yaml = r#"
steps:
  ok:
    bash: echo ok
  boom:
    bash: ./crash.sh
  after:
    bash: echo after
  report:
    post: true
    bash: ./report.sh
"#;
    let graph = compile_yaml(&[yaml]);
    let driver = Arc::new(MockDriver::new().with_step("boom", vec![Reply::Panic]));

    let result = run_with_driver(&graph, driver.clone(), EngineConfig::default()).await;

    assert_eq!(result.job.status, JobStatus::Failure);
    assert!(result.job.finished_at.is_some());
    assert_statuses(&result, &["ok", "report"], StepStatus::Success);
    assert_statuses(&result, &["boom"], StepStatus::Failure);
    assert_statuses(&result, &["after"], StepStatus::Skipped);
    assert!(result
        .job
        .step("boom")
        .unwrap()
        .error
        .as_deref()
        .unwrap()
        .contains("step task failed"));
    assert_eq!(result.job_finished_count(), 1);
}
