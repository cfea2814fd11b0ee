//! Test: end-to-end job runs against a scripted driver

use crate::helpers::*;
use flowline::core::{JobStatus, StepStatus};
use flowline::execution::{EngineConfig, ExecutionEvent};
use std::sync::Arc;
use std::time::Duration;

const FAN_OUT: &str = r#"
steps:
  checkout:
    bash: git clone
  lint:
    dependencies: [checkout]
    bash: cargo clippy
  unit:
    dependencies: [checkout]
    bash: cargo test
  docs:
    dependencies: [checkout]
    bash: cargo doc
  report:
    dependencies: [lint, unit, docs]
    bash: ./report.sh
"#;

fn parallel(max_parallel: usize) -> EngineConfig {
    EngineConfig {
        max_parallel,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_independent_steps_run_concurrently() {
    let graph = compile_yaml(&[FAN_OUT]);
    let driver = Arc::new(MockDriver::new().with_delay(Duration::from_millis(50)));

    let result = run_with_driver(&graph, driver.clone(), parallel(2)).await;

    assert_eq!(result.job.status, JobStatus::Success);
    assert_eq!(driver.peak_concurrency(), 2);
    assert_eq!(result.job.count(StepStatus::Success), 5);
}

#[tokio::test]
async fn test_single_slot_runs_sequentially() {
    let graph = compile_yaml(&[FAN_OUT]);
    let driver = Arc::new(MockDriver::new().with_delay(Duration::from_millis(20)));

    let result = run_with_driver(&graph, driver.clone(), parallel(1)).await;

    assert_eq!(result.job.status, JobStatus::Success);
    assert_eq!(driver.peak_concurrency(), 1);
    // ties are dispatched in declaration order
    assert_eq!(driver.dispatched(), vec!["checkout", "lint", "unit", "docs", "report"]);
}

#[tokio::test]
async fn test_fan_in_waits_for_every_parent() {
    let graph = compile_yaml(&[FAN_OUT]);
    let driver = Arc::new(MockDriver::new());

    run_with_driver(&graph, driver.clone(), parallel(4)).await;

    let report = driver.position("report").unwrap();
    for parent in ["lint", "unit", "docs"] {
        assert!(driver.position(parent).unwrap() < report);
    }
    assert_eq!(driver.position("checkout"), Some(0));
}

#[tokio::test]
async fn test_retry_until_success() {
    let yaml = r#"
steps:
  flaky:
    retry: 2
    bash: ./flaky.sh
"#;
    let graph = compile_yaml(&[yaml]);
    let driver = Arc::new(MockDriver::new().with_step("flaky", vec![Reply::Exit(1), Reply::Exit(1), Reply::Ok]));

    let result = run_with_driver(&graph, driver.clone(), EngineConfig::default()).await;

    assert_eq!(result.job.status, JobStatus::Success);
    assert_eq!(result.status_of("flaky"), StepStatus::Success);
    assert_eq!(result.attempts_of("flaky"), 3);
    assert_eq!(driver.dispatch_count("flaky"), 3);

    let retries: Vec<u32> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepRetrying { attempt, max_attempts, .. } => {
                assert_eq!(*max_attempts, 3);
                Some(*attempt)
            }
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![2, 3]);
}

#[tokio::test]
async fn test_engine_default_retry_applies() {
    let graph = compile_yaml(&["steps:\n  flaky:\n    bash: ./flaky.sh\n"]);
    let driver = Arc::new(MockDriver::new().with_step("flaky", vec![Reply::Exit(2), Reply::Ok]));
    let config = EngineConfig {
        default_retry: 1,
        ..EngineConfig::default()
    };

    let result = run_with_driver(&graph, driver, config).await;
    assert_eq!(result.attempts_of("flaky"), 2);
    assert_eq!(result.job.status, JobStatus::Success);
}

#[tokio::test]
async fn test_dependency_on_stage_waits_for_its_exit() {
    let yaml = r#"
steps:
  build:
    steps:
      compile:
        bash: make
      package:
        bash: make dist
  deploy:
    dependencies: [build]
    bash: ./deploy.sh
  audit:
    dependencies: [compile]
    bash: ./audit.sh
"#;
    let graph = compile_yaml(&[yaml]);
    let driver = Arc::new(MockDriver::new());

    let result = run_with_driver(&graph, driver.clone(), parallel(1)).await;

    assert_eq!(result.job.status, JobStatus::Success);
    assert!(driver.position("package").unwrap() < driver.position("deploy").unwrap());
    assert!(driver.position("compile").unwrap() < driver.position("audit").unwrap());
    assert_eq!(result.status_of("build"), StepStatus::Success);
    assert_eq!(result.attempts_of("build"), 0);
}

#[tokio::test]
async fn test_job_timeout_stops_running_steps() {
    let yaml = r#"
steps:
  stuck:
    bash: sleep infinity
  after:
    bash: echo never
"#;
    let graph = compile_yaml(&[yaml]);
    let driver = Arc::new(MockDriver::new().with_step("stuck", vec![Reply::Hang]));
    let config = EngineConfig {
        job_timeout_secs: Some(1),
        ..EngineConfig::default()
    };

    let result = run_with_driver(&graph, driver.clone(), config).await;

    assert_eq!(result.job.status, JobStatus::Timeout);
    assert_eq!(result.status_of("stuck"), StepStatus::Timeout);
    assert_eq!(result.status_of("after"), StepStatus::Skipped);
    assert_eq!(driver.dispatch_count("after"), 0);
    assert_eq!(result.job_finished_count(), 1);
}

#[tokio::test]
async fn test_events_bracket_the_job() {
    let graph = compile_yaml(&[FAN_OUT]);
    let result = run_with_driver(&graph, Arc::new(MockDriver::new()), EngineConfig::default()).await;

    assert!(matches!(
        result.events.first(),
        Some(ExecutionEvent::JobStarted { steps: 5, .. })
    ));
    assert!(matches!(
        result.events.last(),
        Some(ExecutionEvent::JobFinished {
            status: JobStatus::Success,
            ..
        })
    ));
    assert_eq!(result.job_finished_count(), 1);

    let started = result
        .events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::StepStarted { .. }))
        .count();
    assert_eq!(started, 5);
}

#[tokio::test]
async fn test_job_record_timestamps_and_progress() {
    let graph = compile_yaml(&[FAN_OUT]);
    let result = run_with_driver(&graph, Arc::new(MockDriver::new()), EngineConfig::default()).await;
    let job = &result.job;

    assert!(job.created_at.is_some());
    assert!(job.started_at.unwrap() <= job.finished_at.unwrap());
    assert_eq!(job.progress(), 1.0);
    assert!(job.steps.values().all(|s| s.finished_at.is_some()));
}
