//! Scenario-based tests for flowline

mod failure_handling;
mod job_runs;
mod merging;
mod transitions;
