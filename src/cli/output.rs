//! CLI output formatting

use crate::{
    core::{EffectiveStepProperties, ExecutionGraph, JobRecord, JobStatus, NodeId, StepStatus},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a step status for display
pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Pending => style("PENDING").dim().to_string(),
        StepStatus::Running => style("RUNNING").yellow().to_string(),
        StepStatus::Success => style("SUCCESS").green().to_string(),
        StepStatus::Failure => style("FAILURE").red().to_string(),
        StepStatus::Skipped => style("SKIPPED").dim().to_string(),
        StepStatus::Timeout => style("TIMEOUT").red().to_string(),
    }
}

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Success => style(status.as_str()).green().to_string(),
        JobStatus::Failure | JobStatus::Timeout => style(status.as_str()).red().to_string(),
        JobStatus::Cancelled => style(status.as_str()).yellow().to_string(),
        JobStatus::Running => style(status.as_str()).yellow().to_string(),
        _ => style(status.as_str()).dim().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::JobStarted { job_id, flow, steps } => format!(
            "{} Starting flow {} with {} steps ({})",
            ROCKET,
            style(flow).bold(),
            steps,
            style(&job_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StepStarted { path, .. } => format!("{} {}", SPINNER, style(path).cyan()),
        ExecutionEvent::StepRetrying {
            step,
            attempt,
            max_attempts,
        } => format!(
            "{} {} (attempt {}/{})",
            WARN,
            style(step).yellow(),
            attempt,
            max_attempts
        ),
        ExecutionEvent::StepFinished {
            step,
            status,
            attempts,
            error,
        } => {
            let icon = if status.is_success() { CHECK } else { CROSS };
            let mut line = format!("{} {} {}", icon, style(step).bold(), format_step_status(*status));
            if *attempts > 1 {
                line.push_str(&format!(" after {} attempts", attempts));
            }
            if let Some(error) = error {
                line.push_str(&format!(": {}", style(error).dim()));
            }
            line
        }
        ExecutionEvent::StepSkipped { step, reason } => format!(
            "{} {} {} ({})",
            INFO,
            style(step).dim(),
            format_step_status(StepStatus::Skipped),
            reason
        ),
        ExecutionEvent::JobFinished { job_id, status } => format!(
            "{} Job ({}) {}",
            INFO,
            style(&job_id.to_string()[..8]).dim(),
            format_job_status(*status)
        ),
    }
}

/// Indented tree of the flow with each node's graph predecessors
pub fn format_graph(graph: &ExecutionGraph) -> String {
    let mut out = String::new();
    for step in graph.tree().iter() {
        let depth = step.path.depth().saturating_sub(1);
        let indent = "  ".repeat(depth);
        let node = graph.node(step.id);

        out.push_str(&format!("{}{}", indent, style(&step.name).bold()));
        if step.id != NodeId::ROOT && !node.parents.is_empty() {
            let parents: Vec<&str> = node.parents.iter().map(|&p| graph.name(p)).collect();
            out.push_str(&format!(" {} {}", style("<-").dim(), parents.join(", ")));
        }
        if let Some(exit) = node.exit {
            out.push_str(&format!(" {}", style(format!("[exit: {}]", graph.name(exit))).dim()));
        }
        out.push('\n');
    }
    out
}

/// Human readable effective properties of one step
pub fn format_properties(props: &EffectiveStepProperties) -> String {
    let mut lines = vec![
        format!("{} {}", style("step:").bold(), props.path),
        format!("  timeout: {}s", props.timeout_secs),
        format!("  retry: {}", props.retry),
    ];

    let list = |label: &str, values: Vec<String>| {
        if values.is_empty() {
            None
        } else {
            Some(format!("  {}: {}", label, values.join(", ")))
        }
    };

    lines.extend(list("agents", props.agents.clone()));
    lines.extend(list("exports", props.exports.iter().cloned().collect()));
    lines.extend(list("secrets", props.secrets.iter().cloned().collect()));
    lines.extend(list("configs", props.configs.iter().cloned().collect()));
    lines.extend(list(
        "caches",
        props.caches.iter().map(|c| format!("{}={}", c.name, c.paths.join(":"))).collect(),
    ));
    lines.extend(list(
        "artifacts",
        props.artifacts.iter().map(|a| format!("{}={}", a.name, a.paths.join(":"))).collect(),
    ));
    lines.extend(list(
        "vars",
        props.vars.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
    ));
    if let Some(image) = props.docker.as_ref().and_then(|d| d.image.as_ref()) {
        lines.push(format!("  image: {}", image));
    }
    if props.allow_failure {
        lines.push("  allow_failure: true".to_string());
    }
    for script in &props.bash {
        lines.push(format!("  {} {}", style("bash$").dim(), script));
    }
    for script in &props.pwsh {
        lines.push(format!("  {} {}", style("pwsh>").dim(), script));
    }
    if let Some(plugin) = &props.plugin {
        lines.push(format!("  plugin: {}", plugin));
    }

    lines.join("\n")
}

/// One line per step plus totals
pub fn format_job_summary(job: &JobRecord) -> String {
    let mut out = String::new();
    for record in job.steps.values() {
        out.push_str(&format!("  {:<40} {}\n", record.path, format_step_status(record.status)));
    }

    let duration = match (job.started_at, job.finished_at) {
        (Some(start), Some(end)) => end
            .signed_duration_since(start)
            .to_std()
            .map(format_duration)
            .unwrap_or_default(),
        _ => String::new(),
    };
    out.push_str(&format!(
        "{} {} succeeded, {} failed, {} skipped {}",
        INFO,
        style(job.count(StepStatus::Success)).green(),
        style(job.count(StepStatus::Failure) + job.count(StepStatus::Timeout)).red(),
        style(job.count(StepStatus::Skipped)).dim(),
        style(duration).dim()
    ));
    out
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
