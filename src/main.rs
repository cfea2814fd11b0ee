use anyhow::{Context, Result};
use flowline::cli::commands::{load_flow, GraphCommand, ResolveCommand, RunCommand, ValidateCommand};
use flowline::cli::output::*;
use flowline::cli::{Cli, Command};
use flowline::{compile, DryRunDriver, EngineConfig, ExecutionEngine, ExecutionEvent, JobStatus};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = EngineConfig::load(cli.config.as_deref())?;
    debug!("Engine config: {:?}", config);

    match &cli.command {
        Command::Validate(cmd) => validate_flow(cmd)?,
        Command::Graph(cmd) => print_graph(cmd)?,
        Command::Resolve(cmd) => resolve_step(cmd, &config)?,
        Command::Run(cmd) => run_flow(cmd, config).await?,
    }

    Ok(())
}

fn validate_flow(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating {} document(s)...", INFO, cmd.files.len());

    let result = load_flow(&cmd.files).and_then(|flow| {
        let graph = compile(&flow).context("Failed to compile flow")?;
        Ok((flow, graph))
    });

    match result {
        Ok((flow, graph)) => {
            println!("{} Flow is valid!", CHECK);
            println!("  Name: {}", style(flow.flow_name()).bold());
            println!("  Steps: {}", style(graph.len() - 1).cyan());
            println!("  Variables: {}", style(flow.vars.len()).cyan());

            if cmd.json {
                println!("\n{}", serde_json::to_string_pretty(&flow)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn print_graph(cmd: &GraphCommand) -> Result<()> {
    let flow = load_flow(&cmd.files)?;
    let graph = compile(&flow).context("Failed to compile flow")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&graph.to_view())?);
    } else {
        print!("{}", format_graph(&graph));
    }
    Ok(())
}

fn resolve_step(cmd: &ResolveCommand, config: &EngineConfig) -> Result<()> {
    let flow = load_flow(&cmd.files)?;
    let graph = compile(&flow).context("Failed to compile flow")?;

    let id = graph
        .tree()
        .id_of(&cmd.step)
        .with_context(|| format!("No step named '{}'", cmd.step))?;
    let props = graph.resolve(id, &config.step_defaults());

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&props)?);
    } else {
        println!("{}", format_properties(&props));
    }
    Ok(())
}

async fn run_flow(cmd: &RunCommand, mut config: EngineConfig) -> Result<()> {
    let mut flow = load_flow(&cmd.files)?;
    for (key, value) in &cmd.vars {
        flow.vars.insert(key.clone(), value.clone());
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }
    if let Some(max_parallel) = cmd.max_parallel {
        config.max_parallel = max_parallel;
    }
    config.validate()?;

    let graph = compile(&flow).context("Failed to compile flow")?;
    println!("{} Loaded flow: {}", INFO, style(flow.flow_name()).bold());

    let progress = create_progress_bar(graph.len() - 1);
    let mut engine = ExecutionEngine::new(DryRunDriver::new(), config)?;
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        if matches!(
            event,
            ExecutionEvent::StepFinished { .. } | ExecutionEvent::StepSkipped { .. }
        ) {
            bar.inc(1);
        }
        bar.println(format_execution_event(&event));
    });

    let job = engine.run(&graph).await?;
    progress.finish_and_clear();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        println!("{}", format_job_summary(&job));
    }

    if job.status == JobStatus::Success {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&job.flow).bold(),
            style("successfully").green()
        );
        Ok(())
    } else {
        println!(
            "\n{} {} {}",
            CROSS,
            style(&job.flow).bold(),
            format_job_status(job.status)
        );
        std::process::exit(1);
    }
}
