use anyhow::{bail, Context, Result};
use chrono::Utc;
use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use workflow_runner::cli::commands::{
    ExecutionArgs, HistoryCommand, ListCommand, RunCommand, ValidateCommand, WatchCommand,
};
use workflow_runner::cli::output::*;
use workflow_runner::cli::{Cli, Command};
use workflow_runner::core::{self, Event, Run, RunStatus, Workflow};
use workflow_runner::environment::LocalProvisioner;
use workflow_runner::execution::{next_fire_time, upcoming_fire_times, ExecutionEngine, ExecutionEvent};
use workflow_runner::persistence::{InMemoryPersistence, PersistenceBackend, RunSummary};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, cli.stream).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::Watch(cmd) => watch_workflow(cmd, cli.stream).await?,
        Command::List(cmd) => list_workflows(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_workflow(path: &std::path::Path, args: &ExecutionArgs) -> Result<Workflow> {
    let mut workflow = core::load(path)
        .with_context(|| format!("Failed to load workflow {}", path.display()))?;
    args.apply_env(&mut workflow);

    println!(
        "{} Loaded workflow: {} ({} jobs, {} steps)",
        INFO,
        style(&workflow.name).bold(),
        workflow.jobs.len(),
        workflow.step_count()
    );
    for (key, value) in &args.env {
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }
    Ok(workflow)
}

#[cfg(feature = "sqlite")]
async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    let store = workflow_runner::persistence::SqliteRunStore::with_default_path()
        .await
        .context("Failed to open run history")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    warn!("Built without the sqlite feature; history is not kept across invocations");
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn open_store(args: &ExecutionArgs) -> Result<Arc<dyn PersistenceBackend>> {
    if args.no_history {
        Ok(Arc::new(InMemoryPersistence::new()))
    } else {
        open_history().await
    }
}

fn build_engine(args: &ExecutionArgs, stream: bool, total_steps: usize) -> (ExecutionEngine, ProgressBar) {
    let provisioner = Arc::new(LocalProvisioner::new(args.environment_config()));
    let mut engine = ExecutionEngine::new(provisioner, args.strategy());
    if let Some(timeout) = args.step_timeout() {
        engine = engine.with_default_step_timeout(timeout);
    }

    let progress = create_progress_bar(total_steps);
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        match &event {
            ExecutionEvent::StepStarted { name, .. } => bar.set_message(name.clone()),
            ExecutionEvent::StepFinished { .. } | ExecutionEvent::StepSkipped { .. } => bar.inc(1),
            _ => {}
        }

        if matches!(event, ExecutionEvent::JobStarted { .. }) {
            bar.println(style(separator()).dim().to_string());
        }
        bar.println(format_execution_event(&event));

        // For streaming, show step output as it completes
        if stream {
            if let ExecutionEvent::StepFinished { result, .. } = &event {
                if !result.output().trim().is_empty() {
                    bar.println(format_output(result.output(), 20));
                }
            }
        }
    });

    (engine, progress)
}

/// Deliver one event; returns the run if the workflow was triggered
async fn execute_event(
    workflow: &Workflow,
    event: Event,
    args: &ExecutionArgs,
    stream: bool,
    store: &dyn PersistenceBackend,
) -> Result<Option<Run>> {
    let (engine, progress) = build_engine(args, stream, workflow.step_count());

    let Some(mut run) = engine.trigger(workflow, event.clone()) else {
        progress.finish_and_clear();
        println!(
            "{} {} does not trigger {}",
            INFO,
            style(&event).cyan(),
            style(&workflow.name).bold()
        );
        return Ok(None);
    };

    println!();
    engine.execute(workflow, &mut run).await;
    progress.finish_and_clear();

    // Save to history
    if !args.no_history {
        store.save_run(&run).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(short_id(&run.id)).dim()
        );
    }

    // Print final status
    if run.status == RunStatus::Succeeded {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&workflow.name).bold(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} {} (failed jobs: {})",
            CROSS,
            style(&workflow.name).bold(),
            style("failed").red(),
            run.failed_jobs().join(", ")
        );
    }

    Ok(Some(run))
}

async fn run_workflow(cmd: &RunCommand, stream: bool) -> Result<()> {
    let workflow = load_workflow(&cmd.file, &cmd.execution)?;
    let store = open_store(&cmd.execution).await?;

    let run = execute_event(&workflow, cmd.to_event(), &cmd.execution, stream, store.as_ref()).await?;

    if let Some(run) = run {
        if run.status != RunStatus::Succeeded {
            error!("Run {} failed", run.id);
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn watch_workflow(cmd: &WatchCommand, stream: bool) -> Result<()> {
    let workflow = load_workflow(&cmd.file, &cmd.execution)?;
    let store = open_store(&cmd.execution).await?;

    loop {
        let now = Utc::now();
        let Some(next) = next_fire_time(&workflow, &now) else {
            bail!("Workflow '{}' has no schedule triggers", workflow.name);
        };

        println!(
            "{} Next scheduled run of {} at {}",
            SPINNER,
            style(&workflow.name).bold(),
            style(next.to_rfc3339()).cyan()
        );
        let wait = (next - now).to_std().unwrap_or_default();
        info!("Sleeping {}s until {}", wait.as_secs(), next);
        tokio::time::sleep(wait).await;

        match execute_event(&workflow, Event::tick(next), &cmd.execution, stream, store.as_ref()).await {
            Ok(_) => {}
            Err(e) => warn!("Scheduled run failed to complete: {:#}", e),
        }

        if cmd.once {
            return Ok(());
        }
    }
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    match core::load(&cmd.file) {
        Ok(workflow) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&workflow.name).bold());
            for trigger in &workflow.triggers {
                println!("  Trigger: {}", style(trigger).cyan());
            }
            for job in workflow.jobs.values() {
                println!(
                    "  Job: {} on [{}] ({} steps)",
                    style(&job.id).bold(),
                    job.runs_on,
                    style(job.steps.len()).cyan()
                );
            }
            let upcoming = upcoming_fire_times(&workflow, &Utc::now(), 3);
            for at in &upcoming {
                println!("  Next scheduled: {}", style(at.to_rfc3339()).dim());
            }

            if cmd.json {
                let data = serde_json::json!({
                    "workflow": workflow,
                    "next_scheduled": upcoming,
                });
                println!("\n{}", serde_json::to_string_pretty(&data)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

async fn list_workflows(cmd: &ListCommand) -> Result<()> {
    let store = open_history().await?;
    let workflows = store.list_workflows().await?;

    if workflows.is_empty() {
        println!("{} No workflows found in history", INFO);
        return Ok(());
    }

    println!("{} Workflows in history:", INFO);

    let mut json_data = Vec::new();
    for workflow_name in &workflows {
        let runs = store.list_runs(workflow_name).await?;

        if cmd.with_counts {
            let succeeded = runs.iter().filter(|r| r.status == RunStatus::Succeeded).count();
            let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(workflow_name).bold(),
                style(runs.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(workflow_name).bold());
        }

        json_data.push(serde_json::json!({
            "name": workflow_name,
            "run_count": runs.len(),
        }));
    }

    if cmd.json {
        let data = serde_json::json!({ "workflows": json_data });
        println!("\n{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history().await?;

    // If specific run ID is requested
    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, store.as_ref(), cmd).await?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    // List runs for a workflow or all
    let mut runs = if let Some(workflow_name) = &cmd.workflow {
        store.list_runs(workflow_name).await?
    } else {
        let mut all_runs = Vec::new();
        for workflow_name in store.list_workflows().await? {
            all_runs.extend(store.list_runs(&workflow_name).await?);
        }
        all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_runs
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

async fn print_run_details(
    summary: &RunSummary,
    store: &dyn PersistenceBackend,
    cmd: &HistoryCommand,
) -> Result<()> {
    let logs = store.load_step_logs(summary.run_id).await?;

    if cmd.json {
        let data = serde_json::json!({ "run": summary, "steps": logs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Event: {}", style(&summary.event).cyan());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Jobs: {} ({} failed), {} steps executed",
        summary.total_jobs, summary.failed_jobs, summary.executed_steps
    );

    if !logs.is_empty() {
        println!("\n  {}", style("Steps:").bold());
        for log in &logs {
            println!("    {}", format_step_log(log));
            if cmd.verbose && !log.output.trim().is_empty() {
                for line in log.output.lines() {
                    println!("      {}", style(line).dim());
                }
            }
        }
    }

    Ok(())
}
