//! CLI output formatting

use crate::{
    core::{JobStatus, RunStatus, StepResult},
    execution::ExecutionEvent,
    persistence::{RunSummary, StepLog},
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
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar over the steps of a run
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

/// Horizontal rule as wide as the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    "─".repeat(width)
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => style("PENDING").dim().to_string(),
        JobStatus::Running => style("RUNNING").yellow().to_string(),
        JobStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        JobStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// First eight hex digits of a run id
pub fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Pending => INFO,
    };

    format!(
        "{} {} - {} - {} - {} ({} jobs, {} failed, {} steps) - {}",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.workflow_name).bold(),
        style(&summary.event).dim(),
        format_status(summary.status),
        summary.total_jobs,
        summary.failed_jobs,
        summary.executed_steps,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")).dim()
    )
}

/// Format a step log line for display
pub fn format_step_log(log: &StepLog) -> String {
    let icon = if log.success { CHECK } else { CROSS };
    let code = match log.exit_code {
        Some(code) => format!("exit {}", code),
        None => "no exit code".to_string(),
    };
    format!(
        "{} {} #{} {} ({})",
        icon,
        style(&log.job_id).cyan(),
        log.index + 1,
        style(&log.name).bold(),
        style(code).dim()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            workflow,
            event,
            jobs,
        } => format!(
            "{} Starting {} ({}) on {} with {} job(s)",
            ROCKET,
            style(workflow).bold(),
            style(short_id(run_id)).dim(),
            style(event).cyan(),
            jobs
        ),
        ExecutionEvent::JobStarted { job_id, runs_on, steps } => format!(
            "{} Job {} on [{}] ({} steps)",
            SPINNER,
            style(job_id).cyan().bold(),
            style(runs_on).dim(),
            steps
        ),
        ExecutionEvent::EnvironmentReady { job_id, environment } => format!(
            "{} {} environment ready: {}",
            INFO,
            style(job_id).dim(),
            style(environment).dim()
        ),
        ExecutionEvent::StepStarted {
            job_id,
            index,
            total,
            name,
        } => format!(
            "{} {} [{}/{}] {}",
            SPINNER,
            style(job_id).dim(),
            index + 1,
            total,
            style(name).cyan()
        ),
        ExecutionEvent::StepFinished {
            job_id,
            name,
            result,
            duration,
            ..
        } => match result {
            StepResult::Success { .. } => format!(
                "{} {} {} {}",
                CHECK,
                style(job_id).dim(),
                style(name).green(),
                style(format_duration(*duration)).dim()
            ),
            StepResult::Failure { exit_code, .. } => format!(
                "{} {} {} {} {}",
                CROSS,
                style(job_id).dim(),
                style(name).red(),
                style(match exit_code {
                    Some(code) => format!("(exit {})", code),
                    None => "(no exit code)".to_string(),
                })
                .red(),
                style(format_duration(*duration)).dim()
            ),
        },
        ExecutionEvent::StepSkipped { job_id, name, .. } => format!(
            "{} {} {} {}",
            SKIP,
            style(job_id).dim(),
            style(name).dim(),
            style("(not run)").dim()
        ),
        ExecutionEvent::JobFinished {
            job_id,
            status,
            failure,
        } => match failure {
            None => format!("{} Job {} {}", CHECK, style(job_id).bold(), format_job_status(*status)),
            Some(failure) => format!(
                "{} Job {} {}: {}",
                CROSS,
                style(job_id).bold(),
                format_job_status(*status),
                style(failure).red()
            ),
        },
        ExecutionEvent::RunFinished { run_id, status } => {
            let status_str = match status {
                RunStatus::Succeeded => format!("{} completed", style("successfully").green()),
                RunStatus::Failed => style("failed").red().to_string(),
                other => format_status(*other),
            };
            format!("{} Run ({}) {}", INFO, style(short_id(run_id)).dim(), status_str)
        }
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Human-readable duration
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
