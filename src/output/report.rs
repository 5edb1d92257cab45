use crate::error::OutputError;
use crate::runner::{PlanExecutionReport, TaskOutcome, TaskReport};
use std::fs;
use std::path::{Path, PathBuf};

/// Write `report.md` and `report.json` under `<report_dir>/<run-id>/`, returning that directory
pub fn write_run_report(
    report_dir: &Path,
    report: &PlanExecutionReport,
) -> Result<PathBuf, OutputError> {
    let run_dir = report_dir.join(&report.run_id);
    fs::create_dir_all(&run_dir).map_err(OutputError::CreateDir)?;

    let json = serde_json::to_string_pretty(report)?;
    fs::write(run_dir.join("report.json"), json).map_err(OutputError::WriteReport)?;

    fs::write(run_dir.join("report.md"), build_markdown(report))
        .map_err(OutputError::WriteReport)?;

    Ok(run_dir)
}

fn build_markdown(report: &PlanExecutionReport) -> String {
    let totals = report.totals();
    let mut content = String::new();

    content.push_str(&format!(
        "# Run report: {}\n\n",
        report.title.as_deref().unwrap_or("Development plan")
    ));

    content.push_str("| Metric | Value |\n");
    content.push_str("|--------|-------|\n");
    content.push_str(&format!("| Run | `{}` |\n", report.run_id));
    content.push_str(&format!(
        "| Started | {} |\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    content.push_str(&format!(
        "| Duration | {:.1}s |\n",
        report.duration_ms as f64 / 1000.0
    ));
    content.push_str(&format!("| Completed | {} |\n", totals.completed));
    content.push_str(&format!("| Failed | {} |\n", totals.failed));
    content.push_str(&format!("| Skipped | {} |\n", totals.skipped));
    content.push_str(&format!("| From cache | {} |\n", totals.cached));
    if report.cancelled {
        content.push_str("| Cancelled | yes |\n");
    }
    if report.dry_run {
        content.push_str("| Dry run | yes |\n");
    }
    content.push_str("\n---\n\n");

    for phase in &report.phases {
        content.push_str(&format!("## {} ({})\n\n", phase.title, phase.status));

        for section in &phase.sections {
            content.push_str(&format!(
                "### {} {} ({})\n\n",
                section.section_id, section.title, section.status
            ));

            if section.tasks.is_empty() {
                content.push_str("*No tasks*\n\n");
                continue;
            }

            for task in &section.tasks {
                content.push_str(&format_task(task));
            }
            content.push('\n');
        }
    }

    let stats = &report.statistics;
    if stats.per_plugin.iter().any(|p| p.executions > 0) {
        content.push_str("## Plugins\n\n");
        content.push_str("| Plugin | Runs | Success rate | Avg time |\n");
        content.push_str("|--------|------|--------------|----------|\n");
        for plugin in stats.per_plugin.iter().filter(|p| p.executions > 0) {
            content.push_str(&format!(
                "| {} | {} | {:.0}% | {:.0}ms |\n",
                plugin.name,
                plugin.executions,
                plugin.success_rate * 100.0,
                plugin.average_time_ms
            ));
        }
        content.push('\n');
    }

    content
}

fn format_task(task: &TaskReport) -> String {
    let marker = match &task.outcome {
        TaskOutcome::Completed => "✅",
        TaskOutcome::Failed => "❌",
        TaskOutcome::Skipped { .. } => "⏭️",
    };

    let mut line = format!("- {} `{}` {} ({})", marker, task.task_id, task.name, task.task_type);
    match &task.outcome {
        TaskOutcome::Skipped { reason } => line.push_str(&format!(" - skipped: {}", reason)),
        TaskOutcome::Failed => line.push_str(&format!(
            " - {} after {} attempt(s)",
            task.message, task.attempts
        )),
        TaskOutcome::Completed if task.from_cache => line.push_str(" - cached"),
        TaskOutcome::Completed => {}
    }
    line.push('\n');
    line
}
