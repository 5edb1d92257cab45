use crate::cli::PluginsArgs;
use crate::engine::Engine;
use crate::runner::PlanExecutionReport;
use anyhow::Context;
use std::path::{Path, PathBuf};

pub async fn execute(args: PluginsArgs) -> anyhow::Result<()> {
    let mut config = super::load_config(&args.config.config, None)?;
    // Listing never touches the result cache
    config.cache.enabled = false;
    let engine = Engine::new(config.clone()).await?;

    println!("Registered plugins (lookup order):");
    for plugin in engine.registry().list_all().await {
        println!(
            "  {} v{}{}: {}",
            plugin.name,
            plugin.version,
            if plugin.enabled { "" } else { " [disabled]" },
            plugin
                .supported_task_types
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if args.stats {
        match latest_report(&config.report_dir)? {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let report: PlanExecutionReport = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                print_statistics(&report);
            }
            None => println!("\nNo run reports in {}", config.report_dir.display()),
        }
    }

    engine.shutdown().await?;
    Ok(())
}

/// Most recently written `<report_dir>/<run-id>/report.json`
fn latest_report(report_dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    if !report_dir.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(report_dir)? {
        let path = entry?.path().join("report.json");
        let Ok(modified) = path.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, p)| p))
}

fn print_statistics(report: &PlanExecutionReport) {
    let stats = &report.statistics;
    println!("\nStatistics from run {}:", report.run_id);
    println!("  Tasks executed: {}", stats.total_tasks_executed);
    println!("  Cache hits:     {}", stats.cache_hits);
    println!("  Plugin time:    {}ms", stats.total_execution_time_ms);
    for plugin in &stats.per_plugin {
        println!(
            "  {:<12} runs={} ok={} errors={} success={:.0}% avg={:.0}ms",
            plugin.name,
            plugin.executions,
            plugin.successes,
            plugin.errors,
            plugin.success_rate * 100.0,
            plugin.average_time_ms
        );
    }
}
