use crate::cli::RunArgs;
use crate::engine::Engine;
use crate::output::write_run_report;
use crate::plan::write_plan_file;
use crate::runner::{event_channel, EventReceiver, ExecutionEvent, PlanExecutionReport};
use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut config = super::load_config(&args.plan.config.config, args.plan.plan.as_ref())?;

    // Apply CLI overrides
    if let Some(max_parallel) = args.max_parallel {
        config.max_parallel_tasks = max_parallel;
    }
    if let Some(report_dir) = args.report_dir {
        config.report_dir = report_dir;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    if args.no_write_back {
        config.write_back = false;
    }
    if args.dry_run {
        config.dry_run = true;
    }

    let engine = Engine::new(config.clone()).await?;
    let mut plan = engine
        .parser()
        .parse_file(&config.plan)
        .with_context(|| format!("Failed to parse {}", config.plan.display()))?;

    if config.dry_run {
        info!("DRY RUN - no plugin will be invoked");
    }

    // Ctrl-C stops new batches; in-flight tasks finish
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, waiting for running tasks to finish");
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = event_channel();
    let printer = tokio::spawn(print_events(rx));

    let coordinator = engine.coordinator().with_events(tx);
    let result = match args.phase.as_deref() {
        Some(phase) => {
            coordinator
                .run_plan_phases(&mut plan, Some(phase), &cancel)
                .await
        }
        None => coordinator.run_plan(&mut plan, &cancel).await,
    };
    drop(coordinator);
    let _ = printer.await;
    interrupt.abort();
    let report = result?;

    if !config.dry_run {
        if config.write_back {
            write_plan_file(&config.plan, &plan)
                .with_context(|| format!("Failed to update {}", config.plan.display()))?;
            info!("Updated {}", config.plan.display());
        }

        let run_dir = write_run_report(&config.report_dir, &report)?;
        println!("\nReport: {}", run_dir.join("report.md").display());
    }

    engine.shutdown().await?;
    print_summary(&report);

    if args.fail_on_error && report.has_failures() {
        error!(
            "Exiting with error: {} task(s) failed",
            report.totals().failed
        );
        std::process::exit(1);
    }

    Ok(())
}

async fn print_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            ExecutionEvent::PhaseStarted { phase_id, title } => {
                println!("\n▶ {} {}", phase_id, title);
            }
            ExecutionEvent::SectionStarted {
                section_id,
                title,
                pending_tasks,
                ..
            } => {
                println!("  {} {} ({} pending)", section_id, title, pending_tasks);
            }
            ExecutionEvent::TaskFinished {
                task_id,
                success,
                from_cache,
                attempts,
                execution_time_ms,
            } => {
                println!(
                    "    {} {} {}ms{}{}",
                    if success { "✓" } else { "✗" },
                    task_id,
                    execution_time_ms,
                    if from_cache { " (cached)" } else { "" },
                    if attempts > 1 {
                        format!(" after {} attempts", attempts)
                    } else {
                        String::new()
                    }
                );
            }
            _ => {}
        }
    }
}

fn print_summary(report: &PlanExecutionReport) {
    let totals = report.totals();
    println!(
        "\nCompleted in {:.1}s: {} completed, {} failed, {} skipped ({} from cache){}",
        report.duration_ms as f64 / 1000.0,
        totals.completed,
        totals.failed,
        totals.skipped,
        totals.cached,
        if report.cancelled { " [cancelled]" } else { "" }
    );

    for task in report.tasks() {
        if let Some(error) = &task.error {
            println!(
                "  ✗ {} {}: {}{}",
                task.task_id,
                task.name,
                task.message,
                if error.is_terminal() { " (not retried)" } else { "" }
            );
        }
    }

    let stats = &report.statistics;
    println!(
        "Plugins: {} registered, {} task(s) executed, {} cache hit(s)",
        stats.total_plugins_registered, stats.total_tasks_executed, stats.cache_hits
    );
}
