use crate::cli::PlanArgs;
use crate::plan::{PlanParser, Progress, TaskClassifier};
use anyhow::Context;

pub fn execute(args: PlanArgs) -> anyhow::Result<()> {
    let config = super::load_config(&args.config.config, args.plan.as_ref())?;
    let plan = PlanParser::new(TaskClassifier::from_config(&config)?)
        .parse_file(&config.plan)
        .with_context(|| format!("Failed to parse {}", config.plan.display()))?;

    println!(
        "{}: {}",
        plan.title.as_deref().unwrap_or("Plan"),
        format_progress(plan.progress())
    );
    for phase in &plan.phases {
        println!(
            "  {}. {}: {}",
            phase.number,
            phase.title,
            format_progress(phase.progress())
        );
        for section in &phase.sections {
            println!(
                "    {} {}: {}",
                section.id,
                section.title,
                format_progress(section.progress())
            );
        }
    }
    Ok(())
}

fn format_progress(progress: Progress) -> String {
    format!(
        "{}/{} ({:.0}%)",
        progress.completed,
        progress.total,
        progress.percent()
    )
}
