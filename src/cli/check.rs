use crate::cli::PlanArgs;
use crate::plan::{Plan, PlanParser, TaskClassifier};
use anyhow::Context;

pub fn execute(args: PlanArgs) -> anyhow::Result<()> {
    let config = super::load_config(&args.config.config, args.plan.as_ref())?;
    let parser = PlanParser::new(TaskClassifier::from_config(&config)?);
    let plan = parser
        .parse_file(&config.plan)
        .with_context(|| format!("Failed to parse {}", config.plan.display()))?;

    print_tree(&plan);

    if plan.warnings.is_empty() {
        println!("\nNo warnings");
    } else {
        println!("\n{} warning(s):", plan.warnings.len());
        for warning in &plan.warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}

fn print_tree(plan: &Plan) {
    println!("{}", plan.title.as_deref().unwrap_or("(untitled plan)"));
    if let Some(version) = &plan.metadata.version {
        println!("Version: {}", version);
    }
    if let Some(created) = &plan.metadata.created {
        println!("Created: {}", created);
    }

    for phase in &plan.phases {
        println!("\n[{}] {}. {}", phase.id, phase.number, phase.title);
        for section in &phase.sections {
            println!("  [{}] {}", section.id, section.title);
            for task in &section.tasks {
                println!(
                    "    {} {} {} ({})",
                    if task.completed { "[x]" } else { "[ ]" },
                    task.id,
                    task.name,
                    task.task_type
                );
            }
        }
    }

    println!(
        "\n{} phase(s), {} task(s)",
        plan.phases.len(),
        plan.task_count()
    );
}
