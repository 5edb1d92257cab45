//! Serializes a plan back into its markdown form

use crate::error::OutputError;
use std::io::Write;
use std::path::Path;

use super::types::Plan;

pub fn serialize(plan: &Plan) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.extend(plan.preamble.iter().cloned());
    if let Some(title) = &plan.title {
        lines.push(format!("# {}", title));
    }
    lines.extend(plan.description.iter().cloned());

    for phase in &plan.phases {
        lines.push(format!("## {}. {}", phase.number, phase.title));
        lines.extend(phase.description.iter().cloned());

        for section in &phase.sections {
            lines.push(format!("### {} {}", section.label, section.title));
            lines.extend(section.description.iter().cloned());

            for task in &section.tasks {
                let mark = if task.completed { 'x' } else { ' ' };
                lines.push(format!("- [{}] {}", mark, task.text));
                lines.extend(task.notes.iter().cloned());
            }
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Write the plan atomically: temp file in the same directory, then rename
pub fn write_plan_file(path: &Path, plan: &Plan) -> Result<(), OutputError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(OutputError::WriteReport)?;
    tmp.write_all(serialize(plan).as_bytes())
        .map_err(OutputError::WriteReport)?;
    tmp.persist(path)?;
    Ok(())
}
