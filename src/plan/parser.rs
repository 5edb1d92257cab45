//! Line-oriented parser for markdown development plans
//!
//! Recognized lines, in priority order:
//! - `# Title` sets the plan title (first one, before any phase)
//! - `## 3. Title` opens a phase and closes the open section
//! - `### 3.1 Title` opens a section in the current phase
//! - `- [ ] text` / `- [x] text` appends a task to the current section
//!
//! Everything else is kept verbatim as description text of the innermost open
//! entity so the document can be written back unchanged.

use crate::error::ParseError;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use super::classify::TaskClassifier;
use super::types::{ParseWarning, Phase, Plan, PlanMetadata, Section, Status, Task};

enum Line<'a> {
    Title(&'a str),
    Phase { number: u32, title: &'a str },
    Section { label: &'a str, title: &'a str },
    Task { checked: bool, text: &'a str },
    Fence,
    Text,
}

fn classify_line(line: &str) -> Line<'_> {
    if line.trim_start().starts_with("```") {
        return Line::Fence;
    }

    if let Some(rest) = line.strip_prefix("### ") {
        if let Some((label, title)) = rest.trim().split_once(char::is_whitespace) {
            let title = title.trim();
            if !title.is_empty() {
                return Line::Section { label, title };
            }
        }
        return Line::Text;
    }

    if let Some(rest) = line.strip_prefix("## ") {
        // `## 1.5 Foo` is not a phase; the number must be followed by `. `
        if let Some((num, title)) = rest.trim().split_once(". ") {
            let title = title.trim();
            if let Ok(number) = num.trim().parse::<u32>() {
                if !title.is_empty() {
                    return Line::Phase { number, title };
                }
            }
        }
        return Line::Text;
    }

    if let Some(rest) = line.strip_prefix("# ") {
        let title = rest.trim();
        if !title.is_empty() {
            return Line::Title(title);
        }
        return Line::Text;
    }

    if let Some(rest) = line.strip_prefix("- [") {
        let mut chars = rest.chars();
        let checked = match chars.next() {
            Some(' ') => false,
            Some('x') | Some('X') => true,
            _ => return Line::Text,
        };
        if let Some(text) = chars.as_str().strip_prefix("] ") {
            if !text.trim().is_empty() {
                return Line::Task {
                    checked,
                    text: text.trim_end(),
                };
            }
        }
    }

    Line::Text
}

/// Hands out unique ids in document order, suffixing repeats with `-2`, `-3`, ...
#[derive(Default)]
struct IdAllocator {
    seen: HashMap<String, usize>,
}

impl IdAllocator {
    fn unique(&mut self, base: String) -> String {
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            let candidate = format!("{}-{}", base, count);
            self.unique(candidate)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanParser {
    classifier: TaskClassifier,
}

impl PlanParser {
    pub fn new(classifier: TaskClassifier) -> Self {
        Self { classifier }
    }

    /// Read and parse a plan file
    pub fn parse_file(&self, path: &Path) -> Result<Plan, ParseError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParseError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.parse(&content)
    }

    pub fn parse(&self, document: &str) -> Result<Plan, ParseError> {
        if document.trim().is_empty() {
            return Err(ParseError::EmptyDocument);
        }

        let mut plan = Plan {
            metadata: extract_metadata(document),
            ..Default::default()
        };
        let mut ids = IdAllocator::default();
        let mut in_fence = false;

        for (idx, line) in document.lines().enumerate() {
            let line_no = idx + 1;

            let kind = classify_line(line);
            if in_fence {
                if matches!(kind, Line::Fence) {
                    in_fence = false;
                }
                push_text(&mut plan, line);
                continue;
            }

            match kind {
                Line::Fence => {
                    in_fence = true;
                    push_text(&mut plan, line);
                }
                Line::Title(title) if plan.title.is_none() && plan.phases.is_empty() => {
                    plan.title = Some(title.to_string());
                }
                Line::Phase { number, title } => {
                    plan.phases.push(Phase {
                        id: ids.unique(format!("phase-{}", number)),
                        number,
                        title: title.to_string(),
                        description: Vec::new(),
                        sections: Vec::new(),
                        status: Status::Pending,
                    });
                }
                Line::Section { label, title } => match plan.phases.last_mut() {
                    Some(phase) => {
                        phase.sections.push(Section {
                            id: ids.unique(label.to_string()),
                            label: label.to_string(),
                            title: title.to_string(),
                            description: Vec::new(),
                            tasks: Vec::new(),
                            status: Status::Pending,
                        });
                    }
                    None => {
                        record_warning(&mut plan, line_no, "section heading outside of a phase");
                        push_text(&mut plan, line);
                    }
                },
                Line::Task { checked, text } => {
                    let section = plan
                        .phases
                        .last_mut()
                        .and_then(|p| p.sections.last_mut());
                    match section {
                        Some(section) => {
                            let id = ids
                                .unique(format!("{}.{}", section.id, section.tasks.len() + 1));
                            let task = self.build_task(id, checked, text);
                            section.tasks.push(task);
                        }
                        None => {
                            record_warning(&mut plan, line_no, "task outside of a section");
                            push_text(&mut plan, line);
                        }
                    }
                }
                _ => push_text(&mut plan, line),
            }
        }

        finish_sections(&mut plan);

        debug!(
            "Parsed plan: {} phases, {} tasks, {} warnings",
            plan.phases.len(),
            plan.task_count(),
            plan.warnings.len()
        );

        Ok(plan)
    }

    fn build_task(&self, id: String, checked: bool, text: &str) -> Task {
        let (mut params, cleaned) = extract_params(text);
        let (name, description) = split_name(&cleaned);

        let task_type = params
            .remove("type")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.classifier.classify(&cleaned).to_string());

        Task {
            id,
            name,
            description,
            task_type,
            params,
            completed: checked,
            status: if checked {
                Status::Completed
            } else {
                Status::Pending
            },
            retry_count: 0,
            text: text.to_string(),
            notes: Vec::new(),
        }
    }
}

fn record_warning(plan: &mut Plan, line: usize, message: &str) {
    warn!("Plan line {}: {}; kept as text", line, message);
    plan.warnings.push(ParseWarning {
        line,
        message: message.to_string(),
    });
}

/// Append a line to the innermost open entity
fn push_text(plan: &mut Plan, line: &str) {
    let line = line.to_string();

    if let Some(phase) = plan.phases.last_mut() {
        match phase.sections.last_mut() {
            Some(section) => match section.tasks.last_mut() {
                Some(task) => task.notes.push(line),
                None => section.description.push(line),
            },
            None => phase.description.push(line),
        }
    } else if plan.title.is_some() {
        plan.description.push(line);
    } else {
        plan.preamble.push(line);
    }
}

/// Sections with every task already ticked start out completed
fn finish_sections(plan: &mut Plan) {
    for phase in &mut plan.phases {
        for section in &mut phase.sections {
            if !section.tasks.is_empty() && section.tasks.iter().all(|t| t.completed) {
                section.status = Status::Completed;
            }
        }
        if !phase.sections.is_empty()
            && phase
                .sections
                .iter()
                .all(|s| s.status == Status::Completed)
        {
            phase.status = Status::Completed;
        }
    }
}

/// Pull `` `key=value` `` spans out of the task text
fn extract_params(text: &str) -> (BTreeMap<String, String>, String) {
    let mut params = BTreeMap::new();
    let mut cleaned = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('`') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('`') else {
            break;
        };
        let span = &after[..end];

        match span.split_once('=') {
            Some((key, value)) if is_param_key(key) => {
                cleaned.push_str(&rest[..start]);
                params.insert(key.to_string(), value.trim().to_string());
            }
            _ => {
                cleaned.push_str(&rest[..start + end + 2]);
            }
        }
        rest = &after[end + 1..];
    }
    cleaned.push_str(rest);

    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (params, cleaned)
}

fn is_param_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Split `**Name** - description` into its parts
fn split_name(text: &str) -> (String, String) {
    if let Some(rest) = text.strip_prefix("**") {
        if let Some((name, tail)) = rest.split_once("**") {
            let name = name.trim().to_string();
            let description = tail
                .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ':' | '–' | '—'))
                .trim()
                .to_string();
            if description.is_empty() {
                return (name.clone(), name);
            }
            return (name, description);
        }
    }
    (text.to_string(), text.to_string())
}

fn extract_metadata(content: &str) -> PlanMetadata {
    let capture = |pattern: &str| {
        Regex::new(pattern)
            .ok()
            .and_then(|re| re.captures(content))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    PlanMetadata {
        version: capture(r"Plan v(\d+\.\d+)"),
        created: capture(r"Created.*?(\d{4}-\d{2}-\d{2})"),
    }
}
