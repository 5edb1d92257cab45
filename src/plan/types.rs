//! Types for the parsed development plan: Plan → Phase → Section → Task

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Execution status shared by phases, sections and tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Running => write!(f, "running"),
            Status::Completed => write!(f, "completed"),
            Status::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub title: Option<String>,

    /// Lines before the title heading
    #[serde(skip)]
    pub preamble: Vec<String>,

    /// Free text between the title and the first phase
    pub description: Vec<String>,

    pub phases: Vec<Phase>,

    pub metadata: PlanMetadata,

    #[serde(skip)]
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phase {
    pub id: String,
    pub number: u32,
    pub title: String,
    pub description: Vec<String>,
    pub sections: Vec<Section>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub id: String,

    /// Identifier as written in the heading, before de-duplication
    #[serde(skip)]
    pub label: String,

    pub title: String,
    pub description: Vec<String>,
    pub tasks: Vec<Task>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub params: BTreeMap<String, String>,
    pub completed: bool,
    pub status: Status,
    pub retry_count: u32,

    /// Checkbox text exactly as written
    #[serde(skip)]
    pub text: String,

    /// Continuation lines attached below the checkbox
    #[serde(skip)]
    pub notes: Vec<String>,
}

/// The value handed to plugins. Carries only the task's content, never its place in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskSpec {
    #[serde(rename = "type")]
    pub task_type: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TaskSpec {
    #[cfg(test)]
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            task_type: task_type.into(),
            name: description.clone(),
            description,
            params: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }
}

impl Task {
    pub fn spec(&self) -> TaskSpec {
        TaskSpec {
            task_type: self.task_type.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            params: self.params.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

impl Section {
    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.tasks.iter().filter(|t| t.completed).count(),
            total: self.tasks.len(),
        }
    }
}

impl Phase {
    pub fn progress(&self) -> Progress {
        self.sections
            .iter()
            .map(Section::progress)
            .fold(Progress::default(), |acc, p| Progress {
                completed: acc.completed + p.completed,
                total: acc.total + p.total,
            })
    }
}

impl Plan {
    pub fn progress(&self) -> Progress {
        self.phases
            .iter()
            .map(Phase::progress)
            .fold(Progress::default(), |acc, p| Progress {
                completed: acc.completed + p.completed,
                total: acc.total + p.total,
            })
    }

    pub fn task_count(&self) -> usize {
        self.tasks().count()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.phases
            .iter()
            .flat_map(|p| p.sections.iter())
            .flat_map(|s| s.tasks.iter())
    }
}
