//! Pluggable task handlers and their registry
//!
//! Plugins declare the task types they handle; the registry selects the first
//! enabled plugin (in registration order) that declares a task's type.

pub mod builtin;
mod registry;

pub use registry::PluginRegistry;

use crate::plan::TaskSpec;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Public identity of a registered plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub supported_task_types: BTreeSet<String>,
    pub enabled: bool,
}

/// What a plugin reports back from a single invocation
#[derive(Debug, Clone, Default)]
pub struct PluginOutput {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl PluginOutput {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Per-invocation context handed to plugins alongside the task value
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub workspace: PathBuf,
    pub task_id: String,
    pub section_id: String,
    pub phase_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            task_id: String::new(),
            section_id: String::new(),
            phase_id: String::new(),
            attempt: 1,
            cancel: CancellationToken::new(),
        }
    }
}

/// Every task needs a type and a description
pub fn validate_required(task: &TaskSpec) -> Result<(), String> {
    if task.task_type.trim().is_empty() {
        return Err("task has no type".to_string());
    }
    if task.description.trim().is_empty() {
        return Err("task has no description".to_string());
    }
    Ok(())
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn supported_task_types(&self) -> Vec<String>;

    /// Reject tasks missing required fields before any attempt is made
    fn validate(&self, task: &TaskSpec) -> Result<(), String> {
        validate_required(task)
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&self, task: &TaskSpec, ctx: &TaskContext) -> anyhow::Result<PluginOutput>;

    fn supports(&self, task_type: &str) -> bool {
        self.supported_task_types().iter().any(|t| t == task_type)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable plugins shared by registry, executor and coordinator tests

    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Succeeds from attempt `succeed_on` onwards (0 = never), counting every call
    pub struct ScriptedPlugin {
        pub name: String,
        pub types: Vec<String>,
        pub succeed_on: u32,
        pub delay: Duration,
        pub calls: Arc<AtomicU32>,
        pub running: Arc<AtomicUsize>,
        pub max_running: Arc<AtomicUsize>,
        pub fail_names: Vec<String>,
    }

    impl ScriptedPlugin {
        pub fn new(name: &str, types: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                types: types.iter().map(|t| t.to_string()).collect(),
                succeed_on: 1,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicU32::new(0)),
                running: Arc::new(AtomicUsize::new(0)),
                max_running: Arc::new(AtomicUsize::new(0)),
                fail_names: Vec::new(),
            }
        }

        pub fn succeed_on(mut self, attempt: u32) -> Self {
            self.succeed_on = attempt;
            self
        }

        pub fn delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn always_fail_for(mut self, name: &str) -> Self {
            self.fail_names.push(name.to_string());
            self
        }
    }

    #[async_trait]
    impl Plugin for ScriptedPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn supported_task_types(&self) -> Vec<String> {
            self.types.clone()
        }

        async fn execute(
            &self,
            task: &TaskSpec,
            ctx: &TaskContext,
        ) -> anyhow::Result<PluginOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.fail_names.contains(&task.name) {
                return Ok(PluginOutput::failed(format!("{} always fails", task.name)));
            }
            if self.succeed_on > 0 && ctx.attempt >= self.succeed_on {
                Ok(PluginOutput::ok(format!("{} done", task.name)))
            } else {
                Ok(PluginOutput::failed(format!(
                    "attempt {} failed",
                    ctx.attempt
                )))
            }
        }
    }
}
