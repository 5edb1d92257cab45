use crate::plan::TaskSpec;
use crate::plugin::{Plugin, PluginOutput, TaskContext};
use async_trait::async_trait;
use serde_json::json;

/// Acknowledges tasks that need no side effect: the default type plus any
/// configured passthrough types. Registered last so specific plugins win.
pub struct GenericPlugin {
    types: Vec<String>,
}

impl GenericPlugin {
    pub fn new(default_type: &str, passthrough: &[String]) -> Self {
        let mut types = vec!["generic".to_string()];
        for t in std::iter::once(default_type.to_string()).chain(passthrough.iter().cloned()) {
            if !types.contains(&t) {
                types.push(t);
            }
        }
        Self { types }
    }
}

#[async_trait]
impl Plugin for GenericPlugin {
    fn name(&self) -> &str {
        "generic"
    }

    fn supported_task_types(&self) -> Vec<String> {
        self.types.clone()
    }

    async fn execute(&self, task: &TaskSpec, _ctx: &TaskContext) -> anyhow::Result<PluginOutput> {
        Ok(PluginOutput::ok(format!("Acknowledged: {}", task.name)).with_data(json!({
            "name": task.name,
            "description": task.description,
        })))
    }
}
