use crate::plan::TaskSpec;
use crate::plugin::{validate_required, Plugin, PluginOutput, TaskContext};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::resolve_in_workspace;

/// Creates files and directories under the workspace
pub struct FilesystemPlugin;

#[async_trait]
impl Plugin for FilesystemPlugin {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn supported_task_types(&self) -> Vec<String> {
        vec!["create_file".to_string(), "create_directory".to_string()]
    }

    fn validate(&self, task: &TaskSpec) -> Result<(), String> {
        validate_required(task)?;
        if task.param("path").map(str::trim).unwrap_or("").is_empty() {
            return Err(format!("{} requires a `path=` param", task.task_type));
        }
        Ok(())
    }

    async fn execute(&self, task: &TaskSpec, ctx: &TaskContext) -> anyhow::Result<PluginOutput> {
        let relative = task.param("path").unwrap_or_default();
        let path = match resolve_in_workspace(&ctx.workspace, relative) {
            Ok(p) => p,
            Err(e) => return Ok(PluginOutput::failed(e)),
        };

        match task.task_type.as_str() {
            "create_directory" => {
                tokio::fs::create_dir_all(&path).await?;
                debug!("Created directory {}", path.display());
                Ok(PluginOutput::ok(format!("Directory {} ready", relative))
                    .with_data(json!({ "path": relative })))
            }
            "create_file" => {
                let overwrite = task.param("overwrite") == Some("true");
                if tokio::fs::try_exists(&path).await? && !overwrite {
                    return Ok(PluginOutput::ok(format!("File {} already exists", relative))
                        .with_data(json!({ "path": relative, "created": false })));
                }
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let content = task.param("content").unwrap_or_default();
                tokio::fs::write(&path, content).await?;
                debug!("Wrote {} bytes to {}", content.len(), path.display());
                Ok(PluginOutput::ok(format!("Created file {}", relative))
                    .with_data(json!({ "path": relative, "created": true })))
            }
            other => Ok(PluginOutput::failed(format!(
                "filesystem plugin cannot handle '{}'",
                other
            ))),
        }
    }
}
