use crate::plan::TaskSpec;
use crate::plugin::{validate_required, Plugin, PluginOutput, TaskContext};
use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Output kept in result data, per stream
const MAX_CAPTURE: usize = 4096;

/// Runs a shell command in the workspace. Non-zero exit is a failure.
pub struct CommandPlugin;

#[async_trait]
impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        "command"
    }

    fn supported_task_types(&self) -> Vec<String> {
        vec!["run_command".to_string()]
    }

    fn validate(&self, task: &TaskSpec) -> Result<(), String> {
        validate_required(task)?;
        if task.param("command").map(str::trim).unwrap_or("").is_empty() {
            return Err("run_command requires a `command=` param".to_string());
        }
        Ok(())
    }

    async fn execute(&self, task: &TaskSpec, ctx: &TaskContext) -> anyhow::Result<PluginOutput> {
        let command_line = task.param("command").unwrap_or_default();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command_line)
            .current_dir(&ctx.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropped on timeout or cancellation; don't leave the child behind
            .kill_on_drop(true);

        debug!("Running `{}` in {}", command_line, ctx.workspace.display());

        let child = cmd.spawn()?;
        let output = tokio::select! {
            out = child.wait_with_output() => out?,
            _ = ctx.cancel.cancelled() => {
                return Ok(PluginOutput::failed(format!("`{}` cancelled", command_line)));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = truncate(&String::from_utf8_lossy(&output.stdout));
        let stderr = truncate(&String::from_utf8_lossy(&output.stderr));
        let data = json!({
            "command": command_line,
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        });

        if output.status.success() {
            Ok(PluginOutput::ok(format!("`{}` succeeded", command_line)).with_data(data))
        } else {
            Ok(PluginOutput::failed(format!(
                "`{}` exited with code {}: {}",
                command_line,
                exit_code,
                stderr.trim()
            ))
            .with_data(data))
        }
    }
}

fn truncate(s: &str) -> String {
    if s.len() <= MAX_CAPTURE {
        return s.to_string();
    }
    let mut end = MAX_CAPTURE;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TaskContext::new(dir.path());
        let task = TaskSpec::new("run_command", "echo").with_param("command", "echo hello");

        let out = CommandPlugin.execute(&task, &ctx).await.unwrap();
        assert!(out.success);
        let data = out.data.unwrap();
        assert_eq!(data["exit_code"], 0);
        assert_eq!(data["stdout"], "hello\n");
    }

    #[tokio::test]
    async fn test_failing_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TaskContext::new(dir.path());
        let task = TaskSpec::new("run_command", "fail").with_param("command", "echo oops >&2; exit 3");

        let out = CommandPlugin.execute(&task, &ctx).await.unwrap();
        assert!(!out.success);
        assert!(out.message.contains("code 3"));
        assert!(out.message.contains("oops"));
    }

    #[tokio::test]
    async fn test_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let ctx = TaskContext::new(dir.path());
        let task = TaskSpec::new("run_command", "ls").with_param("command", "test -f marker");

        assert!(CommandPlugin.execute(&task, &ctx).await.unwrap().success);
    }

    #[test]
    fn test_validate_requires_command() {
        assert!(CommandPlugin
            .validate(&TaskSpec::new("run_command", "x"))
            .is_err());
    }

    #[test]
    fn test_truncate_long_output() {
        let long = "a".repeat(MAX_CAPTURE + 10);
        assert_eq!(truncate(&long).chars().count(), MAX_CAPTURE + 1);
        assert_eq!(truncate("short"), "short");
    }
}
