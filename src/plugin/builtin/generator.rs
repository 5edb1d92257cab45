use crate::plan::TaskSpec;
use crate::plugin::{validate_required, Plugin, PluginOutput, TaskContext};
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::resolve_in_workspace;

/// Input handed to a content generator
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub path: String,
    pub name: String,
    pub description: String,
    pub template: Option<String>,
}

/// Produces file contents for `generate_content` tasks.
///
/// The shipped implementation is template based; anything smarter plugs in here.
pub trait ContentGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String>;
}

/// Fills `{{name}}`, `{{description}}` and `{{path}}` placeholders
pub struct TemplateGenerator;

impl TemplateGenerator {
    fn default_template(path: &str) -> &'static str {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        match ext {
            "rs" | "js" | "ts" | "go" | "java" | "c" | "cpp" | "h" => {
                "// {{name}}\n//\n// {{description}}\n"
            }
            "py" | "sh" | "toml" | "yaml" | "yml" => "# {{name}}\n#\n# {{description}}\n",
            "md" => "# {{name}}\n\n{{description}}\n",
            _ => "{{name}}\n\n{{description}}\n",
        }
    }
}

impl ContentGenerator for TemplateGenerator {
    fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        let template = request
            .template
            .as_deref()
            .unwrap_or_else(|| Self::default_template(&request.path));

        Ok(template
            .replace("{{name}}", &request.name)
            .replace("{{description}}", &request.description)
            .replace("{{path}}", &request.path))
    }
}

/// Writes generated content to a workspace file
pub struct GeneratorPlugin {
    generator: Arc<dyn ContentGenerator>,
}

impl GeneratorPlugin {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Plugin for GeneratorPlugin {
    fn name(&self) -> &str {
        "generator"
    }

    fn supported_task_types(&self) -> Vec<String> {
        vec!["generate_content".to_string()]
    }

    fn validate(&self, task: &TaskSpec) -> Result<(), String> {
        validate_required(task)?;
        if task.param("path").map(str::trim).unwrap_or("").is_empty() {
            return Err("generate_content requires a `path=` param".to_string());
        }
        Ok(())
    }

    async fn execute(&self, task: &TaskSpec, ctx: &TaskContext) -> anyhow::Result<PluginOutput> {
        let relative = task.param("path").unwrap_or_default();
        let path = match resolve_in_workspace(&ctx.workspace, relative) {
            Ok(p) => p,
            Err(e) => return Ok(PluginOutput::failed(e)),
        };

        let overwrite = task.param("overwrite") == Some("true");
        if tokio::fs::try_exists(&path).await? && !overwrite {
            return Ok(PluginOutput::ok(format!("{} already exists", relative))
                .with_data(json!({ "path": relative, "generated": false })));
        }

        let request = GenerationRequest {
            path: relative.to_string(),
            name: task.name.clone(),
            description: task.description.clone(),
            template: task.param("template").map(str::to_string),
        };
        let content = self.generator.generate(&request)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content).await?;
        debug!("Generated {} ({} bytes)", path.display(), content.len());

        Ok(PluginOutput::ok(format!("Generated {}", relative)).with_data(json!({
            "path": relative,
            "generated": true,
            "bytes": content.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, template: Option<&str>) -> GenerationRequest {
        GenerationRequest {
            path: path.to_string(),
            name: "Parser".to_string(),
            description: "Parses plans".to_string(),
            template: template.map(str::to_string),
        }
    }

    #[test]
    fn test_default_template_by_extension() {
        let out = TemplateGenerator.generate(&request("src/parser.rs", None)).unwrap();
        assert_eq!(out, "// Parser\n//\n// Parses plans\n");

        let out = TemplateGenerator.generate(&request("README.md", None)).unwrap();
        assert_eq!(out, "# Parser\n\nParses plans\n");
    }

    #[test]
    fn test_explicit_template() {
        let out = TemplateGenerator
            .generate(&request("x.txt", Some("{{path}}: {{name}}")))
            .unwrap();
        assert_eq!(out, "x.txt: Parser");
    }

    #[tokio::test]
    async fn test_generates_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TaskContext::new(dir.path());
        let plugin = GeneratorPlugin::new(Arc::new(TemplateGenerator));
        let task = TaskSpec::new("generate_content", "Module docs").with_param("path", "docs/a.md");

        let out = plugin.execute(&task, &ctx).await.unwrap();
        assert!(out.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("docs/a.md")).unwrap(),
            "# Module docs\n\nModule docs\n"
        );
    }

    #[tokio::test]
    async fn test_existing_file_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "mine").unwrap();
        let ctx = TaskContext::new(dir.path());
        let plugin = GeneratorPlugin::new(Arc::new(TemplateGenerator));
        let task = TaskSpec::new("generate_content", "docs").with_param("path", "a.md");

        let out = plugin.execute(&task, &ctx).await.unwrap();
        assert!(out.success);
        assert_eq!(out.data.unwrap()["generated"], false);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "mine");
    }
}
