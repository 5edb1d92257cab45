//! Plugins that ship with the engine. Registered explicitly at startup.

mod command;
mod filesystem;
mod generator;
mod generic;

pub use command::CommandPlugin;
pub use filesystem::FilesystemPlugin;
pub use generator::{GeneratorPlugin, TemplateGenerator};
pub use generic::GenericPlugin;

use crate::config::Config;
use crate::error::RegistryError;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{Plugin, PluginRegistry};

/// Register the built-in plugins, then disable the ones the config turns off
pub async fn register_builtins(
    registry: &PluginRegistry,
    config: &Config,
) -> Result<(), RegistryError> {
    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(FilesystemPlugin),
        Arc::new(CommandPlugin),
        Arc::new(GeneratorPlugin::new(Arc::new(TemplateGenerator))),
        Arc::new(GenericPlugin::new(
            &config.default_task_type,
            &config.plugins.passthrough_types,
        )),
    ];

    for plugin in plugins {
        registry.register(plugin).await?;
    }

    for name in &config.plugins.disabled {
        registry.set_enabled(name, false).await?;
    }

    Ok(())
}

/// Resolve a task-supplied relative path inside the workspace.
/// Absolute paths and `..` components are rejected.
pub(crate) fn resolve_in_workspace(workspace: &Path, relative: &str) -> Result<PathBuf, String> {
    let rel = Path::new(relative);
    if relative.trim().is_empty() {
        return Err("path is empty".to_string());
    }
    if rel.is_absolute() {
        return Err(format!("path '{}' must be relative to the workspace", relative));
    }
    if rel
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(format!("path '{}' escapes the workspace", relative));
    }
    Ok(workspace.join(rel))
}
