use crate::error::RegistryError;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{Plugin, PluginDescriptor};

struct Entry {
    plugin: Arc<dyn Plugin>,
    enabled: bool,
}

/// Registered plugins in registration order.
///
/// Lookup is first-match: when several plugins declare the same task type, the
/// one registered earliest handles it.
#[derive(Default)]
pub struct PluginRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize and register a plugin. Names must be unique.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();

        if self.contains(&name).await {
            return Err(RegistryError::Conflict(name));
        }

        plugin
            .initialize()
            .await
            .map_err(|e| RegistryError::Initialize {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        // Re-check under the write lock; initialize() ran unlocked
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.plugin.name() == name) {
            return Err(RegistryError::Conflict(name));
        }
        entries.push(Entry {
            plugin: plugin.clone(),
            enabled: true,
        });

        info!(
            "Registered plugin {} v{} ({})",
            name,
            plugin.version(),
            plugin.supported_task_types().join(", ")
        );
        Ok(())
    }

    /// First enabled plugin declaring `task_type`, in registration order
    pub async fn find_capable(&self, task_type: &str) -> Option<Arc<dyn Plugin>> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.enabled)
            .find(|e| e.plugin.supports(task_type))
            .map(|e| e.plugin.clone())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.plugin.name() == name)
            .map(|e| e.plugin.clone())
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.get(name).await.is_some()
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.plugin.name() == name)
            .ok_or_else(|| RegistryError::UnknownPlugin(name.to_string()))?;
        entry.enabled = enabled;
        info!(
            "Plugin {} {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub async fn list_all(&self) -> Vec<PluginDescriptor> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| PluginDescriptor {
                name: e.plugin.name().to_string(),
                version: e.plugin.version().to_string(),
                supported_task_types: e.plugin.supported_task_types().into_iter().collect(),
                enabled: e.enabled,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Run every plugin's cleanup hook; failures are logged, not returned
    pub async fn shutdown(&self) {
        let plugins: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .map(|e| e.plugin.clone())
            .collect();

        for plugin in plugins {
            if let Err(e) = plugin.cleanup().await {
                warn!("Cleanup of plugin {} failed: {}", plugin.name(), e);
            }
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}
