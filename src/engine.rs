//! Owns the long-lived pieces of a run: registry, cache and executor

use crate::cache::TaskCache;
use crate::config::Config;
use crate::error::DevplanError;
use crate::plan::{PlanParser, TaskClassifier};
use crate::plugin::builtin::register_builtins;
use crate::plugin::PluginRegistry;
use crate::runner::{Coordinator, TaskExecutor};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Engine {
    config: Config,
    registry: Arc<PluginRegistry>,
    cache: Option<Arc<TaskCache>>,
    executor: Arc<TaskExecutor>,
    classifier: TaskClassifier,
}

impl Engine {
    /// Validate the config, register the built-in plugins and open the cache
    pub async fn new(config: Config) -> Result<Self, DevplanError> {
        config.validate()?;
        let registry = Arc::new(PluginRegistry::new());
        register_builtins(&registry, &config).await?;
        info!("{} plugins registered", registry.len().await);
        Self::with_registry(config, registry)
    }

    /// Build around an already populated registry
    pub fn with_registry(config: Config, registry: Arc<PluginRegistry>) -> Result<Self, DevplanError> {
        let classifier = TaskClassifier::from_config(&config)?;

        let cache = if config.cache.enabled {
            Some(Arc::new(TaskCache::load(
                &config.cache.path,
                config.cache.max_entries,
            )))
        } else {
            debug!("Result cache disabled");
            None
        };

        let executor = Arc::new(TaskExecutor::new(
            registry.clone(),
            cache.clone(),
            config.retry.clone(),
            config.timeout(),
        ));

        Ok(Self {
            config,
            registry,
            cache,
            executor,
            classifier,
        })
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn parser(&self) -> PlanParser {
        PlanParser::new(self.classifier.clone())
    }

    pub fn coordinator(&self) -> Coordinator {
        Coordinator::new(
            self.executor.clone(),
            self.config.workspace.clone(),
            self.config.max_parallel_tasks,
        )
        .dry_run(self.config.dry_run)
    }

    /// Persist the cache and run plugin cleanup hooks
    pub async fn shutdown(&self) -> Result<(), DevplanError> {
        if let Some(cache) = &self.cache {
            if !self.config.dry_run {
                cache.save().await?;
            }
        }
        self.registry.shutdown().await;
        info!("Engine shut down");
        Ok(())
    }
}
