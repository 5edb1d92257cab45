mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::path::Path;
use std::time::Duration;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace: default_workspace(),
            plan: default_plan(),
            report_dir: default_report_dir(),
            max_parallel_tasks: default_max_parallel_tasks(),
            timeout_sec: default_timeout_sec(),
            dry_run: false,
            write_back: true,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            default_task_type: default_task_type(),
            task_types: Vec::new(),
            plugins: PluginsConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config if the file exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("Config {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_tasks == 0 {
            return Err(ConfigError::InvalidValue(
                "max_parallel_tasks must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        if self.timeout_sec == 0 {
            return Err(ConfigError::InvalidValue(
                "timeout_sec must be greater than 0".to_string(),
            ));
        }
        if self.default_task_type.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "default_task_type must not be empty".to_string(),
            ));
        }

        // Surface bad patterns here rather than at parse time
        for rule in &self.task_types {
            regex::Regex::new(&rule.pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: rule.pattern.clone(),
                source: e,
            })?;
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}
