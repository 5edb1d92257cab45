use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory plugins operate in (file creation, commands)
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Development plan document
    #[serde(default = "default_plan")]
    pub plan: PathBuf,

    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Upper bound on concurrently running tasks within one section
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    /// Per-invocation plugin timeout
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    #[serde(default)]
    pub dry_run: bool,

    /// Rewrite the plan file with updated checkboxes after a run
    #[serde(default = "default_true")]
    pub write_back: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Task type used when no explicit `type=` param or rule matches
    #[serde(default = "default_task_type")]
    pub default_task_type: String,

    /// Ordered classification rules; first match wins
    #[serde(default)]
    pub task_types: Vec<TaskTypeRule>,

    #[serde(default)]
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSON file the cache is persisted to between runs
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// LRU bound on stored entries
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Maps task text to a task type with a case-insensitive regex.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TaskTypeRule {
    pub pattern: String,

    #[serde(rename = "type")]
    pub task_type: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct PluginsConfig {
    /// Built-in plugins registered but disabled for lookup
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Extra task types accepted by the generic plugin
    #[serde(default)]
    pub passthrough_types: Vec<String>,
}
