use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevplanError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid task type pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Plan document is empty")]
    EmptyDocument,

    #[error("Failed to read plan '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("A plugin named '{0}' is already registered")]
    Conflict(String),

    #[error("Plugin '{name}' failed to initialize: {reason}")]
    Initialize { name: String, reason: String },

    #[error("No plugin named '{0}' is registered")]
    UnknownPlugin(String),
}

/// Failure attached to a task result. Cloneable so it can live inside cached results.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("No plugin supports task type '{task_type}'")]
    PluginNotFound { task_type: String },

    #[error("Task rejected by plugin '{plugin}': {reason}")]
    InvalidTask { plugin: String, reason: String },

    #[error("Execution failed: {message}")]
    Execution { message: String },

    #[error("Execution timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Cancelled after attempt {attempts}: {message}")]
    Cancelled { attempts: u32, message: String },
}

impl TaskError {
    pub fn timeout(after: Duration) -> Self {
        TaskError::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    /// Terminal errors are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskError::PluginNotFound { .. }
                | TaskError::InvalidTask { .. }
                | TaskError::Cancelled { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Phase '{0}' not found in plan")]
    PhaseNotFound(String),

    #[error("Failed to acquire semaphore: {0}")]
    Semaphore(#[from] tokio::sync::AcquireError),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read cache file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write cache file: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to persist cache file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to create output directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Failed to write report: {0}")]
    WriteReport(std::io::Error),

    #[error("Failed to persist plan file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
