use crate::cache::{fingerprint, TaskCache};
use crate::config::RetryConfig;
use crate::error::TaskError;
use crate::plan::TaskSpec;
use crate::plugin::{Plugin, PluginOutput, PluginRegistry, TaskContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::retry::retry_with_backoff;

/// Outcome of executing one task, possibly across several attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub from_cache: bool,
    /// Plugin invocations made; zero when no plugin was reached
    pub attempts: u32,
}

impl ExecutionResult {
    fn succeeded(output: PluginOutput, elapsed: Duration, attempts: u32) -> Self {
        Self {
            success: true,
            message: output.message,
            data: output.data,
            execution_time_ms: elapsed.as_millis() as u64,
            error: None,
            from_cache: false,
            attempts,
        }
    }

    fn failed(error: TaskError, elapsed: Duration, attempts: u32) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: None,
            execution_time_ms: elapsed.as_millis() as u64,
            error: Some(error),
            from_cache: false,
            attempts,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

#[derive(Debug, Default, Clone)]
struct Counters {
    executions: u64,
    successes: u64,
    errors: u64,
    total_time: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginStats {
    pub name: String,
    pub executions: u64,
    pub successes: u64,
    pub errors: u64,
    pub total_time_ms: u64,
    pub success_rate: f64,
    pub average_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_plugins_registered: usize,
    pub total_tasks_executed: u64,
    pub total_execution_time_ms: u64,
    pub cache_hits: u64,
    pub per_plugin: Vec<PluginStats>,
}

/// Resolves, validates and runs tasks against the registry with retry, timeout and caching
pub struct TaskExecutor {
    registry: Arc<PluginRegistry>,
    cache: Option<Arc<TaskCache>>,
    retry: RetryConfig,
    timeout: Duration,
    counters: Mutex<HashMap<String, Counters>>,
    /// One lock per fingerprint so identical tasks run once and the rest hit the cache
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    tasks_executed: AtomicU64,
    cache_hits: AtomicU64,
}

impl TaskExecutor {
    pub fn new(
        registry: Arc<PluginRegistry>,
        cache: Option<Arc<TaskCache>>,
        retry: RetryConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            retry,
            timeout,
            counters: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
            tasks_executed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    pub async fn execute(&self, task: &TaskSpec, ctx: &TaskContext) -> ExecutionResult {
        let Some(cache) = &self.cache else {
            return self.run(task, ctx).await;
        };

        let key = fingerprint(task);
        let flight = self.flights.lock().await.entry(key.clone()).or_default().clone();
        let result = self.execute_cached(cache, &flight, task, ctx).await;

        drop(flight);
        let mut flights = self.flights.lock().await;
        if flights.get(&key).is_some_and(|f| Arc::strong_count(f) == 1) {
            flights.remove(&key);
        }
        result
    }

    async fn execute_cached(
        &self,
        cache: &TaskCache,
        flight: &Mutex<()>,
        task: &TaskSpec,
        ctx: &TaskContext,
    ) -> ExecutionResult {
        let _running = flight.lock().await;

        if let Some(mut hit) = cache.get(task).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for {} ({})", ctx.task_id, task.name);
            hit.from_cache = true;
            // Nothing was attempted in this run
            hit.attempts = 0;
            return hit;
        }

        let result = self.run(task, ctx).await;
        if result.success {
            cache.put(task, result.clone()).await;
        }
        result
    }

    async fn run(&self, task: &TaskSpec, ctx: &TaskContext) -> ExecutionResult {
        let start = Instant::now();

        let Some(plugin) = self.registry.find_capable(&task.task_type).await else {
            warn!(
                "No plugin for task {} (type '{}')",
                ctx.task_id, task.task_type
            );
            return ExecutionResult::failed(
                TaskError::PluginNotFound {
                    task_type: task.task_type.clone(),
                },
                start.elapsed(),
                0,
            );
        };

        if let Err(reason) = plugin.validate(task) {
            warn!("Task {} rejected by {}: {}", ctx.task_id, plugin.name(), reason);
            return ExecutionResult::failed(
                TaskError::InvalidTask {
                    plugin: plugin.name().to_string(),
                    reason,
                },
                start.elapsed(),
                0,
            );
        }

        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Executing {} (phase {}, section {}) with plugin {}",
            ctx.task_id,
            ctx.phase_id,
            ctx.section_id,
            plugin.name()
        );

        let outcome = retry_with_backoff(&self.retry, &ctx.cancel, |attempt| {
            let plugin = plugin.clone();
            let mut ctx = ctx.clone();
            ctx.attempt = attempt;
            async move { self.invoke(plugin.as_ref(), task, &ctx).await }
        })
        .await;

        match outcome.result {
            Ok(output) => {
                let result = ExecutionResult::succeeded(output, start.elapsed(), outcome.attempts);
                info!(
                    "Task {} completed in {}ms ({} attempt{})",
                    ctx.task_id,
                    result.execution_time_ms,
                    result.attempts,
                    if result.attempts == 1 { "" } else { "s" }
                );
                result
            }
            Err(error) if outcome.cancelled => {
                info!("Task {} stopped by cancellation", ctx.task_id);
                let error = TaskError::Cancelled {
                    attempts: outcome.attempts,
                    message: error.to_string(),
                };
                ExecutionResult::failed(error, start.elapsed(), outcome.attempts)
            }
            Err(error) => {
                warn!("Task {} failed: {}", ctx.task_id, error);
                ExecutionResult::failed(error, start.elapsed(), outcome.attempts)
            }
        }
    }

    /// One plugin invocation under the timeout. Plugin-reported failures become errors so they retry.
    async fn invoke(
        &self,
        plugin: &dyn Plugin,
        task: &TaskSpec,
        ctx: &TaskContext,
    ) -> Result<PluginOutput, TaskError> {
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, plugin.execute(task, ctx)).await {
            Ok(Ok(output)) if output.success => Ok(output),
            Ok(Ok(output)) => Err(TaskError::Execution {
                message: output.message,
            }),
            Ok(Err(e)) => Err(TaskError::Execution {
                message: format!("{:#}", e),
            }),
            Err(_) => Err(TaskError::timeout(self.timeout)),
        };

        self.record(plugin.name(), result.is_ok(), started.elapsed())
            .await;
        result
    }

    async fn record(&self, plugin: &str, success: bool, elapsed: Duration) {
        let mut counters = self.counters.lock().await;
        let entry = counters.entry(plugin.to_string()).or_default();
        entry.executions += 1;
        if success {
            entry.successes += 1;
        } else {
            entry.errors += 1;
        }
        entry.total_time += elapsed;
    }

    pub async fn statistics(&self) -> Statistics {
        let plugins = self.registry.list_all().await;
        let counters = self.counters.lock().await;

        let per_plugin: Vec<PluginStats> = plugins
            .iter()
            .map(|p| {
                let c = counters.get(&p.name).cloned().unwrap_or_default();
                let total_ms = c.total_time.as_millis() as u64;
                PluginStats {
                    name: p.name.clone(),
                    executions: c.executions,
                    successes: c.successes,
                    errors: c.errors,
                    total_time_ms: total_ms,
                    success_rate: if c.executions == 0 {
                        0.0
                    } else {
                        c.successes as f64 / c.executions as f64
                    },
                    average_time_ms: if c.executions == 0 {
                        0.0
                    } else {
                        total_ms as f64 / c.executions as f64
                    },
                }
            })
            .collect();

        Statistics {
            total_plugins_registered: plugins.len(),
            total_tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            total_execution_time_ms: per_plugin.iter().map(|p| p.total_time_ms).sum(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            per_plugin,
        }
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
