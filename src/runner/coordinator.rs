use crate::error::{RunnerError, TaskError};
use crate::plan::{Phase, Plan, Section, Status, Task};
use crate::plugin::TaskContext;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::events::{EventSender, ExecutionEvent};
use super::executor::{ExecutionResult, Statistics, TaskExecutor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Failed,
    Skipped { reason: String },
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Completed => write!(f, "completed"),
            TaskOutcome::Failed => write!(f, "failed"),
            TaskOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub name: String,
    pub task_type: String,
    pub outcome: TaskOutcome,
    pub message: String,
    pub attempts: u32,
    pub from_cache: bool,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskReport {
    fn skipped(task: &Task, reason: &str) -> Self {
        Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            task_type: task.task_type.clone(),
            outcome: TaskOutcome::Skipped {
                reason: reason.to_string(),
            },
            message: String::new(),
            attempts: 0,
            from_cache: false,
            execution_time_ms: 0,
            error: None,
        }
    }

    fn from_result(task: &Task, result: ExecutionResult) -> Self {
        Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            task_type: task.task_type.clone(),
            outcome: if result.success {
                TaskOutcome::Completed
            } else if was_cancelled(&result) {
                TaskOutcome::Skipped {
                    reason: "cancelled".to_string(),
                }
            } else {
                TaskOutcome::Failed
            },
            message: result.message,
            attempts: result.attempts,
            from_cache: result.from_cache,
            execution_time_ms: result.execution_time_ms,
            error: result.error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionReport {
    pub section_id: String,
    pub title: String,
    pub status: Status,
    pub tasks: Vec<TaskReport>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase_id: String,
    pub title: String,
    pub status: Status,
    pub sections: Vec<SectionReport>,
    pub duration_ms: u64,
}

impl PhaseReport {
    pub fn tasks(&self) -> impl Iterator<Item = &TaskReport> {
        self.sections.iter().flat_map(|s| s.tasks.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecutionReport {
    pub run_id: String,
    pub title: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub cancelled: bool,
    pub dry_run: bool,
    pub phases: Vec<PhaseReport>,
    pub statistics: Statistics,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cached: usize,
}

impl PlanExecutionReport {
    pub fn tasks(&self) -> impl Iterator<Item = &TaskReport> {
        self.phases.iter().flat_map(|p| p.tasks())
    }

    pub fn totals(&self) -> OutcomeCounts {
        count_outcomes(self.tasks())
    }

    pub fn has_failures(&self) -> bool {
        self.totals().failed > 0
    }
}

fn count_outcomes<'a>(tasks: impl Iterator<Item = &'a TaskReport>) -> OutcomeCounts {
    let mut counts = OutcomeCounts::default();
    for task in tasks {
        match task.outcome {
            TaskOutcome::Completed => counts.completed += 1,
            TaskOutcome::Failed => counts.failed += 1,
            TaskOutcome::Skipped { .. } => counts.skipped += 1,
        }
        if task.from_cache {
            counts.cached += 1;
        }
    }
    counts
}

/// Walks a plan in document order. Phases and sections run one after another;
/// tasks inside a section run in batches of at most `max_parallel`.
pub struct Coordinator {
    executor: Arc<TaskExecutor>,
    workspace: PathBuf,
    max_parallel: usize,
    dry_run: bool,
    events: Option<EventSender>,
}

impl Coordinator {
    pub fn new(executor: Arc<TaskExecutor>, workspace: impl Into<PathBuf>, max_parallel: usize) -> Self {
        Self {
            executor,
            workspace: workspace.into(),
            max_parallel: max_parallel.max(1),
            dry_run: false,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver just means nobody is listening
            let _ = events.send(event);
        }
    }

    pub async fn run_plan(
        &self,
        plan: &mut Plan,
        cancel: &CancellationToken,
    ) -> Result<PlanExecutionReport, RunnerError> {
        self.run_plan_phases(plan, None, cancel).await
    }

    /// Full plan report, restricted to one phase when `only_phase` is set
    pub async fn run_plan_phases(
        &self,
        plan: &mut Plan,
        only_phase: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PlanExecutionReport, RunnerError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();

        info!(
            "Run {}: {} tasks in {} phases, up to {} in parallel",
            run_id,
            plan.task_count(),
            plan.phases.len(),
            self.max_parallel
        );

        let phases = match only_phase {
            Some(id) => vec![self.run_phase(plan, id, cancel).await?],
            None => {
                let mut phases = Vec::with_capacity(plan.phases.len());
                for phase in &mut plan.phases {
                    phases.push(self.execute_phase(phase, cancel).await?);
                }
                phases
            }
        };

        let report = PlanExecutionReport {
            run_id,
            title: plan.title.clone(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            cancelled: cancel.is_cancelled(),
            dry_run: self.dry_run,
            phases,
            statistics: self.executor.statistics().await,
        };

        let totals = report.totals();
        self.emit(ExecutionEvent::PlanFinished {
            completed: totals.completed,
            failed: totals.failed,
            skipped: totals.skipped,
            cancelled: report.cancelled,
        });
        info!(
            "Run {} finished in {}ms: {} completed, {} failed, {} skipped",
            report.run_id, report.duration_ms, totals.completed, totals.failed, totals.skipped
        );

        Ok(report)
    }

    pub async fn run_phase(
        &self,
        plan: &mut Plan,
        phase_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, RunnerError> {
        let phase = plan
            .phases
            .iter_mut()
            .find(|p| p.id == phase_id)
            .ok_or_else(|| RunnerError::PhaseNotFound(phase_id.to_string()))?;

        self.execute_phase(phase, cancel).await
    }

    async fn execute_phase(
        &self,
        phase: &mut Phase,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, RunnerError> {
        let start = Instant::now();
        info!("Phase {}: {}", phase.number, phase.title);
        self.emit(ExecutionEvent::PhaseStarted {
            phase_id: phase.id.clone(),
            title: phase.title.clone(),
        });
        phase.status = Status::Running;

        let mut sections = Vec::with_capacity(phase.sections.len());
        for section in &mut phase.sections {
            sections.push(self.execute_section(&phase.id, section, cancel).await?);
        }

        phase.status = rollup(sections.iter().map(|s| s.status));
        self.emit(ExecutionEvent::PhaseFinished {
            phase_id: phase.id.clone(),
            status: phase.status,
        });

        Ok(PhaseReport {
            phase_id: phase.id.clone(),
            title: phase.title.clone(),
            status: phase.status,
            sections,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_section(
        &self,
        phase_id: &str,
        section: &mut Section,
        cancel: &CancellationToken,
    ) -> Result<SectionReport, RunnerError> {
        let start = Instant::now();
        let section_id = section.id.clone();
        let mut reports: Vec<Option<TaskReport>> = vec![None; section.tasks.len()];
        let mut pending = Vec::new();

        for (idx, task) in section.tasks.iter().enumerate() {
            if task.completed {
                reports[idx] = Some(TaskReport::skipped(task, "already completed"));
            } else {
                pending.push(idx);
            }
        }

        info!(
            "Section {} {}: {} pending task(s)",
            section_id,
            section.title,
            pending.len()
        );
        self.emit(ExecutionEvent::SectionStarted {
            phase_id: phase_id.to_string(),
            section_id: section_id.clone(),
            title: section.title.clone(),
            pending_tasks: pending.len(),
        });
        section.status = Status::Running;

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));

        for batch in pending.chunks(self.max_parallel) {
            let skip_reason = if cancel.is_cancelled() {
                Some("cancelled")
            } else if self.dry_run {
                Some("dry run")
            } else {
                None
            };
            if let Some(reason) = skip_reason {
                for &idx in batch {
                    reports[idx] = Some(TaskReport::skipped(&section.tasks[idx], reason));
                }
                continue;
            }

            let mut in_flight = FuturesUnordered::new();
            for &idx in batch {
                let task = &mut section.tasks[idx];
                task.status = Status::Running;
                self.emit(ExecutionEvent::TaskStarted {
                    task_id: task.id.clone(),
                    name: task.name.clone(),
                    task_type: task.task_type.clone(),
                });

                let spec = task.spec();
                let ctx = TaskContext {
                    task_id: task.id.clone(),
                    section_id: section_id.clone(),
                    phase_id: phase_id.to_string(),
                    cancel: cancel.clone(),
                    ..TaskContext::new(self.workspace.clone())
                };

                let permit = semaphore.clone().acquire_owned().await?;
                let executor = self.executor.clone();
                in_flight.push(tokio::spawn(async move {
                    let _permit = permit; // hold until done
                    let result = executor.execute(&spec, &ctx).await;
                    (idx, result)
                }));
            }

            while let Some(joined) = in_flight.next().await {
                match joined {
                    Ok((idx, result)) => {
                        let task = &mut section.tasks[idx];
                        apply_result(task, &result);
                        self.emit(ExecutionEvent::TaskFinished {
                            task_id: task.id.clone(),
                            success: result.success,
                            from_cache: result.from_cache,
                            attempts: result.attempts,
                            execution_time_ms: result.execution_time_ms,
                        });
                        reports[idx] = Some(TaskReport::from_result(task, result));
                    }
                    Err(e) => warn!("Task panicked: {}", e),
                }
            }

            // Anything that never reported back panicked
            for &idx in batch {
                if reports[idx].is_none() {
                    let task = &mut section.tasks[idx];
                    task.status = Status::Failed;
                    let mut report = TaskReport::skipped(task, "");
                    report.outcome = TaskOutcome::Failed;
                    report.message = "task panicked".to_string();
                    reports[idx] = Some(report);
                }
            }
        }

        section.status = rollup(section.tasks.iter().map(|t| t.status));
        self.emit(ExecutionEvent::SectionFinished {
            section_id: section_id.clone(),
            status: section.status,
        });

        Ok(SectionReport {
            section_id,
            title: section.title.clone(),
            status: section.status,
            tasks: reports.into_iter().flatten().collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn was_cancelled(result: &ExecutionResult) -> bool {
    matches!(result.error, Some(TaskError::Cancelled { .. }))
}

/// A cancelled task goes back to pending so the next run picks it up
fn apply_result(task: &mut Task, result: &ExecutionResult) {
    if was_cancelled(result) {
        task.status = Status::Pending;
        return;
    }
    task.retry_count = result.retry_count();
    if result.success {
        task.status = Status::Completed;
        task.completed = true;
    } else {
        task.status = Status::Failed;
    }
}

/// Failed if any child failed, completed if all did, otherwise still pending
fn rollup(statuses: impl Iterator<Item = Status>) -> Status {
    let mut all_completed = true;
    for status in statuses {
        match status {
            Status::Failed => return Status::Failed,
            Status::Completed => {}
            _ => all_completed = false,
        }
    }
    if all_completed {
        Status::Completed
    } else {
        Status::Pending
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("workspace", &self.workspace)
            .field("max_parallel", &self.max_parallel)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TaskCache;
    use crate::config::RetryConfig;
    use crate::plan::{PlanParser, TaskClassifier, TaskSpec};
    use crate::plugin::testing::ScriptedPlugin;
    use crate::plugin::{Plugin, PluginOutput, PluginRegistry};
    use crate::runner::event_channel;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn parse(doc: &str) -> Plan {
        PlanParser::new(TaskClassifier::default()).parse(doc).unwrap()
    }

    fn section_doc(number: u32, label: &str, names: &[&str]) -> String {
        let mut doc = format!("## {}. Phase {}\n\n### {} Work\n", number, number, label);
        for name in names {
            doc.push_str(&format!("- [ ] {} `type=build`\n", name));
        }
        doc
    }

    async fn coordinator(
        plugin: impl Plugin + 'static,
        max_parallel: usize,
        cache: Option<Arc<TaskCache>>,
    ) -> Coordinator {
        coordinator_with_attempts(plugin, max_parallel, cache, 1).await
    }

    async fn coordinator_with_attempts(
        plugin: impl Plugin + 'static,
        max_parallel: usize,
        cache: Option<Arc<TaskCache>>,
        max_attempts: u32,
    ) -> Coordinator {
        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(plugin)).await.unwrap();
        let executor = TaskExecutor::new(
            registry,
            cache,
            RetryConfig {
                max_attempts,
                backoff_base_ms: 1,
            },
            Duration::from_secs(5),
        );
        Coordinator::new(Arc::new(executor), ".", max_parallel)
    }

    #[tokio::test]
    async fn test_batch_bound_respected() {
        let plugin = ScriptedPlugin::new("a", &["build"]).delay(Duration::from_millis(20));
        let calls = plugin.calls.clone();
        let max_running = plugin.max_running.clone();
        let coordinator = coordinator(plugin, 2, None).await;

        let mut plan = parse(&format!(
            "# Plan\n\n{}",
            section_doc(1, "1.1", &["a", "b", "c", "d", "e", "f", "g"])
        ));
        let report = coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 7);
        assert!(max_running.load(Ordering::SeqCst) <= 2);
        assert_eq!(report.totals().completed, 7);
        assert_eq!(plan.phases[0].status, Status::Completed);
        assert!(plan.tasks().all(|t| t.completed));
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let plugin = ScriptedPlugin::new("a", &["build"]).always_fail_for("t4");
        let calls = plugin.calls.clone();
        let coordinator = coordinator(plugin, 3, None).await;

        let names: Vec<String> = (1..=10).map(|i| format!("t{}", i)).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let doc = format!(
            "# Plan\n\n{}\n### 1.2 Next\n- [ ] u1 `type=build`\n",
            section_doc(1, "1.1", &names)
        );
        let mut plan = parse(&doc);

        let report = coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        let first = &report.phases[0].sections[0];
        assert_eq!(first.status, Status::Failed);
        assert_eq!(first.tasks.len(), 10);
        assert_eq!(
            first
                .tasks
                .iter()
                .filter(|t| t.outcome == TaskOutcome::Completed)
                .count(),
            9
        );
        let failed: Vec<_> = first
            .tasks
            .iter()
            .filter(|t| t.outcome == TaskOutcome::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "t4");

        // The sibling section still ran
        assert_eq!(report.phases[0].sections[1].status, Status::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(report.phases[0].status, Status::Failed);
        assert_eq!(plan.phases[0].sections[0].tasks[3].status, Status::Failed);
        assert!(!plan.phases[0].sections[0].tasks[3].completed);
    }

    #[tokio::test]
    async fn test_two_phases_run_in_batches_of_two() {
        let plugin = ScriptedPlugin::new("a", &["build"]).delay(Duration::from_millis(10));
        let calls = plugin.calls.clone();
        let (tx, mut rx) = event_channel();
        let coordinator = coordinator(plugin, 2, None).await.with_events(tx);

        let doc = format!(
            "# Plan\n\n{}\n{}",
            section_doc(1, "1.1", &["a1", "a2", "a3", "a4"]),
            section_doc(2, "2.1", &["b1", "b2", "b3", "b4"])
        );
        let mut plan = parse(&doc);
        coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();
        drop(coordinator);

        assert_eq!(calls.load(Ordering::SeqCst), 8);

        let mut task_events = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                ExecutionEvent::TaskStarted { .. } => task_events.push('S'),
                ExecutionEvent::TaskFinished { .. } => task_events.push('F'),
                _ => {}
            }
        }
        // Each batch starts two tasks and waits for both before the next
        assert_eq!(task_events.iter().collect::<String>(), "SSFF".repeat(4));
    }

    #[tokio::test]
    async fn test_event_order_for_plan() {
        let (tx, mut rx) = event_channel();
        let coordinator = coordinator(ScriptedPlugin::new("a", &["build"]), 3, None)
            .await
            .with_events(tx);

        let mut plan = parse(&format!("# Plan\n\n{}", section_doc(1, "1.1", &["x"])));
        coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();
        drop(coordinator);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                ExecutionEvent::PhaseStarted { .. } => "phase_started",
                ExecutionEvent::SectionStarted { .. } => "section_started",
                ExecutionEvent::TaskStarted { .. } => "task_started",
                ExecutionEvent::TaskFinished { .. } => "task_finished",
                ExecutionEvent::SectionFinished { .. } => "section_finished",
                ExecutionEvent::PhaseFinished { .. } => "phase_finished",
                ExecutionEvent::PlanFinished { .. } => "plan_finished",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "phase_started",
                "section_started",
                "task_started",
                "task_finished",
                "section_finished",
                "phase_finished",
                "plan_finished"
            ]
        );
    }

    /// Cancels the run from inside the first batch
    struct CancellingPlugin;

    #[async_trait]
    impl Plugin for CancellingPlugin {
        fn name(&self) -> &str {
            "cancelling"
        }

        fn supported_task_types(&self) -> Vec<String> {
            vec!["build".to_string()]
        }

        async fn execute(&self, _: &TaskSpec, ctx: &TaskContext) -> anyhow::Result<PluginOutput> {
            ctx.cancel.cancel();
            Ok(PluginOutput::ok("done"))
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_batches() {
        let coordinator = coordinator(CancellingPlugin, 2, None).await;
        let doc = format!(
            "# Plan\n\n{}\n{}",
            section_doc(1, "1.1", &["a", "b", "c", "d"]),
            section_doc(2, "2.1", &["e"])
        );
        let mut plan = parse(&doc);
        let cancel = CancellationToken::new();

        let report = coordinator.run_plan(&mut plan, &cancel).await.unwrap();

        assert!(report.cancelled);
        let totals = report.totals();
        assert_eq!(totals.completed, 2);
        assert_eq!(totals.skipped, 3);
        assert!(report.tasks().filter(|t| t.outcome != TaskOutcome::Completed).all(
            |t| t.outcome
                == TaskOutcome::Skipped {
                    reason: "cancelled".to_string()
                }
        ));
        assert_eq!(plan.phases[0].sections[0].tasks[2].status, Status::Pending);
        assert_eq!(plan.phases[0].sections[0].status, Status::Pending);
    }

    #[tokio::test]
    async fn test_completed_tasks_skipped() {
        let plugin = ScriptedPlugin::new("a", &["build"]);
        let calls = plugin.calls.clone();
        let coordinator = coordinator(plugin, 3, None).await;

        let mut plan = parse(
            "# Plan\n\n## 1. Build\n\n### 1.1 Core\n- [x] done `type=build`\n- [ ] todo `type=build`\n",
        );
        let report = coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let tasks = &report.phases[0].sections[0].tasks;
        assert_eq!(
            tasks[0].outcome,
            TaskOutcome::Skipped {
                reason: "already completed".to_string()
            }
        );
        assert_eq!(tasks[1].outcome, TaskOutcome::Completed);
        assert_eq!(report.phases[0].sections[0].status, Status::Completed);
    }

    #[tokio::test]
    async fn test_identical_tasks_across_sections_use_cache() {
        let plugin = ScriptedPlugin::new("a", &["build"]);
        let calls = plugin.calls.clone();
        let cache = Arc::new(TaskCache::in_memory(100));
        let coordinator = coordinator(plugin, 3, Some(cache)).await;

        let doc = format!(
            "# Plan\n\n{}\n### 1.2 Again\n- [ ] same `type=build`\n",
            section_doc(1, "1.1", &["same"])
        );
        let mut plan = parse(&doc);
        let report = coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.totals().completed, 2);
        assert_eq!(report.totals().cached, 1);
    }

    #[tokio::test]
    async fn test_identical_tasks_in_one_batch_run_once() {
        let plugin = ScriptedPlugin::new("a", &["build"]).delay(Duration::from_millis(20));
        let calls = plugin.calls.clone();
        let cache = Arc::new(TaskCache::in_memory(100));
        let coordinator = coordinator(plugin, 3, Some(cache)).await;

        let mut plan = parse(&format!(
            "# Plan\n\n{}",
            section_doc(1, "1.1", &["same", "same"])
        ));
        let report = coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.totals().completed, 2);
        assert_eq!(report.totals().cached, 1);
        assert!(plan.tasks().all(|t| t.completed));
    }

    #[tokio::test]
    async fn test_retried_success_recorded_on_task() {
        let plugin = ScriptedPlugin::new("a", &["build"]).succeed_on(2);
        let calls = plugin.calls.clone();
        let coordinator = coordinator_with_attempts(plugin, 3, None, 3).await;

        let mut plan = parse(&format!("# Plan\n\n{}", section_doc(1, "1.1", &["flaky"])));
        coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        let task = &plan.phases[0].sections[0].tasks[0];
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(task.status, Status::Completed);
        assert!(task.completed);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_task() {
        let plugin = ScriptedPlugin::new("a", &["build"]).succeed_on(0);
        let calls = plugin.calls.clone();
        let coordinator = coordinator_with_attempts(plugin, 3, None, 3).await;

        let mut plan = parse(&format!("# Plan\n\n{}", section_doc(1, "1.1", &["broken"])));
        let report = coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        let task = &plan.phases[0].sections[0].tasks[0];
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(task.status, Status::Failed);
        assert!(!task.completed);
        assert_eq!(task.retry_count, 2);
        assert_eq!(report.totals().failed, 1);
    }

    /// Fails whenever the run has been cancelled, like an interrupted command
    struct InterruptedPlugin {
        calls: Arc<std::sync::atomic::AtomicU32>,
    }

    #[async_trait]
    impl Plugin for InterruptedPlugin {
        fn name(&self) -> &str {
            "interrupted"
        }

        fn supported_task_types(&self) -> Vec<String> {
            vec!["build".to_string()]
        }

        async fn execute(&self, _: &TaskSpec, ctx: &TaskContext) -> anyhow::Result<PluginOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.cancel.cancel();
            Ok(PluginOutput::failed("interrupted"))
        }
    }

    #[tokio::test]
    async fn test_interrupted_task_returns_to_pending() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let plugin = InterruptedPlugin {
            calls: calls.clone(),
        };
        let coordinator = coordinator_with_attempts(plugin, 1, None, 3).await;

        let mut plan = parse(&format!("# Plan\n\n{}", section_doc(1, "1.1", &["a", "b"])));
        let report = coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!report.has_failures());
        assert_eq!(report.totals().skipped, 2);
        assert!(plan
            .tasks()
            .all(|t| t.status == Status::Pending && !t.completed));
        assert_eq!(plan.phases[0].sections[0].status, Status::Pending);
    }

    #[tokio::test]
    async fn test_run_single_phase() {
        let plugin = ScriptedPlugin::new("a", &["build"]);
        let calls = plugin.calls.clone();
        let coordinator = coordinator(plugin, 3, None).await;

        let doc = format!(
            "# Plan\n\n{}\n{}",
            section_doc(1, "1.1", &["a", "b"]),
            section_doc(2, "2.1", &["c"])
        );
        let mut plan = parse(&doc);
        let cancel = CancellationToken::new();

        let report = coordinator
            .run_phase(&mut plan, "phase-2", &cancel)
            .await
            .unwrap();
        assert_eq!(report.phase_id, "phase-2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(plan.phases[0].status, Status::Pending);

        assert!(matches!(
            coordinator.run_phase(&mut plan, "phase-9", &cancel).await,
            Err(RunnerError::PhaseNotFound(_))
        ));

        let report = coordinator
            .run_plan_phases(&mut plan, Some("phase-1"), &cancel)
            .await
            .unwrap();
        assert_eq!(report.phases.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            coordinator
                .run_plan_phases(&mut plan, Some("phase-9"), &cancel)
                .await,
            Err(RunnerError::PhaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dry_run_invokes_nothing() {
        let plugin = ScriptedPlugin::new("a", &["build"]);
        let calls = plugin.calls.clone();
        let coordinator = coordinator(plugin, 3, None).await.dry_run(true);

        let mut plan = parse(&format!("# Plan\n\n{}", section_doc(1, "1.1", &["a", "b"])));
        let report = coordinator
            .run_plan(&mut plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.totals().skipped, 2);
        assert!(report.dry_run);
        assert!(plan.tasks().all(|t| !t.completed));
    }

    #[test]
    fn test_rollup() {
        use Status::*;
        assert_eq!(rollup([Completed, Completed].into_iter()), Completed);
        assert_eq!(rollup([Completed, Failed, Pending].into_iter()), Failed);
        assert_eq!(rollup([Completed, Pending].into_iter()), Pending);
        assert_eq!(rollup(std::iter::empty()), Completed);
    }
}
