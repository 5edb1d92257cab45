use crate::plan::Status;
use serde::Serialize;
use tokio::sync::mpsc;

/// Progress notifications published while a plan runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    PhaseStarted {
        phase_id: String,
        title: String,
    },
    SectionStarted {
        phase_id: String,
        section_id: String,
        title: String,
        pending_tasks: usize,
    },
    TaskStarted {
        task_id: String,
        name: String,
        task_type: String,
    },
    TaskFinished {
        task_id: String,
        success: bool,
        from_cache: bool,
        attempts: u32,
        execution_time_ms: u64,
    },
    SectionFinished {
        section_id: String,
        status: Status,
    },
    PhaseFinished {
        phase_id: String,
        status: Status,
    },
    PlanFinished {
        completed: usize,
        failed: usize,
        skipped: usize,
        cancelled: bool,
    },
}

pub type EventSender = mpsc::UnboundedSender<ExecutionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
