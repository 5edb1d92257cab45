mod coordinator;
mod events;
mod executor;
mod retry;

pub use coordinator::{Coordinator, PlanExecutionReport, TaskOutcome, TaskReport};
pub use events::{event_channel, EventReceiver, ExecutionEvent};
pub use executor::{ExecutionResult, TaskExecutor};

#[cfg(test)]
pub(crate) use coordinator::{PhaseReport, SectionReport};
#[cfg(test)]
pub(crate) use executor::Statistics;
