//! Development plan model: markdown document ⇄ Phase → Section → Task tree

pub mod classify;
pub mod parser;
pub mod types;
pub mod writer;

pub use classify::TaskClassifier;
pub use parser::PlanParser;
pub use types::{Phase, Plan, Progress, Section, Status, Task, TaskSpec};
pub use writer::write_plan_file;
