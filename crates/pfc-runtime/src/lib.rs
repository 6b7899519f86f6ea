//! pfc-runtime
//!
//! Evaluation orchestrator and recurring scheduler. Both are explicit values
//! built once at startup and shared by `Arc`; there is no process-wide
//! instance.

mod orchestrator;
mod outcome;
mod scheduler;

pub use orchestrator::{ChallengeDefaults, Evaluator};
pub use outcome::{BatchSummary, EvalError, EvaluationResult, ResetSummary};
pub use scheduler::{until_next_reset, Scheduler, SchedulerSettings, SchedulerStatus};
