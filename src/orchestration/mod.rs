//! Orchestration layer: drives the task graph through external collaborators.
//!
//! The [`Orchestrator`] owns the current project snapshot and runs plan
//! generation, task execution, splitting and self-healing against the
//! [`collaborators`] seams. [`ClaudeHeadless`] is the production
//! collaborator; tests plug in scripted ones.

pub mod claude;
pub mod collaborators;
pub mod context;
pub mod healing;
pub mod orchestrator;
pub mod parse;

pub use claude::{ClaudeHeadless, ClaudeResponse, ResultType};
pub use collaborators::{Collaborators, PlanGenerator, TaskDecomposer, TaskExecutor};
pub use context::assemble_context;
pub use healing::{fix_task, RuntimeFault};
pub use orchestrator::{Orchestrator, RunSummary};
pub use parse::parse_structured;
