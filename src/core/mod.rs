//! Core domain models.
//!
//! Tasks, the task graph with its readiness and split operations, the
//! artifact store, the audit log, and the project aggregate that owns them.

pub mod activity;
pub mod artifact;
pub mod graph;
pub mod project;
pub mod task;

pub use activity::{ActivityLog, ActivityLogEntry, ActivityStatus};
pub use artifact::{extract_files, ArtifactStore, ProjectFile};
pub use graph::{PlannedTask, SubtaskDraft, TaskGraph};
pub use project::{PlanDraft, Project, ProjectId};
pub use task::{AgentRole, Task, TaskId, TaskStatus};
