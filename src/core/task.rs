//! Task data model for the project graph.
//!
//! A task is one unit of work handed to the executor collaborator. It tracks
//! its role, lifecycle status, dependency edges, and the output of its last
//! successful execution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task within a project.
///
/// IDs are UUID v4, so IDs of tasks removed by a split are never reissued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Role the executor is asked to take on. Has no effect on scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Architect,
    #[default]
    Developer,
    Reviewer,
    Planner,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Architect => write!(f, "architect"),
            AgentRole::Developer => write!(f, "developer"),
            AgentRole::Reviewer => write!(f, "reviewer"),
            AgentRole::Planner => write!(f, "planner"),
        }
    }
}

/// Task status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for its dependencies or for a user to run it.
    #[default]
    Pending,
    /// An execution is in flight.
    InProgress,
    /// Last execution succeeded; `output` holds its response.
    Completed,
    /// Last execution failed; may be re-run manually.
    Failed,
    /// A dependency can never complete. Only assigned at plan ingestion.
    Blocked,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// A single task in the project graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub agent_role: AgentRole,
    #[serde(default)]
    pub status: TaskStatus,
    /// Tasks that must be `completed` before this one may run, in order.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Present exactly when `status` is `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Task {
    /// Create a pending task with a fresh ID and no dependencies.
    pub fn new(title: &str, description: &str, agent_role: AgentRole) -> Self {
        Self {
            id: TaskId::new(),
            title: title.to_string(),
            description: description.to_string(),
            agent_role,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            output: None,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.output = None;
    }

    pub fn complete(&mut self, output: String) {
        self.status = TaskStatus::Completed;
        self.output = Some(output);
    }

    pub fn fail(&mut self) {
        self.status = TaskStatus::Failed;
        self.output = None;
    }

    pub fn block(&mut self) {
        self.status = TaskStatus::Blocked;
        self.output = None;
    }

    /// Drop a stale in-flight marker. Leaves every other status untouched.
    ///
    /// Returns `true` if the status changed.
    pub fn reset_if_in_progress(&mut self) -> bool {
        if self.status == TaskStatus::InProgress {
            self.status = TaskStatus::Pending;
            true
        } else {
            false
        }
    }

    /// Title and description may only change before the task first runs.
    pub fn is_editable(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn depends_on(&self, id: &TaskId) -> bool {
        self.dependencies.contains(id)
    }
}
