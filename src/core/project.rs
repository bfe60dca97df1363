//! Project aggregate root.
//!
//! A `Project` value is a complete snapshot of the system state. Operations
//! clone the current snapshot, mutate the clone, and install it as a whole.

use crate::core::activity::{ActivityLog, ActivityLogEntry};
use crate::core::artifact::ArtifactStore;
use crate::core::graph::{PlannedTask, TaskGraph};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the plan generator hands back for a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    #[serde(default, alias = "projectName")]
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<PlannedTask>,
    #[serde(default)]
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub tasks: TaskGraph,
    pub files: ArtifactStore,
    /// External packages the generated code relies on. Deduplicated, ordered.
    pub packages: Vec<String>,
    pub activity_log: ActivityLog,
    pub created_at: DateTime<Utc>,
    /// Bumped every time a snapshot is installed.
    #[serde(default)]
    pub revision: u64,
}

impl Project {
    pub fn new(name: &str, description: &str, tasks: TaskGraph) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.to_string(),
            description: description.to_string(),
            tasks,
            files: ArtifactStore::new(),
            packages: Vec::new(),
            activity_log: ActivityLog::new(),
            created_at: Utc::now(),
            revision: 0,
        }
    }

    /// Build a fresh project from a generated plan.
    ///
    /// Returns the project and any ingestion warnings (blocked tasks).
    pub fn from_plan(prompt: &str, draft: PlanDraft) -> Result<(Self, Vec<String>)> {
        let ingested = TaskGraph::from_plan(&draft.tasks)?;

        let name = match draft.name.trim() {
            "" => "Untitled project",
            name => name,
        };
        let mut project = Self::new(name, prompt, ingested.graph);
        for package in draft.packages {
            // Invalid names from the generator are dropped, not fatal.
            let _ = project.add_package(&package);
        }
        Ok((project, ingested.warnings))
    }

    pub fn log(&mut self, entry: ActivityLogEntry) {
        self.activity_log.append(entry);
    }

    /// Add a required package. Returns `false` if it was already listed.
    pub fn add_package(&mut self, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Package name is empty".to_string()));
        }
        if self.packages.iter().any(|p| p == name) {
            return Ok(false);
        }
        self.packages.push(name.to_string());
        Ok(true)
    }

    /// Remove a package. Returns `false` if it was not listed.
    pub fn remove_package(&mut self, name: &str) -> bool {
        let name = name.trim();
        let before = self.packages.len();
        self.packages.retain(|p| p != name);
        self.packages.len() != before
    }

    /// Drop repeated package names, keeping the first occurrence.
    pub(crate) fn dedupe_packages(&mut self) -> usize {
        let before = self.packages.len();
        let mut seen = std::collections::HashSet::new();
        self.packages.retain(|p| seen.insert(p.clone()));
        before - self.packages.len()
    }
}
