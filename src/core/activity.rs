//! Append-only audit log of graph mutations.

use crate::core::task::{Task, TaskId};
use crate::util::truncate_chars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum characters of task output kept in a completion entry.
pub const COMPLETION_DETAILS_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Started,
    Completed,
    Failed,
    Split,
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityStatus::Started => write!(f, "started"),
            ActivityStatus::Completed => write!(f, "completed"),
            ActivityStatus::Failed => write!(f, "failed"),
            ActivityStatus::Split => write!(f, "split"),
        }
    }
}

/// One audit event. The title is captured at event time, so later edits or
/// splits never change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub task_id: TaskId,
    pub task_title: String,
    pub timestamp: DateTime<Utc>,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ActivityLogEntry {
    pub fn new(task: &Task, status: ActivityStatus, details: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            task_title: task.title.clone(),
            timestamp: Utc::now(),
            status,
            details,
        }
    }

    pub fn started(task: &Task) -> Self {
        Self::new(task, ActivityStatus::Started, None)
    }

    /// Completion entry carrying a truncated preview of the output.
    pub fn completed(task: &Task, output: &str) -> Self {
        Self::new(
            task,
            ActivityStatus::Completed,
            Some(truncate_chars(output, COMPLETION_DETAILS_CHARS)),
        )
    }

    pub fn failed(task: &Task, error: &str) -> Self {
        Self::new(task, ActivityStatus::Failed, Some(error.to_string()))
    }

    pub fn split(task: &Task, details: &str) -> Self {
        Self::new(task, ActivityStatus::Split, Some(details.to_string()))
    }
}

/// The project's audit log. Entries are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLog {
    entries: Vec<ActivityLogEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, entry: ActivityLogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ActivityLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ActivityLogEntry> {
        self.entries.last()
    }

    /// Most recent `limit` entries, oldest first.
    pub fn tail(&self, limit: usize) -> &[ActivityLogEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }

    pub fn for_task<'a>(&'a self, id: &'a TaskId) -> impl Iterator<Item = &'a ActivityLogEntry> {
        self.entries.iter().filter(move |e| e.task_id == *id)
    }
}
