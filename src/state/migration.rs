//! Versioned schema loading and startup recovery for persisted projects.
//!
//! Persisted documents are wrapped in an envelope carrying a schema version:
//!
//! ```json
//! { "version": 2, "project": { ... } }
//! ```
//!
//! Documents without an envelope are the legacy (version 1) shape: a bare
//! project that may lack `activity_log` and `packages`. They are upgraded
//! here so business logic never sees a partially-populated project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::activity::ActivityLog;
use crate::core::artifact::ArtifactStore;
use crate::core::graph::TaskGraph;
use crate::core::project::{Project, ProjectId};
use crate::core::task::TaskId;
use crate::{clog, clog_debug, clog_warn, Error, Result};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    project: &'a Project,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    project: Value,
}

/// Legacy project shape, before the audit log and package list existed.
#[derive(Deserialize)]
struct ProjectV1 {
    id: ProjectId,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tasks: TaskGraph,
    #[serde(default)]
    files: ArtifactStore,
    #[serde(default)]
    packages: Option<Vec<String>>,
    #[serde(default)]
    activity_log: Option<ActivityLog>,
    created_at: DateTime<Utc>,
}

impl From<ProjectV1> for Project {
    fn from(v1: ProjectV1) -> Self {
        let mut project = Project {
            id: v1.id,
            name: v1.name,
            description: v1.description,
            tasks: v1.tasks,
            files: v1.files,
            packages: v1.packages.unwrap_or_default(),
            activity_log: v1.activity_log.unwrap_or_default(),
            created_at: v1.created_at,
            revision: 0,
        };
        let dropped_packages = project.dedupe_packages();
        let dropped_files = project.files.normalize();
        if dropped_packages + dropped_files > 0 {
            clog_debug!(
                "Upgraded v1 project: dropped {} duplicate packages, {} duplicate files",
                dropped_packages,
                dropped_files
            );
        }
        project
    }
}

/// Serialize a project in the current schema.
pub fn encode_project(project: &Project) -> Result<String> {
    Ok(serde_json::to_string_pretty(&EnvelopeRef {
        version: SCHEMA_VERSION,
        project,
    })?)
}

/// Deserialize a project from any supported schema version.
pub fn decode_project(contents: &str) -> Result<Project> {
    let value: Value = serde_json::from_str(contents)?;

    let is_envelope = value
        .as_object()
        .map(|obj| obj.contains_key("version") && obj.contains_key("project"))
        .unwrap_or(false);

    if !is_envelope {
        clog_debug!("decode_project: unversioned document, loading as v1");
        let v1: ProjectV1 = serde_json::from_value(value)?;
        return Ok(v1.into());
    }

    let envelope: Envelope = serde_json::from_value(value)?;
    match envelope.version {
        1 => {
            let v1: ProjectV1 = serde_json::from_value(envelope.project)?;
            Ok(v1.into())
        }
        SCHEMA_VERSION => Ok(serde_json::from_value(envelope.project)?),
        other => Err(Error::Validation(format!(
            "Unsupported project schema version {} (this build reads up to {})",
            other, SCHEMA_VERSION
        ))),
    }
}

/// What recovery changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Tasks whose stale `in_progress` marker was reset to `pending`.
    pub reset_tasks: Vec<TaskId>,
    pub warnings: Vec<String>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.reset_tasks.is_empty()
    }
}

/// Normalize a freshly loaded project before any graph operation runs.
///
/// No execution survives a restart, so every `in_progress` task goes back to
/// `pending`. Nothing else is touched: dependency integrity and acyclicity are
/// not re-validated here.
pub fn recover(project: &mut Project) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    for task in project.tasks.iter_mut() {
        if task.reset_if_in_progress() {
            clog_warn!(
                "Recovery: task '{}' ({}) was in progress at shutdown, reset to pending",
                task.title,
                task.id.short()
            );
            report.warnings.push(format!(
                "Task '{}' was in progress when the last session ended; reset to pending",
                task.title
            ));
            report.reset_tasks.push(task.id);
        }
    }

    if report.is_clean() {
        clog_debug!("Recovery: project '{}' needed no changes", project.name);
    } else {
        clog!(
            "Recovery: reset {} in-progress task(s) in project '{}'",
            report.reset_tasks.len(),
            project.name
        );
    }
    report
}
