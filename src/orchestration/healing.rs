//! Fix tasks synthesized from runtime faults reported by the preview sandbox.

use serde::{Deserialize, Serialize};

use crate::core::graph::TaskGraph;
use crate::core::task::{AgentRole, Task};
use crate::util::truncate_chars;

const TITLE_PREFIX_CHARS: usize = 30;

/// A runtime error observed while running the generated project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFault {
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

impl RuntimeFault {
    pub fn new(message: &str, stack: &str) -> Self {
        Self {
            message: message.to_string(),
            stack: stack.to_string(),
        }
    }
}

/// Build a pending fix task for `fault`.
///
/// The task depends on the last completed task in list order, or on nothing
/// if no task has completed yet.
pub fn fix_task(graph: &TaskGraph, fault: &RuntimeFault) -> Task {
    let first_line = fault.message.lines().next().unwrap_or_default().trim();
    let title = format!("Fix: {}", truncate_chars(first_line, TITLE_PREFIX_CHARS));

    let stack = if fault.stack.trim().is_empty() {
        "(no stack trace available)"
    } else {
        fault.stack.trim()
    };
    let description = format!(
        "The application threw a runtime error.\n\n\
         Error message:\n{}\n\n\
         Stack trace:\n{}\n\n\
         Locate the code responsible for this error in the existing files and patch it. \
         Return the complete corrected contents of every file you change.",
        fault.message.trim(),
        stack
    );

    let dependencies = graph
        .last_completed()
        .map(|t| vec![t.id])
        .unwrap_or_default();

    Task::new(&title, &description, AgentRole::Developer).with_dependencies(dependencies)
}
