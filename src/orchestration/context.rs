//! Context assembly for task execution.

use crate::core::project::Project;
use crate::core::task::Task;

/// Build the context handed to the executor for `task`.
///
/// One block per dependency, in dependency order:
///
/// ```text
/// Task "<title>":
/// <output>
/// ```
///
/// Blocks are separated by a blank line. When the project already has files,
/// an `Existing Files:` listing follows. Dependencies that no longer resolve
/// are skipped.
pub fn assemble_context(project: &Project, task: &Task) -> String {
    let mut sections: Vec<String> = task
        .dependencies
        .iter()
        .filter_map(|dep| project.tasks.get(dep))
        .map(|dep| {
            format!(
                "Task \"{}\":\n{}",
                dep.title,
                dep.output.as_deref().unwrap_or_default()
            )
        })
        .collect();

    if !project.files.is_empty() {
        let listing: Vec<String> = project
            .files
            .paths()
            .map(|path| format!("- {}", path))
            .collect();
        sections.push(format!("Existing Files:\n{}", listing.join("\n")));
    }

    sections.join("\n\n")
}
