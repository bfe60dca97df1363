//! Task graph: the ordered task list and its dependency edges.
//!
//! Edges live on each task as an ordered list of dependency IDs, and list
//! order is preserved across every mutation. `petgraph` is only used to
//! validate acyclicity when a plan is ingested.

use crate::core::task::{AgentRole, Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One task of a generated plan, before it receives a real ID.
///
/// `key` is whatever identifier the plan generator chose; `dependencies`
/// refer to other tasks of the same plan by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    #[serde(alias = "id")]
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "agentRole")]
    pub agent_role: Option<AgentRole>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// One replacement task produced by the decomposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "agentRole")]
    pub agent_role: Option<AgentRole>,
}

impl SubtaskDraft {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            agent_role: None,
        }
    }
}

/// Result of ingesting a plan.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub graph: TaskGraph,
    /// Human-readable notes about tasks that were blocked during ingestion.
    pub warnings: Vec<String>,
}

/// The project's tasks in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Build a graph from a generated plan.
    ///
    /// Keys are mapped onto fresh task IDs. A task naming a key that is not part
    /// of the plan keeps its known dependencies and is marked `Blocked`, since the
    /// missing one can never complete.
    ///
    /// # Errors
    /// - `EmptyPlan` if the plan has no tasks
    /// - `Validation` on duplicate or empty keys
    /// - `DependencyCycle` if the dependencies form a cycle (including self-loops)
    pub fn from_plan(planned: &[PlannedTask]) -> Result<Ingested> {
        if planned.is_empty() {
            return Err(Error::EmptyPlan);
        }

        let mut ids: HashMap<&str, TaskId> = HashMap::with_capacity(planned.len());
        for p in planned {
            let key = p.key.trim();
            if key.is_empty() {
                return Err(Error::Validation(format!(
                    "Planned task '{}' has an empty key",
                    p.title
                )));
            }
            if ids.insert(key, TaskId::new()).is_some() {
                return Err(Error::Validation(format!(
                    "Duplicate task key in plan: {}",
                    key
                )));
            }
        }

        let mut warnings = Vec::new();
        let mut tasks = Vec::with_capacity(planned.len());

        for p in planned {
            let key = p.key.trim();
            let mut task = Task::new(&p.title, &p.description, p.agent_role.unwrap_or_default());
            task.id = ids[key];

            let mut unknown = Vec::new();
            for dep in &p.dependencies {
                let dep = dep.trim();
                if dep == key {
                    return Err(Error::DependencyCycle(p.title.clone()));
                }
                match ids.get(dep) {
                    Some(dep_id) if !task.dependencies.contains(dep_id) => {
                        task.dependencies.push(*dep_id);
                    }
                    Some(_) => {}
                    None => unknown.push(dep.to_string()),
                }
            }

            if !unknown.is_empty() {
                task.block();
                warnings.push(format!(
                    "Task '{}' depends on unknown task(s) {}; marked blocked",
                    p.title,
                    unknown.join(", ")
                ));
            }

            tasks.push(task);
        }

        let graph = Self::from_tasks(tasks);
        graph.check_acyclic()?;
        Ok(Ingested { graph, warnings })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == *id)
    }

    /// Like `get`, but a missing task is an error.
    pub fn require(&self, id: &TaskId) -> Result<&Task> {
        self.get(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    pub fn require_mut(&mut self, id: &TaskId) -> Result<&mut Task> {
        self.get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.get(id).is_some()
    }

    /// Append a task at the end of the list.
    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Resolve a full task ID or a unique prefix of one.
    pub fn resolve(&self, query: &str) -> Result<TaskId> {
        let query = query.trim().to_ascii_lowercase();
        if query.is_empty() {
            return Err(Error::Validation("Empty task reference".to_string()));
        }

        let matches: Vec<TaskId> = self
            .tasks
            .iter()
            .map(|t| t.id)
            .filter(|id| id.to_string().starts_with(&query))
            .collect();

        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(Error::TaskNotFound(query)),
            _ => Err(Error::Validation(format!(
                "Task reference '{}' is ambiguous ({} matches)",
                query,
                matches.len()
            ))),
        }
    }

    // ========== Readiness ==========

    /// Tasks that may run now, in list order.
    ///
    /// A task is ready iff it is `Pending` and every dependency resolves to a
    /// `Completed` task. A dependency that does not resolve is unsatisfied.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        let statuses = self.status_index();
        self.tasks
            .iter()
            .filter(|task| Self::ready_in(task, &statuses))
            .collect()
    }

    pub fn is_ready(&self, id: &TaskId) -> bool {
        let statuses = self.status_index();
        self.get(id)
            .map(|task| Self::ready_in(task, &statuses))
            .unwrap_or(false)
    }

    /// A failed task whose dependencies are all completed may be run again
    /// on request. It is never reported by `ready_tasks`.
    pub fn is_retryable(&self, id: &TaskId) -> bool {
        let statuses = self.status_index();
        self.get(id)
            .map(|task| {
                task.status == TaskStatus::Failed && Self::dependencies_met(task, &statuses)
            })
            .unwrap_or(false)
    }

    fn status_index(&self) -> HashMap<TaskId, TaskStatus> {
        self.tasks.iter().map(|t| (t.id, t.status)).collect()
    }

    fn ready_in(task: &Task, statuses: &HashMap<TaskId, TaskStatus>) -> bool {
        task.status == TaskStatus::Pending && Self::dependencies_met(task, statuses)
    }

    fn dependencies_met(task: &Task, statuses: &HashMap<TaskId, TaskStatus>) -> bool {
        task.dependencies
            .iter()
            .all(|dep| statuses.get(dep) == Some(&TaskStatus::Completed))
    }

    /// The completed task that appears last in list order.
    pub fn last_completed(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .rev()
            .find(|t| t.status == TaskStatus::Completed)
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// Dependency IDs that do not resolve to any task in the graph.
    pub fn dangling_dependencies(&self) -> Vec<(TaskId, TaskId)> {
        let known: HashSet<TaskId> = self.tasks.iter().map(|t| t.id).collect();
        self.tasks
            .iter()
            .flat_map(|t| {
                t.dependencies
                    .iter()
                    .filter(|dep| !known.contains(dep))
                    .map(move |dep| (t.id, *dep))
            })
            .collect()
    }

    // ========== Validation ==========

    /// Verify the dependency edges form a DAG.
    ///
    /// Dependencies on unknown IDs are ignored here; they are a readiness
    /// concern, not a cycle.
    pub fn check_acyclic(&self) -> Result<()> {
        let mut graph: DiGraph<&Task, ()> = DiGraph::new();
        let index: HashMap<TaskId, NodeIndex> = self
            .tasks
            .iter()
            .map(|task| (task.id, graph.add_node(task)))
            .collect();

        for task in &self.tasks {
            for dep in &task.dependencies {
                if let Some(&from) = index.get(dep) {
                    graph.add_edge(from, index[&task.id], ());
                }
            }
        }

        toposort(&graph, None).map(|_| ()).map_err(|cycle| {
            let title = graph
                .node_weight(cycle.node_id())
                .map(|t| t.title.clone())
                .unwrap_or_else(|| "unknown".to_string());
            Error::DependencyCycle(title)
        })
    }

    // ========== Mutations ==========

    /// Change a pending task's title and/or description.
    pub fn edit(
        &mut self,
        id: &TaskId,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        let task = self.require_mut(id)?;
        if !task.is_editable() {
            return Err(Error::TaskNotEditable {
                id: id.to_string(),
                status: task.status.to_string(),
            });
        }
        if let Some(title) = title {
            task.title = title.to_string();
        }
        if let Some(description) = description {
            task.description = description.to_string();
        }
        Ok(())
    }

    /// Replace task `id` with a linear chain of subtasks and rewire its dependents.
    ///
    /// The first subtask inherits the original dependencies, each later one
    /// depends only on its predecessor, and every task that depended on `id`
    /// now depends on the last subtask. The chain is appended after the
    /// remaining tasks. Returns the new IDs in chain order.
    ///
    /// The graph is left untouched on error.
    pub fn split(&mut self, id: &TaskId, drafts: &[SubtaskDraft]) -> Result<Vec<TaskId>> {
        if drafts.is_empty() {
            return Err(Error::EmptyDecomposition {
                task_id: id.to_string(),
            });
        }

        let position = self
            .tasks
            .iter()
            .position(|t| t.id == *id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        if self.tasks[position].status != TaskStatus::Pending {
            return Err(Error::TaskNotSplittable {
                id: id.to_string(),
                status: self.tasks[position].status.to_string(),
            });
        }

        let original = self.tasks.remove(position);

        let mut chain: Vec<Task> = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let dependencies = match chain.last() {
                Some(prev) => vec![prev.id],
                None => original.dependencies.clone(),
            };
            chain.push(
                Task::new(
                    &draft.title,
                    &draft.description,
                    draft.agent_role.unwrap_or_default(),
                )
                .with_dependencies(dependencies),
            );
        }

        let new_ids: Vec<TaskId> = chain.iter().map(|t| t.id).collect();
        let tail = new_ids[new_ids.len() - 1];

        for task in &mut self.tasks {
            for dep in task.dependencies.iter_mut() {
                if *dep == original.id {
                    *dep = tail;
                }
            }
        }

        self.tasks.extend(chain);
        Ok(new_ids)
    }
}
