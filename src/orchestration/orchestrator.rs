//! The orchestrator: owns the current project snapshot and drives every
//! graph operation through the collaborators.
//!
//! Every mutation follows the same shape: take the current snapshot, clone
//! it, apply the change to the clone, and install the clone as the new
//! current snapshot. A failed change installs nothing. Installs happen under
//! a short write lock and are recomputed from whatever is current at that
//! moment, so an execution and a split running side by side never overwrite
//! each other. Each installed snapshot is auto-saved.
//!
//! At most one execution and at most one split may be in flight at a time;
//! the two categories do not block each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::Config;
use crate::core::activity::ActivityLogEntry;
use crate::core::artifact::{extract_files, ProjectFile};
use crate::core::project::{Project, ProjectId};
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::orchestration::collaborators::Collaborators;
use crate::orchestration::context::assemble_context;
use crate::orchestration::healing::{fix_task, RuntimeFault};
use crate::state::migration::{recover, RecoveryReport};
use crate::state::store::Persistence;
use crate::{clog, clog_debug, clog_error, clog_trace, clog_warn, Error, Result};

/// Marks an operation category as busy for as long as it is held.
struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, operation: &'static str) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy(operation))?;
        Ok(Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Result of running ready tasks until none are left.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: Vec<TaskId>,
}

pub struct Orchestrator {
    collaborators: Collaborators,
    store: Arc<dyn Persistence>,
    config: RwLock<Config>,
    current: RwLock<Option<Arc<Project>>>,
    executing: AtomicBool,
    splitting: AtomicBool,
    planning: AtomicBool,
    /// Project and revision of the last snapshot written to the store.
    saved: tokio::sync::Mutex<Option<(ProjectId, u64)>>,
}

impl Orchestrator {
    /// Load configuration and the persisted project, then run recovery.
    ///
    /// This is the only place the project is read from the store. The
    /// recovery report is `None` when no project was persisted.
    pub async fn start(
        collaborators: Collaborators,
        store: Arc<dyn Persistence>,
    ) -> Result<(Self, Option<RecoveryReport>)> {
        let config = store.load_config().await?.unwrap_or_default();
        let loaded = store.load_project().await?;

        let orchestrator = Self {
            collaborators,
            store,
            config: RwLock::new(config),
            current: RwLock::new(None),
            executing: AtomicBool::new(false),
            splitting: AtomicBool::new(false),
            planning: AtomicBool::new(false),
            saved: tokio::sync::Mutex::new(None),
        };

        let Some(mut project) = loaded else {
            clog_debug!("Orchestrator::start: no persisted project");
            return Ok((orchestrator, None));
        };

        let report = recover(&mut project);
        *orchestrator.saved.lock().await = Some((project.id, project.revision));

        if report.is_clean() {
            orchestrator.set_current(Some(Arc::new(project)));
        } else {
            project.revision += 1;
            let project = Arc::new(project);
            orchestrator.set_current(Some(project.clone()));
            orchestrator.persist(&project).await?;
        }

        Ok((orchestrator, Some(report)))
    }

    // ========== Queries ==========

    /// The current snapshot, if a project exists.
    pub fn snapshot(&self) -> Option<Arc<Project>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn project(&self) -> Result<Arc<Project>> {
        self.snapshot().ok_or(Error::NoProject)
    }

    /// Tasks that may run now, in list order.
    pub fn ready_tasks(&self) -> Vec<Task> {
        self.snapshot()
            .map(|p| p.tasks.ready_tasks().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    pub fn is_splitting(&self) -> bool {
        self.splitting.load(Ordering::Acquire)
    }

    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn update_config(&self, config: Config) -> Result<()> {
        self.store.save_config(&config).await?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        clog_debug!("Config updated");
        Ok(())
    }

    // ========== Snapshot plumbing ==========

    fn set_current(&self, project: Option<Arc<Project>>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = project;
    }

    /// Apply `change` to a clone of the current snapshot and install it.
    ///
    /// Nothing is installed if `change` fails.
    fn install<T>(&self, change: impl FnOnce(&mut Project) -> Result<T>) -> Result<(Arc<Project>, T)> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let base = current.as_ref().ok_or(Error::NoProject)?;

        let mut next = Project::clone(base);
        let out = change(&mut next)?;
        next.revision = base.revision + 1;

        let next = Arc::new(next);
        *current = Some(next.clone());
        clog_debug!("Installed snapshot revision {}", next.revision);
        Ok((next, out))
    }

    /// Write a snapshot unless a newer revision of the same project was
    /// already written.
    async fn persist(&self, snapshot: &Arc<Project>) -> Result<()> {
        let mut saved = self.saved.lock().await;
        if let Some((id, revision)) = *saved {
            if id == snapshot.id && revision >= snapshot.revision {
                clog_debug!(
                    "Skipping save of revision {} (revision {} already saved)",
                    snapshot.revision,
                    revision
                );
                return Ok(());
            }
        }

        self.store.save_project(snapshot).await.inspect_err(|e| {
            clog_error!("Failed to save revision {}: {}", snapshot.revision, e);
        })?;
        *saved = Some((snapshot.id, snapshot.revision));
        Ok(())
    }

    /// Install and auto-save.
    async fn commit<T>(&self, change: impl FnOnce(&mut Project) -> Result<T>) -> Result<T> {
        let (snapshot, out) = self.install(change)?;
        self.persist(&snapshot).await?;
        Ok(out)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_executing() {
            return Err(Error::Busy("execution"));
        }
        if self.is_splitting() {
            return Err(Error::Busy("split"));
        }
        if self.planning.load(Ordering::Acquire) {
            return Err(Error::Busy("plan generation"));
        }
        Ok(())
    }

    // ========== Plan generation ==========

    /// Ask the plan generator for a plan and install it as a new project.
    ///
    /// Fails if a project already exists; call [`Orchestrator::reset`] first.
    pub async fn generate_plan(&self, prompt: &str) -> Result<Arc<Project>> {
        self.ensure_idle()?;
        let _guard = InFlight::acquire(&self.planning, "plan generation")?;

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::Validation("Prompt is empty".to_string()));
        }
        if self.snapshot().is_some() {
            return Err(Error::Validation(
                "A project already exists; reset it before generating a new plan".to_string(),
            ));
        }

        let config = self.config();
        clog_debug!("Requesting plan for prompt ({} chars)", prompt.len());
        let draft = self
            .collaborators
            .planner
            .generate(prompt, &config)
            .await
            .inspect_err(|e| clog_error!("Plan generation failed: {}", e))?;

        if draft.tasks.is_empty() {
            clog_error!("Plan generator returned an empty plan");
            return Err(Error::EmptyPlan);
        }

        let (project, warnings) = Project::from_plan(prompt, draft)?;
        for warning in &warnings {
            clog_warn!("Plan ingestion: {}", warning);
        }
        clog!(
            "Plan ingested: '{}' with {} tasks, {} packages",
            project.name,
            project.tasks.len(),
            project.packages.len()
        );

        let project = Arc::new(project);
        self.set_current(Some(project.clone()));
        self.persist(&project).await?;
        Ok(project)
    }

    /// Drop the current project and clear it from the store.
    pub async fn reset(&self) -> Result<()> {
        self.ensure_idle()?;
        self.store.clear_project().await?;
        self.set_current(None);
        *self.saved.lock().await = None;
        clog!("Project reset");
        Ok(())
    }

    // ========== Execution ==========

    /// Drive one ready task through the executor.
    ///
    /// On success the task is `completed` with the raw response as output and
    /// its files merged into the artifact store. On failure the task is
    /// `failed`, the error is logged on the project, and the error is returned.
    ///
    /// A failed task whose dependencies are completed may be passed here to
    /// run it again. Nothing retries on its own.
    pub async fn execute_task(&self, id: &TaskId) -> Result<Task> {
        let _guard = InFlight::acquire(&self.executing, "execution")?;

        let (snapshot, task) = self.install(|project| {
            let status = project.tasks.require(id)?.status;
            if !project.tasks.is_ready(id) && !project.tasks.is_retryable(id) {
                return Err(Error::TaskNotReady {
                    id: id.to_string(),
                    status: status.to_string(),
                });
            }
            let task = project.tasks.require_mut(id)?;
            task.start();
            let task = task.clone();
            project.log(ActivityLogEntry::started(&task));
            Ok(task)
        })?;
        clog!("Task started: '{}' ({})", task.title, id.short());

        let outcome = match self.persist(&snapshot).await {
            Ok(()) => self.run_executor(&snapshot, &task).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok((raw, files)) => self.finish_completed(id, raw, files).await,
            Err(error) => {
                if let Err(save_error) = self.finish_failed(id, &error).await {
                    clog_error!(
                        "Could not save failure of {}: {}",
                        id.short(),
                        save_error
                    );
                }
                Err(error)
            }
        }
    }

    /// Execute the first ready task in list order, if any.
    pub async fn execute_next(&self) -> Result<Option<Task>> {
        let Some(next) = self.ready_tasks().into_iter().next() else {
            return Ok(None);
        };
        self.execute_task(&next.id).await.map(Some)
    }

    /// Execute ready tasks one at a time until none remain.
    ///
    /// Stops at the first failure and returns its error.
    pub async fn run_all(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        while let Some(task) = self.execute_next().await? {
            summary.completed.push(task.id);
        }
        clog!("Run finished: {} task(s) completed", summary.completed.len());
        Ok(summary)
    }

    async fn run_executor(
        &self,
        snapshot: &Project,
        task: &Task,
    ) -> Result<(String, Vec<ProjectFile>)> {
        let context = assemble_context(snapshot, task);
        let config = self.config();
        clog_debug!(
            "Executing '{}' as {} with {} chars of context",
            task.title,
            task.agent_role,
            context.len()
        );

        let raw = self
            .collaborators
            .executor
            .execute(task, &context, &snapshot.packages, &config)
            .await?;
        clog_trace!("Executor response for {}:\n{}", task.id.short(), raw);

        let files = extract_files(&raw);
        Ok((raw, files))
    }

    async fn finish_completed(
        &self,
        id: &TaskId,
        raw: String,
        files: Vec<ProjectFile>,
    ) -> Result<Task> {
        let file_count = files.len();
        let task = self
            .commit(|project| {
                project.files.merge(files);
                let task = project.tasks.require_mut(id)?;
                task.complete(raw);
                let task = task.clone();
                let output = task.output.as_deref().unwrap_or_default();
                project.log(ActivityLogEntry::completed(&task, output));
                Ok(task)
            })
            .await?;
        clog!(
            "Task completed: '{}' ({}), {} file(s) written",
            task.title,
            id.short(),
            file_count
        );
        Ok(task)
    }

    async fn finish_failed(&self, id: &TaskId, error: &Error) -> Result<()> {
        clog_error!("Task failed: {}: {}", id.short(), error);
        self.commit(|project| {
            let task = project.tasks.require_mut(id)?;
            if task.status == TaskStatus::InProgress {
                task.fail();
            }
            let task = task.clone();
            project.log(ActivityLogEntry::failed(&task, &error.to_string()));
            Ok(())
        })
        .await
    }

    // ========== Split ==========

    /// Replace a pending task with the decomposer's subtasks.
    ///
    /// A "Decomposing" entry is logged up front. If the decomposer fails,
    /// returns nothing, or the task stopped being pending in the meantime, the
    /// graph is left as it was apart from that entry.
    pub async fn split_task(&self, id: &TaskId) -> Result<Vec<TaskId>> {
        let _guard = InFlight::acquire(&self.splitting, "split")?;

        let task = self
            .commit(|project| {
                let task = project.tasks.require(id)?.clone();
                if task.status != TaskStatus::Pending {
                    return Err(Error::TaskNotSplittable {
                        id: id.to_string(),
                        status: task.status.to_string(),
                    });
                }
                project.log(ActivityLogEntry::split(&task, "Decomposing into subtasks..."));
                Ok(task)
            })
            .await?;
        clog!("Split started: '{}' ({})", task.title, id.short());

        let config = self.config();
        let drafts = self
            .collaborators
            .decomposer
            .decompose(&task, &config)
            .await
            .inspect_err(|e| clog_error!("Decomposition of {} failed: {}", id.short(), e))?;

        if drafts.is_empty() {
            clog_error!("Decomposition of {} returned no subtasks", id.short());
            return Err(Error::EmptyDecomposition {
                task_id: id.to_string(),
            });
        }

        let ids = self
            .commit(|project| {
                let ids = project.tasks.split(id, &drafts)?;
                project.log(ActivityLogEntry::split(
                    &task,
                    &format!("Successfully split into {} subtasks", ids.len()),
                ));
                Ok(ids)
            })
            .await
            .inspect_err(|e| clog_warn!("Split of {} not applied: {}", id.short(), e))?;

        clog!("Split '{}' into {} subtasks", task.title, ids.len());
        Ok(ids)
    }

    // ========== Editing ==========

    /// Change a pending task's title and/or description.
    pub async fn edit_task(
        &self,
        id: &TaskId,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Task> {
        if title.is_none() && description.is_none() {
            return Err(Error::Validation("Nothing to edit".to_string()));
        }
        let task = self
            .commit(|project| {
                project.tasks.edit(id, title, description)?;
                Ok(project.tasks.require(id)?.clone())
            })
            .await?;
        clog!("Task edited: {}", id.short());
        Ok(task)
    }

    /// Returns `false` without saving if the package is already listed.
    pub async fn add_package(&self, name: &str) -> Result<bool> {
        let listed = self
            .project()?
            .packages
            .iter()
            .any(|p| p == name.trim());
        if listed {
            return Ok(false);
        }
        let added = self.commit(|project| project.add_package(name)).await?;
        if added {
            clog!("Package added: {}", name.trim());
        }
        Ok(added)
    }

    /// Returns `false` without saving if the package was not listed.
    pub async fn remove_package(&self, name: &str) -> Result<bool> {
        let listed = self
            .project()?
            .packages
            .iter()
            .any(|p| p == name.trim());
        if !listed {
            return Ok(false);
        }
        let removed = self
            .commit(|project| Ok(project.remove_package(name)))
            .await?;
        clog!("Package removed: {}", name.trim());
        Ok(removed)
    }

    // ========== Self-healing ==========

    /// Append a fix task for a runtime fault reported by the preview.
    pub async fn report_runtime_fault(&self, fault: &RuntimeFault) -> Result<Task> {
        let task = self
            .commit(|project| {
                let task = fix_task(&project.tasks, fault);
                project.log(ActivityLogEntry::split(
                    &task,
                    "Created fix task from runtime error",
                ));
                project.tasks.push(task.clone());
                Ok(task)
            })
            .await?;
        clog!("Fix task created: '{}' ({})", task.title, task.id.short());
        Ok(task)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("revision", &self.snapshot().map(|p| p.revision))
            .field("executing", &self.is_executing())
            .field("splitting", &self.is_splitting())
            .finish()
    }
}
