//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted collaborator that plays planner, executor and decomposer
//! - Predefined plans
//! - Starting (and restarting) an orchestrator over an in-memory store

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use conductor::config::Config;
use conductor::core::{PlanDraft, SubtaskDraft, Task, TaskId};
use conductor::orchestration::{
    Collaborators, Orchestrator, PlanGenerator, TaskDecomposer, TaskExecutor,
};
use conductor::state::{MemoryStore, Persistence, RecoveryReport};
use conductor::{Error, Result};

/// One call the executor received.
#[derive(Debug, Clone)]
pub struct ExecuteCall {
    pub task_id: TaskId,
    pub title: String,
    pub context: String,
    pub packages: Vec<String>,
}

/// Pauses the executor until the test releases it.
#[derive(Debug, Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// A collaborator driven entirely by test data.
///
/// Execution answers with a per-title scripted response, or
/// `done: <title>` when none is scripted. Failures are injected per title.
#[derive(Default)]
pub struct Scripted {
    plan: Mutex<Option<PlanDraft>>,
    responses: Mutex<HashMap<String, String>>,
    execution_failures: Mutex<HashMap<String, String>>,
    decompositions: Mutex<HashMap<String, Vec<SubtaskDraft>>>,
    decomposition_failures: Mutex<HashMap<String, String>>,
    execution_gate: Mutex<Option<Arc<Gate>>>,
    decomposition_gate: Mutex<Option<Arc<Gate>>>,
    pub executed: Mutex<Vec<ExecuteCall>>,
    pub decomposed: Mutex<Vec<TaskId>>,
    pub planned: Mutex<Vec<String>>,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_plan(plan: PlanDraft) -> Arc<Self> {
        let scripted = Self::default();
        *scripted.plan.lock().unwrap() = Some(plan);
        Arc::new(scripted)
    }

    pub fn respond(&self, title: &str, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(title.to_string(), response.to_string());
    }

    pub fn fail_execution(&self, title: &str, message: &str) {
        self.execution_failures
            .lock()
            .unwrap()
            .insert(title.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.execution_failures.lock().unwrap().clear();
    }

    pub fn decompose_into(&self, title: &str, subtasks: &[&str]) {
        let drafts = subtasks
            .iter()
            .map(|t| SubtaskDraft::new(t, &format!("Part of {}", title)))
            .collect();
        self.decompositions
            .lock()
            .unwrap()
            .insert(title.to_string(), drafts);
    }

    pub fn fail_decomposition(&self, title: &str, message: &str) {
        self.decomposition_failures
            .lock()
            .unwrap()
            .insert(title.to_string(), message.to_string());
    }

    pub fn gate_execution(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.execution_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn gate_decomposition(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.decomposition_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn executed_titles(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.title.clone())
            .collect()
    }

    pub fn last_call(&self) -> ExecuteCall {
        self.executed
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("executor was never called")
    }
}

async fn pass_gate(gate: Option<Arc<Gate>>) {
    if let Some(gate) = gate {
        gate.entered.notify_one();
        gate.release.notified().await;
    }
}

#[async_trait]
impl PlanGenerator for Scripted {
    async fn generate(&self, prompt: &str, _config: &Config) -> Result<PlanDraft> {
        self.planned.lock().unwrap().push(prompt.to_string());
        let plan = self.plan.lock().unwrap().clone();
        plan.ok_or_else(|| Error::Collaborator("no plan scripted".to_string()))
    }
}

#[async_trait]
impl TaskExecutor for Scripted {
    async fn execute(
        &self,
        task: &Task,
        context: &str,
        packages: &[String],
        _config: &Config,
    ) -> Result<String> {
        self.executed.lock().unwrap().push(ExecuteCall {
            task_id: task.id,
            title: task.title.clone(),
            context: context.to_string(),
            packages: packages.to_vec(),
        });

        let gate = self.execution_gate.lock().unwrap().clone();
        pass_gate(gate).await;

        if let Some(message) = self.execution_failures.lock().unwrap().get(&task.title) {
            return Err(Error::Collaborator(message.clone()));
        }
        let response = self.responses.lock().unwrap().get(&task.title).cloned();
        Ok(response.unwrap_or_else(|| format!("done: {}", task.title)))
    }
}

#[async_trait]
impl TaskDecomposer for Scripted {
    async fn decompose(&self, task: &Task, _config: &Config) -> Result<Vec<SubtaskDraft>> {
        self.decomposed.lock().unwrap().push(task.id);

        let gate = self.decomposition_gate.lock().unwrap().clone();
        pass_gate(gate).await;

        if let Some(message) = self.decomposition_failures.lock().unwrap().get(&task.title) {
            return Err(Error::Collaborator(message.clone()));
        }
        let drafts = self.decompositions.lock().unwrap().get(&task.title).cloned();
        Ok(drafts.unwrap_or_default())
    }
}

// ========== Plans ==========

pub fn plan(value: serde_json::Value) -> PlanDraft {
    serde_json::from_value(value).expect("fixture plan should deserialize")
}

/// Models -> API -> UI
pub fn linear_plan() -> PlanDraft {
    plan(json!({
        "name": "Todo app",
        "packages": ["react"],
        "tasks": [
            {"id": "models", "title": "Models", "agentRole": "architect"},
            {"id": "api", "title": "API", "dependencies": ["models"]},
            {"id": "ui", "title": "UI", "dependencies": ["api"]}
        ]
    }))
}

/// Base fans out to Left and Right, which join in Top.
pub fn diamond_plan() -> PlanDraft {
    plan(json!({
        "name": "Diamond",
        "tasks": [
            {"id": "base", "title": "Base"},
            {"id": "left", "title": "Left", "dependencies": ["base"]},
            {"id": "right", "title": "Right", "dependencies": ["base"]},
            {"id": "top", "title": "Top", "dependencies": ["left", "right"]}
        ]
    }))
}

// ========== Orchestrator harness ==========

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub scripted: Arc<Scripted>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub async fn new(scripted: Arc<Scripted>) -> Self {
        Self::with_store(scripted, Arc::new(MemoryStore::new()))
            .await
            .0
    }

    /// Start with a plan already generated.
    pub async fn planned(plan: PlanDraft) -> Self {
        let harness = Self::new(Scripted::with_plan(plan)).await;
        harness
            .orchestrator
            .generate_plan("build it")
            .await
            .expect("fixture plan should ingest");
        harness
    }

    pub async fn with_store(
        scripted: Arc<Scripted>,
        store: Arc<MemoryStore>,
    ) -> (Self, Option<RecoveryReport>) {
        let persistence: Arc<dyn Persistence> = store.clone();
        let (orchestrator, report) =
            Orchestrator::start(Collaborators::shared(scripted.clone()), persistence)
                .await
                .expect("orchestrator should start");
        (
            Self {
                orchestrator,
                scripted,
                store,
            },
            report,
        )
    }

    /// Simulate a process restart over the same store.
    pub async fn restart(self) -> (Self, Option<RecoveryReport>) {
        let Self { scripted, store, .. } = self;
        Self::with_store(scripted, store).await
    }

    pub fn id_of(&self, title: &str) -> TaskId {
        self.orchestrator
            .project()
            .unwrap()
            .tasks
            .iter()
            .find(|t| t.title == title)
            .map(|t| t.id)
            .unwrap_or_else(|| panic!("no task titled {title}"))
    }

    pub fn task(&self, title: &str) -> Task {
        let id = self.id_of(title);
        self.orchestrator
            .project()
            .unwrap()
            .tasks
            .get(&id)
            .cloned()
            .unwrap()
    }

    pub fn titles(&self) -> Vec<String> {
        self.orchestrator
            .project()
            .unwrap()
            .tasks
            .iter()
            .map(|t| t.title.clone())
            .collect()
    }

    pub fn ready_titles(&self) -> Vec<String> {
        self.orchestrator
            .ready_tasks()
            .into_iter()
            .map(|t| t.title)
            .collect()
    }
}
