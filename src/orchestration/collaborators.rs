//! Seams to the external systems the orchestrator drives.
//!
//! Plan generation, task execution and task decomposition are performed by
//! collaborators (typically an LLM). The orchestrator only relies on the
//! contracts below, so any implementation can be swapped in.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::core::graph::SubtaskDraft;
use crate::core::project::PlanDraft;
use crate::core::task::Task;
use crate::Result;

/// Turns a natural-language prompt into a plan.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Should fail with `Error::EmptyPlan` when the plan has no tasks; the
    /// orchestrator re-checks either way.
    async fn generate(&self, prompt: &str, config: &Config) -> Result<PlanDraft>;
}

/// Runs one task and returns the raw response text.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// `context` is the assembled dependency output and file listing. The
    /// response may embed any number of `<file path="...">` blocks.
    async fn execute(
        &self,
        task: &Task,
        context: &str,
        packages: &[String],
        config: &Config,
    ) -> Result<String>;
}

/// Breaks one task into an ordered list of smaller ones.
#[async_trait]
pub trait TaskDecomposer: Send + Sync {
    async fn decompose(&self, task: &Task, config: &Config) -> Result<Vec<SubtaskDraft>>;
}

/// The set of collaborators an orchestrator works with.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn PlanGenerator>,
    pub executor: Arc<dyn TaskExecutor>,
    pub decomposer: Arc<dyn TaskDecomposer>,
}

impl Collaborators {
    pub fn new(
        planner: Arc<dyn PlanGenerator>,
        executor: Arc<dyn TaskExecutor>,
        decomposer: Arc<dyn TaskDecomposer>,
    ) -> Self {
        Self {
            planner,
            executor,
            decomposer,
        }
    }

    /// Use one value for all three roles.
    pub fn shared<C>(collaborator: Arc<C>) -> Self
    where
        C: PlanGenerator + TaskExecutor + TaskDecomposer + 'static,
    {
        Self {
            planner: collaborator.clone(),
            executor: collaborator.clone(),
            decomposer: collaborator,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
