//! Collaborators backed by the Claude Code CLI in headless mode.
//!
//! Every request runs `claude -p <prompt> --output-format json` and reads the
//! `result` field of the JSON reply. Plans and decompositions are then pulled
//! out of that text with [`parse_structured`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::Config;
use crate::core::graph::SubtaskDraft;
use crate::core::project::PlanDraft;
use crate::core::task::{AgentRole, Task};
use crate::orchestration::collaborators::{PlanGenerator, TaskDecomposer, TaskExecutor};
use crate::orchestration::parse::parse_structured;
use crate::{clog_debug, clog_error, Error, Result};

/// Outcome reported by the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultType {
    Success { output: String },
    Error { message: String },
}

#[derive(Debug, Clone)]
pub struct ClaudeResponse {
    pub session_id: Option<String>,
    pub result: ResultType,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
}

impl ClaudeResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.result, ResultType::Success { .. })
    }

    /// The output text, or a `Collaborator` error carrying the CLI's message.
    pub fn into_output(self) -> Result<String> {
        match self.result {
            ResultType::Success { output } => Ok(output),
            ResultType::Error { message } => Err(Error::Collaborator(message)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaudeResponse {
    subtype: Option<String>,
    result: Option<String>,
    session_id: Option<String>,
    total_cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Decomposers answer with either a bare array or `{"subtasks": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DecompositionPayload {
    List(Vec<SubtaskDraft>),
    Wrapped { subtasks: Vec<SubtaskDraft> },
}

impl From<DecompositionPayload> for Vec<SubtaskDraft> {
    fn from(payload: DecompositionPayload) -> Self {
        match payload {
            DecompositionPayload::List(list) => list,
            DecompositionPayload::Wrapped { subtasks } => subtasks,
        }
    }
}

/// Headless Claude runner.
///
/// The binary comes from `Config::command` unless one was pinned with
/// [`ClaudeHeadless::with_binary`].
#[derive(Debug, Clone, Default)]
pub struct ClaudeHeadless {
    binary: Option<PathBuf>,
    working_dir: Option<PathBuf>,
}

impl ClaudeHeadless {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = Some(binary);
        self
    }

    /// Directory the CLI is started in. Defaults to the current directory.
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Resolve the binary to run, without spawning anything.
    pub fn resolve_binary(&self, config: &Config) -> Result<PathBuf> {
        if let Some(binary) = &self.binary {
            return Ok(binary.clone());
        }
        let command = config.effective_command();
        which::which(command).map_err(|e| {
            Error::Configuration(format!("executor command '{}' not found: {}", command, e))
        })
    }

    /// Run one prompt to completion and return the response text.
    pub async fn run(&self, prompt: &str, config: &Config) -> Result<String> {
        let binary = self.resolve_binary(config)?;
        let timeout = config.timeout();

        let mut command = Command::new(&binary);
        command.arg("-p").arg(prompt).arg("--output-format").arg("json");
        if let Some(model) = &config.model {
            command.arg("--model").arg(model);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        clog_debug!(
            "Running {} with {} char prompt (timeout {:?})",
            binary.display(),
            prompt.len(),
            timeout
        );
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Ok(response) = Self::parse_json_response(&stdout) {
            if let Some(cost) = response.cost_usd {
                clog_debug!("Claude call cost ${:.4}", cost);
            }
            return response.into_output();
        }

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!(
                    "{} exited with code {}",
                    binary.display(),
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            clog_error!("Claude call failed: {}", message);
            return Err(Error::Collaborator(message));
        }

        Ok(stdout.trim().to_string())
    }

    pub fn parse_json_response(json_str: &str) -> Result<ClaudeResponse> {
        let raw: RawClaudeResponse = serde_json::from_str(json_str.trim())?;

        let failed = raw.is_error || raw.subtype.as_deref().is_some_and(|s| s.starts_with("error"));
        let result = if failed {
            ResultType::Error {
                message: raw
                    .error
                    .or(raw.result)
                    .unwrap_or_else(|| "Claude reported an error".to_string()),
            }
        } else if let Some(error) = raw.error {
            ResultType::Error { message: error }
        } else if let Some(output) = raw.result {
            ResultType::Success { output }
        } else {
            ResultType::Error {
                message: "Unknown response format".to_string(),
            }
        };

        Ok(ClaudeResponse {
            session_id: raw.session_id,
            result,
            cost_usd: raw.total_cost_usd,
            duration_ms: raw.duration_ms,
        })
    }
}

// ========== Prompts ==========

fn persona(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Architect => {
            "You are a software architect. Define structure, data models and interfaces that later tasks will build on."
        }
        AgentRole::Developer => {
            "You are a senior developer. Write complete, working code for the task."
        }
        AgentRole::Reviewer => {
            "You are a code reviewer. Inspect the existing code, fix defects and return corrected files."
        }
        AgentRole::Planner => {
            "You are a technical planner. Produce concise written plans and any scaffolding files they need."
        }
    }
}

pub fn plan_prompt(prompt: &str) -> String {
    format!(
        "Break the following software project into a small set of implementation tasks.\n\n\
         Project description:\n{prompt}\n\n\
         Respond with JSON only, shaped like:\n\
         {{\"name\": \"short project name\", \"packages\": [\"npm-package\"], \"tasks\": [\
         {{\"id\": \"t1\", \"title\": \"...\", \"description\": \"...\", \
         \"agentRole\": \"architect|developer|reviewer|planner\", \"dependencies\": [\"t0\"]}}]}}\n\n\
         Dependencies refer to other task ids in the same list and must not form a cycle."
    )
}

pub fn execution_prompt(task: &Task, context: &str, packages: &[String]) -> String {
    let mut prompt = format!(
        "{}\n\nTask: {}\n{}\n",
        persona(task.agent_role),
        task.title,
        task.description
    );

    if !context.is_empty() {
        prompt.push_str("\nContext from completed work:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }

    if !packages.is_empty() {
        prompt.push_str(&format!("\nAvailable packages: {}\n", packages.join(", ")));
    }

    prompt.push_str(
        "\nWrite every file you create or change as \
         <file path=\"relative/path.ext\">full file contents</file>. \
         A path you emit replaces any existing file at that path.",
    );
    prompt
}

pub fn decomposition_prompt(task: &Task) -> String {
    format!(
        "Split this task into 2 to 5 smaller sequential subtasks.\n\n\
         Task: {}\n{}\n\n\
         Respond with a JSON array only, shaped like:\n\
         [{{\"title\": \"...\", \"description\": \"...\", \
         \"agentRole\": \"architect|developer|reviewer|planner\"}}]",
        task.title, task.description
    )
}

#[async_trait]
impl PlanGenerator for ClaudeHeadless {
    async fn generate(&self, prompt: &str, config: &Config) -> Result<PlanDraft> {
        let raw = self.run(&plan_prompt(prompt), config).await?;
        let draft: PlanDraft = parse_structured(&raw)?;
        if draft.tasks.is_empty() {
            return Err(Error::EmptyPlan);
        }
        Ok(draft)
    }
}

#[async_trait]
impl TaskExecutor for ClaudeHeadless {
    async fn execute(
        &self,
        task: &Task,
        context: &str,
        packages: &[String],
        config: &Config,
    ) -> Result<String> {
        self.run(&execution_prompt(task, context, packages), config)
            .await
    }
}

#[async_trait]
impl TaskDecomposer for ClaudeHeadless {
    async fn decompose(&self, task: &Task, config: &Config) -> Result<Vec<SubtaskDraft>> {
        let raw = self.run(&decomposition_prompt(task), config).await?;
        let payload: DecompositionPayload = parse_structured(&raw)?;
        Ok(payload.into())
    }
}
