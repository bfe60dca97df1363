use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Missing or unusable collaborator setup. Raised before any call is made.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A collaborator call failed; carries the provider-supplied text.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Plan generator returned a plan with no tasks")]
    EmptyPlan,

    #[error("Decomposition of task {task_id} returned no subtasks")]
    EmptyDecomposition { task_id: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {id} is not ready to run (status: {status})")]
    TaskNotReady { id: String, status: String },

    #[error("Task {id} cannot be edited (status: {status})")]
    TaskNotEditable { id: String, status: String },

    #[error("Task {id} cannot be split (status: {status})")]
    TaskNotSplittable { id: String, status: String },

    #[error("Another {0} is already in progress")]
    Busy(&'static str),

    #[error("No project loaded")]
    NoProject,

    #[error("Dependency cycle detected at task: {0}")]
    DependencyCycle(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
