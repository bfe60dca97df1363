use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_COMMAND: &str = "claude";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// User configuration, stored as `conductor.toml` in the state directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Executor binary used by the headless collaborator.
    pub command: Option<String>,
    /// Model name forwarded to the executor binary.
    pub model: Option<String>,
    /// Per-call timeout enforced by the collaborator, not the core.
    pub timeout_secs: Option<u64>,
    /// Overrides `~/.conductor` as the location of project state.
    pub state_dir: Option<String>,
}

impl Config {
    pub fn conductor_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".conductor"))
    }

    /// Directory holding `project.json`.
    pub fn effective_state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Self::conductor_dir(),
        }
    }

    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_COMMAND)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
