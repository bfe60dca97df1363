//! Persistence for projects and configuration.
//!
//! The orchestrator talks to storage through the [`Persistence`] trait.
//! [`FileStore`] keeps state under `~/.conductor`; [`MemoryStore`] keeps it in
//! memory and is what tests and dry runs use. Both go through the same schema
//! encoder, so a project that survives `MemoryStore` survives the file store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::Config;
use crate::core::project::Project;
use crate::state::migration::{decode_project, encode_project};
use crate::util::blocking;
use crate::{clog_debug, Error, Result};

const PROJECT_FILE: &str = "project.json";
const CONFIG_FILE: &str = "conductor.toml";

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load the persisted project, upgraded to the current schema.
    async fn load_project(&self) -> Result<Option<Project>>;
    async fn save_project(&self, project: &Project) -> Result<()>;
    async fn clear_project(&self) -> Result<()>;
    async fn load_config(&self) -> Result<Option<Config>>;
    async fn save_config(&self, config: &Config) -> Result<()>;
}

/// JSON/TOML files on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    config_path: PathBuf,
    project_path: PathBuf,
}

impl FileStore {
    /// Keep both files in `dir`.
    pub fn new(dir: &Path) -> Self {
        Self {
            config_path: dir.join(CONFIG_FILE),
            project_path: dir.join(PROJECT_FILE),
        }
    }

    /// Store in `~/.conductor`.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(&Config::conductor_dir()?))
    }

    /// Keep the project in `dir` while the config stays where it is.
    pub fn with_project_dir(mut self, dir: &Path) -> Self {
        self.project_path = dir.join(PROJECT_FILE);
        self
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Write via a temp file and rename, keeping a `.bak` of the previous version.
fn write_atomically(path: &Path, contents: &str, extension: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            clog_debug!("Creating state directory: {}", parent.display());
            fs::create_dir_all(parent)?;
        }
    }

    if path.exists() {
        let backup_path = path.with_extension(format!("{}.bak", extension));
        fs::copy(path, &backup_path)?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", extension));
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[async_trait]
impl Persistence for FileStore {
    async fn load_project(&self) -> Result<Option<Project>> {
        let path = self.project_path.clone();
        blocking(move || {
            clog_debug!("FileStore::load_project path={}", path.display());
            if !path.exists() {
                return Ok(None);
            }
            let contents = fs::read_to_string(&path)?;
            let project = decode_project(&contents)?;
            clog_debug!(
                "Project loaded: '{}' with {} tasks",
                project.name,
                project.tasks.len()
            );
            Ok(Some(project))
        })
        .await
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        let contents = encode_project(project)?;
        let path = self.project_path.clone();
        let revision = project.revision;
        blocking(move || {
            write_atomically(&path, &contents, "json")?;
            clog_debug!("Project saved: {} (revision {})", path.display(), revision);
            Ok(())
        })
        .await
    }

    async fn clear_project(&self) -> Result<()> {
        let path = self.project_path.clone();
        blocking(move || {
            if path.exists() {
                fs::remove_file(&path)?;
                clog_debug!("Project cleared: {}", path.display());
            }
            Ok(())
        })
        .await
    }

    async fn load_config(&self) -> Result<Option<Config>> {
        let path = self.config_path.clone();
        blocking(move || {
            if !path.exists() {
                clog_debug!("Config file not found at {}", path.display());
                return Ok(None);
            }
            let config = Config::from_toml(&fs::read_to_string(&path)?)?;
            Ok(Some(config))
        })
        .await
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        let contents = config.to_toml()?;
        let path = self.config_path.clone();
        blocking(move || write_atomically(&path, &contents, "toml")).await
    }
}

/// In-memory store holding the encoded documents.
#[derive(Debug, Default)]
pub struct MemoryStore {
    project: Mutex<Option<String>>,
    config: Mutex<Option<Config>>,
    saves: Mutex<u64>,
    reject_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a raw persisted document, in any schema version.
    pub fn with_raw_project(raw: &str) -> Self {
        let store = Self::new();
        if let Ok(mut slot) = store.project.lock() {
            *slot = Some(raw.to_string());
        }
        store
    }

    /// The currently stored document, if any.
    pub fn raw_project(&self) -> Option<String> {
        self.project.lock().ok().and_then(|slot| slot.clone())
    }

    /// Number of successful `save_project` calls.
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }

    /// Make subsequent `save_project` calls fail with an I/O error.
    pub fn reject_saves(&self, reject: bool) {
        self.reject_saves.store(reject, Ordering::Release);
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Validation("memory store lock poisoned".to_string())
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn load_project(&self) -> Result<Option<Project>> {
        let raw = self.project.lock().map_err(poisoned)?.clone();
        raw.as_deref().map(decode_project).transpose()
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        if self.reject_saves.load(Ordering::Acquire) {
            return Err(Error::Io(std::io::Error::other("memory store rejected save")));
        }
        let encoded = encode_project(project)?;
        *self.project.lock().map_err(poisoned)? = Some(encoded);
        *self.saves.lock().map_err(poisoned)? += 1;
        Ok(())
    }

    async fn clear_project(&self) -> Result<()> {
        *self.project.lock().map_err(poisoned)? = None;
        Ok(())
    }

    async fn load_config(&self) -> Result<Option<Config>> {
        Ok(self.config.lock().map_err(poisoned)?.clone())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        *self.config.lock().map_err(poisoned)? = Some(config.clone());
        Ok(())
    }
}
