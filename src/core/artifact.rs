//! Artifact store: the project's files, keyed by path.
//!
//! Files are produced by task executions as `<file path="...">...</file>`
//! blocks embedded in the executor's response and merged last-writer-wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// `<file path="PATH">CONTENT</file>`, either quote style, whitespace tolerant.
static FILE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<\s*file\s+path\s*=\s*(?:"([^"]*)"|'([^']*)')\s*>(.*?)<\s*/\s*file\s*>"#,
    )
    .expect("file block pattern is valid")
});

/// A single file in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
    pub language: String,
}

impl ProjectFile {
    pub fn new(path: &str, content: &str) -> Self {
        Self {
            path: path.to_string(),
            content: content.to_string(),
            language: language_for(path).to_string(),
        }
    }
}

/// Language tag derived from the path's extension.
pub fn language_for(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let ext = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "plaintext",
    };

    match ext.as_str() {
        "ts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "md" => "markdown",
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "sh" => "shell",
        "sql" => "sql",
        "svg" | "xml" => "xml",
        _ => "plaintext",
    }
}

/// Extract every file block from an executor response, in order of appearance.
///
/// Content is trimmed. Repeated paths are all returned; the merge decides
/// which one wins.
pub fn extract_files(raw: &str) -> Vec<ProjectFile> {
    FILE_BLOCK_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let path = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
            if path.is_empty() {
                return None;
            }
            let content = caps.get(3).map(|m| m.as_str()).unwrap_or("").trim();
            Some(ProjectFile::new(path, content))
        })
        .collect()
}

/// Order-preserving collection of files with at most one entry per path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactStore {
    files: Vec<ProjectFile>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[ProjectFile] {
        &self.files
    }

    pub fn get(&self, path: &str) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    /// Write one file: overwrite in place if the path exists, else append.
    pub fn write(&mut self, file: ProjectFile) {
        match self.files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => {
                existing.content = file.content;
                existing.language = file.language;
            }
            None => self.files.push(file),
        }
    }

    /// Merge a batch of files in list order. Returns the number of files written.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = ProjectFile>) -> usize {
        let mut written = 0;
        for file in batch {
            self.write(file);
            written += 1;
        }
        written
    }

    /// Collapse duplicate paths from older persisted data, keeping the first
    /// position and the last content.
    pub(crate) fn normalize(&mut self) -> usize {
        let files = std::mem::take(&mut self.files);
        let before = files.len();
        self.merge(files);
        before - self.files.len()
    }
}
