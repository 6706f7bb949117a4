//! Code context view of a session.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Result;

/// Files a session has indexed, keyed by path.
///
/// Only the set of keys matters to the engine; the content is whatever the
/// session chose to index.
#[derive(Debug, Clone, Default)]
pub struct CodeContext {
    files: BTreeMap<PathBuf, String>,
}

impl CodeContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `paths`, skipping anything under `exclude`.
    ///
    /// Directories are walked recursively. Files that are not valid UTF-8
    /// are skipped. A path that does not exist is an error.
    pub fn index(paths: &[PathBuf], exclude: &[PathBuf]) -> Result<Self> {
        let mut context = Self::new();
        for path in paths {
            context.index_path(path, exclude)?;
        }
        Ok(context)
    }

    fn index_path(&mut self, path: &Path, exclude: &[PathBuf]) -> Result<()> {
        if exclude.iter().any(|ex| path.starts_with(ex)) {
            debug!(path = %path.display(), "excluded from code context");
            return Ok(());
        }

        let metadata = fs::metadata(path)?;
        if metadata.is_dir() {
            let mut entries = fs::read_dir(path)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()?;
            entries.sort();
            for entry in entries {
                self.index_path(&entry, exclude)?;
            }
        } else {
            match fs::read_to_string(path) {
                Ok(content) => {
                    self.files.insert(path.to_path_buf(), content);
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    debug!(path = %path.display(), "skipping non-text file");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Remove a file, returning its content.
    pub fn remove(&mut self, path: &Path) -> Option<String> {
        self.files.remove(path)
    }

    /// Indexed content for `path`.
    pub fn get(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(|s| s.as_str())
    }

    /// Paths of all indexed files, sorted.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    /// Number of indexed files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
