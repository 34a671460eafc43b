//! Document persistence behind the save orchestrator.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Write to {0} was declined")]
    Declined(PathBuf),
}

/// Where documents are read from and written to.
///
/// A missing or unreadable document reads as `None`.
pub trait DocumentStore {
    fn read(&self, path: &Path) -> Option<String>;

    fn write(&mut self, path: &Path, content: &str) -> Result<(), StoreError>;
}

/// Reads and writes the real filesystem.
#[derive(Debug, Default)]
pub struct FsStore;

impl DocumentStore for FsStore {
    fn read(&self, path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    fn write(&mut self, path: &Path, content: &str) -> Result<(), StoreError> {
        let wrap = |source| StoreError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        fs::write(path, content).map_err(wrap)?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}

/// Documents kept in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub documents: BTreeMap<PathBuf, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.documents.insert(path.into(), content.into());
        self
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.documents.get(path.as_ref()).map(String::as_str)
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, path: &Path) -> Option<String> {
        self.documents.get(path).cloned()
    }

    fn write(&mut self, path: &Path, content: &str) -> Result<(), StoreError> {
        self.documents.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }
}
