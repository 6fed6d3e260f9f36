//! Loaded file contents shared across a discovery or extraction run

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Owns file contents keyed by path and lends out read-only views.
///
/// Each file is read from disk once; later lookups borrow the same buffer.
#[derive(Debug, Default)]
pub struct FileCache {
    /// Loaded contents keyed by path
    files: HashMap<PathBuf, Vec<u8>>,
}

impl FileCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` if it is not cached yet.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if !self.files.contains_key(path) {
            let bytes = std::fs::read(path)?;
            tracing::debug!("cached {} ({} bytes)", path.display(), bytes.len());
            self.files.insert(path.to_path_buf(), bytes);
        }
        Ok(())
    }

    /// Contents of `path`, reading it on first use.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn get(&mut self, path: &Path) -> Result<&[u8]> {
        self.load(path)?;
        Ok(self.files.get(path).map_or(&[][..], Vec::as_slice))
    }

    /// Contents of `path` if already loaded.
    pub fn get_loaded(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Register an in-memory buffer under `key` (e.g. a decompressed chunk).
    pub fn insert(&mut self, key: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files.insert(key.into(), bytes);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Number of cached buffers.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Drop every cached buffer.
    pub fn clear(&mut self) {
        self.files.clear();
    }
}
