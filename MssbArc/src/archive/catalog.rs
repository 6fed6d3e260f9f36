//! Persisted discovery results
//!
//! Brute-force probing of a full archive takes a long time, so its results
//! are saved as JSON and reused by later runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::descriptor::BlockDescriptor;
use super::ranges::RangeSet;

/// Every chunk known for one blob, grouped by how it was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Compressed chunks pointed to by a descriptor in a reference buffer.
    #[serde(rename = "GameReferencedCompressedFiles", default)]
    pub referenced_compressed: Vec<BlockDescriptor>,
    /// Stored chunks pointed to by a descriptor in a reference buffer.
    #[serde(rename = "GameReferencedRawFiles", default)]
    pub referenced_raw: Vec<BlockDescriptor>,
    /// Chunks found by probing, with unknown decompressed size.
    #[serde(rename = "UnreferencedCompressedFiles", default)]
    pub unreferenced_compressed: Vec<BlockDescriptor>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of chunks.
    pub fn len(&self) -> usize {
        self.referenced_compressed.len() + self.referenced_raw.len() + self.unreferenced_compressed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All chunks, grouped as stored.
    pub fn iter(&self) -> impl Iterator<Item = &BlockDescriptor> {
        self.referenced_compressed
            .iter()
            .chain(&self.referenced_raw)
            .chain(&self.unreferenced_compressed)
    }

    /// Sort each group by disk location.
    pub fn sort(&mut self) {
        self.referenced_compressed.sort();
        self.referenced_raw.sort();
        self.unreferenced_compressed.sort();
    }

    /// Blob ranges claimed by the chunks of `source`.
    pub fn claimed_ranges(&self, source: &str) -> RangeSet {
        self.iter()
            .filter(|d| d.source == source)
            .map(BlockDescriptor::byte_range)
            .collect()
    }

    /// Write as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Saved catalog of {} chunks to {}", self.len(), path.display());
        Ok(())
    }

    /// Read a catalog written by [`Catalog::save`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a catalog.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&json)?;
        tracing::info!("Loaded catalog of {} chunks from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Load `path` if it exists, otherwise build the catalog and save it there.
    ///
    /// # Errors
    /// Returns an error from loading, from `build`, or from saving.
    pub fn load_or_else<F>(path: &Path, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Self>,
    {
        if path.exists() {
            return Self::load(path);
        }
        let catalog = build()?;
        catalog.save(path)?;
        Ok(catalog)
    }
}
