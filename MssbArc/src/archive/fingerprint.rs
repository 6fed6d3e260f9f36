//! Locating block descriptors embedded in unrelated binary data
//!
//! Pointer tables in the game executables store descriptors back to back,
//! but nothing marks where a table starts. A descriptor for a given pair of
//! codec widths always begins with the bytes `00 00 rb lb`, so scanning for
//! that word and parsing a record at each hit recovers the tables.

use std::collections::BTreeSet;

use crate::compression::CodecParams;

use super::descriptor::{BlockDescriptor, DESCRIPTOR_SIZE};

/// Leading word of every descriptor using `params`.
pub fn fingerprint(params: CodecParams) -> [u8; 4] {
    [0, 0, params.repetition_bits, params.lookback_bits]
}

/// Offsets of every occurrence of the fingerprint for `params` that leaves
/// room for a full descriptor.
pub fn find_fingerprints(data: &[u8], params: CodecParams) -> Vec<usize> {
    if data.len() < DESCRIPTOR_SIZE {
        return Vec::new();
    }
    let pattern = fingerprint(params);
    data[..=data.len() - DESCRIPTOR_SIZE]
        .iter()
        .enumerate()
        .filter(|&(i, _)| data[i..i + 4] == pattern)
        .map(|(i, _)| i)
        .collect()
}

/// Scans one buffer for descriptors.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintScanner<'a> {
    data: &'a [u8],
    source: &'a str,
}

impl<'a> FingerprintScanner<'a> {
    /// `source` names the blob the found descriptors point into.
    pub fn new(data: &'a [u8], source: &'a str) -> Self {
        Self { data, source }
    }

    /// Descriptors for `params` that pass [`BlockDescriptor::validate`],
    /// ordered by disk location with duplicates removed.
    pub fn scan(&self, params: CodecParams) -> Vec<BlockDescriptor> {
        let mut found = BTreeSet::new();
        let mut rejected = 0usize;

        for offset in find_fingerprints(self.data, params) {
            let descriptor = match BlockDescriptor::parse(self.data, offset, self.source) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!("{e}");
                    continue;
                }
            };
            match descriptor.validate(offset) {
                Ok(()) => {
                    found.insert(descriptor);
                }
                Err(_) => rejected += 1,
            }
        }

        tracing::debug!(
            "fingerprint {params}: {} descriptors, {rejected} malformed",
            found.len()
        );
        found.into_iter().collect()
    }

    /// Descriptors of uncompressed chunks.
    pub fn scan_stored(&self) -> Vec<BlockDescriptor> {
        self.scan(CodecParams::STORED)
    }
}
