//! Building a chunk catalog for an archive blob
//!
//! Discovery runs in four phases:
//!
//! 1. Scan reference buffers (executables, decompressed modules) for
//!    descriptors pointing into the blob.
//! 2. Keep the compressed candidates whose stored bytes decode consistently,
//!    claiming their byte ranges.
//! 3. Probe every unclaimed sector start with the validating decoder; hits
//!    become unreferenced chunks of unknown size.
//! 4. Accept stored-chunk candidates that do not overlap anything claimed.
//!
//! Known seeds (chunks found by hand) are listed as-is and claim their ranges
//! before any of this runs.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compression::{CodecParams, is_valid, is_valid_prefix};
use crate::error::{Error, Result};

use super::cache::FileCache;
use super::catalog::Catalog;
use super::descriptor::{BlockDescriptor, SECTOR_SIZE};
use super::extract::extract_chunk;
use super::fingerprint::FingerprintScanner;
use super::ranges::RangeSet;

/// Smallest probe size accepted by default; shorter probes pass too often by chance.
pub const DEFAULT_MIN_PROBE_SIZE: usize = 16;

/// Bytes of output a brute-force probe must account for by default.
pub const DEFAULT_PROBE_SIZE: usize = 200;

/// Codec widths and probe length for brute-force probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeFormat {
    #[serde(flatten)]
    pub params: CodecParams,
    /// Decoded bytes a probe must reach to count as a hit.
    pub probe_size: usize,
}

impl ProbeFormat {
    #[must_use]
    pub const fn new(params: CodecParams, probe_size: usize) -> Self {
        Self { params, probe_size }
    }
}

/// Tunables for a discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryOptions {
    /// Widths to look for in reference buffers.
    pub fingerprint_formats: Vec<CodecParams>,
    /// Widths and probe lengths for brute-force probing.
    pub probe_formats: Vec<ProbeFormat>,
    /// Also look for descriptors of stored chunks.
    pub scan_stored: bool,
    /// Probe formats shorter than this are rejected.
    pub min_probe_size: usize,
    /// Drop compressed candidates overlapping already-claimed ranges
    /// instead of validating them. Turning this off lets two verified chunks
    /// claim the same bytes.
    pub skip_overlapping: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            fingerprint_formats: vec![CodecParams::COMMON],
            probe_formats: vec![ProbeFormat::new(CodecParams::COMMON, DEFAULT_PROBE_SIZE)],
            scan_stored: true,
            min_probe_size: DEFAULT_MIN_PROBE_SIZE,
            skip_overlapping: true,
        }
    }
}

impl DiscoveryOptions {
    /// Create options with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the widths to scan reference buffers for
    #[must_use]
    pub fn with_fingerprint_formats(mut self, formats: Vec<CodecParams>) -> Self {
        self.fingerprint_formats = formats;
        self
    }

    /// Set the brute-force probe formats (empty disables probing)
    #[must_use]
    pub fn with_probe_formats(mut self, formats: Vec<ProbeFormat>) -> Self {
        self.probe_formats = formats;
        self
    }

    /// Enable or disable the stored-descriptor scan
    #[must_use]
    pub fn with_scan_stored(mut self, scan: bool) -> Self {
        self.scan_stored = scan;
        self
    }

    /// Set the minimum accepted probe size
    #[must_use]
    pub fn with_min_probe_size(mut self, size: usize) -> Self {
        self.min_probe_size = size;
        self
    }

    /// Skip compressed candidates that overlap claimed ranges
    #[must_use]
    pub fn with_skip_overlapping(mut self, skip: bool) -> Self {
        self.skip_overlapping = skip;
        self
    }

    /// Check the options describe a usable run.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for probe sizes below the minimum or
    /// widths the codec cannot decode.
    pub fn validate(&self) -> Result<()> {
        for format in &self.probe_formats {
            if format.probe_size < self.min_probe_size {
                return Err(Error::InvalidConfig(format!(
                    "probe size {} for {} is below the minimum of {}",
                    format.probe_size, format.params, self.min_probe_size
                )));
            }
            if format.params.is_stored() {
                return Err(Error::InvalidConfig("stored chunks cannot be probed".into()));
            }
        }
        let widths = self
            .fingerprint_formats
            .iter()
            .chain(self.probe_formats.iter().map(|f| &f.params));
        for params in widths {
            params
                .validate_for_decoding()
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }
}

/// A discovery run described as a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// The archive blob to catalog.
    pub blob: PathBuf,
    /// Files scanned as-is for descriptors.
    #[serde(default)]
    pub reference_files: Vec<PathBuf>,
    /// Chunks whose decompressed contents are scanned for descriptors.
    /// They are listed in the catalog and never reported again as candidates.
    #[serde(default)]
    pub reference_chunks: Vec<BlockDescriptor>,
    /// Compressed chunks known in advance.
    #[serde(default)]
    pub known_compressed: Vec<BlockDescriptor>,
    /// Stored chunks known in advance.
    #[serde(default)]
    pub known_raw: Vec<BlockDescriptor>,
    /// Candidates matching any of these (ignoring source) are dropped.
    #[serde(default)]
    pub exclusions: Vec<BlockDescriptor>,
    #[serde(default)]
    pub options: DiscoveryOptions,
}

impl DiscoveryConfig {
    /// Read a config file. Relative paths inside it, including descriptor
    /// sources, are resolved against the file's directory.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or its options are invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut config: DiscoveryConfig = serde_json::from_str(&json)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.options.validate()?;
        Ok(config)
    }

    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        fn resolve(base: &Path, p: &Path) -> PathBuf {
            if p.is_relative() { base.join(p) } else { p.to_path_buf() }
        }

        self.blob = resolve(base, &self.blob);
        for file in &mut self.reference_files {
            *file = resolve(base, file);
        }
        let descriptors = self
            .reference_chunks
            .iter_mut()
            .chain(&mut self.known_compressed)
            .chain(&mut self.known_raw)
            .chain(&mut self.exclusions);
        for d in descriptors {
            d.source = resolve(base, Path::new(&d.source)).to_string_lossy().into_owned();
        }
    }

    /// Source name given to descriptors that point into the blob.
    pub fn blob_name(&self) -> String {
        self.blob.to_string_lossy().into_owned()
    }

    /// Load every input through `cache` and run discovery.
    ///
    /// # Errors
    /// Returns an error if an input file cannot be read, a reference chunk
    /// cannot be decompressed, or the options are invalid.
    pub fn run(
        &self,
        cache: &mut FileCache,
        progress: &(dyn Fn(&DiscoveryProgress) + Sync),
        stop: Option<&AtomicBool>,
    ) -> Result<DiscoveryOutcome> {
        cache.load(&self.blob)?;
        for file in &self.reference_files {
            cache.load(file)?;
        }

        let mut chunk_keys = Vec::with_capacity(self.reference_chunks.len());
        for chunk in &self.reference_chunks {
            let key = PathBuf::from(format!("{}@{:08x}", chunk.source, chunk.disk_location));
            if !cache.contains(&key) {
                let bytes = {
                    let source = cache.get(Path::new(&chunk.source))?;
                    extract_chunk(source, chunk)?
                };
                tracing::debug!("Decompressed reference chunk {chunk} ({} bytes)", bytes.len());
                cache.insert(key.clone(), bytes);
            }
            chunk_keys.push(key);
        }

        let cache = &*cache;
        let loaded = |path: &Path| {
            cache.get_loaded(path).ok_or_else(|| {
                Error::InvalidConfig(format!("{} was not loaded", path.display()))
            })
        };

        let blob = loaded(self.blob.as_path())?;
        let mut discovery = Discovery::new(blob, self.blob_name())
            .with_options(self.options.clone())
            .with_known_compressed(
                self.reference_chunks
                    .iter()
                    .chain(&self.known_compressed)
                    .cloned()
                    .collect(),
            )
            .with_known_raw(self.known_raw.clone())
            .with_exclusions(self.exclusions.clone());
        for path in self.reference_files.iter().chain(&chunk_keys) {
            discovery = discovery.with_reference(loaded(path.as_path())?);
        }

        discovery.run_with_progress(progress, stop)
    }
}

/// Phase of a discovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPhase {
    /// Looking for descriptors in reference buffers
    ScanningReferences,
    /// Validating compressed candidates
    VerifyingCompressed,
    /// Probing unclaimed sectors
    Probing,
    /// Accepting stored-chunk candidates
    VerifyingRaw,
    /// Run finished
    Complete,
}

impl DiscoveryPhase {
    /// Get a human-readable description of this phase
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScanningReferences => "Scanning references",
            Self::VerifyingCompressed => "Checking compressed candidates",
            Self::Probing => "Probing sectors",
            Self::VerifyingRaw => "Checking raw candidates",
            Self::Complete => "Complete",
        }
    }
}

/// Progress information during discovery
#[derive(Debug, Clone)]
pub struct DiscoveryProgress {
    /// Current phase
    pub phase: DiscoveryPhase,
    /// Items done in this phase
    pub current: usize,
    /// Items in this phase
    pub total: usize,
}

impl DiscoveryProgress {
    #[must_use]
    pub fn new(phase: DiscoveryPhase, current: usize, total: usize) -> Self {
        Self { phase, current, total }
    }

    /// Get the progress percentage (0.0 - 1.0)
    #[must_use]
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f32 / self.total as f32
        }
    }
}

/// Counts describing what a discovery run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Distinct compressed descriptors found in reference buffers
    pub fingerprint_candidates: usize,
    /// Candidates matching a known chunk or exclusion
    pub excluded: usize,
    /// Candidates overlapping claimed ranges and not validated
    pub skipped_overlapping: usize,
    /// Candidates whose stored bytes decoded consistently
    pub verified: usize,
    /// Candidates that failed validation or lay outside the blob
    pub rejected: usize,
    /// Sector starts probed
    pub probes_run: usize,
    /// Probe hits
    pub unreferenced_found: usize,
    /// Distinct stored-chunk descriptors found
    pub raw_candidates: usize,
    /// Stored-chunk candidates accepted
    pub raw_verified: usize,
    /// Stored-chunk candidates overlapping claimed ranges
    pub raw_skipped: usize,
    /// Stored-chunk candidates reaching past the end of the blob
    pub raw_rejected: usize,
    /// Whether the stop flag ended the run early
    pub interrupted: bool,
}

impl fmt::Display for DiscoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "compressed: {} candidates, {} verified, {} rejected, {} excluded, {} overlapping",
            self.fingerprint_candidates, self.verified, self.rejected, self.excluded, self.skipped_overlapping
        )?;
        writeln!(f, "probing:    {} probes, {} unreferenced chunks", self.probes_run, self.unreferenced_found)?;
        write!(
            f,
            "raw:        {} candidates, {} verified, {} overlapping, {} outside blob",
            self.raw_candidates, self.raw_verified, self.raw_skipped, self.raw_rejected
        )?;
        if self.interrupted {
            write!(f, "\n(interrupted)")?;
        }
        Ok(())
    }
}

/// Result of a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub catalog: Catalog,
    pub report: DiscoveryReport,
    /// Blob ranges attributed to a chunk at the end of the run
    pub claimed: RangeSet,
}

/// Discovery over an in-memory blob and reference buffers.
#[derive(Debug, Clone)]
pub struct Discovery<'a> {
    blob: &'a [u8],
    blob_name: String,
    references: Vec<&'a [u8]>,
    known_compressed: Vec<BlockDescriptor>,
    known_raw: Vec<BlockDescriptor>,
    exclusions: Vec<BlockDescriptor>,
    options: DiscoveryOptions,
}

fn chunk_label(prefix: &str, d: &BlockDescriptor) -> String {
    format!(
        "{prefix} {:02x}{:02x} {:08x}.dat",
        d.params.lookback_bits, d.params.repetition_bits, d.disk_location
    )
}

impl<'a> Discovery<'a> {
    /// `blob_name` becomes the source of every descriptor found.
    pub fn new(blob: &'a [u8], blob_name: impl Into<String>) -> Self {
        Self {
            blob,
            blob_name: blob_name.into(),
            references: Vec::new(),
            known_compressed: Vec::new(),
            known_raw: Vec::new(),
            exclusions: Vec::new(),
            options: DiscoveryOptions::default(),
        }
    }

    /// Add a buffer to scan for descriptors
    #[must_use]
    pub fn with_reference(mut self, bytes: &'a [u8]) -> Self {
        self.references.push(bytes);
        self
    }

    /// Compressed chunks known in advance
    #[must_use]
    pub fn with_known_compressed(mut self, known: Vec<BlockDescriptor>) -> Self {
        self.known_compressed = known;
        self
    }

    /// Stored chunks known in advance
    #[must_use]
    pub fn with_known_raw(mut self, known: Vec<BlockDescriptor>) -> Self {
        self.known_raw = known;
        self
    }

    /// Descriptors whose content is never reported as a candidate
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: Vec<BlockDescriptor>) -> Self {
        self.exclusions = exclusions;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Run all phases without progress reporting.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the options are invalid.
    pub fn run(&self) -> Result<DiscoveryOutcome> {
        self.run_with_progress(&|_| {}, None)
    }

    /// Run all phases, reporting progress and checking `stop` between steps.
    ///
    /// Once `stop` is set no further probes are issued and the remaining
    /// phases are skipped; the partial catalog is returned with
    /// [`DiscoveryReport::interrupted`] set.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the options are invalid.
    pub fn run_with_progress(
        &self,
        progress: &(dyn Fn(&DiscoveryProgress) + Sync),
        stop: Option<&AtomicBool>,
    ) -> Result<DiscoveryOutcome> {
        self.options.validate()?;
        let stopped = || stop.is_some_and(|s| s.load(Ordering::Relaxed));

        let mut report = DiscoveryReport::default();
        let mut catalog = Catalog::new();
        let mut claimed = RangeSet::new();

        tracing::info!(
            "Discovering chunks in {} (0x{:x} bytes, {} reference buffers)",
            self.blob_name,
            self.blob.len(),
            self.references.len()
        );

        for d in &self.known_compressed {
            if d.source == self.blob_name {
                claimed.add(d.byte_range());
            }
        }
        for d in &self.known_raw {
            claimed.add(d.byte_range());
        }
        catalog.referenced_compressed.extend(self.known_compressed.iter().cloned());
        catalog.referenced_raw.extend(self.known_raw.iter().cloned());

        let (compressed, raw) = self.scan_references(progress);
        report.fingerprint_candidates = compressed.len();
        report.raw_candidates = raw.len();

        if !stopped() {
            self.verify_compressed(compressed, &mut catalog, &mut claimed, &mut report, progress);
        }
        if !stopped() {
            self.probe(&mut catalog, &mut claimed, &mut report, progress, &stopped);
        }
        if !stopped() {
            self.accept_raw(raw, &mut catalog, &mut claimed, &mut report, progress);
        }
        report.interrupted = stopped();

        catalog.sort();
        progress(&DiscoveryProgress::new(DiscoveryPhase::Complete, 1, 1));
        tracing::info!(
            "Discovery finished: {} verified, {} unreferenced, {} raw{}",
            report.verified,
            report.unreferenced_found,
            report.raw_verified,
            if report.interrupted { " (interrupted)" } else { "" }
        );

        Ok(DiscoveryOutcome {
            catalog,
            report,
            claimed,
        })
    }

    /// Phase 1: descriptors from every reference buffer, in parallel.
    fn scan_references(
        &self,
        progress: &(dyn Fn(&DiscoveryProgress) + Sync),
    ) -> (BTreeSet<BlockDescriptor>, BTreeSet<BlockDescriptor>) {
        let total = self.references.len();
        let done = std::sync::atomic::AtomicUsize::new(0);

        let per_buffer: Vec<(Vec<BlockDescriptor>, Vec<BlockDescriptor>)> = self
            .references
            .par_iter()
            .map(|bytes| {
                let scanner = FingerprintScanner::new(bytes, &self.blob_name);
                let compressed: Vec<_> = self
                    .options
                    .fingerprint_formats
                    .iter()
                    .flat_map(|&params| scanner.scan(params))
                    .collect();
                let raw = if self.options.scan_stored {
                    scanner.scan_stored()
                } else {
                    Vec::new()
                };
                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress(&DiscoveryProgress::new(DiscoveryPhase::ScanningReferences, current, total));
                (compressed, raw)
            })
            .collect();

        let mut compressed = BTreeSet::new();
        let mut raw = BTreeSet::new();
        for (c, r) in per_buffer {
            compressed.extend(c);
            raw.extend(r);
        }
        tracing::info!(
            "Found {} compressed and {} raw descriptors",
            compressed.len(),
            raw.len()
        );
        (compressed, raw)
    }

    fn is_known(&self, candidate: &BlockDescriptor) -> bool {
        self.known_compressed
            .iter()
            .chain(&self.exclusions)
            .any(|k| k.same_content(candidate))
    }

    /// Phase 2: keep candidates whose stored bytes decode consistently.
    fn verify_compressed(
        &self,
        candidates: BTreeSet<BlockDescriptor>,
        catalog: &mut Catalog,
        claimed: &mut RangeSet,
        report: &mut DiscoveryReport,
        progress: &(dyn Fn(&DiscoveryProgress) + Sync),
    ) {
        let candidates: Vec<BlockDescriptor> = candidates
            .into_iter()
            .filter(|c| {
                let known = self.is_known(c);
                if known {
                    report.excluded += 1;
                }
                !known
            })
            .collect();

        // Validation is independent per chunk; claiming happens afterwards in
        // location order so results do not depend on scheduling.
        let valid: Vec<bool> = candidates
            .par_iter()
            .map(|c| match c.stored_bytes(self.blob) {
                Ok(bytes) => is_valid(bytes, c.params),
                Err(e) => {
                    tracing::debug!("{e}");
                    false
                }
            })
            .collect();

        let total = candidates.len();
        for (i, (mut candidate, ok)) in candidates.into_iter().zip(valid).enumerate() {
            progress(&DiscoveryProgress::new(DiscoveryPhase::VerifyingCompressed, i + 1, total));
            let range = candidate.byte_range();
            if self.options.skip_overlapping && claimed.overlaps(&range) {
                report.skipped_overlapping += 1;
                continue;
            }
            if !ok {
                tracing::debug!("Rejected {candidate}");
                report.rejected += 1;
                continue;
            }
            candidate.label = Some(chunk_label("cmp", &candidate));
            claimed.add(range);
            catalog.referenced_compressed.push(candidate);
            report.verified += 1;
        }
        tracing::info!("Verified {} of {total} compressed candidates", report.verified);
    }

    /// Phase 3: brute-force probing of unclaimed sector starts.
    fn probe(
        &self,
        catalog: &mut Catalog,
        claimed: &mut RangeSet,
        report: &mut DiscoveryReport,
        progress: &(dyn Fn(&DiscoveryProgress) + Sync),
        stopped: &dyn Fn() -> bool,
    ) {
        let sector = SECTOR_SIZE as usize;
        let total = self.blob.len().div_ceil(sector);

        for format in &self.options.probe_formats {
            tracing::info!("Probing with {} (probe size {})", format.params, format.probe_size);
            for (i, offset) in (0..self.blob.len()).step_by(sector).enumerate() {
                if stopped() {
                    tracing::warn!("Probing stopped at 0x{offset:x}");
                    return;
                }
                if i % 256 == 0 {
                    progress(&DiscoveryProgress::new(DiscoveryPhase::Probing, i, total));
                }
                let start = offset as u64;
                if claimed.contains(start) {
                    continue;
                }

                report.probes_run += 1;
                let end = (offset + 2 * format.probe_size).min(self.blob.len());
                if !is_valid_prefix(&self.blob[offset..end], format.params, format.probe_size) {
                    continue;
                }

                let location = u32::try_from(offset).unwrap_or(u32::MAX);
                let hit = BlockDescriptor::new(self.blob_name.clone(), format.params, 0, 0, location, 0)
                    .with_label(format!("cmp unverified {offset:x}.dat"));
                tracing::debug!("Probe hit at 0x{offset:08x} ({})", format.params);
                claimed.add(start..start + format.probe_size as u64);
                catalog.unreferenced_compressed.push(hit);
                report.unreferenced_found += 1;
            }
            progress(&DiscoveryProgress::new(DiscoveryPhase::Probing, total, total));
        }
    }

    /// Phase 4: stored candidates inside the blob that fit between everything
    /// claimed so far.
    fn accept_raw(
        &self,
        candidates: BTreeSet<BlockDescriptor>,
        catalog: &mut Catalog,
        claimed: &mut RangeSet,
        report: &mut DiscoveryReport,
        progress: &(dyn Fn(&DiscoveryProgress) + Sync),
    ) {
        let total = candidates.len();
        for (i, mut candidate) in candidates.into_iter().enumerate() {
            progress(&DiscoveryProgress::new(DiscoveryPhase::VerifyingRaw, i + 1, total));
            if candidate.stored_bytes(self.blob).is_err() {
                report.raw_rejected += 1;
                continue;
            }
            let range = candidate.byte_range();
            if claimed.overlaps(&range) {
                report.raw_skipped += 1;
                continue;
            }
            candidate.label = Some(chunk_label("raw", &candidate));
            claimed.add(range);
            catalog.referenced_raw.push(candidate);
            report.raw_verified += 1;
        }
    }
}
