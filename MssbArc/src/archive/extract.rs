//! Materializing chunk contents from a blob

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::compression::{RollingDecompressor, decompress};
use crate::error::{Error, Result};

use super::cache::FileCache;
use super::descriptor::BlockDescriptor;
use super::parts::estimated_extent;

/// Decompressed (or stored) bytes of one chunk.
///
/// Chunks without a recorded size are decoded lazily: up to the size implied
/// by their part table when they have one, otherwise until the stream, the
/// output ceiling, or the first decode error ends them. Whatever was
/// produced up to that point is returned.
///
/// # Errors
/// Returns [`Error::Chunk`] wrapping the underlying failure, naming the chunk.
pub fn extract_chunk(blob: &[u8], descriptor: &BlockDescriptor) -> Result<Vec<u8>> {
    extract_inner(blob, descriptor).map_err(|e| e.in_chunk(descriptor))
}

fn extract_inner(blob: &[u8], d: &BlockDescriptor) -> Result<Vec<u8>> {
    if d.is_stored() {
        let len = if d.original_size > 0 { d.original_size } else { d.compressed_size };
        let start = d.disk_location as usize;
        return blob
            .get(start..start + len as usize)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::ChunkOutOfBounds {
                location: u64::from(d.disk_location),
                size: u64::from(len),
                blob_len: blob.len(),
            });
    }

    let compressed = if d.compressed_size > 0 {
        d.stored_bytes(blob)?
    } else {
        d.tail_bytes(blob)?
    };

    if d.original_size > 0 {
        return decompress(compressed, d.params, d.original_size as usize);
    }

    let mut rolling = RollingDecompressor::new(compressed, d.params)?;
    let parts = rolling.part_offsets().unwrap_or_else(|e| {
        tracing::debug!("{d}: no part table ({e})");
        Vec::new()
    });
    let extent = estimated_extent(&parts);

    let outcome = match extent {
        Some(extent) => rolling.ensure(extent.min(rolling.limit())),
        None => rolling.fill_to_end().map(|_| ()),
    };
    if let Err(e) = outcome {
        tracing::debug!("{d}: stopped after {} bytes ({e})", rolling.produced().len());
    }

    let mut out = rolling.into_output();
    if let Some(extent) = extent {
        out.truncate(extent);
    }
    Ok(out)
}

/// Extract many chunks of one blob in parallel, in input order.
pub fn extract_all(blob: &[u8], descriptors: &[BlockDescriptor]) -> Vec<Result<Vec<u8>>> {
    descriptors
        .par_iter()
        .map(|d| extract_chunk(blob, d))
        .collect()
}

/// Progress information while writing extracted chunks
#[derive(Debug, Clone)]
pub struct ExtractProgress {
    /// Chunks finished so far (1-indexed)
    pub current: usize,
    /// Total number of chunks
    pub total: usize,
    /// Output name of the chunk just finished
    pub current_file: String,
}

/// Outcome of [`write_chunks`].
#[derive(Debug, Default)]
pub struct ExtractSummary {
    /// Files written
    pub written: Vec<PathBuf>,
    /// Chunks that failed, with their output name
    pub failed: Vec<(String, Error)>,
}

impl ExtractSummary {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Output file name for a chunk: the file-name part of its label.
pub fn output_file_name(descriptor: &BlockDescriptor) -> String {
    let label = descriptor.label_or_default();
    Path::new(&label)
        .file_name()
        .map_or(label.clone(), |n| n.to_string_lossy().into_owned())
}

/// Extract every descriptor into `dest`, reading blobs through `cache`.
///
/// Sources are loaded up front; chunks are then decoded and written in
/// parallel. Per-chunk failures are collected, not returned.
///
/// # Errors
/// Returns an error if a source blob cannot be read or `dest` cannot be created.
pub fn write_chunks<F>(
    descriptors: &[BlockDescriptor],
    cache: &mut FileCache,
    dest: &Path,
    progress: F,
) -> Result<ExtractSummary>
where
    F: Fn(&ExtractProgress) + Send + Sync,
{
    std::fs::create_dir_all(dest)?;
    for d in descriptors {
        cache.load(Path::new(&d.source))?;
    }
    let cache = &*cache;

    let processed = AtomicUsize::new(0);
    let total = descriptors.len();

    let results: Vec<(String, Result<PathBuf>)> = descriptors
        .par_iter()
        .map(|d| {
            let name = output_file_name(d);
            let result = cache
                .get_loaded(Path::new(&d.source))
                .ok_or_else(|| Error::InvalidConfig(format!("{} was not loaded", d.source)))
                .and_then(|blob| extract_chunk(blob, d))
                .and_then(|bytes| {
                    let path = dest.join(&name);
                    std::fs::write(&path, bytes)?;
                    Ok(path)
                });

            let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
            progress(&ExtractProgress {
                current,
                total,
                current_file: name.clone(),
            });
            (name, result)
        })
        .collect();

    let mut summary = ExtractSummary::default();
    for (name, result) in results {
        match result {
            Ok(path) => summary.written.push(path),
            Err(e) => {
                tracing::warn!("Failed to extract {name}: {e}");
                summary.failed.push((name, e));
            }
        }
    }
    tracing::info!(
        "Extracted {} chunks to {} ({} failed)",
        summary.written.len(),
        dest.display(),
        summary.failed.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{BitWriter, CodecParams, compress};
    use pretty_assertions::assert_eq;

    fn blob_with(chunk: &[u8], at: usize) -> Vec<u8> {
        let mut blob = vec![0xEEu8; at];
        blob.extend_from_slice(chunk);
        blob.resize(blob.len().next_multiple_of(0x800), 0);
        blob
    }

    #[test]
    fn test_stored_chunk() {
        let blob = blob_with(b"movie bytes", 0x800);
        let d = BlockDescriptor::new("b", CodecParams::STORED, 11, 0, 0x800, 11);
        assert_eq!(extract_chunk(&blob, &d).unwrap(), b"movie bytes");

        let no_size = BlockDescriptor::new("b", CodecParams::STORED, 0, 0, 0x800, 5);
        assert_eq!(extract_chunk(&blob, &no_size).unwrap(), b"movie");
    }

    #[test]
    fn test_sized_chunk() {
        let data: Vec<u8> = b"sized chunk, sized chunk, sized chunk!".to_vec();
        let packed = compress(&data, CodecParams::COMMON).unwrap();
        let blob = blob_with(&packed, 0x1000);
        let d = BlockDescriptor::new(
            "b",
            CodecParams::COMMON,
            data.len() as u32,
            0,
            0x1000,
            packed.len() as u32,
        );
        assert_eq!(extract_chunk(&blob, &d).unwrap(), data);
    }

    #[test]
    fn test_unsized_chunk_uses_part_table() {
        let mut data = Vec::new();
        for offset in [0x10u32, 0x30, 0x50, 0] {
            data.extend_from_slice(&offset.to_be_bytes());
        }
        data.extend((0..0x60u32).map(|i| (i % 7) as u8));
        let packed = compress(&data, CodecParams::COMMON).unwrap();
        let blob = blob_with(&packed, 0x800);

        let d = BlockDescriptor::new("b", CodecParams::COMMON, 0, 0, 0x800, 0);
        let out = extract_chunk(&blob, &d).unwrap();
        assert_eq!(out, &data[..0x70]);
    }

    #[test]
    fn test_unsized_chunk_stops_at_first_decode_error() {
        // "ab", then a reference whose distance runs past the end of the blob.
        // The leftover bits of the last word would read as a literal 'A'.
        let mut writer = BitWriter::new();
        writer.write_literal(b'a');
        writer.write_literal(b'b');
        writer.write_bits(BitWriter::REFERENCE_TAG, 1);
        writer.write_literal(b'A');
        writer.write_bits(0, 4);
        let mut blob = vec![0xEEu8; 0x800];
        blob.extend_from_slice(&writer.finish());

        let d = BlockDescriptor::new("b", CodecParams::new(20, 4), 0, 0, 0x800, 0);
        assert_eq!(extract_chunk(&blob, &d).unwrap(), b"ab");
    }

    #[test]
    fn test_out_of_bounds_names_chunk() {
        let blob = vec![0u8; 0x800];
        let d = BlockDescriptor::new("b", CodecParams::COMMON, 0x10, 0, 0x1000, 0x10);
        let err = extract_chunk(&blob, &d).unwrap_err();
        assert!(matches!(&err, Error::Chunk { source, .. } if matches!(**source, Error::ChunkOutOfBounds { .. })));
        assert!(err.to_string().contains("0x00001000"));
    }

    #[test]
    fn test_write_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("ZZZZ.dat");
        std::fs::write(&blob_path, blob_with(b"raw!", 0x800)).unwrap();
        let source = blob_path.to_string_lossy().into_owned();

        let good = BlockDescriptor::new(source.clone(), CodecParams::STORED, 4, 0, 0x800, 4)
            .with_label("out/raw.bin");
        let bad = BlockDescriptor::new(source, CodecParams::STORED, 4, 0, 0x8000, 4);

        let mut cache = FileCache::new();
        let out_dir = dir.path().join("out");
        let summary = write_chunks(&[good, bad], &mut cache, &out_dir, |_| {}).unwrap();

        assert_eq!(summary.written, vec![out_dir.join("raw.bin")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(std::fs::read(out_dir.join("raw.bin")).unwrap(), b"raw!");
    }
}
