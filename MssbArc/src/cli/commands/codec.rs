//! CLI commands for single-chunk codec operations

use std::path::Path;
use std::time::Instant;

use anyhow::Context;

use crate::archive::estimated_extent;
use crate::cli::progress::{DISK, GEAR, LOOKING_GLASS, PACKAGE, format_size, print_done, print_step};
use crate::compression::{
    self, CodecParams, MatchStrategy, RollingDecompressor, disassemble, is_valid_prefix,
};

/// Bytes a chunk start must decode consistently to be reported as plausible.
const PLAUSIBILITY_PROBE: usize = 200;

fn chunk_tail(blob: &[u8], offset: u64) -> anyhow::Result<&[u8]> {
    usize::try_from(offset)
        .ok()
        .and_then(|o| blob.get(o..))
        .with_context(|| format!("offset 0x{offset:x} is past the end of the blob (0x{:x} bytes)", blob.len()))
}

pub fn decompress(
    source: &Path,
    offset: u64,
    size: usize,
    params: CodecParams,
    destination: &Path,
) -> anyhow::Result<()> {
    let start = Instant::now();

    print_step(1, 3, LOOKING_GLASS, &format!("Reading {}...", source.display()));
    let blob = std::fs::read(source)?;
    let tail = chunk_tail(&blob, offset)?;

    print_step(2, 3, GEAR, &format!("Decompressing 0x{offset:x} [{params}]..."));
    let data = compression::decompress(tail, params, size)
        .with_context(|| format!("chunk at 0x{offset:08x} in {}", source.display()))?;

    print_step(3, 3, DISK, &format!("Writing {}...", destination.display()));
    std::fs::write(destination, &data)?;

    println!("  {} decompressed", format_size(data.len() as u64));
    print_done(start.elapsed());
    Ok(())
}

pub fn compress(
    source: &Path,
    destination: &Path,
    params: CodecParams,
    strategy: MatchStrategy,
) -> anyhow::Result<()> {
    let start = Instant::now();

    print_step(1, 3, LOOKING_GLASS, &format!("Reading {}...", source.display()));
    let data = std::fs::read(source)?;

    print_step(2, 3, PACKAGE, &format!("Compressing [{params}, {strategy:?}]..."));
    let packed = compression::compress_with(&data, params, strategy)?;

    print_step(3, 3, DISK, &format!("Writing {}...", destination.display()));
    std::fs::write(destination, &packed)?;

    let ratio = if packed.is_empty() {
        0.0
    } else {
        data.len() as f64 / packed.len() as f64
    };
    println!(
        "  {} -> {} ({ratio:.2}x)",
        format_size(data.len() as u64),
        format_size(packed.len() as u64)
    );
    print_done(start.elapsed());
    Ok(())
}

pub fn inspect(
    source: &Path,
    offset: u64,
    params: CodecParams,
    size: Option<usize>,
    limit: usize,
    parts: bool,
) -> anyhow::Result<()> {
    let blob = std::fs::read(source)?;
    let tail = chunk_tail(&blob, offset)?;

    println!("Chunk at 0x{offset:08x} in {} [{params}]", source.display());
    let plausible = is_valid_prefix(tail, params, PLAUSIBILITY_PROBE);
    println!(
        "  First {PLAUSIBILITY_PROBE} bytes decode consistently: {}",
        if plausible { "yes" } else { "no" }
    );

    // Each instruction yields at most max_match_len bytes, so this many
    // bytes always takes at least `limit` instructions.
    let span = size.unwrap_or(limit.saturating_mul(params.max_match_len()));
    match disassemble(tail, params, Some(span)) {
        Ok(instructions) => {
            println!();
            let mut produced = 0usize;
            for instruction in instructions.iter().take(limit) {
                println!("  {produced:>8x}  {instruction}");
                produced += instruction.output_len();
            }
            if instructions.len() > limit {
                println!("  ... {} more", instructions.len() - limit);
            }
        }
        Err(e) => println!("  Disassembly stopped: {e}"),
    }

    if parts {
        let mut rolling = RollingDecompressor::new(tail, params)?;
        let offsets = rolling.part_offsets()?;
        println!();
        println!("Part table ({} entries):", offsets.len());
        for o in &offsets {
            println!("  0x{o:08x}");
        }
        if let Some(extent) = estimated_extent(&offsets) {
            println!("Estimated size: {}", format_size(extent as u64));
        }
    }

    Ok(())
}
