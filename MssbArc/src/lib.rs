#![allow(non_snake_case)]
//! # MssbArc
//!
//! A pure-Rust library for unpacking the chunked, bit-packed LZ archives used
//! by Mario Superstar Baseball (`ZZZZ.dat`, `aaaa.dat`).
//!
//! ## What's Inside
//!
//! - **Codec** - Bulk, validating and lazy decompression plus a matching encoder
//! - **Block descriptors** - The 16-byte records locating chunks in a blob
//! - **Discovery** - Fingerprint scanning and sector probing to build a chunk catalog
//! - **Extraction** - Decompressing catalogued chunks to files
//!
//! ## Quick Start
//!
//! ### Decompressing a Chunk
//!
//! ```no_run
//! use mssbarc::compression::{CodecParams, decompress};
//!
//! let blob = std::fs::read("aaaa.dat")?;
//! let chunk = &blob[0x800..0x800 + 0x5A818];
//! let rel = decompress(chunk, CodecParams::new(11, 4), 0x1027E4)?;
//! # Ok::<(), mssbarc::Error>(())
//! ```
//!
//! ### Round-Tripping Data
//!
//! ```
//! use mssbarc::compression::{CodecParams, compress, decompress};
//!
//! let data = b"batter up, batter up, batter up";
//! let packed = compress(data, CodecParams::COMMON)?;
//! assert_eq!(decompress(&packed, CodecParams::COMMON, data.len())?, data);
//! # Ok::<(), mssbarc::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - Enables the `mssbarc` command-line binary

pub mod archive;
pub mod compression;
pub mod error;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};

    pub use crate::compression::{
        CodecParams, Instruction, MatchStrategy, RollingDecompressor,
        compress, compress_with, decompress, disassemble, is_valid, is_valid_prefix,
    };

    pub use crate::archive::{
        BlockDescriptor, Catalog, Discovery, DiscoveryConfig, DiscoveryOptions, DiscoveryReport,
        FileCache, FingerprintScanner, ProbeFormat, RangeSet,
        extract_all, extract_chunk, part_offsets, write_chunks,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;
