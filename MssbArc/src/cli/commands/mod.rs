use clap::Subcommand;
use std::path::PathBuf;

use crate::compression::{CodecParams, MatchStrategy, parse_number};

pub mod codec;
pub mod discover;
pub mod execute;
pub mod extract;
pub mod scan;

/// Parse a decimal or `0x` hex offset/size argument
fn parse_u64(s: &str) -> Result<u64, String> {
    parse_number(s)
}

fn parse_usize(s: &str) -> Result<usize, String> {
    let value = parse_number(s)?;
    usize::try_from(value).map_err(|_| format!("{value} is too large"))
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decompress one chunk of a blob
    Decompress {
        /// Archive blob (e.g. ZZZZ.dat)
        #[arg(short, long)]
        source: PathBuf,

        /// Byte offset of the chunk (decimal or 0x hex)
        #[arg(short, long, value_parser = parse_u64)]
        offset: u64,

        /// Decompressed size (decimal or 0x hex)
        #[arg(short = 'z', long, value_parser = parse_usize)]
        size: usize,

        /// Lookback and repetition bit widths, e.g. "11,4" ("0,0" for stored)
        #[arg(short, long, default_value = "11,4")]
        params: CodecParams,

        /// Output file
        #[arg(short, long)]
        destination: PathBuf,
    },

    /// Compress a file into the archive's chunk format
    Compress {
        /// Input file
        #[arg(short, long)]
        source: PathBuf,

        /// Output file
        #[arg(short, long)]
        destination: PathBuf,

        /// Lookback and repetition bit widths, e.g. "11,4"
        #[arg(short, long, default_value = "11,4")]
        params: CodecParams,

        /// Match search strategy (naive, indexed, windowed). Output is identical.
        #[arg(long, default_value = "indexed")]
        strategy: MatchStrategy,
    },

    /// Scan a buffer (e.g. main.dol) for block descriptors
    Scan {
        /// Buffer to scan
        #[arg(short, long)]
        source: PathBuf,

        /// Bit widths to look for
        #[arg(short, long, default_value = "11,4")]
        params: CodecParams,

        /// Also look for stored-chunk descriptors
        #[arg(long)]
        stored: bool,

        /// Name of the blob the descriptors point into
        #[arg(long, default_value = "ZZZZ.dat")]
        blob_name: String,
    },

    /// Show the instruction stream at an offset
    Inspect {
        /// Archive blob
        #[arg(short, long)]
        source: PathBuf,

        /// Byte offset of the chunk (decimal or 0x hex)
        #[arg(short, long, value_parser = parse_u64)]
        offset: u64,

        /// Lookback and repetition bit widths
        #[arg(short, long, default_value = "11,4")]
        params: CodecParams,

        /// Decompressed size, if known
        #[arg(short = 'z', long, value_parser = parse_usize)]
        size: Option<usize>,

        /// Number of instructions to print
        #[arg(short, long, default_value_t = 32)]
        limit: usize,

        /// Also read the chunk's part-offset table
        #[arg(long)]
        parts: bool,
    },

    /// Build a chunk catalog from a discovery config
    Discover {
        /// Discovery config (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Catalog file to write (reused if it exists)
        #[arg(short, long)]
        destination: PathBuf,

        /// Rebuild the catalog even if it exists
        #[arg(short, long)]
        force: bool,

        /// Suppress progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Extract every chunk listed in a catalog
    Extract {
        /// Catalog file (JSON)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Output directory
        #[arg(short, long)]
        destination: PathBuf,

        /// Suppress progress bar
        #[arg(short, long)]
        quiet: bool,
    },
}
