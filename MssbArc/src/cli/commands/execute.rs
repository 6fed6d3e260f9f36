//! Command execution implementations

use super::Commands;
use super::{codec, discover, extract, scan};

impl Commands {
    /// Execute the selected command.
    ///
    /// # Errors
    /// Returns an error if the underlying command fails.
    pub fn execute(&self) -> anyhow::Result<()> {
        match self {
            Commands::Decompress {
                source,
                offset,
                size,
                params,
                destination,
            } => codec::decompress(source, *offset, *size, *params, destination),
            Commands::Compress {
                source,
                destination,
                params,
                strategy,
            } => codec::compress(source, destination, *params, *strategy),
            Commands::Scan {
                source,
                params,
                stored,
                blob_name,
            } => scan::execute(source, *params, *stored, blob_name),
            Commands::Inspect {
                source,
                offset,
                params,
                size,
                limit,
                parts,
            } => codec::inspect(source, *offset, *params, *size, *limit, *parts),
            Commands::Discover {
                config,
                destination,
                force,
                quiet,
            } => discover::execute(config, destination, *force, *quiet),
            Commands::Extract {
                catalog,
                destination,
                quiet,
            } => extract::execute(catalog, destination, *quiet),
        }
    }
}
