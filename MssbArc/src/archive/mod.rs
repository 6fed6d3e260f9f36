//! Archive layout: descriptors, claimed ranges, discovery and extraction
//!
//! An archive blob is a sequence of sector-aligned chunks. Some are listed
//! by 16-byte [`BlockDescriptor`] records scattered through the game's
//! executables; the rest have to be found by probing.
//!
//! # Example
//!
//! ```no_run
//! use mssbarc::archive::{Discovery, DiscoveryOptions};
//!
//! let blob = std::fs::read("ZZZZ.dat")?;
//! let main = std::fs::read("main.dol")?;
//!
//! let outcome = Discovery::new(&blob, "ZZZZ.dat")
//!     .with_reference(&main)
//!     .with_options(DiscoveryOptions::new())
//!     .run()?;
//! println!("{}", outcome.report);
//! # Ok::<(), mssbarc::Error>(())
//! ```

pub mod cache;
pub mod catalog;
pub mod descriptor;
pub mod discovery;
pub mod extract;
pub mod fingerprint;
pub mod parts;
pub mod ranges;

pub use cache::FileCache;
pub use catalog::Catalog;
pub use descriptor::{BlockDescriptor, DESCRIPTOR_SIZE, DescriptorRecord, SECTOR_SIZE, STORED_SIZE_TOLERANCE};
pub use discovery::{
    Discovery, DiscoveryConfig, DiscoveryOptions, DiscoveryOutcome, DiscoveryPhase, DiscoveryProgress,
    DiscoveryReport, ProbeFormat,
};
pub use extract::{ExtractProgress, ExtractSummary, extract_all, extract_chunk, output_file_name, write_chunks};
pub use fingerprint::{FingerprintScanner, find_fingerprints, fingerprint};
pub use parts::{estimated_extent, part_offsets};
pub use ranges::RangeSet;
