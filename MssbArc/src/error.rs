//! Error types for `MssbArc`

use thiserror::Error;

/// The error type for `MssbArc` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Codec Errors ====================
    /// The bit reader needed another 32-bit word but fewer than 4 bytes remain.
    #[error("out of data: needed {requested} more bits at byte offset 0x{offset:x}")]
    OutOfData {
        /// Byte offset of the reader when the refill was attempted.
        offset: usize,
        /// Number of bits that could not be satisfied.
        requested: u32,
    },

    /// A back-reference points before the start of the produced output.
    #[error("corrupt data: back-reference {far_back} at output position {position}")]
    CorruptData {
        /// Number of bytes produced when the reference was read.
        position: usize,
        /// The offending lookback distance.
        far_back: u32,
    },

    /// Lookback/repetition bit widths outside what the codec supports.
    #[error("invalid codec parameters: {0}")]
    InvalidCodecParams(String),

    /// The lazy decompressor was asked for bytes past its output ceiling.
    #[error("rolling decompression limit of {limit} bytes exceeded (requested {requested})")]
    RollingLimitExceeded {
        /// The fixed output ceiling.
        limit: usize,
        /// The number of bytes the caller asked to materialize.
        requested: usize,
    },

    // ==================== Descriptor Errors ====================
    /// Fewer than 16 bytes are available to parse a block descriptor.
    #[error("descriptor at 0x{offset:x} truncated: {available} bytes available")]
    DescriptorTruncated {
        /// Offset the parse started at.
        offset: usize,
        /// Bytes available from that offset.
        available: usize,
    },

    /// A parsed descriptor failed the sector-alignment or size checks.
    #[error("malformed descriptor at 0x{offset:x}: {reason}")]
    MalformedDescriptor {
        /// Offset of the descriptor record in the scanned buffer.
        offset: usize,
        /// Which check failed.
        reason: String,
    },

    /// A descriptor references bytes past the end of its blob.
    #[error("chunk at 0x{location:08x} (+0x{size:x}) lies outside blob of 0x{blob_len:x} bytes")]
    ChunkOutOfBounds {
        /// Disk location of the chunk.
        location: u64,
        /// Number of bytes the chunk needs.
        size: u64,
        /// Length of the blob.
        blob_len: usize,
    },

    /// A chunk failed to decode; carries the descriptor summary.
    #[error("chunk {descriptor}: {source}")]
    Chunk {
        /// One-line summary of the offending descriptor.
        descriptor: String,
        /// The underlying codec error.
        #[source]
        source: Box<Error>,
    },

    // ==================== Configuration / Parsing Errors ====================
    /// Discovery configuration is invalid.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap this error with the summary of the chunk it occurred in.
    #[must_use]
    pub fn in_chunk(self, descriptor: impl std::fmt::Display) -> Self {
        Error::Chunk {
            descriptor: descriptor.to_string(),
            source: Box::new(self),
        }
    }
}

/// A specialized Result type for `MssbArc` operations.
pub type Result<T> = std::result::Result<T, Error>;
