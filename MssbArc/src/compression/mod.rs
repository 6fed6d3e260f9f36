//! Bit-packed LZ codec used by the archive
//!
//! Every chunk is a stream of tagged instructions: a `1` tag followed by a
//! literal byte, or a `0` tag followed by a `lookback_bits`-wide distance and a
//! `repetition_bits`-wide length (stored as length - 2). The widths differ per
//! chunk and are carried by the chunk's [`BlockDescriptor`](crate::archive::BlockDescriptor);
//! both zero means the chunk is stored uncompressed.

pub mod bitstream;
pub mod compressor;
pub mod decompressor;
pub mod rolling;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use bitstream::{BitReader, BitWriter};
pub use compressor::{MatchStrategy, compress, compress_with};
pub use decompressor::{decompress, disassemble, is_valid, is_valid_prefix};
pub use rolling::{DeferredSlice, MAX_ROLLING_OUTPUT, RollingDecompressor};

/// Shortest run worth encoding as a back-reference.
pub const MIN_MATCH_LEN: usize = 2;

/// Widest field the encoder accepts; wider windows are not used by the format.
pub const MAX_ENCODE_BITS: u8 = 16;

/// Lookback and repetition bit widths of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecParams {
    /// Width of the back-reference distance field.
    pub lookback_bits: u8,
    /// Width of the stored (length - 2) field.
    pub repetition_bits: u8,
}

impl CodecParams {
    /// Uncompressed chunk marker.
    pub const STORED: CodecParams = CodecParams {
        lookback_bits: 0,
        repetition_bits: 0,
    };

    /// The widths used by most compressed chunks in the game archives.
    pub const COMMON: CodecParams = CodecParams {
        lookback_bits: 11,
        repetition_bits: 4,
    };

    #[must_use]
    pub const fn new(lookback_bits: u8, repetition_bits: u8) -> Self {
        Self {
            lookback_bits,
            repetition_bits,
        }
    }

    /// Both widths zero: the chunk bytes are stored verbatim.
    pub const fn is_stored(self) -> bool {
        self.lookback_bits == 0 && self.repetition_bits == 0
    }

    /// Number of already-produced bytes a reference can reach back over.
    pub fn window_size(self) -> usize {
        1usize << self.lookback_bits
    }

    /// Longest run a single reference can copy.
    pub fn max_match_len(self) -> usize {
        (1usize << self.repetition_bits) + 1
    }

    /// Check the widths fit a single stream word.
    pub fn validate_for_decoding(self) -> Result<()> {
        if self.lookback_bits > 32 || self.repetition_bits > 32 {
            return Err(Error::InvalidCodecParams(format!(
                "{self} exceeds the 32-bit stream word"
            )));
        }
        Ok(())
    }

    /// Check the widths are usable by the encoder.
    pub fn validate_for_encoding(self) -> Result<()> {
        if self.is_stored() {
            return Ok(());
        }
        if !(1..=MAX_ENCODE_BITS).contains(&self.lookback_bits)
            || !(1..=MAX_ENCODE_BITS).contains(&self.repetition_bits)
        {
            return Err(Error::InvalidCodecParams(format!(
                "{self}: encoder widths must be in 1..={MAX_ENCODE_BITS}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CodecParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lookback_bits, self.repetition_bits)
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

impl FromStr for CodecParams {
    type Err = String;

    /// Accepts `"11,4"`, `"11 4"` or hex such as `"0xb,0x4"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s
            .split([',', ' '])
            .filter(|p| !p.trim().is_empty())
            .collect();
        let [lookback, repetition] = parts.as_slice() else {
            return Err(format!(
                "Invalid codec parameters '{s}'. Expected '<lookback bits>,<repetition bits>', e.g. 11,4"
            ));
        };
        let narrow = |v: u64| u8::try_from(v).map_err(|_| format!("bit width {v} out of range"));
        Ok(CodecParams::new(
            narrow(parse_number(lookback)?)?,
            narrow(parse_number(repetition)?)?,
        ))
    }
}

/// One decoded step of a compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// A byte copied straight to the output.
    Literal(u8),
    /// Copy `length` bytes starting `far_back + 1` bytes behind the write position.
    Reference {
        /// Distance field as stored.
        far_back: u32,
        /// True copy length (stored value + 2).
        length: usize,
    },
}

impl Instruction {
    /// Number of output bytes this instruction produces.
    pub fn output_len(&self) -> usize {
        match self {
            Instruction::Literal(_) => 1,
            Instruction::Reference { length, .. } => *length,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Literal(byte) => write!(f, "Literal({byte:02x})"),
            Instruction::Reference { far_back, length } => {
                write!(f, "Reference(look_back={far_back}, length={length})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_str() {
        assert_eq!("11,4".parse::<CodecParams>().unwrap(), CodecParams::COMMON);
        assert_eq!("11 4".parse::<CodecParams>().unwrap(), CodecParams::COMMON);
        assert_eq!("0xe, 5".parse::<CodecParams>().unwrap(), CodecParams::new(14, 5));
        assert!("11".parse::<CodecParams>().is_err());
        assert!("300,4".parse::<CodecParams>().is_err());
    }

    #[test]
    fn test_params_limits() {
        let params = CodecParams::COMMON;
        assert_eq!(params.window_size(), 2048);
        assert_eq!(params.max_match_len(), 17);
        assert!(CodecParams::STORED.is_stored());
        assert!(CodecParams::new(17, 4).validate_for_encoding().is_err());
        assert!(CodecParams::new(0, 4).validate_for_encoding().is_err());
        assert!(CodecParams::new(17, 4).validate_for_decoding().is_ok());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x800"), Ok(0x800));
        assert_eq!(parse_number("2048"), Ok(2048));
        assert!(parse_number("0xzz").is_err());
    }
}
