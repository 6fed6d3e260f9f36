//! Block descriptors: where a chunk lives and how it is encoded
//!
//! Binary layout (16 bytes, big-endian):
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0x00   | 2    | reserved (zero)                         |
//! | 0x02   | 1    | repetition bits                         |
//! | 0x03   | 1    | lookback bits                           |
//! | 0x04   | 4    | compression flag (4) / original size (28) |
//! | 0x08   | 4    | disk location                           |
//! | 0x0C   | 4    | compressed size                         |

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::compression::CodecParams;
use crate::error::{Error, Result};

/// Size of a packed descriptor record.
pub const DESCRIPTOR_SIZE: usize = 16;

/// Chunk storage is padded to multiples of this many bytes.
pub const SECTOR_SIZE: u64 = 0x800;

/// Largest allowed gap between stored and original size of a raw chunk.
pub const STORED_SIZE_TOLERANCE: u32 = 3;

const ORIGINAL_SIZE_MASK: u32 = 0x0FFF_FFFF;
const FLAG_SHIFT: u32 = 28;

/// Metadata for one chunk of an archive blob.
///
/// Equality and hashing cover every field except the display label; use
/// [`BlockDescriptor::same_content`] to also ignore which blob it points into.
#[derive(Debug, Clone)]
pub struct BlockDescriptor {
    /// Identity of the blob the chunk lives in (usually its path).
    pub source: String,
    /// Optional display/output name.
    pub label: Option<String>,
    /// Codec bit widths.
    pub params: CodecParams,
    /// Decompressed size (28 bits).
    pub original_size: u32,
    /// Top four bits of the size word.
    pub compression_flag: u8,
    /// Byte offset of the chunk in the blob.
    pub disk_location: u32,
    /// Stored size of the chunk in the blob.
    pub compressed_size: u32,
}

impl BlockDescriptor {
    /// Build a descriptor from its fields.
    ///
    /// `original_size` is masked to 28 bits and `compression_flag` to 4,
    /// matching what survives a pack/parse round trip.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        params: CodecParams,
        original_size: u32,
        compression_flag: u8,
        disk_location: u32,
        compressed_size: u32,
    ) -> Self {
        Self {
            source: source.into(),
            label: None,
            params,
            original_size: original_size & ORIGINAL_SIZE_MASK,
            compression_flag: compression_flag & 0x0F,
            disk_location,
            compressed_size,
        }
    }

    /// Parse a packed record at `offset` in `bytes`.
    pub fn parse(bytes: &[u8], offset: usize, source: impl Into<String>) -> Result<Self> {
        let record = bytes
            .get(offset..offset + DESCRIPTOR_SIZE)
            .ok_or(Error::DescriptorTruncated {
                offset,
                available: bytes.len().saturating_sub(offset),
            })?;

        let mut cursor = Cursor::new(record);
        let _reserved = cursor.read_u16::<BigEndian>()?;
        let repetition_bits = cursor.read_u8()?;
        let lookback_bits = cursor.read_u8()?;
        let size_word = cursor.read_u32::<BigEndian>()?;
        let disk_location = cursor.read_u32::<BigEndian>()?;
        let compressed_size = cursor.read_u32::<BigEndian>()?;

        Ok(Self {
            source: source.into(),
            label: None,
            params: CodecParams::new(lookback_bits, repetition_bits),
            original_size: size_word & ORIGINAL_SIZE_MASK,
            compression_flag: (size_word >> FLAG_SHIFT) as u8,
            disk_location,
            compressed_size,
        })
    }

    /// Pack into the 16-byte record format.
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut record = [0u8; DESCRIPTOR_SIZE];
        record[2] = self.params.repetition_bits;
        record[3] = self.params.lookback_bits;
        let size_word = (u32::from(self.compression_flag) << FLAG_SHIFT)
            | (self.original_size & ORIGINAL_SIZE_MASK);
        BigEndian::write_u32(&mut record[4..8], size_word);
        BigEndian::write_u32(&mut record[8..12], self.disk_location);
        BigEndian::write_u32(&mut record[12..16], self.compressed_size);
        record
    }

    /// Check the chunk start is sector-aligned and non-zero, and that stored
    /// chunks have plausible sizes.
    ///
    /// `offset` is where the record was found, for the error message.
    pub fn validate(&self, offset: usize) -> Result<()> {
        let malformed = |reason: String| Error::MalformedDescriptor { offset, reason };
        if self.disk_location == 0 {
            return Err(malformed("disk location is zero".into()));
        }
        if !self.is_sector_aligned() {
            return Err(malformed(format!(
                "disk location 0x{:x} is not a multiple of 0x{SECTOR_SIZE:x}",
                self.disk_location
            )));
        }
        if self.is_stored() {
            if self.compressed_size == 0 || self.original_size == 0 {
                return Err(malformed("stored chunk with zero size".into()));
            }
            if self.compressed_size.abs_diff(self.original_size) > STORED_SIZE_TOLERANCE {
                return Err(malformed(format!(
                    "stored sizes differ: 0x{:x} vs 0x{:x}",
                    self.compressed_size, self.original_size
                )));
            }
        }
        Ok(())
    }

    /// Attach a display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label if set, otherwise the default output name.
    pub fn label_or_default(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.default_label())
    }

    /// `"{source} {lb:02x}{rb:02x} {location:08x}.dat"`
    pub fn default_label(&self) -> String {
        format!(
            "{} {:02x}{:02x} {:08x}.dat",
            self.source, self.params.lookback_bits, self.params.repetition_bits, self.disk_location
        )
    }

    /// Padding after the chunk up to the next sector boundary (0 if aligned).
    pub fn footer_size(&self) -> u64 {
        let end = u64::from(self.disk_location) + u64::from(self.compressed_size);
        match end % SECTOR_SIZE {
            0 => 0,
            rem => SECTOR_SIZE - rem,
        }
    }

    /// Blob bytes claimed by the chunk, padding included.
    pub fn byte_range(&self) -> Range<u64> {
        let start = u64::from(self.disk_location);
        start..start + u64::from(self.compressed_size) + self.footer_size()
    }

    pub fn is_stored(&self) -> bool {
        self.params.is_stored()
    }

    pub fn is_sector_aligned(&self) -> bool {
        u64::from(self.disk_location) % SECTOR_SIZE == 0
    }

    /// Equal in every field except `source` and `label`.
    pub fn same_content(&self, other: &BlockDescriptor) -> bool {
        self.params == other.params
            && self.original_size == other.original_size
            && self.compression_flag == other.compression_flag
            && self.disk_location == other.disk_location
            && self.compressed_size == other.compressed_size
    }

    /// Slice of `blob` holding this chunk's stored bytes.
    pub fn stored_bytes<'b>(&self, blob: &'b [u8]) -> Result<&'b [u8]> {
        let start = self.disk_location as usize;
        let end = start + self.compressed_size as usize;
        blob.get(start..end).ok_or(Error::ChunkOutOfBounds {
            location: u64::from(self.disk_location),
            size: u64::from(self.compressed_size),
            blob_len: blob.len(),
        })
    }

    /// Slice of `blob` from the chunk start to the end of the blob.
    pub fn tail_bytes<'b>(&self, blob: &'b [u8]) -> Result<&'b [u8]> {
        blob.get(self.disk_location as usize..)
            .ok_or(Error::ChunkOutOfBounds {
                location: u64::from(self.disk_location),
                size: 0,
                blob_len: blob.len(),
            })
    }

    /// Multi-line field dump.
    pub fn describe(&self) -> String {
        format!(
            "File:            {}\n\
             Output Name:     {}\n\
             Lookback bits:   0x{:02x}\n\
             Repetition bits: 0x{:02x}\n\
             Original Size:   0x{:x}\n\
             Disk Location:   0x{:08x}\n\
             Compressed Size: 0x{:x}\n\
             Compressed Flag: {}\n\
             Footer Size:     0x{:x}",
            self.source,
            self.label_or_default(),
            self.params.lookback_bits,
            self.params.repetition_bits,
            self.original_size,
            self.disk_location,
            self.compressed_size,
            self.compression_flag,
            self.footer_size()
        )
    }

    fn key(&self) -> (u32, &str, CodecParams, u32, u8, u32) {
        (
            self.disk_location,
            &self.source,
            self.params,
            self.original_size,
            self.compression_flag,
            self.compressed_size,
        )
    }
}

impl PartialEq for BlockDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for BlockDescriptor {}

impl Hash for BlockDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Ordered by disk location first.
impl Ord for BlockDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for BlockDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BlockDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@0x{:08x} [{}] 0x{:x} -> 0x{:x}",
            self.source,
            self.disk_location,
            self.params,
            self.compressed_size,
            self.original_size
        )
    }
}

/// Catalog form of a descriptor, as stored in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorRecord {
    #[serde(rename = "Input")]
    pub input: String,
    #[serde(rename = "Output", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(rename = "lookbackBitSize")]
    pub lookback_bit_size: u8,
    #[serde(rename = "repetitionBitSize")]
    pub repetition_bit_size: u8,
    pub size: u32,
    pub offset: u32,
    #[serde(rename = "compressedSize")]
    pub compressed_size: u32,
    #[serde(rename = "compressionFlag")]
    pub compression_flag: u8,
    /// Written for readers of the catalog; recomputed when loading.
    #[serde(rename = "footerSize", default)]
    pub footer_size: u64,
}

impl From<&BlockDescriptor> for DescriptorRecord {
    fn from(d: &BlockDescriptor) -> Self {
        Self {
            input: d.source.clone(),
            output: Some(d.label_or_default()),
            lookback_bit_size: d.params.lookback_bits,
            repetition_bit_size: d.params.repetition_bits,
            size: d.original_size,
            offset: d.disk_location,
            compressed_size: d.compressed_size,
            compression_flag: d.compression_flag,
            footer_size: d.footer_size(),
        }
    }
}

impl From<DescriptorRecord> for BlockDescriptor {
    fn from(r: DescriptorRecord) -> Self {
        let descriptor = BlockDescriptor::new(
            r.input,
            CodecParams::new(r.lookback_bit_size, r.repetition_bit_size),
            r.size,
            r.compression_flag,
            r.offset,
            r.compressed_size,
        );
        match r.output {
            Some(label) => descriptor.with_label(label),
            None => descriptor,
        }
    }
}

impl Serialize for BlockDescriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        DescriptorRecord::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlockDescriptor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        DescriptorRecord::deserialize(deserializer).map(BlockDescriptor::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> BlockDescriptor {
        BlockDescriptor::new("ZZZZ.dat", CodecParams::new(14, 5), 0x3e1a0, 0, 0x08e77000, 0x143ec)
    }

    #[test]
    fn test_parse_and_pack() {
        let bytes = [
            0x00, 0x00, 0x04, 0x0b, // reserved, repetition, lookback
            0x40, 0x10, 0x27, 0xe4, // flag 4, size 0x1027e4
            0x00, 0x00, 0x08, 0x00, // disk location
            0x00, 0x05, 0xa8, 0x18, // compressed size
        ];
        let d = BlockDescriptor::parse(&bytes, 0, "aaaa.dat").unwrap();
        assert_eq!(d.params, CodecParams::COMMON);
        assert_eq!(d.compression_flag, 4);
        assert_eq!(d.original_size, 0x1027e4);
        assert_eq!(d.disk_location, 0x800);
        assert_eq!(d.compressed_size, 0x5a818);
        assert_eq!(d.to_bytes(), bytes);
    }

    #[test]
    fn test_parse_truncated() {
        let err = BlockDescriptor::parse(&[0u8; 20], 8, "x").unwrap_err();
        assert!(matches!(err, Error::DescriptorTruncated { offset: 8, available: 12 }));
    }

    #[test]
    fn test_footer_alignment() {
        let d = BlockDescriptor::new("x", CodecParams::COMMON, 0, 0, 0x1000, 0x123);
        assert_eq!(d.footer_size(), 0x6DD);
        assert_eq!((0x1000 + 0x123 + d.footer_size()) % SECTOR_SIZE, 0);
        assert_eq!(d.byte_range(), 0x1000..0x1800);

        let aligned = BlockDescriptor::new("x", CodecParams::COMMON, 0, 0, 0x1000, 0x800);
        assert_eq!(aligned.footer_size(), 0);
    }

    #[test]
    fn test_equality_ignores_label_not_source() {
        let a = sample();
        let b = sample().with_label("renamed.dat");
        assert_eq!(a, b);

        let mut other_source = sample();
        other_source.source = "aaaa.dat".into();
        assert_ne!(a, other_source);
        assert!(a.same_content(&other_source));
    }

    #[test]
    fn test_ordering_by_location() {
        let mut early = sample();
        early.disk_location = 0x800;
        early.source = "zzzz".into();
        assert!(early < sample());
    }

    #[test]
    fn test_record_round_trip() {
        let d = sample().with_label("cmp 08e77000.dat");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["lookbackBitSize"], 14);
        assert_eq!(json["offset"], 0x08e77000);
        assert_eq!(json["footerSize"], d.footer_size());

        let back: BlockDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
        assert_eq!(back.label.as_deref(), Some("cmp 08e77000.dat"));
    }

    #[test]
    fn test_validate() {
        assert!(sample().validate(0).is_ok());
        let mut unaligned = sample();
        unaligned.disk_location += 0x10;
        assert!(unaligned.validate(0).is_err());
        let ok = BlockDescriptor::new("x", CodecParams::COMMON, 0x100, 0, 0x8000, 0x80);
        assert!(ok.validate(0).is_ok());

        let zero = BlockDescriptor::new("x", CodecParams::COMMON, 0x100, 0, 0, 0x80);
        assert!(matches!(zero.validate(4), Err(Error::MalformedDescriptor { offset: 4, .. })));

        let raw = BlockDescriptor::new("x", CodecParams::STORED, 0x100, 0, 0x8000, 0x103);
        assert!(raw.validate(0).is_ok());
        let off_by_four = BlockDescriptor::new("x", CodecParams::STORED, 0x100, 0, 0x8000, 0x104);
        assert!(off_by_four.validate(0).is_err());
        let empty = BlockDescriptor::new("x", CodecParams::STORED, 0, 0, 0x8000, 0);
        assert!(empty.validate(0).is_err());
    }

    #[test]
    fn test_default_label() {
        assert_eq!(sample().default_label(), "ZZZZ.dat 0e05 08e77000.dat");
    }
}
