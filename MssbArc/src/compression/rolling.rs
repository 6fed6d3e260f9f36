//! Lazy decompression for chunks of unknown size
//!
//! Unreferenced chunks have no recorded decompressed size; decoding "to the
//! end" would run over whatever follows the chunk in the blob. The
//! [`RollingDecompressor`] only decodes as far as the caller has looked,
//! keeps everything produced so far, and refuses to grow past
//! [`MAX_ROLLING_OUTPUT`] bytes.
//!
//! A decode error ends the stream for good: the reader may have stopped in
//! the middle of an instruction, so later calls report the same error and
//! never decode past it.

use std::ops::Range;

use crate::error::{Error, Result};

use super::bitstream::BitReader;
use super::decompressor::{copy_reference, read_instruction};
use super::{CodecParams, Instruction};

/// Output ceiling for a single lazily decoded chunk (4 MB).
pub const MAX_ROLLING_OUTPUT: usize = 4_000_000;

/// Indexable view over a chunk's decompressed bytes, decoded on demand.
#[derive(Debug, Clone)]
pub struct RollingDecompressor<'a> {
    compressed: &'a [u8],
    reader: BitReader<'a>,
    params: CodecParams,
    output: Vec<u8>,
    limit: usize,
    failure: Option<Failure>,
}

/// First decode error of a view, replayed on every later request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    OutOfData { offset: usize, requested: u32 },
    Corrupt { position: usize, far_back: u32 },
}

impl Failure {
    /// `None` for errors that leave the reader usable.
    fn of(error: &Error) -> Option<Self> {
        match *error {
            Error::OutOfData { offset, requested } => Some(Self::OutOfData { offset, requested }),
            Error::CorruptData { position, far_back } => Some(Self::Corrupt { position, far_back }),
            _ => None,
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::OutOfData { offset, requested } => Error::OutOfData { offset, requested },
            Failure::Corrupt { position, far_back } => Error::CorruptData { position, far_back },
        }
    }
}

impl<'a> RollingDecompressor<'a> {
    /// Start a lazy decode of `compressed`.
    ///
    /// `compressed` normally runs from the chunk start to the end of the blob.
    pub fn new(compressed: &'a [u8], params: CodecParams) -> Result<Self> {
        params.validate_for_decoding()?;
        Ok(Self {
            compressed,
            reader: BitReader::new(compressed),
            params,
            output: Vec::new(),
            limit: MAX_ROLLING_OUTPUT,
            failure: None,
        })
    }

    /// Replace the output ceiling.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn params(&self) -> CodecParams {
        self.params
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes decoded so far.
    pub fn produced(&self) -> &[u8] {
        &self.output
    }

    /// Whether the ceiling has been reached.
    pub fn is_at_limit(&self) -> bool {
        self.output.len() >= self.limit
    }

    /// Whether a decode error ended the stream.
    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Consume the view, keeping whatever was decoded.
    pub fn into_output(self) -> Vec<u8> {
        self.output
    }

    /// Decode one instruction. Only called below the ceiling.
    fn step(&mut self) -> Result<()> {
        if let Some(failure) = self.failure {
            return Err(failure.into());
        }
        let decoded = self.decode_next();
        if let Err(e) = &decoded {
            self.failure = Failure::of(e);
        }
        decoded
    }

    fn decode_next(&mut self) -> Result<()> {
        match read_instruction(&mut self.reader, self.params)? {
            Instruction::Literal(byte) => self.output.push(byte),
            Instruction::Reference { far_back, length } => {
                let room = self.limit.saturating_sub(self.output.len());
                if length > room {
                    tracing::debug!("reference of {length} bytes cut at the 0x{:x} byte ceiling", self.limit);
                }
                copy_reference(&mut self.output, far_back, length.min(room))?;
            }
        }
        Ok(())
    }

    fn extend_stored(&mut self, len: usize) -> Result<()> {
        let have = self.output.len();
        let bytes = self.compressed.get(have..len).ok_or_else(|| Error::OutOfData {
            offset: self.compressed.len(),
            requested: (len.saturating_sub(self.compressed.len()) * 8) as u32,
        })?;
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    /// Decode until at least `len` bytes exist. Already-decoded bytes are reused.
    ///
    /// Requests past the ceiling fail even when the bytes would already be
    /// available, and output never grows beyond the ceiling.
    pub fn ensure(&mut self, len: usize) -> Result<()> {
        if len > self.limit {
            return Err(Error::RollingLimitExceeded {
                limit: self.limit,
                requested: len,
            });
        }
        if len <= self.output.len() {
            return Ok(());
        }
        if self.params.is_stored() {
            return self.extend_stored(len);
        }
        while self.output.len() < len {
            self.step()?;
        }
        Ok(())
    }

    /// Byte at `index`.
    pub fn get(&mut self, index: usize) -> Result<u8> {
        self.ensure(index + 1)?;
        Ok(self.output[index])
    }

    /// Bytes in `range`; an empty or inverted range yields an empty slice.
    pub fn range(&mut self, range: Range<usize>) -> Result<&[u8]> {
        self.ensure(range.start.max(range.end))?;
        Ok(self.output.get(range).unwrap_or(&[]))
    }

    /// Open-ended view starting at `start`, resolved when indexed.
    pub fn range_from(&mut self, start: usize) -> DeferredSlice<'_, 'a> {
        DeferredSlice {
            source: self,
            start,
        }
    }

    /// Decode until the stream runs out of bits or the ceiling is reached.
    ///
    /// After a decode error this returns that error again without decoding;
    /// [`RollingDecompressor::produced`] still holds the bytes before it.
    pub fn fill_to_end(&mut self) -> Result<&[u8]> {
        if self.params.is_stored() {
            let end = self.compressed.len().min(self.limit);
            if end > self.output.len() {
                self.extend_stored(end)?;
            }
            return Ok(&self.output);
        }
        if let Some(failure) = self.failure {
            return Err(failure.into());
        }
        while self.output.len() < self.limit && self.reader.has_bits() {
            self.step()?;
        }
        Ok(&self.output)
    }
}

/// A view of a [`RollingDecompressor`] with a fixed start and no end yet.
///
/// Indices passed to a deferred slice are relative to its start.
#[derive(Debug)]
pub struct DeferredSlice<'r, 'a> {
    source: &'r mut RollingDecompressor<'a>,
    start: usize,
}

impl DeferredSlice<'_, '_> {
    /// Absolute start offset in the decompressed chunk.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Byte at `index` past the start.
    pub fn get(&mut self, index: usize) -> Result<u8> {
        self.source.get(self.start + index)
    }

    /// Bytes in `range`, relative to the start.
    pub fn range(&mut self, range: Range<usize>) -> Result<&[u8]> {
        let absolute = self.start + range.start..self.start + range.end;
        self.source.range(absolute)
    }

    /// First `len` bytes of the view.
    pub fn take(&mut self, len: usize) -> Result<&[u8]> {
        self.range(0..len)
    }

    /// A further open-ended view `offset` bytes past this one's start.
    pub fn range_from(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            source: self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::bitstream::BitWriter;
    use crate::compression::{compress, decompress};

    fn sample() -> (Vec<u8>, Vec<u8>) {
        let data: Vec<u8> = b"rolling rolling rolling decompression of a rolling stream"
            .iter()
            .copied()
            .cycle()
            .take(600)
            .collect();
        let packed = compress(&data, CodecParams::COMMON).unwrap();
        (data, packed)
    }

    #[test]
    fn test_get_decodes_only_what_is_needed() {
        let (data, packed) = sample();
        let mut rolling = RollingDecompressor::new(&packed, CodecParams::COMMON).unwrap();
        assert_eq!(rolling.get(3).unwrap(), data[3]);
        assert!(rolling.produced().len() < data.len());

        let before = rolling.produced().len();
        assert_eq!(rolling.get(0).unwrap(), data[0]);
        assert_eq!(rolling.produced().len(), before);
    }

    #[test]
    fn test_range_matches_bulk() {
        let (data, packed) = sample();
        let bulk = decompress(&packed, CodecParams::COMMON, data.len()).unwrap();
        let mut rolling = RollingDecompressor::new(&packed, CodecParams::COMMON).unwrap();
        assert_eq!(rolling.range(100..250).unwrap(), &bulk[100..250]);
        assert_eq!(rolling.range(0..data.len()).unwrap(), bulk.as_slice());
        assert!(rolling.range(50..10).unwrap().is_empty());
    }

    #[test]
    fn test_deferred_slice_resolves_relative() {
        let (data, packed) = sample();
        let mut rolling = RollingDecompressor::new(&packed, CodecParams::COMMON).unwrap();
        let mut tail = rolling.range_from(40);
        assert_eq!(tail.get(2).unwrap(), data[42]);
        assert_eq!(tail.take(10).unwrap(), &data[40..50]);

        let mut deeper = tail.range_from(100);
        assert_eq!(deeper.start(), 140);
        assert_eq!(deeper.range(5..9).unwrap(), &data[145..149]);
    }

    #[test]
    fn test_limit_is_enforced() {
        let (_, packed) = sample();
        let mut rolling = RollingDecompressor::new(&packed, CodecParams::COMMON)
            .unwrap()
            .with_limit(64);
        assert!(rolling.get(63).is_ok());
        assert!(matches!(
            rolling.get(64),
            Err(Error::RollingLimitExceeded { limit: 64, requested: 65 })
        ));
        let all = rolling.fill_to_end().unwrap();
        assert_eq!(all.len(), 64);
        assert!(rolling.is_at_limit());
        assert!(rolling.get(64).is_err());
    }

    /// `a`, `b`, then a reference whose 20-bit distance is cut off by the end
    /// of the stream. The 13 bits left in the last word spell a literal `A`.
    fn stream_cut_inside_reference() -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.write_literal(b'a');
        writer.write_literal(b'b');
        writer.write_bits(BitWriter::REFERENCE_TAG, 1);
        writer.write_literal(b'A');
        writer.write_bits(0, 4);
        writer.finish()
    }

    #[test]
    fn test_error_is_latched() {
        let packed = stream_cut_inside_reference();
        assert_eq!(packed.len(), 4);
        let params = CodecParams::new(20, 4);
        assert!(matches!(decompress(&packed, params, 3), Err(Error::OutOfData { .. })));

        let mut rolling = RollingDecompressor::new(&packed, params).unwrap();
        assert!(matches!(rolling.get(2), Err(Error::OutOfData { .. })));
        assert!(rolling.has_failed());
        assert_eq!(rolling.produced(), b"ab");

        assert!(matches!(rolling.fill_to_end(), Err(Error::OutOfData { .. })));
        assert!(rolling.get(2).is_err());
        assert_eq!(rolling.get(1).unwrap(), b'b');
        assert_eq!(rolling.into_output(), b"ab");
    }

    #[test]
    fn test_long_reference_is_cut_at_limit() {
        // One literal then a single reference asking for 2^24 + 1 copies.
        let params = CodecParams::new(4, 24);
        let mut writer = BitWriter::new();
        writer.write_literal(b'x');
        writer.write_reference(0, 4, 0xFF_FFFF, 24);
        let packed = writer.finish();

        let mut rolling = RollingDecompressor::new(&packed, params).unwrap().with_limit(100);
        assert_eq!(rolling.fill_to_end().unwrap(), vec![b'x'; 100].as_slice());
        assert!(matches!(
            rolling.get(100),
            Err(Error::RollingLimitExceeded { limit: 100, requested: 101 })
        ));

        assert_eq!(decompress(&packed, params, 10).unwrap(), vec![b'x'; 10]);
    }

    #[test]
    fn test_fill_to_end_stops_at_stream_end() {
        let (data, packed) = sample();
        let mut rolling = RollingDecompressor::new(&packed, CodecParams::COMMON).unwrap();
        let all = rolling.fill_to_end().unwrap();
        assert!(all.starts_with(&data[..data.len() - 2]));
    }

    #[test]
    fn test_stored_view() {
        let raw = b"stored bytes";
        let mut rolling = RollingDecompressor::new(raw, CodecParams::STORED).unwrap();
        assert_eq!(rolling.range(0..6).unwrap(), b"stored");
        assert_eq!(rolling.fill_to_end().unwrap(), raw);
        assert!(rolling.get(raw.len()).is_err());
    }
}
