//! Bit packing over big-endian 32-bit words
//!
//! The archive codec packs values low-bit-first into a 32-bit accumulator that
//! is stored big-endian. When a value straddles two words, the bits left in
//! the current word hold the *high* part of the value and the low part starts
//! at bit 0 of the next word.
//!
//! ```text
//!  word n                         word n+1
//!  [ value.hi | earlier values ]  [ later values | value.lo ]
//!    msb                   lsb      msb                  lsb
//! ```

use crate::error::{Error, Result};

/// Size of one stream word in bytes.
pub const WORD_SIZE: usize = 4;

/// Low `n` bits of `value` (`n` may be 32).
#[inline]
fn low_bits(value: u32, n: u32) -> u32 {
    if n >= 32 {
        value
    } else {
        value & ((1u32 << n) - 1)
    }
}

/// Reads fixed-width values out of a compressed bit stream.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    buffer: u32,
    bits_buffered: u32,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first word of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_offset: 0,
            buffer: 0,
            bits_buffered: 0,
        }
    }

    /// Byte offset of the next word to load.
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Bytes not yet loaded into the bit buffer.
    pub fn remaining_bytes(&self) -> usize {
        self.data.len().saturating_sub(self.byte_offset)
    }

    /// Whether unread stream content remains.
    ///
    /// Used when the output size is unknown: reading stops once no further
    /// word can be loaded and the bits still buffered are all zero (the
    /// padding of the final partial word).
    pub fn has_bits(&self) -> bool {
        self.remaining_bytes() >= WORD_SIZE || self.buffer != 0
    }

    fn load_word(&mut self, requested: u32) -> Result<u32> {
        let end = self.byte_offset + WORD_SIZE;
        let Some(bytes) = self.data.get(self.byte_offset..end) else {
            return Err(Error::OutOfData {
                offset: self.byte_offset,
                requested,
            });
        };
        self.byte_offset = end;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an `n`-bit value (`n` in `0..=32`).
    ///
    /// # Errors
    /// Returns [`Error::OutOfData`] if a refill is needed and fewer than
    /// four bytes remain.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        debug_assert!(n <= 32, "read width {n} exceeds a stream word");
        if n == 0 {
            return Ok(0);
        }

        if n <= self.bits_buffered {
            let value = low_bits(self.buffer, n);
            self.buffer = self.buffer.checked_shr(n).unwrap_or(0);
            self.bits_buffered -= n;
            return Ok(value);
        }

        let needed = n - self.bits_buffered;
        let word = self.load_word(needed)?;

        // Leftover bits become the high part of the value.
        let high = self.buffer.checked_shl(needed).unwrap_or(0);
        let value = high | low_bits(word, needed);

        self.buffer = word.checked_shr(needed).unwrap_or(0);
        self.bits_buffered = 32 - needed;
        Ok(value)
    }

    /// Read a single tag bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }
}

/// Packs fixed-width values into a compressed bit stream.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    out: Vec<u8>,
    buffer: u32,
    bits_buffered: u32,
}

impl BitWriter {
    /// Tag bit marking a literal byte.
    pub const LITERAL_TAG: u32 = 1;
    /// Tag bit marking a back-reference.
    pub const REFERENCE_TAG: u32 = 0;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer with room reserved for roughly `bytes` of output.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            out: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    fn push_word(&mut self) {
        self.out.extend_from_slice(&self.buffer.to_be_bytes());
        self.buffer = 0;
        self.bits_buffered = 0;
    }

    /// Append the low `width` bits of `value`.
    ///
    /// # Panics
    /// Panics if `width > 32` or `value` does not fit in `width` bits. Silent
    /// truncation would corrupt the stream without any way to detect it.
    pub fn write_bits(&mut self, value: u32, width: u32) {
        assert!(width <= 32, "bit width {width} exceeds a stream word");
        assert!(
            low_bits(value, width) == value,
            "value {value:#x} does not fit in {width} bits"
        );
        if width == 0 {
            return;
        }

        if self.bits_buffered + width <= 32 {
            self.buffer |= value.checked_shl(self.bits_buffered).unwrap_or(0);
            self.bits_buffered += width;
            if self.bits_buffered == 32 {
                self.push_word();
            }
            return;
        }

        // The word's remaining bits take the high part of the value.
        let room = 32 - self.bits_buffered;
        let spill = width - room;
        self.buffer |= (value >> spill) << self.bits_buffered;
        self.push_word();
        self.buffer = low_bits(value, spill);
        self.bits_buffered = spill;
    }

    /// Emit a literal: tag 1 followed by the byte.
    pub fn write_literal(&mut self, byte: u8) {
        self.write_bits(Self::LITERAL_TAG, 1);
        self.write_bits(u32::from(byte), 8);
    }

    /// Emit a back-reference: tag 0, then `far_back` and the stored length.
    ///
    /// `length` is the stored value (true length minus 2).
    ///
    /// # Panics
    /// Panics if either value does not fit its declared width.
    pub fn write_reference(
        &mut self,
        far_back: u32,
        far_back_bits: u32,
        length: u32,
        length_bits: u32,
    ) {
        self.write_bits(Self::REFERENCE_TAG, 1);
        self.write_bits(far_back, far_back_bits);
        self.write_bits(length, length_bits);
    }

    /// Emit the trailing partial word, zero padded.
    pub fn flush(&mut self) {
        if self.bits_buffered > 0 {
            self.push_word();
        }
    }

    /// Bytes written so far, excluding any unflushed partial word.
    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty() && self.bits_buffered == 0
    }

    /// Flush and return the packed stream.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_within_one_word() {
        let mut writer = BitWriter::new();
        writer.write_bits(1, 1);
        writer.write_bits(0xAB, 8);
        writer.write_bits(0x5, 3);
        let bytes = writer.finish();

        // 0b101_10101011_1 packed from bit 0 upwards
        assert_eq!(bytes, (0b101_1010_1011_1u32).to_be_bytes());

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(1).unwrap(), 1);
        assert_eq!(reader.read_bits(8).unwrap(), 0xAB);
        assert_eq!(reader.read_bits(3).unwrap(), 0x5);
    }

    #[test]
    fn test_value_straddling_words() {
        let mut writer = BitWriter::new();
        writer.write_bits(0x3FFF_FFFF, 30);
        writer.write_bits(0b1011, 4);
        let bytes = writer.finish();
        assert_eq!(bytes.len(), 8);

        // High two bits of 0b1011 end word 0, low two bits start word 1.
        let first = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let second = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(first >> 30, 0b10);
        assert_eq!(second, 0b11);

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(30).unwrap(), 0x3FFF_FFFF);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1011);
    }

    #[test]
    fn test_full_width_values() {
        let mut writer = BitWriter::new();
        writer.write_bits(0xDEAD_BEEF, 32);
        writer.write_bits(1, 1);
        writer.write_bits(0x1234_5678, 32);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(32).unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_bits(1).unwrap(), 1);
        assert_eq!(reader.read_bits(32).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_refill_without_data_is_out_of_data() {
        let bytes = [0u8, 0, 0];
        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            reader.read_bits(1),
            Err(Error::OutOfData { offset: 0, requested: 1 })
        ));
    }

    #[test]
    fn test_has_bits_stops_on_zero_padding() {
        let mut writer = BitWriter::new();
        writer.write_literal(0x41);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert!(reader.has_bits());
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(8).unwrap(), 0x41);
        assert!(!reader.has_bits());
    }

    #[test]
    fn test_zero_width_is_noop() {
        let mut writer = BitWriter::new();
        writer.write_bits(0, 0);
        assert!(writer.is_empty());

        let mut reader = BitReader::new(&[]);
        assert_eq!(reader.read_bits(0).unwrap(), 0);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn test_oversized_value_panics() {
        let mut writer = BitWriter::new();
        writer.write_bits(0x10, 4);
    }
}
