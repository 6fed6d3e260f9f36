//! Sub-file offset tables at the start of decompressed chunks
//!
//! Many chunks bundle several files and open with a list of big-endian `u32`
//! offsets to them, strictly increasing and terminated by a zero word.

use byteorder::{BigEndian, ByteOrder};

use crate::compression::RollingDecompressor;
use crate::error::{Error, Result};

/// Read the leading offset table of a decompressed chunk.
///
/// Stops at a zero word, at the first value not greater than its predecessor,
/// or when fewer than four bytes remain.
pub fn part_offsets(data: &[u8]) -> Vec<u32> {
    let mut offsets: Vec<u32> = Vec::new();
    for word in data.chunks_exact(4) {
        let value = BigEndian::read_u32(word);
        if value == 0 || offsets.last().is_some_and(|&last| value <= last) {
            break;
        }
        offsets.push(value);
    }
    offsets
}

/// Guess the decompressed size of a chunk from its part table: the last
/// offset plus the mean gap between offsets.
///
/// Needs at least two offsets.
pub fn estimated_extent(offsets: &[u32]) -> Option<usize> {
    let (first, last) = match offsets {
        [first, .., last] => (*first as usize, *last as usize),
        _ => return None,
    };
    let mean_gap = (last - first) / (offsets.len() - 1);
    Some(last + mean_gap)
}

impl RollingDecompressor<'_> {
    /// Read the chunk's part table, decoding only the words it occupies.
    ///
    /// Running out of input or reaching the output ceiling ends the table.
    ///
    /// # Errors
    /// Returns [`Error::CorruptData`] if the
    /// stream is inconsistent before the table ends.
    pub fn part_offsets(&mut self) -> Result<Vec<u32>> {
        let mut offsets: Vec<u32> = Vec::new();
        let mut pos = 0usize;
        loop {
            let word = match self.range(pos..pos + 4) {
                Ok(word) => BigEndian::read_u32(word),
                Err(Error::OutOfData { .. } | Error::RollingLimitExceeded { .. }) => break,
                Err(e) => return Err(e),
            };
            if word == 0 || offsets.last().is_some_and(|&last| word <= last) {
                break;
            }
            offsets.push(word);
            pos += 4;
        }
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CodecParams, compress};
    use pretty_assertions::assert_eq;

    fn with_table(offsets: &[u32], tail: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        for o in offsets {
            data.extend_from_slice(&o.to_be_bytes());
        }
        data.extend_from_slice(tail);
        data
    }

    #[test]
    fn test_terminators() {
        assert_eq!(part_offsets(&with_table(&[0x10, 0x40, 0], &[1, 2, 3, 4])), vec![0x10, 0x40]);
        assert_eq!(part_offsets(&with_table(&[0x10, 0x40, 0x20], &[])), vec![0x10, 0x40]);
        assert_eq!(part_offsets(&with_table(&[0x10, 0x40], &[9, 9])), vec![0x10, 0x40]);
        assert!(part_offsets(&[0, 0, 0, 0, 0, 0, 0, 8]).is_empty());
    }

    #[test]
    fn test_estimated_extent() {
        assert_eq!(estimated_extent(&[0x10, 0x30, 0x50]), Some(0x70));
        assert_eq!(estimated_extent(&[0x10]), None);
        assert_eq!(estimated_extent(&[]), None);
    }

    #[test]
    fn test_rolling_part_offsets() {
        let mut data = with_table(&[0x0c, 0x80, 0x100, 0], &[]);
        data.extend(std::iter::repeat_n(0x5Au8, 0x200));
        let packed = compress(&data, CodecParams::COMMON).unwrap();

        let mut rolling = RollingDecompressor::new(&packed, CodecParams::COMMON).unwrap();
        assert_eq!(rolling.part_offsets().unwrap(), vec![0x0c, 0x80, 0x100]);
        assert!(rolling.produced().len() < data.len());
        assert_eq!(part_offsets(&data), vec![0x0c, 0x80, 0x100]);
    }
}
