//! Greedy encoder for the archive codec
//!
//! At every position the encoder looks for the longest earlier run (at least
//! two bytes, at most [`CodecParams::max_match_len`]) starting inside the
//! trailing window of [`CodecParams::window_size`] bytes. Runs may extend
//! past the current position; the decoder copies byte by byte. Among equally
//! long runs the one starting earliest in the buffer wins, so every
//! [`MatchStrategy`] produces identical output.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::bitstream::BitWriter;
use super::{CodecParams, MIN_MATCH_LEN};

/// How candidate matches are located. All strategies emit the same stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Compare against every window position.
    Naive,
    /// Only compare against window positions sharing the first byte.
    #[default]
    Indexed,
    /// Search for ever longer prefixes of the lookahead as substrings of
    /// the window until one is missing.
    Windowed,
}

impl std::str::FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "naive" => Ok(MatchStrategy::Naive),
            "indexed" | "index" => Ok(MatchStrategy::Indexed),
            "windowed" | "window" => Ok(MatchStrategy::Windowed),
            _ => Err(format!(
                "Invalid strategy '{s}'. Valid values: naive, indexed, windowed"
            )),
        }
    }
}

/// A run found in the window: absolute start offset and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Match {
    offset: usize,
    len: usize,
}

/// Number of equal bytes at `a` and `b`, capped at `limit`.
#[inline]
fn match_len(data: &[u8], a: usize, b: usize, limit: usize) -> usize {
    let mut len = 0;
    while len < limit && data[a + len] == data[b + len] {
        len += 1;
    }
    len
}

fn find_naive(data: &[u8], pos: usize, window_start: usize, limit: usize) -> Option<Match> {
    let mut best: Option<Match> = None;
    for offset in window_start..pos {
        let len = match_len(data, offset, pos, limit);
        if len >= MIN_MATCH_LEN && best.is_none_or(|b| len > b.len) {
            best = Some(Match { offset, len });
            if len == limit {
                break;
            }
        }
    }
    best
}

fn find_windowed(data: &[u8], pos: usize, window_start: usize, limit: usize) -> Option<Match> {
    let mut best: Option<Match> = None;
    // A run of length n+1 also matches n bytes, so the earliest (n+1)-byte
    // match never starts before the earliest n-byte one.
    let mut from = window_start;
    for len in MIN_MATCH_LEN..=limit {
        let needle = &data[pos..pos + len];
        // Candidate starts run up to pos - 1 and may reach into the lookahead.
        let haystack = &data[from..pos + len - 1];
        let Some(i) = haystack.windows(len).position(|w| w == needle) else {
            break;
        };
        from += i;
        best = Some(Match { offset: from, len });
    }
    best
}

/// Positions of each byte value seen so far, oldest first.
struct FirstByteIndex {
    positions: Vec<VecDeque<usize>>,
}

impl FirstByteIndex {
    fn new() -> Self {
        Self {
            positions: vec![VecDeque::new(); 256],
        }
    }

    fn insert(&mut self, byte: u8, pos: usize) {
        self.positions[usize::from(byte)].push_back(pos);
    }

    fn find(&mut self, data: &[u8], pos: usize, window_start: usize, limit: usize) -> Option<Match> {
        let candidates = &mut self.positions[usize::from(data[pos])];
        while candidates.front().is_some_and(|&p| p < window_start) {
            candidates.pop_front();
        }

        let mut best: Option<Match> = None;
        for &offset in candidates.iter() {
            let len = match_len(data, offset, pos, limit);
            if len >= MIN_MATCH_LEN && best.is_none_or(|b| len > b.len) {
                best = Some(Match { offset, len });
                if len == limit {
                    break;
                }
            }
        }
        best
    }
}

/// Compress `data` with the default [`MatchStrategy`].
///
/// # Errors
/// Returns [`Error::InvalidCodecParams`](crate::Error::InvalidCodecParams)
/// if the widths are outside `1..=16` (stored params copy `data` verbatim).
pub fn compress(data: &[u8], params: CodecParams) -> Result<Vec<u8>> {
    compress_with(data, params, MatchStrategy::default())
}

/// Compress `data` using a specific match-finding strategy.
pub fn compress_with(data: &[u8], params: CodecParams, strategy: MatchStrategy) -> Result<Vec<u8>> {
    params.validate_for_encoding()?;
    if params.is_stored() {
        return Ok(data.to_vec());
    }

    let window = params.window_size();
    let max_len = params.max_match_len();
    let far_bits = u32::from(params.lookback_bits);
    let len_bits = u32::from(params.repetition_bits);

    let mut writer = BitWriter::with_capacity(data.len());
    let mut index = (strategy == MatchStrategy::Indexed).then(FirstByteIndex::new);
    let mut pos = 0usize;
    let mut references = 0usize;

    while pos < data.len() {
        let window_start = pos.saturating_sub(window);
        let limit = max_len.min(data.len() - pos);

        let found = if limit < MIN_MATCH_LEN {
            None
        } else {
            match (&mut index, strategy) {
                (Some(index), _) => index.find(data, pos, window_start, limit),
                (None, MatchStrategy::Windowed) => find_windowed(data, pos, window_start, limit),
                (None, _) => find_naive(data, pos, window_start, limit),
            }
        };

        let advance = match found {
            Some(m) => {
                writer.write_reference(
                    (pos - m.offset - 1) as u32,
                    far_bits,
                    (m.len - MIN_MATCH_LEN) as u32,
                    len_bits,
                );
                references += 1;
                m.len
            }
            None => {
                writer.write_literal(data[pos]);
                1
            }
        };

        if let Some(index) = index.as_mut() {
            for p in pos..pos + advance {
                index.insert(data[p], p);
            }
        }
        pos += advance;
    }

    let out = writer.finish();
    tracing::debug!(
        "compressed {} -> {} bytes ({references} references, params {params}, {strategy:?})",
        data.len(),
        out.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{Instruction, decompress, disassemble};

    const STRATEGIES: [MatchStrategy; 3] = [
        MatchStrategy::Naive,
        MatchStrategy::Indexed,
        MatchStrategy::Windowed,
    ];

    #[test]
    fn test_round_trip_text() {
        let data = b"I am Sam. Sam I am. That Sam-I-am! That Sam-I-am! I do not like that Sam-I-am!";
        for strategy in STRATEGIES {
            let packed = compress_with(data, CodecParams::COMMON, strategy).unwrap();
            assert!(packed.len() < data.len());
            assert_eq!(decompress(&packed, CodecParams::COMMON, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_run_uses_overlapping_reference() {
        let data = [7u8; 12];
        let packed = compress(&data, CodecParams::COMMON).unwrap();
        let instructions = disassemble(&packed, CodecParams::COMMON, Some(data.len())).unwrap();
        assert_eq!(
            instructions,
            vec![
                Instruction::Literal(7),
                Instruction::Reference { far_back: 0, length: 11 },
            ]
        );
    }

    #[test]
    fn test_ties_prefer_earliest_offset() {
        // "xy" occurs at 0 and 3; the reference must point at offset 0.
        let data = b"xyzxyqxy";
        for strategy in STRATEGIES {
            let packed = compress_with(data, CodecParams::COMMON, strategy).unwrap();
            let instructions = disassemble(&packed, CodecParams::COMMON, Some(data.len())).unwrap();
            assert_eq!(
                instructions.last(),
                Some(&Instruction::Reference { far_back: 5, length: 2 }),
                "{strategy:?}"
            );
        }
    }

    #[test]
    fn test_window_bound_respected() {
        // With a 2-byte window the repeat of "ab" four bytes back is unreachable.
        let data = b"abcdab";
        let params = CodecParams::new(1, 2);
        let packed = compress(data, params).unwrap();
        let instructions = disassemble(&packed, params, Some(data.len())).unwrap();
        assert!(instructions.iter().all(|i| matches!(i, Instruction::Literal(_))));
        assert_eq!(decompress(&packed, params, data.len()).unwrap(), data);
    }

    #[test]
    fn test_length_bound_respected() {
        let data = [0u8; 40];
        let params = CodecParams::new(4, 2); // at most 5 bytes per reference
        let packed = compress(&data, params).unwrap();
        let instructions = disassemble(&packed, params, Some(data.len())).unwrap();
        assert!(instructions.iter().all(|i| i.output_len() <= 5));
        assert_eq!(decompress(&packed, params, data.len()).unwrap(), data);
    }

    #[test]
    fn test_strategies_agree() {
        let data: Vec<u8> = (0..2000u32).map(|i| ((i * 7) % 13 + (i / 50) % 3) as u8).collect();
        let params = CodecParams::new(6, 3);
        let expected = compress_with(&data, params, MatchStrategy::Naive).unwrap();
        for strategy in STRATEGIES {
            assert_eq!(compress_with(&data, params, strategy).unwrap(), expected);
        }
    }

    #[test]
    fn test_stored_and_empty() {
        assert_eq!(compress(b"abc", CodecParams::STORED).unwrap(), b"abc");
        assert!(compress(&[], CodecParams::COMMON).unwrap().is_empty());
        assert!(compress(b"abc", CodecParams::new(0, 4)).is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("Naive".parse::<MatchStrategy>(), Ok(MatchStrategy::Naive));
        assert_eq!("window".parse::<MatchStrategy>(), Ok(MatchStrategy::Windowed));
        assert!("fast".parse::<MatchStrategy>().is_err());
    }
}
