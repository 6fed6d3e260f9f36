//! Bulk and validating decompression
//!
//! [`decompress`] materializes a chunk of known size. [`is_valid`] and
//! [`is_valid_prefix`] walk the same instruction stream but only count
//! produced bytes, which is enough to tell whether a guessed offset and bit
//! widths describe a self-consistent stream.

use crate::error::{Error, Result};

use super::bitstream::BitReader;
use super::{CodecParams, Instruction, MIN_MATCH_LEN};

/// Read the next tagged instruction from the stream.
pub(crate) fn read_instruction(reader: &mut BitReader<'_>, params: CodecParams) -> Result<Instruction> {
    if reader.read_bit()? {
        let byte = reader.read_bits(8)?;
        return Ok(Instruction::Literal(byte as u8));
    }
    let far_back = reader.read_bits(u32::from(params.lookback_bits))?;
    let stored_len = reader.read_bits(u32::from(params.repetition_bits))?;
    Ok(Instruction::Reference {
        far_back,
        length: stored_len as usize + MIN_MATCH_LEN,
    })
}

/// Append `length` bytes copied from `far_back + 1` bytes behind the end of `out`.
///
/// The source may overlap the bytes being appended.
pub(crate) fn copy_reference(out: &mut Vec<u8>, far_back: u32, length: usize) -> Result<()> {
    let distance = far_back as usize;
    if distance >= out.len() {
        return Err(Error::CorruptData {
            position: out.len(),
            far_back,
        });
    }
    let start = out.len() - 1 - distance;
    out.reserve(length);
    for i in 0..length {
        let byte = out[start + i];
        out.push(byte);
    }
    Ok(())
}

/// Decompress a chunk whose decompressed size is known.
///
/// Stored chunks ([`CodecParams::STORED`]) return the first `original_size`
/// bytes unchanged. A final reference that runs past `original_size` is cut
/// at `original_size`.
///
/// # Errors
/// [`Error::OutOfData`] if the stream ends early, [`Error::CorruptData`] if
/// a reference reaches before the start of the output.
pub fn decompress(compressed: &[u8], params: CodecParams, original_size: usize) -> Result<Vec<u8>> {
    if params.is_stored() {
        return compressed
            .get(..original_size)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::OutOfData {
                offset: compressed.len(),
                requested: (original_size.saturating_sub(compressed.len()) * 8) as u32,
            });
    }
    params.validate_for_decoding()?;

    let mut reader = BitReader::new(compressed);
    let mut out = Vec::with_capacity(original_size);

    while out.len() < original_size {
        match read_instruction(&mut reader, params)? {
            Instruction::Literal(byte) => out.push(byte),
            Instruction::Reference { far_back, length } => {
                let room = original_size - out.len();
                if length > room {
                    tracing::debug!("final reference overran declared size by {} bytes", length - room);
                }
                copy_reference(&mut out, far_back, length.min(room))?;
            }
        }
    }
    Ok(out)
}

fn validate(compressed: &[u8], params: CodecParams, target: Option<usize>) -> bool {
    if params.is_stored() {
        return true;
    }
    if params.validate_for_decoding().is_err() {
        return false;
    }

    let mut reader = BitReader::new(compressed);
    let mut produced = 0usize;

    loop {
        let keep_going = match target {
            Some(target) => produced < target,
            None => reader.has_bits(),
        };
        if !keep_going {
            return true;
        }

        match read_instruction(&mut reader, params) {
            Ok(Instruction::Literal(_)) => produced += 1,
            Ok(Instruction::Reference { far_back, length }) => {
                // Nothing exists before position 0, so the distance must be
                // strictly inside what has been produced.
                if far_back as usize >= produced {
                    return false;
                }
                produced += length;
            }
            Err(_) => return false,
        }
    }
}

/// Check whether `compressed` decodes consistently with these widths.
///
/// Runs until the stream's bits are exhausted, counting output bytes without
/// materializing them. Never fails; any inconsistency yields `false`. Short
/// inputs can pass by accident, so callers should require a minimum size.
pub fn is_valid(compressed: &[u8], params: CodecParams) -> bool {
    validate(compressed, params, None)
}

/// Like [`is_valid`] but stops once `probe_size` output bytes are accounted for.
///
/// Running out of input before that point counts as invalid.
pub fn is_valid_prefix(compressed: &[u8], params: CodecParams, probe_size: usize) -> bool {
    validate(compressed, params, Some(probe_size))
}

/// Decode the instruction stream without producing output bytes.
///
/// With `original_size` the walk stops once that many bytes are described;
/// without it, once the stream's bits run out. Stored chunks have no
/// instructions.
pub fn disassemble(
    compressed: &[u8],
    params: CodecParams,
    original_size: Option<usize>,
) -> Result<Vec<Instruction>> {
    if params.is_stored() {
        return Ok(Vec::new());
    }
    params.validate_for_decoding()?;

    let mut reader = BitReader::new(compressed);
    let mut produced = 0usize;
    let mut instructions = Vec::new();

    loop {
        let keep_going = match original_size {
            Some(size) => produced < size,
            None => reader.has_bits(),
        };
        if !keep_going {
            break;
        }

        let instruction = read_instruction(&mut reader, params)?;
        if let Instruction::Reference { far_back, .. } = instruction {
            if far_back as usize >= produced {
                return Err(Error::CorruptData {
                    position: produced,
                    far_back,
                });
            }
        }
        produced += instruction.output_len();
        instructions.push(instruction);
    }

    Ok(instructions)
}
