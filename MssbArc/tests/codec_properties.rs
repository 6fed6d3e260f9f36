//! Property tests for the archive codec

use mssbarc::compression::{
    BitWriter, CodecParams, Instruction, MatchStrategy, RollingDecompressor, compress, compress_with,
    decompress, disassemble, is_valid,
};
use mssbarc::Error;
use proptest::prelude::*;

/// Byte strings with plenty of repeats, so references actually get emitted.
fn repetitive_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(0u8..4, 0..400),
        prop::collection::vec(any::<u8>(), 0..200),
        (prop::collection::vec(any::<u8>(), 1..12), 1usize..40)
            .prop_map(|(unit, times)| unit.repeat(times)),
    ]
}

fn params() -> impl Strategy<Value = CodecParams> {
    (1u8..=16, 1u8..=16).prop_map(|(lb, rb)| CodecParams::new(lb, rb))
}

fn encode(instructions: &[Instruction], params: CodecParams) -> Vec<u8> {
    let mut writer = BitWriter::new();
    for instruction in instructions {
        match *instruction {
            Instruction::Literal(byte) => writer.write_literal(byte),
            Instruction::Reference { far_back, length } => writer.write_reference(
                far_back,
                u32::from(params.lookback_bits),
                (length - 2) as u32,
                u32::from(params.repetition_bits),
            ),
        }
    }
    writer.finish()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn round_trip(data in repetitive_bytes(), params in params()) {
        let packed = compress(&data, params).unwrap();
        prop_assert_eq!(decompress(&packed, params, data.len()).unwrap(), data);
    }

    #[test]
    fn own_output_is_valid(data in repetitive_bytes(), params in params()) {
        let packed = compress(&data, params).unwrap();
        prop_assert!(is_valid(&packed, params));
    }

    #[test]
    fn stored_is_identity(data in prop::collection::vec(any::<u8>(), 0..100), take in 0usize..100) {
        let take = take.min(data.len());
        prop_assert_eq!(compress(&data, CodecParams::STORED).unwrap(), data.clone());
        prop_assert_eq!(decompress(&data, CodecParams::STORED, take).unwrap(), &data[..take]);
    }

    #[test]
    fn lazy_matches_bulk(data in repetitive_bytes(), params in params()) {
        let packed = compress(&data, params).unwrap();
        let bulk = decompress(&packed, params, data.len()).unwrap();

        let mut sequential = RollingDecompressor::new(&packed, params).unwrap();
        for (i, &expected) in bulk.iter().enumerate() {
            prop_assert_eq!(sequential.get(i).unwrap(), expected);
        }

        let mut sliced = RollingDecompressor::new(&packed, params).unwrap();
        prop_assert_eq!(sliced.range(0..data.len()).unwrap(), bulk.as_slice());
    }

    #[test]
    fn strategies_agree(data in repetitive_bytes(), params in params()) {
        let naive = compress_with(&data, params, MatchStrategy::Naive).unwrap();
        prop_assert_eq!(&compress_with(&data, params, MatchStrategy::Indexed).unwrap(), &naive);
        prop_assert_eq!(&compress_with(&data, params, MatchStrategy::Windowed).unwrap(), &naive);
    }

    #[test]
    fn reference_before_start_is_detected(
        data in prop::collection::vec(0u8..3, 8..300),
        pick in any::<prop::sample::Index>(),
    ) {
        let params = CodecParams::COMMON;
        let packed = compress(&data, params).unwrap();
        let mut instructions = disassemble(&packed, params, Some(data.len())).unwrap();

        // Output position at which each instruction starts.
        let mut starts = Vec::with_capacity(instructions.len());
        let mut produced = 0usize;
        for i in &instructions {
            starts.push(produced);
            produced += i.output_len();
        }

        let references: Vec<usize> = instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| matches!(i, Instruction::Reference { .. }))
            .map(|(k, _)| k)
            .filter(|&k| starts[k] < params.window_size())
            .collect();
        prop_assume!(!references.is_empty());

        let k = references[pick.index(references.len())];
        if let Instruction::Reference { far_back, .. } = &mut instructions[k] {
            *far_back = starts[k] as u32;
        }
        let corrupted = encode(&instructions, params);

        let is_corrupt = matches!(
            decompress(&corrupted, params, data.len()),
            Err(Error::CorruptData { .. })
        );
        prop_assert!(is_corrupt);
        prop_assert!(!is_valid(&corrupted, params));
    }
}
