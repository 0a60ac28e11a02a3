//! End-to-end decode coverage over both archive layouts.

mod common;

use common::{ChunkedArchiveBuilder, LegacyArchiveBuilder, LegacyColumn};
use reltrace::archive::FormatVersion;
use reltrace::{decode, decode_header, DecodeError, OutputScheme};

fn value(col: u64, iter: u64) -> f64 {
    (col * 1000 + iter) as f64 * 0.5
}

fn chunked_fixture(stride: u64, iterations: u64) -> Vec<u8> {
    ChunkedArchiveBuilder::new(stride, iterations)
        .step(1e-3)
        .block("alpha", vec![(0..iterations).map(|i| value(0, i)).collect()])
        .block(
            "beta",
            vec![
                (0..iterations).map(|i| value(1, i)).collect(),
                (0..iterations).map(|i| value(2, i)).collect(),
            ],
        )
        .encode()
}

#[test]
fn chunked_round_trip_at_stride_boundaries() {
    // One row short of a chunk, exactly one chunk, and a final partial chunk.
    for iterations in [3u64, 4, 9] {
        let archive = decode(&chunked_fixture(4, iterations)).unwrap();
        assert_eq!(archive.format_version(), FormatVersion::Chunked);
        assert_eq!(archive.iterations_per_block(), iterations);

        let alpha = archive.columns_by_name("alpha").unwrap();
        let beta = archive.columns_by_name("beta").unwrap();
        for i in 0..iterations {
            assert_eq!(alpha.columns[0][i as usize], value(0, i));
            assert_eq!(beta.columns[0][i as usize], value(1, i));
            assert_eq!(beta.columns[1][i as usize], value(2, i));
        }
    }
}

#[test]
fn per_block_column_counts_sum_to_total() {
    let archive = decode(&chunked_fixture(4, 10)).unwrap();
    let total: u64 = (0..archive.block_count())
        .map(|id| archive.column_count_by_id(id).unwrap())
        .sum();
    assert_eq!(archive.total_column_count(), Some(total));
}

#[test]
fn resolution_is_bit_identical_across_calls() {
    let archive = decode(&chunked_fixture(4, 10)).unwrap();
    let first = archive.columns_by_name("beta").unwrap();
    let second = archive.columns_by_name("beta").unwrap();
    for (a, b) in first.columns.iter().zip(&second.columns) {
        let a_bits: Vec<u64> = a.iter().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u64> = b.iter().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }
}

#[test]
fn directory_metadata_matches_construction() {
    let archive = decode_header(&chunked_fixture(4, 10)).unwrap();
    assert_eq!(archive.block_names(), ["alpha", "beta"]);
    assert_eq!(archive.block_name_by_id(1).unwrap(), "beta");
    assert!(matches!(
        archive.block_name_by_id(5),
        Err(DecodeError::BlockIdOutOfRange { id: 5, count: 2 })
    ));
    assert_eq!(archive.column_count_by_id(0).unwrap(), 1);
    assert_eq!(archive.column_count_by_id(1).unwrap(), 2);
}

#[test]
fn fixed_step_output_times_are_derived() {
    let archive = decode(&chunked_fixture(4, 5)).unwrap();
    assert_eq!(archive.output_scheme(), OutputScheme::FixedStep);
    let times = archive.output_times();
    assert_eq!(times.len(), 5);
    assert_eq!(times[0], 0.0);
    assert_eq!(times[3], 3.0 * 1e-3);
}

#[test]
fn regex_resolution_follows_directory_order() {
    let archive = decode(&chunked_fixture(4, 6)).unwrap();
    let all = archive.columns_by_regex("^(alpha|beta)$").unwrap();
    let names: Vec<&str> = all.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["alpha", "beta"]);

    let err = archive.columns_by_regex("[unclosed").unwrap_err();
    assert!(matches!(err, DecodeError::BadBlockPattern(_)));
}

#[test]
fn unknown_scheme_code_is_rejected() {
    let mut bytes = chunked_fixture(4, 6);
    // Scheme code sits right after the tag and reserved byte.
    bytes[19..21].copy_from_slice(&3u16.to_le_bytes());
    assert!(matches!(
        decode_header(&bytes),
        Err(DecodeError::UnknownOutputScheme { code: 3 })
    ));
}

#[test]
fn garbage_input_is_rejected() {
    assert!(matches!(
        decode(b"not an archive at all......."),
        Err(DecodeError::UnrecognizedFormat { .. })
    ));
    // Shorter than the format tag.
    assert!(matches!(decode(b"MCELL"), Err(DecodeError::Truncated(_))));
}

/// Minimal chunked header declaring `iterations` rows and no blocks.
fn chunked_header_only(iterations: u64) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(b"MCELL_BINARY_API_2");
    b.push(0x00); // reserved byte
    b.extend_from_slice(&1u16.to_le_bytes()); // fixed-step scheme
    b.extend_from_slice(&iterations.to_le_bytes());
    b.extend_from_slice(&1u64.to_le_bytes());
    b.extend_from_slice(&1e-6f64.to_le_bytes());
    b.extend_from_slice(&4u64.to_le_bytes()); // stride
    b.extend_from_slice(&0u64.to_le_bytes()); // block count
    b
}

#[test]
fn hostile_iteration_count_does_not_allocate() {
    // iterations = u64::MAX makes the declared capacity and slack both
    // saturate; decode must come back normally instead of attempting an
    // overflowing allocation.
    let bytes = chunked_header_only(u64::MAX);
    let archive = decode(&bytes).unwrap();
    assert_eq!(archive.block_count(), 0);
    assert_eq!(archive.total_column_count(), Some(0));
}

#[test]
fn oversized_declared_payload_is_truncated() {
    // A multi-TiB declared payload with one block must fail the shortfall
    // check, not abort on allocation.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"MCELL_BINARY_API_2");
    bytes.push(0x00);
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&(1u64 << 40).to_le_bytes()); // iterations
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.extend_from_slice(&1e-6f64.to_le_bytes());
    bytes.extend_from_slice(&4u64.to_le_bytes());
    bytes.extend_from_slice(&1u64.to_le_bytes()); // block count
    bytes.extend_from_slice(b"only\0");
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    assert!(matches!(decode(&bytes), Err(DecodeError::Truncated(_))));
}

#[test]
fn truncation_beyond_slack_is_fatal() {
    let mut bytes = chunked_fixture(4, 10);
    bytes.truncate(bytes.len() - 128);
    assert!(matches!(decode(&bytes), Err(DecodeError::Truncated(_))));
}

#[test]
fn legacy_round_trip_mixed_kinds() {
    let iterations = 7u64;
    let bytes = LegacyArchiveBuilder::new(iterations)
        .block(
            "hits",
            LegacyColumn::Int((0..iterations as u32).map(|i| i * 2).collect()),
        )
        .block(
            "conc",
            LegacyColumn::Double((0..iterations).map(|i| i as f64 * 0.125).collect()),
        )
        .encode();
    let archive = decode(&bytes).unwrap();
    assert_eq!(archive.format_version(), FormatVersion::Legacy);
    assert_eq!(archive.total_column_count(), None);
    assert_eq!(archive.column_count_by_id(0).unwrap(), 1);

    let hits = archive.columns_by_name("hits").unwrap();
    let conc = archive.columns_by_name("conc").unwrap();
    for i in 0..iterations {
        assert_eq!(hits.columns[0][i as usize], (i * 2) as f64);
        assert_eq!(conc.columns[0][i as usize], i as f64 * 0.125);
    }
}
