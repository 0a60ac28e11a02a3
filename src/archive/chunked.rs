//! Chunked (current) layout: header parse and striped column resolution.
//!
//! # Layout
//! After the shared scheme/time header come the stream-chunk stride, the
//! block count, and the directory: per block a NUL-terminated name, a column
//! count, and that many u16 kind tags. Directory offsets are running sums of
//! column counts, so every block addresses a contiguous sub-range of the
//! archive-wide column space.
//!
//! The payload is a sequence of stream chunks. Each chunk holds `stride`
//! iterations of *all* columns in column-major order:
//!
//! ```text
//! [col0 r0..rK][col1 r0..rK]...[colN r0..rK]   (K = rows in this chunk)
//! ```
//!
//! Every chunk holds `stride` rows except the final one, which holds
//! `iterations % stride` rows (or `stride` when the remainder is zero). An
//! archive shorter than one chunk is just a single partial chunk. Getting the
//! final-chunk row count wrong silently misaligns every block behind it, so
//! the addressing below must not be "simplified".

use super::{
    build_name_index, parse_time_metadata, ColumnSeries, DataKind, DecodeError, Layout,
    OutputScheme, TraceArchive,
};
use crate::cursor::{ByteCursor, ShortRead};

/// Directory entry: column count, per-column kinds, and the block's offset
/// into the archive-wide column space.
#[derive(Clone, Debug)]
pub(crate) struct BlockInfo {
    pub num_cols: u64,
    pub kinds: Vec<DataKind>,
    pub col_offset: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct ChunkedLayout {
    /// Iterations per stream chunk ("output buffer size" upstream).
    pub stride: u64,
    /// Grand total of columns across all blocks.
    pub total_cols: u64,
    pub blocks: Vec<BlockInfo>,
}

pub(crate) fn parse_header(cur: &mut ByteCursor<'_>) -> Result<TraceArchive, DecodeError> {
    let scheme = OutputScheme::from_code(cur.read_u16()?)?;
    let iterations = cur.read_u64()?;
    let (step_size, time_list) = parse_time_metadata(cur, scheme)?;
    let stride = cur.read_u64()?;
    let block_count = cur.read_u64()?;

    // Counts are untrusted: grow as entries actually decode rather than
    // preallocating from a header field.
    let mut names = Vec::new();
    let mut blocks = Vec::new();
    let mut total_cols = 0u64;
    for _ in 0..block_count {
        let name = String::from_utf8_lossy(cur.read_until_nul()?).into_owned();
        let num_cols = cur.read_u64()?;
        let mut kinds = Vec::new();
        for _ in 0..num_cols {
            kinds.push(DataKind::from_tag(cur.read_u16()?)?);
        }
        names.push(name);
        blocks.push(BlockInfo {
            num_cols,
            kinds,
            col_offset: total_cols,
        });
        total_cols += num_cols;
    }

    let name_index = build_name_index(&names);
    Ok(TraceArchive {
        scheme,
        step_size,
        time_list,
        iterations,
        names,
        name_index,
        layout: Layout::Chunked(ChunkedLayout {
            stride,
            total_cols,
            blocks,
        }),
        payload: None,
    })
}

/// Payload capacity in bytes: every iteration of every column as f64, plus
/// one iteration of slack the writer reserves against overflow.
pub(crate) fn payload_capacity(layout: &ChunkedLayout, iterations: u64) -> usize {
    iterations
        .saturating_mul(layout.total_cols)
        .saturating_mul(8)
        .saturating_add(iterations) as usize
}

/// Rows held by chunk `chunk` (zero-indexed): the stride, except for the
/// final partial chunk.
#[inline]
fn rows_in_chunk(iterations: u64, stride: u64, chunk: u64) -> u64 {
    (iterations - chunk * stride).min(stride)
}

pub(crate) fn resolve_columns(
    layout: &ChunkedLayout,
    payload: &[u8],
    iterations: u64,
    id: u64,
) -> Result<ColumnSeries, DecodeError> {
    let block = &layout.blocks[id as usize];
    // A zero stride means the writer never chunked; treat the whole series as
    // one chunk.
    let stride = if layout.stride == 0 {
        iterations.max(1)
    } else {
        layout.stride
    };

    let mut columns = Vec::with_capacity(block.num_cols as usize);
    for c in 0..block.num_cols {
        let mut col = Vec::with_capacity(iterations as usize);
        let mut row = 0u64;
        let mut chunk = 0u64;
        while row < iterations {
            let rows = rows_in_chunk(iterations, stride, chunk);
            let chunk_base = chunk * stride * layout.total_cols * 8;
            let col_base = chunk_base + rows * (block.col_offset + c) * 8;
            for r in 0..rows {
                col.push(read_f64_at(payload, col_base + r * 8)?);
            }
            row += rows;
            chunk += 1;
        }
        columns.push(col);
    }

    Ok(ColumnSeries {
        columns,
        kinds: block.kinds.clone(),
    })
}

#[inline]
fn read_f64_at(payload: &[u8], offset: u64) -> Result<f64, DecodeError> {
    let offset = offset as usize;
    let bytes = payload
        .get(offset..offset + 8)
        .ok_or(DecodeError::Truncated(ShortRead {
            needed: 8,
            remaining: payload.len().saturating_sub(offset),
        }))?;
    Ok(f64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
}
