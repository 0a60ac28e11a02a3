//! Legacy layout: header parse and contiguous-run column resolution.
//!
//! # Layout
//! The legacy header records the iteration count and a u32 block count, then
//! all block names up front, then the scheme header (a zero-based u32 scheme
//! code that maps +1 into the shared enumeration), and finally one
//! `(kind, start, end)` entry per block. `start`/`end` are absolute offsets
//! into the uncompressed file; the first block's `start` doubles as the
//! global base that rebases every run onto the flat payload.
//!
//! Each block is a single column stored as one contiguous run, decoded as
//! u32 or f64 per its kind tag. The decoded item count must consume the run
//! exactly; anything else means the directory and payload disagree.

use super::{
    build_name_index, parse_time_metadata, ColumnSeries, DataKind, DecodeError, Layout,
    OutputScheme, TraceArchive,
};
use crate::cursor::ByteCursor;

/// Directory entry: data kind plus the absolute `[start, end)` byte run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BlockEntry {
    pub kind: DataKind,
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct LegacyLayout {
    /// Global base offset (the first block's `start`).
    pub base: u64,
    pub blocks: Vec<BlockEntry>,
}

pub(crate) fn parse_header(cur: &mut ByteCursor<'_>) -> Result<TraceArchive, DecodeError> {
    let iterations = cur.read_u64()?;
    let block_count = cur.read_u32()?;

    let mut names = Vec::new();
    for _ in 0..block_count {
        names.push(String::from_utf8_lossy(cur.read_until_nul()?).into_owned());
    }

    // Legacy scheme codes are zero-based; +1 lands them in the shared
    // enumeration. Codes past the known set fall out as unknown.
    let raw_code = cur.read_u32()?;
    let scheme = OutputScheme::from_code(raw_code.saturating_add(1).min(u16::MAX as u32) as u16)?;
    let (step_size, time_list) = parse_time_metadata(cur, scheme)?;

    let mut blocks = Vec::new();
    for _ in 0..block_count {
        let kind = DataKind::from_tag(cur.read_u8()? as u16)?;
        let start = cur.read_u64()?;
        let end = cur.read_u64()?;
        blocks.push(BlockEntry { kind, start, end });
    }
    let base = blocks.first().map_or(0, |b| b.start);

    let name_index = build_name_index(&names);
    Ok(TraceArchive {
        scheme,
        step_size,
        time_list,
        iterations,
        names,
        name_index,
        layout: Layout::Legacy(LegacyLayout { base, blocks }),
        payload: None,
    })
}

/// Payload capacity in bytes: every block's run at its kind's item width,
/// plus one iteration of slack the writer reserves against overflow.
pub(crate) fn payload_capacity(layout: &LegacyLayout, iterations: u64) -> usize {
    let runs: u64 = layout
        .blocks
        .iter()
        .map(|b| iterations.saturating_mul(b.kind.item_width()))
        .sum();
    runs.saturating_add(iterations) as usize
}

pub(crate) fn resolve_columns(
    layout: &LegacyLayout,
    payload: &[u8],
    iterations: u64,
    id: u64,
    name: &str,
) -> Result<ColumnSeries, DecodeError> {
    let entry = &layout.blocks[id as usize];
    let expected = entry.end.saturating_sub(entry.start);
    let bounds_mismatch = |consumed: u64| DecodeError::BlockBoundsMismatch {
        name: name.to_owned(),
        consumed,
        expected,
    };

    let (start, end) = match (
        entry.start.checked_sub(layout.base),
        entry.end.checked_sub(layout.base),
    ) {
        (Some(s), Some(e)) if s <= e => (s, e),
        _ => return Err(bounds_mismatch(0)),
    };

    let run = payload
        .get(start as usize..)
        .ok_or_else(|| bounds_mismatch(0))?;
    let mut cur = ByteCursor::new(run);
    let mut col = Vec::with_capacity(iterations as usize);
    match entry.kind {
        DataKind::Int => {
            for _ in 0..iterations {
                col.push(f64::from(cur.read_u32()?));
            }
        }
        DataKind::Double => {
            for _ in 0..iterations {
                col.push(cur.read_f64()?);
            }
        }
    }

    let consumed = cur.position() as u64;
    if start + consumed != end {
        return Err(bounds_mismatch(consumed));
    }

    Ok(ColumnSeries {
        columns: vec![col],
        kinds: vec![entry.kind],
    })
}
