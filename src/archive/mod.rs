//! Trace-archive decoding and column resolution.
//!
//! # Scope
//! This module decodes the binary count-trace archives produced by the
//! simulator and materializes named column series on demand. Two physical
//! layout variants exist and are mutually exclusive per archive:
//!
//! - **Chunked** (current): a striped payload of fixed-size stream chunks,
//!   each holding all columns for a run of iterations in column-major order.
//! - **Legacy**: one contiguous byte run per block, addressed by absolute
//!   `(start, end)` offsets recorded in the header.
//!
//! # Invariants
//! - An archive is immutable after decode; resolution never caches and never
//!   mutates.
//! - Decode either completes or fails; no partial archive escapes.
//! - For the chunked variant, the per-block column counts always sum to the
//!   recorded total column count (the directory offsets are running sums).
//!
//! # Design Notes
//! - The variant is a sum type picked once at header-decode time; resolution
//!   dispatches with a match, not dynamic dispatch.
//! - Header fields are untrusted; every read is bounds-checked and any short
//!   read surfaces as [`DecodeError::Truncated`].

pub mod chunked;
pub mod error;
pub mod legacy;

use std::borrow::Cow;
use std::collections::HashMap;

use crate::cursor::ByteCursor;

pub use error::DecodeError;

/// Format tag of the legacy (contiguous-run) layout.
pub const FORMAT_TAG_LEGACY: &[u8] = b"MCELL_BINARY_API_1";
/// Format tag of the chunked (striped) layout.
pub const FORMAT_TAG_CHUNKED: &[u8] = b"MCELL_BINARY_API_2";

const FORMAT_TAG_LEN: usize = 18;

/// How output rows map to wall/sim time.
///
/// The discriminants are the on-disk scheme codes of the chunked variant;
/// legacy archives store a zero-based u32 code that maps into the same space
/// by adding one.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputScheme {
    /// Rows are spaced by a fixed time step.
    FixedStep = 1,
    /// Rows carry an explicit list of output times.
    TimeList = 2,
    /// Rows carry an explicit list of output iterations.
    IterationList = 4,
}

impl OutputScheme {
    /// Maps an on-disk scheme code, rejecting anything outside the enumeration.
    pub fn from_code(code: u16) -> Result<Self, DecodeError> {
        match code {
            1 => Ok(Self::FixedStep),
            2 => Ok(Self::TimeList),
            4 => Ok(Self::IterationList),
            _ => Err(DecodeError::UnknownOutputScheme { code }),
        }
    }
}

/// Declared per-column payload data kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// 32-bit unsigned counts (legacy payloads only; chunked payloads store
    /// every column as f64 regardless of the declared kind).
    Int,
    /// IEEE-754 64-bit doubles.
    Double,
}

impl DataKind {
    pub fn from_tag(tag: u16) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Self::Int),
            1 => Ok(Self::Double),
            _ => Err(DecodeError::UnknownDataKind { tag }),
        }
    }

    /// Payload item width in bytes (legacy variant).
    #[must_use]
    pub const fn item_width(self) -> u64 {
        match self {
            Self::Int => 4,
            Self::Double => 8,
        }
    }
}

/// One resolved block: equal-length f64 column vectors plus the per-column
/// kind tags declared in the directory.
///
/// Produced on demand and never cached; each block is typically requested at
/// most once per analysis pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSeries {
    pub columns: Vec<Vec<f64>>,
    pub kinds: Vec<DataKind>,
}

/// Physical layout variant, fixed for the archive's lifetime.
#[derive(Clone, Debug)]
pub(crate) enum Layout {
    Chunked(chunked::ChunkedLayout),
    Legacy(legacy::LegacyLayout),
}

/// Which layout variant an archive uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatVersion {
    Chunked,
    Legacy,
}

/// Decoded, read-only representation of one simulation output file.
#[derive(Clone, Debug)]
pub struct TraceArchive {
    pub(crate) scheme: OutputScheme,
    pub(crate) step_size: f64,
    pub(crate) time_list: Vec<f64>,
    pub(crate) iterations: u64,
    pub(crate) names: Vec<String>,
    pub(crate) name_index: HashMap<String, u64>,
    pub(crate) layout: Layout,
    pub(crate) payload: Option<Vec<u8>>,
}

/// Decodes only the archive header.
///
/// The returned archive has no payload; it answers metadata queries cheaply
/// but rejects column resolution with [`DecodeError::MissingPayload`].
pub fn decode_header(bytes: &[u8]) -> Result<TraceArchive, DecodeError> {
    let mut cur = ByteCursor::new(bytes);
    decode_header_from(&mut cur)
}

/// Decodes the full archive: header, then payload.
pub fn decode(bytes: &[u8]) -> Result<TraceArchive, DecodeError> {
    let mut cur = ByteCursor::new(bytes);
    let mut archive = decode_header_from(&mut cur)?;

    let iterations = archive.iterations;
    // The writer preallocates one extra iteration's worth of slack to avoid
    // reallocation-on-overflow; the addressable span may fall short of full
    // capacity by up to that amount.
    let slack = iterations as usize;
    let capacity = match &archive.layout {
        Layout::Chunked(layout) => chunked::payload_capacity(layout, iterations),
        Layout::Legacy(layout) => legacy::payload_capacity(layout, iterations),
    };
    archive.payload = Some(cur.read_payload(capacity, slack)?);
    Ok(archive)
}

fn decode_header_from(cur: &mut ByteCursor<'_>) -> Result<TraceArchive, DecodeError> {
    let tag = cur.read_bytes(FORMAT_TAG_LEN)?;
    let version = if tag == FORMAT_TAG_CHUNKED {
        FormatVersion::Chunked
    } else if tag == FORMAT_TAG_LEGACY {
        FormatVersion::Legacy
    } else {
        return Err(DecodeError::UnrecognizedFormat {
            tag: String::from_utf8_lossy(tag).into_owned(),
        });
    };
    // Skip one reserved byte: a known defect in the upstream writer, kept
    // byte-for-byte for compatibility.
    cur.skip(1)?;
    match version {
        FormatVersion::Chunked => chunked::parse_header(cur),
        FormatVersion::Legacy => legacy::parse_header(cur),
    }
}

/// Reads the scheme-dependent time metadata: a length field, then either one
/// step size (FixedStep) or `length` f64 values (TimeList/IterationList).
pub(crate) fn parse_time_metadata(
    cur: &mut ByteCursor<'_>,
    scheme: OutputScheme,
) -> Result<(f64, Vec<f64>), DecodeError> {
    let length = cur.read_u64()?;
    match scheme {
        OutputScheme::FixedStep => Ok((cur.read_f64()?, Vec::new())),
        OutputScheme::TimeList | OutputScheme::IterationList => {
            // The length field is untrusted; grow as values actually decode.
            let mut times = Vec::new();
            for _ in 0..length {
                times.push(cur.read_f64()?);
            }
            Ok((0.0, times))
        }
    }
}

pub(crate) fn build_name_index(names: &[String]) -> HashMap<String, u64> {
    names
        .iter()
        .enumerate()
        .map(|(id, name)| (name.clone(), id as u64))
        .collect()
}

impl TraceArchive {
    /// Layout variant of this archive.
    #[must_use]
    pub fn format_version(&self) -> FormatVersion {
        match self.layout {
            Layout::Chunked(_) => FormatVersion::Chunked,
            Layout::Legacy(_) => FormatVersion::Legacy,
        }
    }

    #[must_use]
    pub fn output_scheme(&self) -> OutputScheme {
        self.scheme
    }

    /// Output time step. Only meaningful under [`OutputScheme::FixedStep`];
    /// zero otherwise.
    #[must_use]
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Number of output iterations per block (identical across all blocks).
    #[must_use]
    pub fn iterations_per_block(&self) -> u64 {
        self.iterations
    }

    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.names.len() as u64
    }

    /// Ordered block names as recorded in the directory.
    #[must_use]
    pub fn block_names(&self) -> &[String] {
        &self.names
    }

    /// Block name for a numeric id.
    pub fn block_name_by_id(&self, id: u64) -> Result<&str, DecodeError> {
        self.names
            .get(id as usize)
            .map(String::as_str)
            .ok_or(DecodeError::BlockIdOutOfRange {
                id,
                count: self.block_count(),
            })
    }

    /// Grand total of columns across all blocks. `None` for legacy archives,
    /// which do not track a shared column space.
    #[must_use]
    pub fn total_column_count(&self) -> Option<u64> {
        match &self.layout {
            Layout::Chunked(layout) => Some(layout.total_cols),
            Layout::Legacy(_) => None,
        }
    }

    /// Column count of one block (always 1 in the legacy layout).
    pub fn column_count_by_id(&self, id: u64) -> Result<u64, DecodeError> {
        self.check_id(id)?;
        match &self.layout {
            Layout::Chunked(layout) => Ok(layout.blocks[id as usize].num_cols),
            Layout::Legacy(_) => Ok(1),
        }
    }

    /// The per-iteration output times.
    ///
    /// Computed from the step size for FixedStep archives; borrowed from the
    /// decoded time list otherwise.
    #[must_use]
    pub fn output_times(&self) -> Cow<'_, [f64]> {
        match self.scheme {
            OutputScheme::FixedStep => Cow::Owned(
                (0..self.iterations)
                    .map(|i| i as f64 * self.step_size)
                    .collect(),
            ),
            OutputScheme::TimeList | OutputScheme::IterationList => {
                Cow::Borrowed(&self.time_list)
            }
        }
    }

    /// Resolves a block by directory name.
    pub fn columns_by_name(&self, name: &str) -> Result<ColumnSeries, DecodeError> {
        let id = *self
            .name_index
            .get(name)
            .ok_or_else(|| DecodeError::BlockNotFound {
                name: name.to_owned(),
            })?;
        self.columns_by_id(id)
    }

    /// Resolves a block by numeric id.
    pub fn columns_by_id(&self, id: u64) -> Result<ColumnSeries, DecodeError> {
        self.check_id(id)?;
        let payload = self.payload.as_deref().ok_or(DecodeError::MissingPayload)?;
        let name = &self.names[id as usize];
        match &self.layout {
            Layout::Chunked(layout) => {
                chunked::resolve_columns(layout, payload, self.iterations, id)
            }
            Layout::Legacy(layout) => {
                legacy::resolve_columns(layout, payload, self.iterations, id, name)
            }
        }
    }

    /// Resolves every block whose name matches `pattern`, in directory order.
    pub fn columns_by_regex(
        &self,
        pattern: &str,
    ) -> Result<Vec<(String, ColumnSeries)>, DecodeError> {
        let regex = regex::Regex::new(pattern).map_err(DecodeError::BadBlockPattern)?;
        let mut out = Vec::new();
        for (id, name) in self.names.iter().enumerate() {
            if regex.is_match(name) {
                out.push((name.clone(), self.columns_by_id(id as u64)?));
            }
        }
        Ok(out)
    }

    fn check_id(&self, id: u64) -> Result<(), DecodeError> {
        if id >= self.block_count() {
            return Err(DecodeError::BlockIdOutOfRange {
                id,
                count: self.block_count(),
            });
        }
        Ok(())
    }
}
