//! Decode-time error taxonomy.
//!
//! Every variant aborts the archive being decoded or resolved; no partial
//! `TraceArchive` is ever handed back. Downstream scientific analysis depends
//! on correctness, so malformed input fails loudly instead of being repaired.

use std::fmt;

use crate::cursor::ShortRead;

/// Errors from archive header/payload decode and column resolution.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// The leading ASCII tag matched none of the recognized format variants.
    UnrecognizedFormat { tag: String },
    /// The output-time scheme code is not part of the enumeration.
    UnknownOutputScheme { code: u16 },
    /// The stream ended before a declared field or the payload was complete.
    Truncated(ShortRead),
    /// A block declared a data-kind tag outside the known set.
    UnknownDataKind { tag: u16 },
    /// The requested block name is not in the directory.
    BlockNotFound { name: String },
    /// The requested numeric block id is past the directory.
    BlockIdOutOfRange { id: u64, count: u64 },
    /// Decoding a legacy block did not consume exactly its `[start, end)` run.
    BlockBoundsMismatch {
        name: String,
        consumed: u64,
        expected: u64,
    },
    /// Column resolution was requested on a header-only archive.
    MissingPayload,
    /// A block-selection pattern failed to compile.
    BadBlockPattern(regex::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedFormat { tag } => {
                write!(f, "unrecognized format tag {tag:?}")
            }
            Self::UnknownOutputScheme { code } => {
                write!(f, "unknown output scheme code {code}")
            }
            Self::Truncated(short) => write!(f, "truncated archive: {short}"),
            Self::UnknownDataKind { tag } => write!(f, "unknown data kind tag {tag}"),
            Self::BlockNotFound { name } => write!(f, "data block {name:?} not found"),
            Self::BlockIdOutOfRange { id, count } => {
                write!(f, "block id {id} out of range (archive has {count} blocks)")
            }
            Self::BlockBoundsMismatch {
                name,
                consumed,
                expected,
            } => write!(
                f,
                "block {name:?} decode consumed {consumed} bytes, expected {expected}"
            ),
            Self::MissingPayload => {
                write!(f, "archive was decoded header-only; payload is absent")
            }
            Self::BadBlockPattern(err) => write!(f, "bad block selection pattern: {err}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Truncated(short) => Some(short),
            Self::BadBlockPattern(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShortRead> for DecodeError {
    fn from(short: ShortRead) -> Self {
        Self::Truncated(short)
    }
}
