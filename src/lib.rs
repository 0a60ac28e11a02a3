//! Binary reaction-trace decoder and release-event analyzer.
//!
//! ## Scope
//! This crate reads the binary count-trace archives written by a
//! particle-based reaction simulator and detects discrete release events in
//! the decoded per-sensor traces, using either a deterministic counting rule
//! or a stochastic (Metropolis-style) energy rule.
//!
//! ## Key invariants
//! - A `TraceArchive` is immutable after decode and owned by exactly one
//!   analysis; decode either completes or fails, never partially.
//! - Two physical layouts exist (chunked and legacy); the variant is fixed at
//!   header-decode time and column resolution dispatches over it.
//! - The release engine is deterministic except for the explicitly injected
//!   `ReleaseRng`; the same seed reproduces identical release decisions.
//! - Malformed input fails loudly per unit of work (archive, entity, file);
//!   nothing is heuristically repaired and no failure aborts a batch.
//!
//! ## Flow (single archive)
//! 1) Decompress (bzip2/gzip) into a byte buffer.
//! 2) Decode the header: format tag, output-time scheme, block directory.
//! 3) Decode the payload into an exactly preallocated buffer.
//! 4) Per entity: resolve sensor columns, extract activation events, merge
//!    chronologically, apply the fusion policy, verify carrier counts.
//!
//! ## Notable entry points
//! - [`archive::decode_header`] / [`archive::decode`]: archive decoding.
//! - [`archive::TraceArchive`]: decoded archive and column resolution.
//! - [`release::detect_releases`]: per-entity release detection.
//! - [`runner::run`]: fixed worker pool over many archive files.

pub mod archive;
pub mod cursor;
pub mod release;
pub mod runner;

pub use archive::{
    decode, decode_header, ColumnSeries, DataKind, DecodeError, OutputScheme, TraceArchive,
};
pub use release::{
    detect_releases, Detection, EngineError, FusionModel, FusionPolicy, ReleaseEvent, ReleaseRng,
    Sensor, SensorClass, SensorConfig, TraceNaming,
};
pub use runner::{run, ArchiveReport, RunConfig, RunnerError};
