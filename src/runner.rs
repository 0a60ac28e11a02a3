//! Batch driver: opens trace archives, decodes them, and runs release
//! detection across a bounded worker pool.
//!
//! # Design Notes
//! - Workers pull paths from a bounded channel, so a large batch never
//!   materializes more than `workers` decoded archives at once.
//! - Per-archive failures become failed [`ArchiveReport`]s; the batch keeps
//!   going. Only configuration and thread-spawn problems abort the run.
//! - Detection is seeded per archive from the batch seed and the seed
//!   embedded in the file name, so results do not depend on which worker
//!   picks up which file.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::{fmt, thread};

use bzip2::read::BzDecoder;
use crossbeam_channel as channel;
use flate2::read::GzDecoder;
use serde::Deserialize;

use crate::archive::{decode, DecodeError};
use crate::release::{detect_releases, Detection, FusionModel, ReleaseRng, SensorConfig};

/// Batch run configuration. Deserializable so a whole run can be described
/// in one config file.
#[derive(Clone, Debug, Deserialize)]
pub struct RunConfig {
    /// Worker thread count. Must be at least 1.
    pub workers: usize,
    /// Batch-level seed, mixed with each archive's file-name seed.
    pub seed: u64,
    pub sensors: SensorConfig,
    pub fusion: FusionModel,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.workers == 0 {
            return Err(RunnerError::ZeroWorkers);
        }
        self.sensors.validate().map_err(RunnerError::Config)?;
        self.fusion.validate().map_err(RunnerError::Config)?;
        Ok(())
    }
}

/// Outcome of one archive in a batch.
#[derive(Debug)]
pub struct ArchiveReport {
    pub path: PathBuf,
    /// Seed parsed from the file name, when the name was well formed.
    pub seed: Option<u64>,
    pub outcome: Result<Detection, RunnerError>,
}

/// Errors from the batch runner. Per-archive variants surface inside
/// [`ArchiveReport::outcome`]; the rest abort the run.
#[derive(Debug)]
#[non_exhaustive]
pub enum RunnerError {
    ZeroWorkers,
    Config(crate::release::ConfigError),
    /// File name does not follow the `<stem>.<seed>.bin[.gz|.bz2]`
    /// convention, so no seed can be recovered for it.
    MalformedFileName { path: PathBuf },
    Io { path: PathBuf, source: io::Error },
    Decode(DecodeError),
    Spawn(io::Error),
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroWorkers => write!(f, "worker count must be at least 1"),
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::MalformedFileName { path } => {
                write!(f, "no seed recoverable from file name {}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "i/o failure reading {}: {source}", path.display())
            }
            Self::Decode(err) => write!(f, "archive decode failed: {err}"),
            Self::Spawn(err) => write!(f, "failed to spawn worker thread: {err}"),
        }
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Decode(err) => Some(err),
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

/// Recovers the simulation seed embedded in an archive file name.
///
/// Accepts `<stem>.<seed>.bin`, optionally followed by `.gz` or `.bz2`.
/// The simulator always writes compressed output, so its names carry the
/// compression suffix; bare `.bin` is additionally accepted here so
/// archives decompressed by hand keep working.
pub fn extract_seed(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let name = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".bz2"))
        .unwrap_or(name);
    let name = name.strip_suffix(".bin")?;
    let (_, digits) = name.rsplit_once('.')?;
    digits.parse().ok()
}

/// Reads an archive into memory, transparently decompressing `.bz2` and
/// `.gz` inputs by file extension.
pub fn open_trace(path: &Path) -> Result<Vec<u8>, RunnerError> {
    let io_err = |source| RunnerError::Io {
        path: path.to_owned(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut bytes = Vec::new();
    let name = path.to_string_lossy();
    if name.ends_with(".bz2") {
        BzDecoder::new(file)
            .read_to_end(&mut bytes)
            .map_err(io_err)?;
    } else if name.ends_with(".gz") {
        GzDecoder::new(file)
            .read_to_end(&mut bytes)
            .map_err(io_err)?;
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes).map_err(io_err)?;
    }
    Ok(bytes)
}

/// Runs release detection over a batch of archives.
///
/// Reports come back sorted by path. A failing archive produces a failed
/// report; the remaining archives are unaffected.
pub fn run(cfg: &RunConfig, paths: &[PathBuf]) -> Result<Vec<ArchiveReport>, RunnerError> {
    cfg.validate()?;

    let (job_tx, job_rx) = channel::bounded::<PathBuf>(cfg.workers * 2);
    let (report_tx, report_rx) = channel::unbounded::<ArchiveReport>();

    let mut reports = thread::scope(|scope| -> Result<Vec<ArchiveReport>, RunnerError> {
        for idx in 0..cfg.workers {
            let job_rx = job_rx.clone();
            let report_tx = report_tx.clone();
            thread::Builder::new()
                .name(format!("release-worker-{idx}"))
                .spawn_scoped(scope, move || {
                    for path in job_rx {
                        // A closed report channel means the batch already
                        // aborted; stop quietly.
                        if report_tx.send(process_archive(cfg, &path)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(RunnerError::Spawn)?;
        }
        drop(job_rx);
        drop(report_tx);

        for path in paths {
            // Workers hold their receiver for the scope's lifetime, so a
            // send failure is unreachable unless every worker panicked.
            if job_tx.send(path.clone()).is_err() {
                break;
            }
        }
        drop(job_tx);

        Ok(report_rx.iter().collect())
    })?;

    reports.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(reports)
}

fn process_archive(cfg: &RunConfig, path: &Path) -> ArchiveReport {
    let Some(file_seed) = extract_seed(path) else {
        return ArchiveReport {
            path: path.to_owned(),
            seed: None,
            outcome: Err(RunnerError::MalformedFileName {
                path: path.to_owned(),
            }),
        };
    };

    let outcome = open_trace(path)
        .and_then(|bytes| decode(&bytes).map_err(RunnerError::Decode))
        .map(|archive| {
            let mut rng = ReleaseRng::new(cfg.seed ^ file_seed);
            detect_releases(&archive, &cfg.sensors, &cfg.fusion, &mut rng, file_seed)
        });
    ArchiveReport {
        path: path.to_owned(),
        seed: Some(file_seed),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn seed_extraction_handles_compression_suffixes() {
        assert_eq!(extract_seed(Path::new("out.0042.bin")), Some(42));
        assert_eq!(extract_seed(Path::new("/run/out.0042.bin.bz2")), Some(42));
        assert_eq!(extract_seed(Path::new("out.7.bin.gz")), Some(7));
    }

    #[test]
    fn seed_extraction_rejects_malformed_names() {
        assert_eq!(extract_seed(Path::new("out.0042.dat")), None);
        assert_eq!(extract_seed(Path::new("out.bin")), None);
        assert_eq!(extract_seed(Path::new("out.seed.bin")), None);
    }

    #[test]
    fn open_trace_reads_raw_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let payload = b"raw archive bytes";

        let raw = dir.path().join("t.0001.bin");
        std::fs::write(&raw, payload).unwrap();
        assert_eq!(open_trace(&raw).unwrap(), payload);

        let gz = dir.path().join("t.0001.bin.gz");
        let mut enc = flate2::write::GzEncoder::new(
            File::create(&gz).unwrap(),
            flate2::Compression::default(),
        );
        enc.write_all(payload).unwrap();
        enc.finish().unwrap();
        assert_eq!(open_trace(&gz).unwrap(), payload);
    }

    #[test]
    fn open_trace_reads_bzip2() {
        let dir = tempfile::tempdir().unwrap();
        let payload = b"compressed archive bytes";
        let bz = dir.path().join("t.0002.bin.bz2");
        let mut enc = bzip2::write::BzEncoder::new(
            File::create(&bz).unwrap(),
            bzip2::Compression::default(),
        );
        enc.write_all(payload).unwrap();
        enc.finish().unwrap();
        assert_eq!(open_trace(&bz).unwrap(), payload);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = open_trace(Path::new("/nonexistent/t.0001.bin")).unwrap_err();
        assert!(matches!(err, RunnerError::Io { .. }));
    }
}
