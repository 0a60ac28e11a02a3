//! Release-event detection over decoded sensor traces.
//!
//! # Flow (per entity)
//! 1) For each sensor, resolve every configured site trace (and per-pulse
//!    trace for multi-pulse data), sum them elementwise, and scan the
//!    combined count series against the class threshold, emitting
//!    activation/deactivation transitions.
//! 2) Stable-sort all events by iteration, apply them into the active-sensor
//!    set, and evaluate the fusion policy once per distinct iteration, after
//!    every simultaneous event has been applied.
//! 3) On release, check that the charge-carrier traces account for at least
//!    the bound count implied by the active sensor composition.
//!
//! # Invariants
//! - At most one release per entity; the first accepted release is terminal.
//! - Activating an already-active sensor or deactivating an inactive one is
//!    a bug signal and fails that entity, never silently corrected.
//! - Entities are independent: one entity's failure leaves the others'
//!   results intact.
//!
//! # Determinism
//! The stochastic policy draws exactly one uniform sample per iteration of
//! the gap it scans, so a fixed seed reproduces the identical release
//! iteration. A closed-form geometric sample would be distributionally
//! equivalent but would break bit-for-bit seed reproducibility.

use std::collections::BTreeSet;
use std::fmt;

use crate::archive::{DecodeError, TraceArchive};
use crate::release::config::{FusionModel, FusionPolicy, SensorClass, SensorConfig};
use crate::release::rng::ReleaseRng;

/// Carrier units implied by an active sensor, by class.
const PRIMARY_CARRIER_UNITS: u64 = 2;
const SECONDARY_CARRIER_UNITS: u64 = 1;

/// One threshold crossing of one sensor's combined count series.
///
/// Produced transiently while scanning an entity's traces and consumed by
/// the release decision; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivationEvent {
    pub sensor: usize,
    pub entity: String,
    pub iter: u64,
    /// True for a below→at-or-above crossing, false for the reverse.
    pub activated: bool,
}

/// Which stimulus window a release time falls into (1-based): inside pulse
/// `n`, or in the interstimulus gap after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PulseWindow {
    Pulse(u32),
    Interstim(u32),
}

/// Terminal detection result for one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct ReleaseEvent {
    pub entity: String,
    pub iter: u64,
    /// Sensor ids active at release, ascending.
    pub sensors: Vec<usize>,
    /// Release time per the archive's output-time scheme.
    pub time: f64,
    pub window: PulseWindow,
}

/// Per-archive detection outcome: releases for the entities that fused,
/// errors for the entities whose analysis failed. Entities without events or
/// releases appear in neither list.
#[derive(Debug, Default)]
pub struct Detection {
    pub releases: Vec<ReleaseEvent>,
    pub entity_errors: Vec<(String, EngineError)>,
}

/// Errors from release detection. Each aborts one entity's analysis.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// Column resolution failed for a configured trace.
    Decode(DecodeError),
    /// A sensor or carrier trace had other than one column.
    ColumnShapeMismatch { name: String, columns: usize },
    /// An activation was applied to an already-active sensor, or a
    /// deactivation to an inactive one.
    InconsistentActivationState {
        sensor: usize,
        iter: u64,
        activated: bool,
    },
    /// The next event precedes the iteration under evaluation.
    OutOfOrderReleaseEvaluation { current: u64, next: u64 },
    /// The energy model produced an acceptance probability >= 1.
    StochasticModelMisconfigured { probability: f64 },
    /// Carrier traces account for less bound charge than the release's
    /// active sensors imply. Carries the rejected release so reports can
    /// show exactly what was detected.
    ChargeCarrierShortfall {
        release: ReleaseEvent,
        actual: u64,
        expected: u64,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "trace resolution failed: {err}"),
            Self::ColumnShapeMismatch { name, columns } => {
                write!(f, "trace {name:?} has {columns} columns, expected 1")
            }
            Self::InconsistentActivationState {
                sensor,
                iter,
                activated,
            } => {
                let what = if *activated {
                    "activate an already-active"
                } else {
                    "deactivate an inactive"
                };
                write!(f, "attempt to {what} sensor {sensor} at iteration {iter}")
            }
            Self::OutOfOrderReleaseEvaluation { current, next } => write!(
                f,
                "next event at iteration {next} precedes current iteration {current}"
            ),
            Self::StochasticModelMisconfigured { probability } => write!(
                f,
                "acceptance probability {probability} out of bounds; energy model misconfigured"
            ),
            Self::ChargeCarrierShortfall {
                release,
                actual,
                expected,
            } => write!(
                f,
                "bound carriers at iteration {} ({actual}) below the active-sensor \
                 expectation ({expected}) for entity {} releasing via sensors {:?}",
                release.iter, release.entity, release.sensors
            ),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DecodeError> for EngineError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

/// Detects release events for every configured entity of one archive.
///
/// Entities are analyzed independently; a failing entity contributes an
/// error to [`Detection::entity_errors`] without disturbing its siblings.
/// The RNG is only consulted by the stochastic policy.
pub fn detect_releases(
    archive: &TraceArchive,
    cfg: &SensorConfig,
    fusion: &FusionModel,
    rng: &mut ReleaseRng,
    seed: u64,
) -> Detection {
    let times = archive.output_times();
    let mut detection = Detection::default();
    for entity in &cfg.entities {
        match analyze_entity(archive, cfg, fusion, rng, seed, entity, &times) {
            Ok(Some(release)) => detection.releases.push(release),
            Ok(None) => {}
            Err(err) => detection.entity_errors.push((entity.clone(), err)),
        }
    }
    detection
}

fn analyze_entity(
    archive: &TraceArchive,
    cfg: &SensorConfig,
    fusion: &FusionModel,
    rng: &mut ReleaseRng,
    seed: u64,
    entity: &str,
    times: &[f64],
) -> Result<Option<ReleaseEvent>, EngineError> {
    let events = extract_activation_events(archive, cfg, fusion, seed, entity)?;
    if events.is_empty() {
        return Ok(None);
    }

    let Some((iter, sensors)) =
        extract_release_decision(events, cfg, fusion, archive.iterations_per_block(), rng)?
    else {
        return Ok(None);
    };

    let time = times
        .get(iter as usize)
        .copied()
        .unwrap_or(iter as f64 * archive.step_size());
    let release = ReleaseEvent {
        entity: entity.to_owned(),
        iter,
        sensors,
        time,
        window: pulse_window(cfg.isi, cfg.pulse_duration, time),
    };
    verify_carriers(archive, cfg, &release)?;
    Ok(Some(release))
}

/// Extracts the activation/deactivation events of every sensor for one
/// entity. A sensor that never crosses its threshold contributes nothing.
fn extract_activation_events(
    archive: &TraceArchive,
    cfg: &SensorConfig,
    fusion: &FusionModel,
    seed: u64,
    entity: &str,
) -> Result<Vec<ActivationEvent>, EngineError> {
    let iterations = archive.iterations_per_block() as usize;
    let pulses: Vec<Option<u32>> = if cfg.num_pulses <= 1 {
        vec![None]
    } else {
        (1..=cfg.num_pulses).map(Some).collect()
    };
    let mut events = Vec::new();

    for (id, sensor) in cfg.sensors.iter().enumerate() {
        let threshold = i64::from(fusion.threshold(sensor.class));

        // Sum every site trace (and per-pulse trace) into one count series.
        let mut combined = vec![0i64; iterations];
        for &site in &sensor.sites {
            for &pulse in &pulses {
                let name = cfg
                    .naming
                    .sensor_block_name(entity, sensor.class, site, pulse, seed);
                let series = archive.columns_by_name(&name)?;
                if series.columns.len() != 1 {
                    return Err(EngineError::ColumnShapeMismatch {
                        name,
                        columns: series.columns.len(),
                    });
                }
                for (acc, v) in combined.iter_mut().zip(&series.columns[0]) {
                    *acc += *v as i64;
                }
            }
        }

        let mut active = false;
        for (i, &count) in combined.iter().enumerate() {
            if !active && count >= threshold {
                active = true;
                events.push(ActivationEvent {
                    sensor: id,
                    entity: entity.to_owned(),
                    iter: i as u64,
                    activated: true,
                });
            } else if active && count < threshold {
                active = false;
                events.push(ActivationEvent {
                    sensor: id,
                    entity: entity.to_owned(),
                    iter: i as u64,
                    activated: false,
                });
            }
        }
    }
    Ok(events)
}

/// Merges the entity's events chronologically and applies the fusion policy.
///
/// Returns the release iteration and the ascending ids of the sensors active
/// at release, or `None` if the entity never fuses.
fn extract_release_decision(
    mut events: Vec<ActivationEvent>,
    cfg: &SensorConfig,
    fusion: &FusionModel,
    max_iter: u64,
    rng: &mut ReleaseRng,
) -> Result<Option<(u64, Vec<usize>)>, EngineError> {
    // Stable: simultaneous events keep their emission order.
    events.sort_by_key(|e| e.iter);

    let mut active: BTreeSet<usize> = BTreeSet::new();
    for (i, event) in events.iter().enumerate() {
        let consistent = if event.activated {
            active.insert(event.sensor)
        } else {
            active.remove(&event.sensor)
        };
        if !consistent {
            return Err(EngineError::InconsistentActivationState {
                sensor: event.sensor,
                iter: event.iter,
                activated: event.activated,
            });
        }

        // Apply every simultaneous event before evaluating; the release
        // condition sees only post-merge active sets.
        if events.get(i + 1).is_some_and(|next| next.iter == event.iter) {
            continue;
        }

        match fusion.policy {
            FusionPolicy::Deterministic { required_active } => {
                if active.len() == required_active as usize {
                    return Ok(Some((event.iter, active.iter().copied().collect())));
                }
            }
            FusionPolicy::Stochastic {
                fusion_energy,
                primary_energy,
                secondary_energy,
            } => {
                let energy: i64 = active
                    .iter()
                    .map(|&s| {
                        i64::from(match cfg.sensors[s].class {
                            SensorClass::Primary => primary_energy,
                            SensorClass::Secondary => secondary_energy,
                        })
                    })
                    .sum();
                let next = events.get(i + 1).map_or(max_iter, |n| n.iter);
                let Some(gap) = next.checked_sub(event.iter) else {
                    return Err(EngineError::OutOfOrderReleaseEvaluation {
                        current: event.iter,
                        next,
                    });
                };
                if let Some(offset) =
                    sample_release_offset(i64::from(fusion_energy), energy, gap, rng)?
                {
                    return Ok(Some((
                        event.iter + offset,
                        active.iter().copied().collect(),
                    )));
                }
            }
        }
    }
    Ok(None)
}

/// Metropolis acceptance scan: releases immediately when the bound energy
/// reaches the fusion threshold, otherwise draws one uniform sample per
/// iteration of the gap and accepts at the first sample below
/// `exp(energy - fusion_energy)`.
fn sample_release_offset(
    fusion_energy: i64,
    energy: i64,
    gap: u64,
    rng: &mut ReleaseRng,
) -> Result<Option<u64>, EngineError> {
    if energy >= fusion_energy {
        return Ok(Some(0));
    }
    let probability = ((energy - fusion_energy) as f64).exp();
    if probability >= 1.0 {
        return Err(EngineError::StochasticModelMisconfigured { probability });
    }
    for offset in 0..gap {
        if rng.next_f64() < probability {
            return Ok(Some(offset));
        }
    }
    Ok(None)
}

/// Stimulus-window attribution for a release time (1-based pulse index).
fn pulse_window(isi: f64, pulse_duration: f64, time: f64) -> PulseWindow {
    let pulse = if isi == 0.0 {
        0
    } else {
        (time / isi).floor() as u32
    };
    if time - f64::from(pulse) * isi > pulse_duration {
        PulseWindow::Interstim(pulse + 1)
    } else {
        PulseWindow::Pulse(pulse + 1)
    }
}

/// Post-release consistency check: the carrier traces attributable to the
/// entity must account for at least 2 units per active primary sensor and 1
/// per active secondary. A shortfall indicates a data/model mismatch and is
/// reported, never repaired.
fn verify_carriers(
    archive: &TraceArchive,
    cfg: &SensorConfig,
    release: &ReleaseEvent,
) -> Result<(), EngineError> {
    let expected: u64 = release
        .sensors
        .iter()
        .map(|&s| match cfg.sensors[s].class {
            SensorClass::Primary => PRIMARY_CARRIER_UNITS,
            SensorClass::Secondary => SECONDARY_CARRIER_UNITS,
        })
        .sum();

    let pattern = cfg.naming.carrier_pattern(&release.entity);
    let mut actual = 0u64;
    for (name, series) in archive.columns_by_regex(&pattern)? {
        if series.columns.len() != 1 {
            return Err(EngineError::ColumnShapeMismatch {
                name,
                columns: series.columns.len(),
            });
        }
        let bound = series.columns[0]
            .get(release.iter as usize)
            .copied()
            .unwrap_or(0.0);
        if bound > 0.0 {
            actual += bound as u64;
        }
    }

    if actual < expected {
        return Err(EngineError::ChargeCarrierShortfall {
            release: release.clone(),
            actual,
            expected,
        });
    }
    Ok(())
}
