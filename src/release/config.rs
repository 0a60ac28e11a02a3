//! Sensor and fusion-model configuration.
//!
//! # Invariants
//! - Configuration is plain data supplied by the caller and validated up
//!   front; the engine never reads process-wide state.
//! - Trace block names are produced from an explicit template, so the same
//!   engine serves models whose writers follow different naming conventions.
//!
//! # Design Notes
//! - Validation failures are configuration bugs, not hostile input; each
//!   variant names the violated constraint.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sensor class. Each class carries its own activation threshold and, under
/// the stochastic policy, its own energy contribution.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorClass {
    Primary = 0,
    Secondary = 1,
}

/// A binding-site detector: the site indices whose count traces it
/// aggregates, and its class.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sensor {
    pub sites: Vec<u32>,
    pub class: SensorClass,
}

/// Template-driven naming of trace blocks.
///
/// `sensor_template` supports the placeholders `{entity}`, `{class}`,
/// `{site}`, `{pulse}`, and `{seed}`. `{class}` expands to the configured
/// primary/secondary label; `{pulse}` is only substituted for multi-pulse
/// data; `{seed}` is zero-padded to `seed_width` digits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceNaming {
    pub sensor_template: String,
    pub primary_label: String,
    pub secondary_label: String,
    /// Regex template with an `{entity}` placeholder selecting the blocks
    /// that track charge-carrier binding for one entity.
    pub carrier_template: String,
    /// Zero-pad width for `{seed}`; 0 disables padding.
    pub seed_width: usize,
}

impl TraceNaming {
    /// Renders the block name for one site trace.
    #[must_use]
    pub fn sensor_block_name(
        &self,
        entity: &str,
        class: SensorClass,
        site: u32,
        pulse: Option<u32>,
        seed: u64,
    ) -> String {
        let label = match class {
            SensorClass::Primary => &self.primary_label,
            SensorClass::Secondary => &self.secondary_label,
        };
        let mut name = self
            .sensor_template
            .replace("{entity}", entity)
            .replace("{class}", label)
            .replace("{site}", &site.to_string())
            .replace("{seed}", &format!("{:0width$}", seed, width = self.seed_width));
        if let Some(pulse) = pulse {
            name = name.replace("{pulse}", &pulse.to_string());
        }
        name
    }

    /// Renders the charge-carrier block-selection pattern for one entity.
    ///
    /// The entity id is regex-escaped; the rest of the template is taken as
    /// a regular expression verbatim.
    #[must_use]
    pub fn carrier_pattern(&self, entity: &str) -> String {
        self.carrier_template
            .replace("{entity}", &regex::escape(entity))
    }
}

/// Static analysis configuration: sensors, entities, naming, and pulse
/// timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorConfig {
    pub sensors: Vec<Sensor>,
    /// Entity ids analyzed per archive, in order.
    pub entities: Vec<String>,
    pub naming: TraceNaming,
    /// Stimulation pulses recorded in the data; above 1, site traces exist
    /// per pulse and are summed.
    pub num_pulses: u32,
    /// Interstimulus interval in seconds. Only meaningful when
    /// `num_pulses > 1`.
    pub isi: f64,
    /// Duration of a single pulse in seconds.
    pub pulse_duration: f64,
}

impl SensorConfig {
    /// Checks internal consistency. Call once before analysis.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors.is_empty() {
            return Err(ConfigError::NoSensors);
        }
        if let Some(id) = self.sensors.iter().position(|s| s.sites.is_empty()) {
            return Err(ConfigError::SensorWithoutSites { sensor: id });
        }
        if self.entities.is_empty() {
            return Err(ConfigError::NoEntities);
        }
        for placeholder in ["{entity}", "{site}"] {
            if !self.naming.sensor_template.contains(placeholder) {
                return Err(ConfigError::MissingPlaceholder { placeholder });
            }
        }
        if !self.naming.carrier_template.contains("{entity}") {
            return Err(ConfigError::MissingPlaceholder {
                placeholder: "{entity}",
            });
        }
        if self.num_pulses > 1 {
            if !self.naming.sensor_template.contains("{pulse}") {
                return Err(ConfigError::MissingPlaceholder {
                    placeholder: "{pulse}",
                });
            }
            if self.isi <= 0.0 {
                return Err(ConfigError::NonPositiveIsi { isi: self.isi });
            }
        }
        Ok(())
    }
}

/// Release decision rule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum FusionPolicy {
    /// Release the moment exactly `required_active` sensors are active.
    Deterministic { required_active: u32 },
    /// Metropolis-style energy rule: active-sensor energies against a fusion
    /// threshold, with per-iteration acceptance sampling below it.
    Stochastic {
        fusion_energy: i32,
        primary_energy: i32,
        secondary_energy: i32,
    },
}

/// Fusion model: per-class activation thresholds plus the decision policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionModel {
    /// Bound count at which a primary sensor activates.
    pub primary_threshold: u32,
    /// Bound count at which a secondary sensor activates.
    pub secondary_threshold: u32,
    pub policy: FusionPolicy,
}

impl FusionModel {
    /// Checks internal consistency. Call once before analysis.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_threshold == 0 || self.secondary_threshold == 0 {
            return Err(ConfigError::ZeroActivationThreshold);
        }
        match self.policy {
            FusionPolicy::Deterministic { required_active } => {
                if required_active == 0 {
                    return Err(ConfigError::ZeroRequiredActive);
                }
            }
            FusionPolicy::Stochastic {
                primary_energy,
                secondary_energy,
                ..
            } => {
                if primary_energy < 0 {
                    return Err(ConfigError::NegativeEnergy {
                        which: "primary",
                        value: primary_energy,
                    });
                }
                if secondary_energy < 0 {
                    return Err(ConfigError::NegativeEnergy {
                        which: "secondary",
                        value: secondary_energy,
                    });
                }
            }
        }
        Ok(())
    }

    /// Activation threshold for a sensor class.
    #[must_use]
    pub fn threshold(&self, class: SensorClass) -> u32 {
        match class {
            SensorClass::Primary => self.primary_threshold,
            SensorClass::Secondary => self.secondary_threshold,
        }
    }
}

/// Validation error for sensor/fusion configuration.
///
/// Each variant corresponds to a violated constraint. Callers should treat
/// this as a configuration bug, not recoverable input.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    NoSensors,
    SensorWithoutSites { sensor: usize },
    NoEntities,
    MissingPlaceholder { placeholder: &'static str },
    NonPositiveIsi { isi: f64 },
    ZeroActivationThreshold,
    ZeroRequiredActive,
    NegativeEnergy { which: &'static str, value: i32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSensors => write!(f, "at least one sensor is required"),
            Self::SensorWithoutSites { sensor } => {
                write!(f, "sensor {sensor} has no binding sites")
            }
            Self::NoEntities => write!(f, "at least one entity id is required"),
            Self::MissingPlaceholder { placeholder } => {
                write!(f, "naming template is missing the {placeholder} placeholder")
            }
            Self::NonPositiveIsi { isi } => {
                write!(f, "multi-pulse analysis requires a positive ISI (got {isi})")
            }
            Self::ZeroActivationThreshold => {
                write!(f, "activation thresholds must be positive")
            }
            Self::ZeroRequiredActive => {
                write!(f, "deterministic policy requires a positive active-site count")
            }
            Self::NegativeEnergy { which, value } => {
                write!(f, "{which} sensor energy must be non-negative (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
