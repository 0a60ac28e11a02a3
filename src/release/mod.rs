//! Release detection: sensor configuration, the fusion decision engine, and
//! the deterministic RNG backing the stochastic policy.
//!
//! [`detect_releases`] is the sole entry point; it takes a decoded
//! [`crate::archive::TraceArchive`] plus validated configuration and returns
//! per-entity results with failures isolated per entity.

pub mod config;
pub mod engine;
pub mod rng;

pub use config::{
    ConfigError, FusionModel, FusionPolicy, Sensor, SensorClass, SensorConfig, TraceNaming,
};
pub use engine::{
    detect_releases, ActivationEvent, Detection, EngineError, PulseWindow, ReleaseEvent,
};
pub use rng::ReleaseRng;
