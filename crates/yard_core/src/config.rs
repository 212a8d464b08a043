//! Engine configuration and the per-device physics collaborator.
//!
//! [SimConfig] holds the engine-wide knobs and loads from TOML with defaults
//! for anything omitted. Per-device physics comes from a [PhysicsConfig]
//! implementation; lookups never fall back to a default, a missing value is a
//! [ConfigurationError].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures within `window_ms` that suspend a business type.
    pub max_failures: usize,
    pub window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Meters below which a waypoint counts as reached.
    pub arrival_threshold: f64,
    /// Meters within which a truck can plug into its station.
    pub charge_align_threshold: f64,
    pub max_events_per_timestamp: usize,
    /// Physics tick interval; 0 disables the tick.
    pub physics_tick_ms: u64,
    /// Fixed part of a crane fetch/put cycle.
    pub crane_operation_ms: u64,
    pub hoist_height_m: f64,
    /// Rail distance between neighbouring bays.
    pub bay_pitch_m: f64,
    pub error_log_capacity: usize,
    pub event_log_capacity: usize,
    pub dead_loop_log_capacity: usize,
    /// Business-type breaker; absent means it never trips.
    pub business_breaker: Option<BreakerConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arrival_threshold: 0.01,
            charge_align_threshold: 1.0,
            max_events_per_timestamp: 10_000,
            physics_tick_ms: 100,
            crane_operation_ms: 30_000,
            hoist_height_m: 20.0,
            bay_pitch_m: 6.1,
            error_log_capacity: 1_000,
            event_log_capacity: 10_000,
            dead_loop_log_capacity: 100,
            business_breaker: None,
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        let config: SimConfig =
            toml::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_physics_tick_ms(mut self, tick_ms: u64) -> Self {
        self.physics_tick_ms = tick_ms;
        self
    }

    pub fn with_max_events_per_timestamp(mut self, max: usize) -> Self {
        self.max_events_per_timestamp = max;
        self
    }

    pub fn with_business_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.business_breaker = Some(breaker);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("arrival_threshold", self.arrival_threshold)?;
        positive("charge_align_threshold", self.charge_align_threshold)?;
        positive("hoist_height_m", self.hoist_height_m)?;
        positive("bay_pitch_m", self.bay_pitch_m)?;
        non_zero("max_events_per_timestamp", self.max_events_per_timestamp)?;
        non_zero("error_log_capacity", self.error_log_capacity)?;
        non_zero("event_log_capacity", self.event_log_capacity)?;
        non_zero("dead_loop_log_capacity", self.dead_loop_log_capacity)?;
        if let Some(breaker) = &self.business_breaker {
            non_zero("business_breaker.max_failures", breaker.max_failures)?;
            if breaker.window_ms == 0 {
                return Err(invalid("business_breaker.window_ms", "must be greater than 0"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a positive finite number, got {value}")))
    }
}

fn non_zero(field: &'static str, value: usize) -> Result<(), ConfigurationError> {
    if value == 0 {
        Err(invalid(field, "must be greater than 0"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicsParameter {
    HorizontalSpeed,
    HoistSpeed,
    PowerConsumeRate,
    LoadedConsumeCoefficient,
    SafePowerThreshold,
}

impl fmt::Display for PhysicsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhysicsParameter::HorizontalSpeed => "horizontal_speed",
            PhysicsParameter::HoistSpeed => "hoist_speed",
            PhysicsParameter::PowerConsumeRate => "power_consume_rate",
            PhysicsParameter::LoadedConsumeCoefficient => "loaded_consume_coefficient",
            PhysicsParameter::SafePowerThreshold => "safe_power_threshold",
        };
        f.write_str(name)
    }
}

/// Per-device physics lookups, keyed by device id.
pub trait PhysicsConfig: Send + Sync {
    fn parameter(&self, device_id: &str, parameter: PhysicsParameter) -> Result<f64, ConfigurationError>;

    /// Meters per second along the ground or rail.
    fn horizontal_speed(&self, device_id: &str) -> Result<f64, ConfigurationError> {
        self.parameter(device_id, PhysicsParameter::HorizontalSpeed)
    }

    /// Meters per second for the spreader.
    fn hoist_speed(&self, device_id: &str) -> Result<f64, ConfigurationError> {
        self.parameter(device_id, PhysicsParameter::HoistSpeed)
    }

    /// Battery percent per second of travel.
    fn power_consume_rate(&self, device_id: &str) -> Result<f64, ConfigurationError> {
        self.parameter(device_id, PhysicsParameter::PowerConsumeRate)
    }

    /// Multiplier on consumption while carrying a container.
    fn loaded_consume_coefficient(&self, device_id: &str) -> Result<f64, ConfigurationError> {
        self.parameter(device_id, PhysicsParameter::LoadedConsumeCoefficient)
    }

    /// Battery percent below which a truck needs charging.
    fn safe_power_threshold(&self, device_id: &str) -> Result<f64, ConfigurationError> {
        self.parameter(device_id, PhysicsParameter::SafePowerThreshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhysicsProfile {
    pub horizontal_speed: Option<f64>,
    pub hoist_speed: Option<f64>,
    pub power_consume_rate: Option<f64>,
    pub loaded_consume_coefficient: Option<f64>,
    pub safe_power_threshold: Option<f64>,
}

impl PhysicsProfile {
    pub fn truck(speed: f64, consume_rate: f64, loaded_coefficient: f64, safe_threshold: f64) -> Self {
        Self {
            horizontal_speed: Some(speed),
            hoist_speed: None,
            power_consume_rate: Some(consume_rate),
            loaded_consume_coefficient: Some(loaded_coefficient),
            safe_power_threshold: Some(safe_threshold),
        }
    }

    pub fn crane(speed: f64, hoist_speed: f64) -> Self {
        Self {
            horizontal_speed: Some(speed),
            hoist_speed: Some(hoist_speed),
            ..Self::default()
        }
    }

    fn get(&self, parameter: PhysicsParameter) -> Option<f64> {
        match parameter {
            PhysicsParameter::HorizontalSpeed => self.horizontal_speed,
            PhysicsParameter::HoistSpeed => self.hoist_speed,
            PhysicsParameter::PowerConsumeRate => self.power_consume_rate,
            PhysicsParameter::LoadedConsumeCoefficient => self.loaded_consume_coefficient,
            PhysicsParameter::SafePowerThreshold => self.safe_power_threshold,
        }
    }
}

/// Table-backed [PhysicsConfig], loadable from TOML:
///
/// ```toml
/// [devices.T01]
/// horizontal_speed = 5.0
/// power_consume_rate = 0.01
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsTable {
    devices: BTreeMap<String, PhysicsProfile>,
}

impl PhysicsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    pub fn with_profile(mut self, device_id: impl Into<String>, profile: PhysicsProfile) -> Self {
        self.insert(device_id, profile);
        self
    }

    pub fn insert(&mut self, device_id: impl Into<String>, profile: PhysicsProfile) {
        self.devices.insert(device_id.into(), profile);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl PhysicsConfig for PhysicsTable {
    fn parameter(&self, device_id: &str, parameter: PhysicsParameter) -> Result<f64, ConfigurationError> {
        self.devices
            .get(device_id)
            .and_then(|profile| profile.get(parameter))
            .ok_or_else(|| ConfigurationError::MissingPhysics {
                device_id: device_id.to_string(),
                parameter,
            })
    }
}
