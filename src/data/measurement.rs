//! Measurement data structures.
//!
//! Adapters hand the engine [`RawMeasurement`]s whose fields may be missing;
//! only validated [`Measurement`]s reach the cycle detector.

use chrono::{DateTime, Utc};

use crate::error::Error;

/// HVAC modes that allow heating.
const HEATING_MODES: [&str; 3] = ["heat", "heat_cool", "auto"];

/// HVAC actions that mean the heater is running.
const HEATING_ACTIONS: [&str; 2] = ["heating", "preheating"];

/// Check whether a host HVAC mode string allows heating.
pub fn hvac_mode_enables_heating(mode: &str) -> bool {
    let mode = mode.trim().to_ascii_lowercase();
    HEATING_MODES.contains(&mode.as_str())
}

/// Check whether a host HVAC action string means the heater is running.
pub fn hvac_action_is_heating(action: &str) -> bool {
    let action = action.trim().to_ascii_lowercase();
    HEATING_ACTIONS.contains(&action.as_str())
}

/// A sample as delivered by a measurement adapter, before validation.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawMeasurement {
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Whether the heating mode allows heating.
    pub heating_enabled: Option<bool>,
    /// Whether the heater is actually running.
    pub heating_active: Option<bool>,
    /// Room temperature in Celsius.
    pub current_temp: Option<f64>,
    /// Set point in Celsius.
    pub target_temp: Option<f64>,
}

impl RawMeasurement {
    /// Build a raw measurement from host HVAC mode/action strings.
    ///
    /// Missing strings leave the corresponding flag unset.
    pub fn from_hvac(
        timestamp: DateTime<Utc>,
        hvac_mode: Option<&str>,
        hvac_action: Option<&str>,
        current_temp: Option<f64>,
        target_temp: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            heating_enabled: hvac_mode.map(hvac_mode_enables_heating),
            heating_active: hvac_action.map(hvac_action_is_heating),
            current_temp,
            target_temp,
        }
    }
}

/// One validated temperature/mode sample for a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Whether the heating mode allows heating.
    pub heating_enabled: bool,
    /// Whether the heater is actually running.
    pub heating_active: bool,
    /// Room temperature in Celsius.
    pub current_temp: f64,
    /// Set point in Celsius.
    pub target_temp: f64,
}

impl Measurement {
    /// Create a new measurement.
    pub fn new(
        timestamp: DateTime<Utc>,
        heating_enabled: bool,
        heating_active: bool,
        current_temp: f64,
        target_temp: f64,
    ) -> Self {
        Self {
            timestamp,
            heating_enabled,
            heating_active,
            current_temp,
            target_temp,
        }
    }

    /// Gap between set point and room temperature (°C).
    pub fn temperature_gap(&self) -> f64 {
        self.target_temp - self.current_temp
    }
}

impl TryFrom<RawMeasurement> for Measurement {
    type Error = Error;

    fn try_from(raw: RawMeasurement) -> Result<Self, Self::Error> {
        let malformed = |field| Error::MalformedMeasurement {
            timestamp: raw.timestamp,
            field,
        };

        let heating_enabled = raw.heating_enabled.ok_or_else(|| malformed("heating_enabled"))?;
        let heating_active = raw.heating_active.ok_or_else(|| malformed("heating_active"))?;
        let current_temp = raw
            .current_temp
            .filter(|t| t.is_finite())
            .ok_or_else(|| malformed("current_temp"))?;
        let target_temp = raw
            .target_temp
            .filter(|t| t.is_finite())
            .ok_or_else(|| malformed("target_temp"))?;

        Ok(Self::new(
            raw.timestamp,
            heating_enabled,
            heating_active,
            current_temp,
            target_temp,
        ))
    }
}

impl From<Measurement> for RawMeasurement {
    fn from(m: Measurement) -> Self {
        Self {
            timestamp: m.timestamp,
            heating_enabled: Some(m.heating_enabled),
            heating_active: Some(m.heating_active),
            current_temp: Some(m.current_temp),
            target_temp: Some(m.target_temp),
        }
    }
}
