//! Engine configuration.
//!
//! Every section carries the documented defaults through its `Default` impl.
//! [`EngineConfig::validate`] is the only place where a bad value is fatal;
//! [`crate::HeatingEngine::new`] runs it once at setup.

use chrono::Duration;

use crate::error::{Error, Result};

/// Default minimum gap between target and current temperature to start a cycle (°C).
pub const DEFAULT_DETECTION_THRESHOLD: f64 = 0.2;
/// Default shortest accepted heating cycle (minutes).
pub const DEFAULT_MIN_CYCLE_DURATION_MINUTES: u32 = 5;
/// Default longest accepted heating cycle (minutes).
pub const DEFAULT_MAX_CYCLE_DURATION_MINUTES: u32 = 300;
/// Default cycle retention window (days).
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
/// Default time allowed for one measurement source query (seconds).
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;
/// Default time-to-live of a learned slope cache entry (seconds).
pub const DEFAULT_LHS_TTL_SECONDS: u64 = 86_400;
/// Default slope aggregation lookback (days).
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;
/// Conservative slope used when nothing has been learned yet (°C/h).
pub const DEFAULT_HEATING_SLOPE: f64 = 2.0;
/// Default lower anticipation bound (minutes).
pub const DEFAULT_MIN_ANTICIPATION_MINUTES: f64 = 5.0;
/// Default upper anticipation bound (minutes).
pub const DEFAULT_MAX_ANTICIPATION_MINUTES: f64 = 240.0;
/// Default safety buffer added to every prediction (minutes).
pub const DEFAULT_SAFETY_BUFFER_MINUTES: f64 = 5.0;
/// Default overshoot tolerance above target before heating is stopped (°C).
pub const DEFAULT_OVERSHOOT_MARGIN: f64 = 0.5;

/// Cycle detection settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectionConfig {
    /// Gap between target and current temperature (°C) that opens a cycle,
    /// and the margin below target that closes it.
    pub detection_threshold: f64,
    /// Cycles shorter than this are discarded (minutes).
    pub min_cycle_duration_minutes: u32,
    /// Cycles longer than this are discarded (minutes).
    pub max_cycle_duration_minutes: u32,
    /// When set, valid cycles longer than this are split into sub-cycles (minutes).
    pub cycle_split_duration_minutes: Option<u32>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            min_cycle_duration_minutes: DEFAULT_MIN_CYCLE_DURATION_MINUTES,
            max_cycle_duration_minutes: DEFAULT_MAX_CYCLE_DURATION_MINUTES,
            cycle_split_duration_minutes: None,
        }
    }
}

impl DetectionConfig {
    /// Minimum cycle duration.
    pub fn min_cycle_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.min_cycle_duration_minutes))
    }

    /// Maximum cycle duration.
    pub fn max_cycle_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.max_cycle_duration_minutes))
    }

    /// Split length, if splitting is enabled.
    pub fn cycle_split_duration(&self) -> Option<Duration> {
        self.cycle_split_duration_minutes
            .filter(|m| *m > 0)
            .map(|m| Duration::minutes(i64::from(m)))
    }
}

/// Cycle cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    /// Cycles ending before `now - retention_days` are pruned.
    pub retention_days: u32,
    /// Upper bound on a single measurement source query (seconds).
    pub source_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            source_timeout_secs: DEFAULT_SOURCE_TIMEOUT_SECS,
        }
    }
}

impl CacheConfig {
    /// Retention window.
    pub fn retention(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    /// Source query timeout.
    pub fn source_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.source_timeout_secs)
    }
}

/// Learned heating slope settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LhsConfig {
    /// Time-to-live of both the global and the per-hour cache entries.
    pub ttl_seconds: u64,
    /// Only cycles starting within this many days are aggregated.
    pub lookback_days: u32,
    /// Slope used when no other tier of the fallback chain has a value (°C/h).
    pub default_slope: f64,
    /// Offset applied to UTC timestamps before taking the hour of day.
    pub utc_offset_minutes: i32,
}

impl Default for LhsConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_LHS_TTL_SECONDS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            default_slope: DEFAULT_HEATING_SLOPE,
            utc_offset_minutes: 0,
        }
    }
}

impl LhsConfig {
    /// Aggregation lookback window.
    pub fn lookback(&self) -> Duration {
        Duration::days(i64::from(self.lookback_days))
    }
}

/// Anticipation bounds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnticipationConfig {
    /// Lower clamp on the anticipation lead time (minutes).
    pub min_anticipation_minutes: f64,
    /// Upper clamp on the anticipation lead time (minutes).
    pub max_anticipation_minutes: f64,
    /// Fixed margin added before clamping (minutes).
    pub safety_buffer_minutes: f64,
    /// Projected temperature above target that triggers a stop (°C).
    pub overshoot_margin: f64,
}

impl Default for AnticipationConfig {
    fn default() -> Self {
        Self {
            min_anticipation_minutes: DEFAULT_MIN_ANTICIPATION_MINUTES,
            max_anticipation_minutes: DEFAULT_MAX_ANTICIPATION_MINUTES,
            safety_buffer_minutes: DEFAULT_SAFETY_BUFFER_MINUTES,
            overshoot_margin: DEFAULT_OVERSHOOT_MARGIN,
        }
    }
}

/// Environmental correction thresholds and multipliers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EnvironmentConfig {
    /// Outdoor temperature below which heating is slowed down (°C).
    pub outdoor_reference: f64,
    /// Added multiplier per degree below the outdoor reference.
    pub outdoor_factor: f64,
    /// Upper bound of the outdoor multiplier.
    pub max_outdoor_factor: f64,
    /// Relative humidity above which heating is slowed down (%).
    pub humidity_reference: f64,
    /// Added multiplier per humidity point above the reference.
    pub humidity_factor: f64,
    /// Upper bound of each humidity multiplier.
    pub max_humidity_factor: f64,
    /// Cloud cover below which solar gain speeds heating up (%).
    pub cloud_reference: f64,
    /// Removed multiplier per cloud point below the reference.
    pub cloud_factor: f64,
    /// Lower bound of the solar multiplier.
    pub min_cloud_factor: f64,
    /// Confidence added per available environmental reading.
    pub sensor_confidence_bonus: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            outdoor_reference: 20.0,
            outdoor_factor: 0.05,
            max_outdoor_factor: 3.0,
            humidity_reference: 50.0,
            humidity_factor: 0.002,
            max_humidity_factor: 1.2,
            cloud_reference: 100.0,
            cloud_factor: 0.001,
            min_cloud_factor: 0.8,
            sensor_confidence_bonus: 0.05,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Cycle detection.
    pub detection: DetectionConfig,
    /// Cycle cache.
    pub cache: CacheConfig,
    /// Learned heating slope.
    pub lhs: LhsConfig,
    /// Anticipation bounds.
    pub anticipation: AnticipationConfig,
    /// Environmental corrections.
    pub environment: EnvironmentConfig,
}

impl EngineConfig {
    /// Create a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every setting and report the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if !d.detection_threshold.is_finite() || d.detection_threshold <= 0.0 {
            return Err(Error::invalid_config(
                "detection_threshold",
                d.detection_threshold,
                "must be a finite, positive temperature",
            ));
        }
        if d.min_cycle_duration_minutes == 0 {
            return Err(Error::invalid_config(
                "min_cycle_duration",
                d.min_cycle_duration_minutes,
                "must be at least one minute",
            ));
        }
        if d.min_cycle_duration_minutes > d.max_cycle_duration_minutes {
            return Err(Error::invalid_config(
                "min_cycle_duration",
                d.min_cycle_duration_minutes,
                "exceeds max_cycle_duration",
            ));
        }
        if let Some(split) = d.cycle_split_duration_minutes.filter(|m| *m > 0) {
            if split < d.min_cycle_duration_minutes {
                return Err(Error::invalid_config(
                    "cycle_split_duration",
                    split,
                    "is shorter than min_cycle_duration",
                ));
            }
        }

        if self.cache.retention_days == 0 {
            return Err(Error::invalid_config(
                "retention_days",
                self.cache.retention_days,
                "must be positive",
            ));
        }
        if self.cache.source_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "source_timeout_secs",
                self.cache.source_timeout_secs,
                "must be positive",
            ));
        }

        let l = &self.lhs;
        if l.ttl_seconds == 0 {
            return Err(Error::invalid_config("ttl_seconds", l.ttl_seconds, "must be positive"));
        }
        if l.lookback_days == 0 {
            return Err(Error::invalid_config(
                "lookback_days",
                l.lookback_days,
                "must be positive",
            ));
        }
        if !l.default_slope.is_finite() || l.default_slope <= 0.0 {
            return Err(Error::invalid_config(
                "default_slope",
                l.default_slope,
                "must be a finite, positive slope",
            ));
        }
        if l.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(Error::invalid_config(
                "utc_offset_minutes",
                l.utc_offset_minutes,
                "must be less than a day",
            ));
        }

        let a = &self.anticipation;
        for (name, value) in [
            ("min_anticipation", a.min_anticipation_minutes),
            ("max_anticipation", a.max_anticipation_minutes),
            ("safety_buffer", a.safety_buffer_minutes),
            ("overshoot_margin", a.overshoot_margin),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_config(name, value, "must be finite and non-negative"));
            }
        }
        if a.min_anticipation_minutes > a.max_anticipation_minutes {
            return Err(Error::invalid_config(
                "min_anticipation",
                a.min_anticipation_minutes,
                "exceeds max_anticipation",
            ));
        }

        let e = &self.environment;
        if !e.outdoor_reference.is_finite() {
            return Err(Error::invalid_config(
                "outdoor_reference",
                e.outdoor_reference,
                "must be a finite temperature",
            ));
        }
        for (name, value) in [
            ("outdoor_factor", e.outdoor_factor),
            ("humidity_factor", e.humidity_factor),
            ("cloud_factor", e.cloud_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_config(name, value, "must be finite and non-negative"));
            }
        }
        if !(0.0..=100.0).contains(&e.humidity_reference) {
            return Err(Error::invalid_config(
                "humidity_reference",
                e.humidity_reference,
                "must be a percentage",
            ));
        }
        if !(0.0..=100.0).contains(&e.cloud_reference) {
            return Err(Error::invalid_config(
                "cloud_reference",
                e.cloud_reference,
                "must be a percentage",
            ));
        }
        for (name, value) in [
            ("max_outdoor_factor", e.max_outdoor_factor),
            ("max_humidity_factor", e.max_humidity_factor),
        ] {
            if !value.is_finite() || value < 1.0 {
                return Err(Error::invalid_config(name, value, "must be finite and at least 1.0"));
            }
        }
        if !(0.0..=1.0).contains(&e.min_cloud_factor) {
            return Err(Error::invalid_config(
                "min_cloud_factor",
                e.min_cloud_factor,
                "must lie in [0, 1]",
            ));
        }
        if !e.sensor_confidence_bonus.is_finite() || e.sensor_confidence_bonus < 0.0 {
            return Err(Error::invalid_config(
                "sensor_confidence_bonus",
                e.sensor_confidence_bonus,
                "must be finite and non-negative",
            ));
        }

        Ok(())
    }
}
