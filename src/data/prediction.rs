//! Prediction data structures.
//!
//! Contains the inputs of an anticipation request (current conditions and
//! the next scheduled event) and the ephemeral [`PredictionResult`].

use chrono::{DateTime, Duration, Utc};

use super::lhs::SlopeSource;
use crate::utils::minutes_to_duration;

/// Current conditions of a zone at prediction time.
///
/// Environmental readings are optional; an absent reading leaves its
/// correction multiplier at 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurrentState {
    /// Room temperature in Celsius.
    pub current_temp: f64,
    /// Outdoor temperature in Celsius.
    pub outdoor_temp: Option<f64>,
    /// Indoor relative humidity (0-100).
    pub humidity: Option<f64>,
    /// Outdoor relative humidity (0-100).
    pub outdoor_humidity: Option<f64>,
    /// Cloud cover (0-100, 0 = clear sky).
    pub cloud_cover: Option<f64>,
}

impl CurrentState {
    /// Create a state with only the room temperature known.
    pub fn new(current_temp: f64) -> Self {
        Self {
            current_temp,
            ..Default::default()
        }
    }

    /// Set the outdoor temperature.
    pub fn with_outdoor_temp(mut self, celsius: f64) -> Self {
        self.outdoor_temp = Some(celsius);
        self
    }

    /// Set the indoor humidity.
    pub fn with_humidity(mut self, percent: f64) -> Self {
        self.humidity = Some(percent);
        self
    }

    /// Set the outdoor humidity.
    pub fn with_outdoor_humidity(mut self, percent: f64) -> Self {
        self.outdoor_humidity = Some(percent);
        self
    }

    /// Set the cloud cover.
    pub fn with_cloud_cover(mut self, percent: f64) -> Self {
        self.cloud_cover = Some(percent);
        self
    }

    /// Number of usable (present and finite) environmental readings.
    pub fn sensor_count(&self) -> usize {
        [
            self.outdoor_temp,
            self.humidity,
            self.outdoor_humidity,
            self.cloud_cover,
        ]
        .iter()
        .filter(|r| r.map_or(false, f64::is_finite))
        .count()
    }
}

/// The next scheduled target for a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NextEvent {
    /// When the target temperature must be reached.
    pub target_time: DateTime<Utc>,
    /// Temperature to reach in Celsius.
    pub target_temp: f64,
}

impl NextEvent {
    /// Create a new event.
    pub fn new(target_time: DateTime<Utc>, target_temp: f64) -> Self {
        Self {
            target_time,
            target_temp,
        }
    }
}

/// Outcome class of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PredictionStatus {
    /// Heating must start at the anticipated start time.
    #[default]
    Scheduled,
    /// The zone is already at or above target.
    NotNeeded,
    /// No usable duration could be derived from the inputs.
    NoData,
}

/// When heating must start to reach a target on time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredictionResult {
    /// Zone the prediction was made for.
    pub zone_id: String,
    /// Moment heating should begin.
    pub anticipated_start_time: DateTime<Utc>,
    /// When the target must be reached.
    pub target_time: DateTime<Utc>,
    /// Temperature to reach in Celsius.
    pub target_temp: f64,
    /// Expected heating time in minutes, buffer and clamping included.
    pub estimated_duration_minutes: f64,
    /// Slope that drove the prediction (°C/hour).
    pub learned_slope_used: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Fallback tier that supplied the slope.
    pub slope_source: SlopeSource,
    /// Outcome class.
    pub status: PredictionStatus,
}

impl PredictionResult {
    /// Expected heating time as a duration.
    pub fn estimated_duration(&self) -> Duration {
        minutes_to_duration(self.estimated_duration_minutes)
    }

    /// Get the lead time as hours and minutes.
    pub fn lead_time_formatted(&self) -> (u32, u32) {
        let total = self.estimated_duration_minutes.max(0.0).round() as u32;
        (total / 60, total % 60)
    }

    /// Check if heating should be running at `now`.
    ///
    /// Only true inside `[anticipated_start_time, target_time)`; once the
    /// target time has passed the slot is over.
    pub fn should_start(&self, now: DateTime<Utc>) -> bool {
        self.status == PredictionStatus::Scheduled
            && self.anticipated_start_time <= now
            && now < self.target_time
    }

    /// Check if the target time has been reached at `now`.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        now >= self.target_time
    }

    /// Check if the prediction carries a usable start time.
    pub fn is_actionable(&self) -> bool {
        self.status == PredictionStatus::Scheduled
    }
}
