//! Utility functions for the heating-pilot crate.

use chrono::{DateTime, Duration, Timelike, Utc};

/// Convert a fractional number of minutes into a [`chrono::Duration`].
///
/// The value is rounded to the nearest millisecond. Non-finite or negative
/// inputs yield a zero duration.
///
/// # Example
///
/// ```
/// use heating_pilot::minutes_to_duration;
///
/// let d = minutes_to_duration(1.5);
/// assert_eq!(d.num_seconds(), 90);
/// ```
#[inline]
pub fn minutes_to_duration(minutes: f64) -> Duration {
    if !minutes.is_finite() || minutes <= 0.0 {
        return Duration::zero();
    }
    Duration::milliseconds((minutes * 60_000.0).round() as i64)
}

/// Convert a [`chrono::Duration`] into fractional minutes.
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use heating_pilot::duration_to_minutes;
///
/// assert!((duration_to_minutes(Duration::seconds(90)) - 1.5).abs() < 1e-9);
/// ```
#[inline]
pub fn duration_to_minutes(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 60_000.0
}

/// Convert a [`chrono::Duration`] into fractional hours.
#[inline]
pub fn duration_to_hours(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 3_600_000.0
}

/// Hour of day (0-23) of a UTC timestamp seen from a fixed UTC offset.
///
/// Slope buckets are keyed on local wall-clock hours, so callers pass the
/// zone's offset in minutes (e.g. `60` for UTC+1).
#[inline]
pub fn hour_of_day(timestamp: DateTime<Utc>, utc_offset_minutes: i32) -> u32 {
    (timestamp + Duration::minutes(i64::from(utc_offset_minutes))).hour()
}
