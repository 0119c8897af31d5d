//! Heating cycle data structures.
//!
//! Contains the detected [`HeatingCycle`] interval, the transient
//! [`SlopeSample`] derived from it, and the per-zone [`CycleCacheEntry`].

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::utils::{duration_to_hours, duration_to_minutes, hour_of_day};

/// One contiguous interval during which a zone was actively heating.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeatingCycle {
    /// Zone this cycle was detected in.
    pub zone_id: String,
    /// When heating started.
    pub start_time: DateTime<Utc>,
    /// When the closing condition was observed.
    pub end_time: DateTime<Utc>,
    /// Room temperature at start (°C).
    pub start_temp: f64,
    /// Room temperature at end (°C).
    pub end_temp: f64,
    /// Set point in force when the cycle opened (°C).
    pub target_temp: f64,
}

impl HeatingCycle {
    /// Length of the cycle.
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Length of the cycle in minutes.
    pub fn duration_minutes(&self) -> f64 {
        duration_to_minutes(self.duration())
    }

    /// Temperature rise over the cycle (°C).
    pub fn temperature_gain(&self) -> f64 {
        self.end_temp - self.start_temp
    }

    /// Average heating rate in °C/hour, or 0.0 for a zero-length cycle.
    pub fn slope(&self) -> f64 {
        let hours = duration_to_hours(self.duration());
        if hours <= 0.0 {
            return 0.0;
        }
        self.temperature_gain() / hours
    }

    /// Hour of day (0-23) at which the cycle started.
    pub fn start_hour(&self, utc_offset_minutes: i32) -> u32 {
        hour_of_day(self.start_time, utc_offset_minutes)
    }

    /// Derive the aggregation sample for this cycle.
    pub fn slope_sample(&self, utc_offset_minutes: i32) -> SlopeSample {
        SlopeSample {
            slope: self.slope(),
            hour_of_day: self.start_hour(utc_offset_minutes),
        }
    }
}

/// Slope of a single cycle, tagged with its starting hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeSample {
    /// Heating rate in °C/hour.
    pub slope: f64,
    /// Hour of day (0-23) at which the source cycle started.
    pub hour_of_day: u32,
}

/// The start of a cycle that has not been closed yet.
///
/// Stored with the cache entry so a cycle spanning two refreshes is closed by
/// the later scan instead of being dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenCycle {
    /// When heating started.
    pub start_time: DateTime<Utc>,
    /// Room temperature at start (°C).
    pub start_temp: f64,
    /// Set point at start (°C).
    pub target_temp: f64,
}

/// Cached cycles for one zone.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CycleCacheEntry {
    /// Zone these cycles belong to.
    pub zone_id: String,
    /// Detected cycles keyed (and deduplicated) by start time.
    pub cycles: BTreeMap<DateTime<Utc>, HeatingCycle>,
    /// High-water mark of measurements already processed.
    pub last_scan_end: DateTime<Utc>,
    /// Retention window in days.
    pub retention_days: u32,
    /// Detector state carried into the next incremental scan.
    pub open_cycle: Option<OpenCycle>,
}

impl CycleCacheEntry {
    /// Create an empty entry.
    pub fn new(
        zone_id: impl Into<String>,
        last_scan_end: DateTime<Utc>,
        retention_days: u32,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            cycles: BTreeMap::new(),
            last_scan_end,
            retention_days,
            open_cycle: None,
        }
    }

    /// Insert cycles whose start time is not cached yet.
    ///
    /// Returns the number of cycles actually added.
    pub fn insert_cycles<I>(&mut self, cycles: I) -> usize
    where
        I: IntoIterator<Item = HeatingCycle>,
    {
        let mut added = 0;
        for cycle in cycles {
            if let std::collections::btree_map::Entry::Vacant(slot) =
                self.cycles.entry(cycle.start_time)
            {
                slot.insert(cycle);
                added += 1;
            }
        }
        added
    }

    /// Drop cycles that ended before the retention cutoff.
    ///
    /// Returns the number of cycles removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(i64::from(self.retention_days));
        let before = self.cycles.len();
        self.cycles.retain(|_, cycle| cycle.end_time >= cutoff);
        before - self.cycles.len()
    }

    /// Cycles starting at or after `since`, oldest first.
    pub fn cycles_since(&self, since: Option<DateTime<Utc>>) -> Vec<HeatingCycle> {
        match since {
            Some(since) => self.cycles.range(since..).map(|(_, c)| c.clone()).collect(),
            None => self.cycles.values().cloned().collect(),
        }
    }

    /// Number of cached cycles.
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    /// Check if no cycles are cached.
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}
