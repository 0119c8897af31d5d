//! Scheduler payload normalization.
//!
//! External schedulers describe their next slot in several shapes. This
//! module turns any of them into a single [`NextEvent`], so nothing past the
//! boundary has to care which scheduler produced it.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::data::NextEvent;
use crate::error::{Error, Result};

/// Formats accepted for timestamps without an offset.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// An action a scheduler runs when its slot starts.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScheduleAction {
    /// Set an explicit target temperature (°C).
    SetTemperature {
        /// Target temperature.
        temperature: f64,
    },
    /// Switch to a named preset.
    SetPreset {
        /// Preset name as written by the scheduler.
        preset: String,
    },
    /// Any other service call; carries no temperature.
    Other {
        /// Service name.
        service: String,
    },
}

/// One upcoming entry of a scheduler using the entries layout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduleEntry {
    /// Trigger time as text.
    pub time: String,
    /// Actions of the entry; the first one sets the target.
    pub actions: Vec<ScheduleAction>,
}

/// Next-slot description as published by a scheduler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SchedulerPayload {
    /// Trigger time plus an index into the list of slot actions.
    Standard {
        /// Trigger time as text.
        next_trigger: String,
        /// Index of the upcoming slot in `actions`.
        next_slot: usize,
        /// One action per slot.
        actions: Vec<ScheduleAction>,
    },
    /// Ordered list of upcoming entries; the first is next.
    Entries {
        /// Upcoming entries.
        next_entries: Vec<ScheduleEntry>,
    },
}

/// Temperatures of named presets.
///
/// Names are matched case-insensitively, with spaces and underscores
/// treated alike.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetTable {
    temperatures: HashMap<String, f64>,
}

impl PresetTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a preset.
    pub fn insert(&mut self, preset: &str, temperature: f64) {
        self.temperatures.insert(preset_key(preset), temperature);
    }

    /// Builder form of [`PresetTable::insert`].
    pub fn with(mut self, preset: &str, temperature: f64) -> Self {
        self.insert(preset, temperature);
        self
    }

    /// Temperature of `preset`, if known.
    pub fn resolve(&self, preset: &str) -> Option<f64> {
        self.temperatures.get(&preset_key(preset)).copied()
    }
}

fn preset_key(preset: &str) -> String {
    preset.trim().to_lowercase().replace(' ', "_")
}

/// Converts scheduler payloads into [`NextEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct ScheduleNormalizer {
    utc_offset_minutes: i32,
    presets: PresetTable,
}

impl ScheduleNormalizer {
    /// Create a normalizer.
    ///
    /// Timestamps without an offset are read as local time at
    /// `utc_offset_minutes`.
    pub fn new(utc_offset_minutes: i32, presets: PresetTable) -> Self {
        Self {
            utc_offset_minutes,
            presets,
        }
    }

    /// Parse a scheduler timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchedule`] if the text is neither RFC 3339 nor
    /// one of the accepted local formats.
    pub fn parse_time(&self, raw: &str) -> Result<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(parsed.with_timezone(&Utc));
        }

        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            Error::InvalidSchedule {
                context: format!(
                    "UTC offset of {} minutes is out of range",
                    self.utc_offset_minutes
                ),
            }
        })?;

        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .and_then(|naive| offset.from_local_datetime(&naive).single())
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| Error::InvalidSchedule {
                context: format!("unparseable trigger time '{}'", raw),
            })
    }

    /// Target temperature set by `action`, if any.
    pub fn resolve_action(&self, action: &ScheduleAction) -> Option<f64> {
        match action {
            ScheduleAction::SetTemperature { temperature } if temperature.is_finite() => {
                Some(*temperature)
            }
            ScheduleAction::SetTemperature { .. } => None,
            ScheduleAction::SetPreset { preset } => {
                let resolved = self.presets.resolve(preset);
                if resolved.is_none() {
                    debug!("Could not resolve preset '{}' to a temperature", preset);
                }
                resolved
            }
            ScheduleAction::Other { .. } => None,
        }
    }

    /// Normalize one payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchedule`] when the trigger time cannot be
    /// parsed or no action yields a temperature.
    pub fn normalize(&self, payload: &SchedulerPayload) -> Result<NextEvent> {
        let (raw_time, action) = match payload {
            SchedulerPayload::Standard {
                next_trigger,
                next_slot,
                actions,
            } => (next_trigger.as_str(), actions.get(*next_slot)),
            SchedulerPayload::Entries { next_entries } => {
                let entry = next_entries.first().ok_or_else(|| Error::InvalidSchedule {
                    context: "no upcoming entries".to_string(),
                })?;
                (entry.time.as_str(), entry.actions.first())
            }
        };

        let target_time = self.parse_time(raw_time)?;
        let target_temp = action
            .and_then(|a| self.resolve_action(a))
            .ok_or_else(|| Error::InvalidSchedule {
                context: format!("no target temperature for slot at {}", raw_time),
            })?;

        Ok(NextEvent::new(target_time, target_temp))
    }

    /// Earliest valid event across several schedulers.
    ///
    /// Payloads that cannot be normalized are skipped.
    pub fn earliest_event<'a, I>(&self, payloads: I) -> Option<NextEvent>
    where
        I: IntoIterator<Item = &'a SchedulerPayload>,
    {
        let earliest = payloads
            .into_iter()
            .filter_map(|payload| match self.normalize(payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!("Skipping scheduler payload: {}", e);
                    None
                }
            })
            .min_by_key(|event| event.target_time);

        match &earliest {
            Some(event) => info!(
                "Next scheduled event at {} ({:.1}°C)",
                event.target_time, event.target_temp
            ),
            None => debug!("No valid scheduled event found"),
        }

        earliest
    }
}
