//! Error types for the heating-pilot crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The measurement source could not be reached or failed to answer.
    #[error("Measurement data unavailable for zone {zone_id}: {reason}")]
    DataUnavailable {
        /// The zone whose history was requested.
        zone_id: String,
        /// Description of why the data could not be fetched.
        reason: String,
    },

    /// The measurement source did not answer within the configured timeout.
    #[error("Measurement source timed out for zone {zone_id}")]
    Timeout {
        /// The zone whose history was requested.
        zone_id: String,
    },

    /// A configuration value was rejected during validation.
    #[error("Invalid configuration: {name} = {value} ({reason})")]
    InvalidConfiguration {
        /// The name of the offending setting.
        name: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A measurement is missing a required field or carries a non-finite value.
    #[error("Malformed measurement at {timestamp}: missing or invalid {field}")]
    MalformedMeasurement {
        /// Timestamp of the rejected sample.
        timestamp: DateTime<Utc>,
        /// The field that was missing or invalid.
        field: &'static str,
    },

    /// A scheduler payload could not be turned into a next event.
    #[error("Invalid schedule: {context}")]
    InvalidSchedule {
        /// Description of what was wrong with the payload.
        context: String,
    },
}

impl Error {
    /// Build an [`Error::InvalidConfiguration`] from displayable parts.
    pub(crate) fn invalid_config(
        name: &str,
        value: impl std::fmt::Display,
        reason: &str,
    ) -> Self {
        Self::InvalidConfiguration {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check whether the caller can carry on after this error.
    ///
    /// Only configuration errors are fatal; everything else degrades to
    /// cached or fallback data.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidConfiguration { .. })
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
