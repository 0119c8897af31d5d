//! Inbound interfaces.
//!
//! The engine reads measurement history through [`MeasurementSource`] and a
//! last-known slope from a previous session through [`PersistedSlopeProvider`].
//! [`MemorySource`] is an in-process source for hosts that push samples
//! themselves, and for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

use crate::data::RawMeasurement;
use crate::error::{Error, Result};

/// Supplier of historical measurements for a zone.
///
/// Implementations return samples with `from < timestamp <= to`, ordered by
/// timestamp. A zero-length window yields an empty vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Fetch the samples of `zone_id` in `(from, to]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataUnavailable`] when the history cannot be read.
    async fn query(
        &self,
        zone_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawMeasurement>>;
}

/// Read-only supplier of the slope learned in a previous session.
pub trait PersistedSlopeProvider: Send + Sync {
    /// Last known slope (°C/hour) for `zone_id`, if any was stored.
    fn last_known_slope(&self, zone_id: &str) -> Option<f64>;
}

impl PersistedSlopeProvider for HashMap<String, f64> {
    fn last_known_slope(&self, zone_id: &str) -> Option<f64> {
        self.get(zone_id).copied()
    }
}

/// In-memory measurement history.
#[derive(Debug)]
pub struct MemorySource {
    /// Samples by zone, kept sorted by timestamp.
    zones: RwLock<HashMap<String, Vec<RawMeasurement>>>,
    /// When false, every query fails with `DataUnavailable`.
    available: AtomicBool,
    /// Number of queries served.
    query_count: AtomicUsize,
}

impl MemorySource {
    /// Create an empty, available source.
    pub fn new() -> Self {
        Self {
            zones: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            query_count: AtomicUsize::new(0),
        }
    }

    /// Record one sample for a zone.
    ///
    /// Samples are inserted in timestamp order; equal timestamps keep
    /// arrival order.
    pub fn push(&self, zone_id: &str, sample: impl Into<RawMeasurement>) {
        let sample = sample.into();
        let mut zones = self.zones.write();
        let samples = zones.entry(zone_id.to_string()).or_default();
        let pos = samples.partition_point(|s| s.timestamp <= sample.timestamp);
        samples.insert(pos, sample);
    }

    /// Record several samples for a zone.
    pub fn extend<I, M>(&self, zone_id: &str, samples: I)
    where
        I: IntoIterator<Item = M>,
        M: Into<RawMeasurement>,
    {
        for sample in samples {
            self.push(zone_id, sample);
        }
    }

    /// Simulate the history backend going offline or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Number of samples stored for a zone.
    pub fn len(&self, zone_id: &str) -> usize {
        self.zones.read().get(zone_id).map_or(0, Vec::len)
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeasurementSource for MemorySource {
    async fn query(
        &self,
        zone_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawMeasurement>> {
        self.query_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::DataUnavailable {
                zone_id: zone_id.to_string(),
                reason: "memory source marked unavailable".to_string(),
            });
        }

        let samples: Vec<RawMeasurement> = self
            .zones
            .read()
            .get(zone_id)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.timestamp > from && s.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            "Memory source returned {} samples for {} in ({}, {}]",
            samples.len(),
            zone_id,
            from,
            to
        );

        Ok(samples)
    }
}
