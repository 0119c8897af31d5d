//! Per-zone cycle cache with incremental refresh.
//!
//! The first refresh of a zone scans the whole retention window through the
//! [`CycleDetector`]. Later refreshes only ask the [`MeasurementSource`] for
//! samples newer than the entry's `last_scan_end`, so repeated learning stays
//! cheap.
//!
//! A refresh builds the new entry off to the side and swaps it in only once
//! every step has succeeded. A failing, timed-out, or cancelled refresh
//! leaves the cached entry exactly as it was.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::data::{CycleCacheEntry, HeatingCycle, Measurement};
use crate::detector::CycleDetector;
use crate::error::{Error, Result};
use crate::source::MeasurementSource;

/// How a refresh read the measurement history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// First scan of a zone, covering the retention window.
    Full,
    /// Only samples newer than the previous scan.
    Incremental,
}

/// Summary of a successful refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    /// Refreshed zone.
    pub zone_id: String,
    /// Full or incremental scan.
    pub mode: ScanMode,
    /// Exclusive start of the queried window.
    pub window_start: DateTime<Utc>,
    /// Inclusive end of the queried window.
    pub window_end: DateTime<Utc>,
    /// Samples returned by the source.
    pub measurements: usize,
    /// Samples skipped as malformed.
    pub skipped: usize,
    /// Cycles newly added to the cache.
    pub added: usize,
    /// Cycles dropped by retention.
    pub pruned: usize,
    /// Cycles cached after the refresh.
    pub total: usize,
}

/// Cycle cache shared by every zone of an engine.
pub struct CycleCache {
    /// History backend.
    source: Arc<dyn MeasurementSource>,
    /// Detector applied to fetched samples.
    detector: CycleDetector,
    /// Retention and timeout settings.
    config: CacheConfig,
    /// Cache entries by zone.
    entries: RwLock<HashMap<String, CycleCacheEntry>>,
    /// Per-zone refresh locks.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CycleCache {
    /// Create an empty cache reading from `source`.
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        detector: CycleDetector,
        config: CacheConfig,
    ) -> Self {
        Self {
            source,
            detector,
            config,
            entries: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cache settings.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn zone_lock(&self, zone_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(zone_id.to_string()).or_default().clone()
    }

    /// Bring the cached cycles of `zone_id` up to `now`.
    ///
    /// Concurrent refreshes of the same zone are serialized; different zones
    /// proceed independently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataUnavailable`] if the source fails and
    /// [`Error::Timeout`] if it does not answer in time. Both are
    /// recoverable and leave the cache untouched.
    pub async fn refresh(&self, zone_id: &str, now: DateTime<Utc>) -> Result<RefreshReport> {
        let lock = self.zone_lock(zone_id);
        let _guard = lock.lock().await;

        let previous = self.entries.read().get(zone_id).cloned();
        let (mode, mut entry) = match previous {
            Some(entry) => (ScanMode::Incremental, entry),
            None => (
                ScanMode::Full,
                CycleCacheEntry::new(
                    zone_id,
                    now - self.config.retention(),
                    self.config.retention_days,
                ),
            ),
        };
        let window_start = entry.last_scan_end.min(now);

        debug!(
            "Refreshing {} ({:?} scan) over ({}, {}]",
            zone_id, mode, window_start, now
        );

        let raw = match tokio::time::timeout(
            self.config.source_timeout(),
            self.source.query(zone_id, window_start, now),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("Refresh of {} failed, keeping cached cycles: {}", zone_id, e);
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "Measurement source timed out after {:?} for {}, keeping cached cycles",
                    self.config.source_timeout(),
                    zone_id
                );
                return Err(Error::Timeout {
                    zone_id: zone_id.to_string(),
                });
            }
        };

        let fetched = raw.len();
        let measurements: Vec<Measurement> = raw
            .into_iter()
            .filter_map(|sample| match Measurement::try_from(sample) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("Skipping sample for {}: {}", zone_id, e);
                    None
                }
            })
            .collect();
        let skipped = fetched - measurements.len();

        let mut cycles = self.detector.resume(measurements, zone_id, entry.open_cycle);
        let detected: Vec<HeatingCycle> = cycles.by_ref().collect();
        let open_cycle = cycles.open_cycle();

        let added = entry.insert_cycles(detected);
        entry.open_cycle = open_cycle;
        entry.last_scan_end = entry.last_scan_end.max(now);
        entry.retention_days = self.config.retention_days;
        let pruned = entry.prune(now);

        let report = RefreshReport {
            zone_id: zone_id.to_string(),
            mode,
            window_start,
            window_end: now,
            measurements: fetched,
            skipped,
            added,
            pruned,
            total: entry.len(),
        };

        self.entries.write().insert(zone_id.to_string(), entry);

        info!(
            "Refreshed {}: {} samples, {} new cycles, {} pruned, {} cached",
            zone_id, fetched, added, pruned, report.total
        );

        Ok(report)
    }

    /// Cached cycles of `zone_id` starting at or after `since`, oldest first.
    ///
    /// Never fails: an unknown zone yields an empty vector.
    pub fn get_cycles(&self, zone_id: &str, since: Option<DateTime<Utc>>) -> Vec<HeatingCycle> {
        self.entries
            .read()
            .get(zone_id)
            .map(|entry| entry.cycles_since(since))
            .unwrap_or_default()
    }

    /// Copy of the entry of `zone_id`, for persistence.
    pub fn snapshot(&self, zone_id: &str) -> Option<CycleCacheEntry> {
        self.entries.read().get(zone_id).cloned()
    }

    /// Install a previously persisted entry.
    ///
    /// The next refresh continues incrementally from the entry's
    /// `last_scan_end` and prunes it against the current retention. Waits for
    /// an in-flight refresh of the same zone to finish first.
    pub async fn restore(&self, entry: CycleCacheEntry) {
        let lock = self.zone_lock(&entry.zone_id);
        let _guard = lock.lock().await;
        debug!(
            "Restoring {} cached cycles for {} (scanned up to {})",
            entry.len(),
            entry.zone_id,
            entry.last_scan_end
        );
        self.entries.write().insert(entry.zone_id.clone(), entry);
    }

    /// Forget the entry of `zone_id`; the next refresh is a full scan.
    ///
    /// Waits for an in-flight refresh of the same zone to finish first.
    pub async fn clear(&self, zone_id: &str) -> Option<CycleCacheEntry> {
        let lock = self.zone_lock(zone_id);
        let _guard = lock.lock().await;
        self.entries.write().remove(zone_id)
    }

    /// High-water mark of processed measurements for `zone_id`.
    pub fn last_scan_end(&self, zone_id: &str) -> Option<DateTime<Utc>> {
        self.entries.read().get(zone_id).map(|e| e.last_scan_end)
    }

    /// Number of cached cycles for `zone_id`.
    pub fn cycle_count(&self, zone_id: &str) -> usize {
        self.entries.read().get(zone_id).map_or(0, CycleCacheEntry::len)
    }

    /// Zones with a cache entry.
    pub fn zones(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for CycleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleCache")
            .field("config", &self.config)
            .field("zones", &self.entries.read().len())
            .finish()
    }
}
