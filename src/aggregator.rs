//! Learned heating slope aggregation.
//!
//! Slopes of cached cycles are combined with an outlier-resistant
//! [`trimmed_mean`], either over every cycle of a zone (global) or over the
//! cycles that started in a given hour of the day (contextual). Each scope
//! keeps a TTL-bounded [`LhsCacheEntry`].
//!
//! Resolution walks a fallback chain and always yields a slope:
//!
//! 1. fresh contextual entry, else contextual recomputation
//! 2. fresh global entry, else global recomputation
//! 3. the slope persisted by a previous session
//! 4. the configured default slope

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::LhsConfig;
use crate::cycle_cache::CycleCache;
use crate::data::{HeatingCycle, LhsCacheEntry, SlopeEstimate, SlopeSource};
use crate::source::PersistedSlopeProvider;

/// Fraction of samples discarded at each end before averaging.
const TRIM_FRACTION: f64 = 0.1;

/// Below this many samples the plain mean is used.
const MIN_TRIM_SAMPLES: usize = 4;

/// Outlier-resistant mean of `samples`.
///
/// Non-finite samples are ignored. Returns `None` when nothing is left. With
/// fewer than four samples this is the arithmetic mean; otherwise the lowest
/// and highest 10% (rounded down, at least one each) are dropped first.
///
/// ```
/// use heating_pilot::trimmed_mean;
///
/// assert_eq!(trimmed_mean(&[1.0, 2.0, 3.0, 100.0]), Some(2.5));
/// assert_eq!(trimmed_mean(&[]), None);
/// ```
pub fn trimmed_mean(samples: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|s| s.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }

    let kept: &[f64] = if sorted.len() < MIN_TRIM_SAMPLES {
        &sorted
    } else {
        sorted.sort_by(f64::total_cmp);
        let trim = ((sorted.len() as f64 * TRIM_FRACTION).floor() as usize).max(1);
        &sorted[trim..sorted.len() - trim]
    };

    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Aggregates cycle slopes into global and per-hour estimates.
pub struct SlopeAggregator {
    /// Cycle history.
    cycles: Arc<CycleCache>,
    /// TTL, lookback and default slope.
    config: LhsConfig,
    /// Last value from a previous session.
    persisted: Option<Arc<dyn PersistedSlopeProvider>>,
    /// Global entries by zone.
    global: RwLock<HashMap<String, LhsCacheEntry>>,
    /// Contextual entries by zone and hour of day.
    contextual: RwLock<HashMap<(String, u32), LhsCacheEntry>>,
}

impl SlopeAggregator {
    /// Create an aggregator over `cycles`.
    pub fn new(cycles: Arc<CycleCache>, config: LhsConfig) -> Self {
        Self {
            cycles,
            config,
            persisted: None,
            global: RwLock::new(HashMap::new()),
            contextual: RwLock::new(HashMap::new()),
        }
    }

    /// Use `provider` as the persisted tier of the fallback chain.
    pub fn with_persisted(mut self, provider: Arc<dyn PersistedSlopeProvider>) -> Self {
        self.persisted = Some(provider);
        self
    }

    /// Get the slope settings.
    pub fn config(&self) -> &LhsConfig {
        &self.config
    }

    /// Global slope of `zone_id` in °C/hour, through the fallback chain.
    pub fn global_slope(&self, zone_id: &str, now: DateTime<Utc>) -> f64 {
        self.resolve_global(zone_id, now).value
    }

    /// Slope of `zone_id` for cycles starting at `hour_of_day`, through the
    /// fallback chain.
    pub fn contextual_slope(&self, zone_id: &str, hour_of_day: u32, now: DateTime<Utc>) -> f64 {
        self.resolve_contextual(zone_id, hour_of_day, now).value
    }

    /// Resolve the global slope together with its fallback tier.
    pub fn resolve_global(&self, zone_id: &str, now: DateTime<Utc>) -> SlopeEstimate {
        self.learned_global(zone_id, now)
            .unwrap_or_else(|| self.fallback(zone_id))
    }

    /// Resolve the contextual slope together with its fallback tier.
    pub fn resolve_contextual(
        &self,
        zone_id: &str,
        hour_of_day: u32,
        now: DateTime<Utc>,
    ) -> SlopeEstimate {
        self.learned_contextual(zone_id, hour_of_day, now)
            .or_else(|| self.learned_global(zone_id, now))
            .unwrap_or_else(|| self.fallback(zone_id))
    }

    /// Current global cache entry of `zone_id`, fresh or stale.
    pub fn cached_global(&self, zone_id: &str) -> Option<LhsCacheEntry> {
        self.global.read().get(zone_id).copied()
    }

    /// Current contextual cache entry of `zone_id` for `hour_of_day`.
    pub fn cached_contextual(&self, zone_id: &str, hour_of_day: u32) -> Option<LhsCacheEntry> {
        self.contextual
            .read()
            .get(&(zone_id.to_string(), hour_of_day))
            .copied()
    }

    /// Drop every cached slope of `zone_id`.
    pub fn invalidate(&self, zone_id: &str) {
        self.global.write().remove(zone_id);
        self.contextual.write().retain(|(zone, _), _| zone != zone_id);
        debug!("Invalidated learned slopes for {}", zone_id);
    }

    fn learned_global(&self, zone_id: &str, now: DateTime<Utc>) -> Option<SlopeEstimate> {
        if let Some(entry) = self.global.read().get(zone_id).filter(|e| e.is_fresh(now)) {
            debug!("Global slope cache hit for {}: {:.2}°C/h", zone_id, entry.value);
            return Some(SlopeEstimate::new(
                entry.value,
                SlopeSource::GlobalCached,
                entry.sample_count,
            ));
        }

        let slopes: Vec<f64> = self
            .recent_cycles(zone_id, now)
            .iter()
            .map(HeatingCycle::slope)
            .collect();
        let value = usable(trimmed_mean(&slopes))?;
        debug!(
            "Recomputed global slope for {}: {:.2}°C/h from {} cycles",
            zone_id,
            value,
            slopes.len()
        );

        let entry = LhsCacheEntry::new(value, now, self.config.ttl_seconds, slopes.len());
        self.global.write().insert(zone_id.to_string(), entry);
        Some(SlopeEstimate::new(value, SlopeSource::GlobalComputed, slopes.len()))
    }

    fn learned_contextual(
        &self,
        zone_id: &str,
        hour_of_day: u32,
        now: DateTime<Utc>,
    ) -> Option<SlopeEstimate> {
        let key = (zone_id.to_string(), hour_of_day);
        if let Some(entry) = self.contextual.read().get(&key).filter(|e| e.is_fresh(now)) {
            debug!(
                "Contextual slope cache hit for {} at {:02}h: {:.2}°C/h",
                zone_id, hour_of_day, entry.value
            );
            return Some(SlopeEstimate::new(
                entry.value,
                SlopeSource::ContextualCached,
                entry.sample_count,
            ));
        }

        let offset = self.config.utc_offset_minutes;
        let slopes: Vec<f64> = self
            .recent_cycles(zone_id, now)
            .iter()
            .map(|c| c.slope_sample(offset))
            .filter(|s| s.hour_of_day == hour_of_day)
            .map(|s| s.slope)
            .collect();

        let Some(value) = usable(trimmed_mean(&slopes)) else {
            debug!(
                "No usable contextual samples for {} at {:02}h ({} cycles)",
                zone_id,
                hour_of_day,
                slopes.len()
            );
            return None;
        };
        debug!(
            "Recomputed contextual slope for {} at {:02}h: {:.2}°C/h from {} cycles",
            zone_id,
            hour_of_day,
            value,
            slopes.len()
        );

        let entry = LhsCacheEntry::new(value, now, self.config.ttl_seconds, slopes.len());
        self.contextual.write().insert(key, entry);
        Some(SlopeEstimate::new(value, SlopeSource::ContextualComputed, slopes.len()))
    }

    fn fallback(&self, zone_id: &str) -> SlopeEstimate {
        let persisted = self
            .persisted
            .as_ref()
            .and_then(|p| p.last_known_slope(zone_id))
            .and_then(|v| usable(Some(v)));

        match persisted {
            Some(value) => {
                debug!("Using persisted slope for {}: {:.2}°C/h", zone_id, value);
                SlopeEstimate::new(value, SlopeSource::Persisted, 0)
            }
            None => {
                debug!(
                    "No learned slope for {}, using default {:.2}°C/h",
                    zone_id, self.config.default_slope
                );
                SlopeEstimate::new(self.config.default_slope, SlopeSource::Default, 0)
            }
        }
    }

    fn recent_cycles(&self, zone_id: &str, now: DateTime<Utc>) -> Vec<HeatingCycle> {
        self.cycles
            .get_cycles(zone_id, Some(now - self.config.lookback()))
    }
}

impl std::fmt::Debug for SlopeAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlopeAggregator")
            .field("config", &self.config)
            .field("persisted", &self.persisted.is_some())
            .finish()
    }
}

/// A slope can drive a prediction only if finite and positive.
fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}
