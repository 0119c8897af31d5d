//! Learned heating slope (LHS) data structures.

use chrono::{DateTime, Duration, Utc};

/// A cached slope value with the time it was computed.
///
/// An entry older than its TTL is stale: it is kept, but must be recomputed
/// before it can be served again.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LhsCacheEntry {
    /// Slope in °C/hour.
    pub value: f64,
    /// When the value was computed.
    pub computed_at: DateTime<Utc>,
    /// Time-to-live in seconds.
    pub ttl_seconds: u64,
    /// Number of cycles the value was aggregated from.
    pub sample_count: usize,
}

impl LhsCacheEntry {
    /// Create a new entry.
    pub fn new(
        value: f64,
        computed_at: DateTime<Utc>,
        ttl_seconds: u64,
        sample_count: usize,
    ) -> Self {
        Self {
            value,
            computed_at,
            ttl_seconds,
            sample_count,
        }
    }

    /// Time elapsed since the value was computed.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.computed_at
    }

    /// Check whether the entry may still be served at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        self.age(now) <= Duration::seconds(ttl)
    }
}

/// Which tier of the fallback chain supplied a slope.
///
/// Ordered from most to least specific knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlopeSource {
    /// Fresh per-hour cache entry.
    ContextualCached,
    /// Per-hour value recomputed from cycles.
    ContextualComputed,
    /// Fresh global cache entry.
    GlobalCached,
    /// Global value recomputed from cycles.
    GlobalComputed,
    /// Last value persisted by a previous session.
    Persisted,
    /// Fixed conservative default.
    Default,
}

impl SlopeSource {
    /// Base prediction confidence for a slope from this tier.
    pub fn base_confidence(&self) -> f64 {
        match self {
            Self::ContextualCached => 0.90,
            Self::ContextualComputed => 0.85,
            Self::GlobalCached => 0.75,
            Self::GlobalComputed => 0.70,
            Self::Persisted => 0.50,
            Self::Default => 0.30,
        }
    }

    /// Check if the slope was learned from cached cycles.
    pub fn is_learned(&self) -> bool {
        !matches!(self, Self::Persisted | Self::Default)
    }

    /// Check if the slope came from the hour-of-day bucket.
    pub fn is_contextual(&self) -> bool {
        matches!(self, Self::ContextualCached | Self::ContextualComputed)
    }
}

impl std::fmt::Display for SlopeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextualCached => write!(f, "contextual (cached)"),
            Self::ContextualComputed => write!(f, "contextual (computed)"),
            Self::GlobalCached => write!(f, "global (cached)"),
            Self::GlobalComputed => write!(f, "global (computed)"),
            Self::Persisted => write!(f, "persisted"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// A resolved slope together with where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlopeEstimate {
    /// Slope in °C/hour.
    pub value: f64,
    /// Fallback tier that supplied the value.
    pub source: SlopeSource,
    /// Number of cycles behind the value (0 for persisted/default).
    pub sample_count: usize,
}

impl SlopeEstimate {
    /// Create a new estimate.
    pub fn new(value: f64, source: SlopeSource, sample_count: usize) -> Self {
        Self {
            value,
            source,
            sample_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cache_entry_freshness() {
        let computed = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        let entry = LhsCacheEntry::new(3.0, computed, 3600, 4);

        assert!(entry.is_fresh(computed));
        assert!(entry.is_fresh(computed + Duration::seconds(3600)));
        assert!(!entry.is_fresh(computed + Duration::seconds(3601)));
        assert_eq!(entry.age(computed + Duration::minutes(5)), Duration::minutes(5));
    }

    #[test]
    fn test_source_ordering_and_confidence() {
        let tiers = [
            SlopeSource::ContextualCached,
            SlopeSource::ContextualComputed,
            SlopeSource::GlobalCached,
            SlopeSource::GlobalComputed,
            SlopeSource::Persisted,
            SlopeSource::Default,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].base_confidence() > pair[1].base_confidence());
        }
        assert!(SlopeSource::GlobalComputed.is_learned());
        assert!(!SlopeSource::Persisted.is_learned());
        assert!(SlopeSource::ContextualCached.is_contextual());
        assert!(!SlopeSource::GlobalCached.is_contextual());
    }
}
