//! Heating engine facade.
//!
//! [`HeatingEngine`] wires the cycle cache, the slope aggregator and the
//! anticipation predictor together for any number of zones, and publishes
//! every prediction to subscribers.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::aggregator::SlopeAggregator;
use crate::config::EngineConfig;
use crate::cycle_cache::{CycleCache, RefreshReport};
use crate::data::{
    CurrentState, HeatingCycle, HeatingDecision, NextEvent, PredictionResult, SlopeEstimate,
};
use crate::detector::CycleDetector;
use crate::error::Result;
use crate::predictor::AnticipationPredictor;
use crate::source::{MeasurementSource, PersistedSlopeProvider};

/// Capacity of the prediction broadcast channel.
const PREDICTION_CHANNEL_CAPACITY: usize = 32;

/// Handle for a registered callback.
///
/// The callback stays registered until the handle is dropped or
/// [`CallbackHandle::unregister`] is called.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Learns heating slopes and predicts start times for a set of zones.
pub struct HeatingEngine {
    /// Validated configuration.
    config: EngineConfig,
    /// Cycle history per zone.
    cache: Arc<CycleCache>,
    /// Learned slopes per zone.
    aggregator: SlopeAggregator,
    /// Start time computation.
    predictor: AnticipationPredictor,
    /// Prediction channel.
    prediction_tx: broadcast::Sender<PredictionResult>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl HeatingEngine {
    /// Create an engine reading measurements from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfiguration`] if `config` does not
    /// validate.
    pub fn new(config: EngineConfig, source: Arc<dyn MeasurementSource>) -> Result<Self> {
        config.validate()?;

        let detector = CycleDetector::new(config.detection.clone());
        let cache = Arc::new(CycleCache::new(source, detector, config.cache.clone()));
        let aggregator = SlopeAggregator::new(cache.clone(), config.lhs.clone());
        let predictor = AnticipationPredictor::from_config(&config);
        let (prediction_tx, _) = broadcast::channel(PREDICTION_CHANNEL_CAPACITY);

        info!(
            "Heating engine ready (retention {} days, lookback {} days, default slope {:.1}°C/h)",
            config.cache.retention_days, config.lhs.lookback_days, config.lhs.default_slope
        );

        Ok(Self {
            config,
            cache,
            aggregator,
            predictor,
            prediction_tx,
            callback_counter: AtomicU64::new(0),
        })
    }

    /// Use `provider` for slopes persisted by a previous session.
    pub fn with_persisted(mut self, provider: Arc<dyn PersistedSlopeProvider>) -> Self {
        self.aggregator = self.aggregator.with_persisted(provider);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the cycle cache, e.g. to snapshot or restore entries.
    pub fn cache(&self) -> &CycleCache {
        &self.cache
    }

    /// Get the slope aggregator.
    pub fn aggregator(&self) -> &SlopeAggregator {
        &self.aggregator
    }

    /// Refresh the cycle cache of one zone.
    ///
    /// # Errors
    ///
    /// Returns a recoverable error if the measurement source fails or times
    /// out; the cached cycles stay usable.
    pub async fn refresh(&self, zone_id: &str, now: DateTime<Utc>) -> Result<RefreshReport> {
        self.cache.refresh(zone_id, now).await
    }

    /// Refresh several zones concurrently.
    pub async fn refresh_all<'a, I>(
        &self,
        zone_ids: I,
        now: DateTime<Utc>,
    ) -> Vec<(String, Result<RefreshReport>)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let refreshes = zone_ids.into_iter().map(|zone_id| async move {
            (zone_id.to_string(), self.cache.refresh(zone_id, now).await)
        });
        let results = join_all(refreshes).await;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        debug!("Refreshed {} zones ({} failed)", results.len(), failed);

        results
    }

    /// Predict when heating must start for `zone_id` to reach `event`.
    ///
    /// The result is also sent to prediction subscribers.
    pub fn predict(
        &self,
        zone_id: &str,
        state: &CurrentState,
        event: &NextEvent,
        now: DateTime<Utc>,
    ) -> PredictionResult {
        let result = self.predictor.predict(&self.aggregator, zone_id, state, event, now);

        info!(
            "Prediction for {}: start at {} ({:.1} min, slope {:.2}°C/h from {}, \
             confidence {:.2}, {:?})",
            zone_id,
            result.anticipated_start_time,
            result.estimated_duration_minutes,
            result.learned_slope_used,
            result.slope_source,
            result.confidence,
            result.status
        );

        // No subscribers is fine.
        let _ = self.prediction_tx.send(result.clone());
        result
    }

    /// Refresh a zone, then predict from whatever is cached.
    ///
    /// A failed refresh is logged and the prediction proceeds on the
    /// previous cycles or the fallback slopes.
    pub async fn refresh_and_predict(
        &self,
        zone_id: &str,
        state: &CurrentState,
        event: &NextEvent,
        now: DateTime<Utc>,
    ) -> PredictionResult {
        if let Err(e) = self.refresh(zone_id, now).await {
            warn!("Predicting {} from cached data: {}", zone_id, e);
        }
        self.predict(zone_id, state, event, now)
    }

    /// Predict for `zone_id` and decide whether heating should start at `now`.
    ///
    /// The underlying prediction is published like any other.
    pub fn decide(
        &self,
        zone_id: &str,
        state: &CurrentState,
        event: &NextEvent,
        now: DateTime<Utc>,
    ) -> HeatingDecision {
        let prediction = self.predict(zone_id, state, event, now);
        self.predictor.decide(&prediction, now)
    }

    /// Check whether heating `zone_id` at `current_slope` (°C/h) would
    /// overshoot `event`.
    pub fn check_overshoot_risk(
        &self,
        zone_id: &str,
        state: &CurrentState,
        event: &NextEvent,
        current_slope: f64,
        now: DateTime<Utc>,
    ) -> HeatingDecision {
        debug!("Checking overshoot risk for {} at {:.2}°C/h", zone_id, current_slope);
        self.predictor.check_overshoot_risk(state, event, current_slope, now)
    }

    /// Cached cycles of `zone_id` starting at or after `since`.
    pub fn cycles(&self, zone_id: &str, since: Option<DateTime<Utc>>) -> Vec<HeatingCycle> {
        self.cache.get_cycles(zone_id, since)
    }

    /// Global slope of `zone_id` with its fallback tier.
    pub fn global_slope(&self, zone_id: &str, now: DateTime<Utc>) -> SlopeEstimate {
        self.aggregator.resolve_global(zone_id, now)
    }

    /// Contextual slope of `zone_id` for `hour_of_day` with its fallback tier.
    pub fn contextual_slope(
        &self,
        zone_id: &str,
        hour_of_day: u32,
        now: DateTime<Utc>,
    ) -> SlopeEstimate {
        self.aggregator.resolve_contextual(zone_id, hour_of_day, now)
    }

    /// Subscribe to predictions.
    pub fn subscribe_predictions(&self) -> broadcast::Receiver<PredictionResult> {
        self.prediction_tx.subscribe()
    }

    /// Register a callback run for every prediction.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_prediction<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(PredictionResult) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.prediction_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(result) => callback(result),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Prediction callback {} lagged, skipped {}", callback_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }
}

impl std::fmt::Debug for HeatingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeatingEngine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}
