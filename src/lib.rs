//! # heating-pilot
//!
//! Learns how fast each heated zone warms up and predicts when heating must
//! start so a scheduled target temperature is reached right on time.
//!
//! ## Features
//!
//! - **Cycle Detection**: Find heating cycles in thermostat history
//! - **Incremental Cache**: Full scan once, then only new measurements
//! - **Learned Slopes**: Outlier-resistant global and per-hour heating rates
//! - **Graceful Fallbacks**: Contextual, global, persisted, then default slope
//! - **Environmental Corrections**: Outdoor temperature, humidity and sun
//! - **Heating Decisions**: Start, wait, or stop early on overshoot risk
//! - **Scheduler Adapters**: Normalize several scheduler layouts to one event
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heating_pilot::{
//!     CurrentState, EngineConfig, HeatingEngine, Measurement, MemorySource, NextEvent, Result,
//! };
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let source = Arc::new(MemorySource::new());
//!     let now = Utc::now();
//!     source.extend(
//!         "bedroom",
//!         [
//!             Measurement::new(now - Duration::minutes(50), true, true, 18.0, 21.0),
//!             Measurement::new(now - Duration::minutes(10), true, true, 21.0, 21.0),
//!         ],
//!     );
//!
//!     let engine = HeatingEngine::new(EngineConfig::default(), source)?;
//!     engine.refresh("bedroom", now).await?;
//!
//!     let event = NextEvent::new(now + Duration::hours(2), 21.0);
//!     let prediction = engine.predict("bedroom", &CurrentState::new(19.0), &event, now);
//!     println!(
//!         "Start heating at {} ({:.0} min ahead, slope {:.2}°C/h)",
//!         prediction.anticipated_start_time,
//!         prediction.estimated_duration_minutes,
//!         prediction.learned_slope_used
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! Refreshes of the same zone are serialized; different zones refresh in
//! parallel. A refresh that fails, times out, or is cancelled leaves the
//! cached cycles of its zone unchanged.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for config and data types

// Public modules
pub mod aggregator;
pub mod config;
pub mod cycle_cache;
pub mod data;
pub mod detector;
pub mod engine;
pub mod error;
pub mod predictor;
pub mod schedule;
pub mod source;
pub mod utils;

// Re-exports for convenience
pub use aggregator::{trimmed_mean, SlopeAggregator};
pub use config::{
    AnticipationConfig, CacheConfig, DetectionConfig, EngineConfig, EnvironmentConfig, LhsConfig,
};
pub use cycle_cache::{CycleCache, RefreshReport, ScanMode};
pub use detector::{CycleDetector, Cycles};
pub use engine::{CallbackHandle, HeatingEngine};
pub use error::{Error, Result};
pub use predictor::{AnticipationPredictor, EnvironmentalCorrection};
pub use schedule::{
    PresetTable, ScheduleAction, ScheduleEntry, ScheduleNormalizer, SchedulerPayload,
};
pub use source::{MeasurementSource, MemorySource, PersistedSlopeProvider};
pub use utils::{duration_to_minutes, hour_of_day, minutes_to_duration};

// Re-export commonly used types from submodules
pub use data::{
    CurrentState, CycleCacheEntry, HeatingAction, HeatingCycle, HeatingDecision, LhsCacheEntry,
    Measurement, NextEvent, OpenCycle, PredictionResult, PredictionStatus, RawMeasurement,
    SlopeEstimate, SlopeSource,
};
