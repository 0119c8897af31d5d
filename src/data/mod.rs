//! Data structures for the prediction engine.
//!
//! This module contains the value types that flow between the detector,
//! the caches, and the predictor: measurements, heating cycles, learned
//! slope entries, prediction results, and heating decisions.

pub mod cycle;
pub mod decision;
pub mod lhs;
pub mod measurement;
pub mod prediction;

pub use cycle::{CycleCacheEntry, HeatingCycle, OpenCycle, SlopeSample};
pub use decision::{HeatingAction, HeatingDecision};
pub use lhs::{LhsCacheEntry, SlopeEstimate, SlopeSource};
pub use measurement::{
    hvac_action_is_heating, hvac_mode_enables_heating, Measurement, RawMeasurement,
};
pub use prediction::{CurrentState, NextEvent, PredictionResult, PredictionStatus};
