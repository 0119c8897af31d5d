//! Anticipation prediction.
//!
//! Turns a temperature gap and a learned slope into the moment heating must
//! start, corrected for outdoor conditions and bounded by the configured
//! anticipation window. A prediction then drives a [`HeatingDecision`]: start
//! now, wait, or stop early when the current heating rate would overshoot.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::aggregator::SlopeAggregator;
use crate::config::{AnticipationConfig, EngineConfig, EnvironmentConfig};
use crate::data::{
    CurrentState, HeatingDecision, NextEvent, PredictionResult, PredictionStatus, SlopeEstimate,
};
use crate::utils::{duration_to_hours, hour_of_day, minutes_to_duration};

/// Multipliers applied to the base heating time.
///
/// Each is 1.0 when its reading is absent or not finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentalCorrection {
    /// Cold outdoor air slows heating down.
    pub outdoor: f64,
    /// Humid indoor air slows heating down.
    pub humidity: f64,
    /// Humid outdoor air slows heating down.
    pub outdoor_humidity: f64,
    /// Clear skies speed heating up.
    pub cloud: f64,
}

impl EnvironmentalCorrection {
    /// No correction.
    pub const NONE: Self = Self {
        outdoor: 1.0,
        humidity: 1.0,
        outdoor_humidity: 1.0,
        cloud: 1.0,
    };

    /// Combined multiplier.
    pub fn total(&self) -> f64 {
        self.outdoor * self.humidity * self.outdoor_humidity * self.cloud
    }
}

impl Default for EnvironmentalCorrection {
    fn default() -> Self {
        Self::NONE
    }
}

/// Computes anticipated heating start times.
#[derive(Debug, Clone, Default)]
pub struct AnticipationPredictor {
    anticipation: AnticipationConfig,
    environment: EnvironmentConfig,
}

impl AnticipationPredictor {
    /// Create a predictor.
    pub fn new(anticipation: AnticipationConfig, environment: EnvironmentConfig) -> Self {
        Self {
            anticipation,
            environment,
        }
    }

    /// Create a predictor from the relevant sections of an engine config.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.anticipation.clone(), config.environment.clone())
    }

    /// Predict when heating must start for `zone_id` to reach `event`.
    ///
    /// The slope is the contextual slope for the hour of the event, resolved
    /// through the aggregator's fallback chain.
    pub fn predict(
        &self,
        aggregator: &SlopeAggregator,
        zone_id: &str,
        state: &CurrentState,
        event: &NextEvent,
        now: DateTime<Utc>,
    ) -> PredictionResult {
        let hour = hour_of_day(event.target_time, aggregator.config().utc_offset_minutes);
        let slope = aggregator.resolve_contextual(zone_id, hour, now);
        self.predict_with_slope(zone_id, state, event, slope)
    }

    /// Predict from an already resolved slope.
    pub fn predict_with_slope(
        &self,
        zone_id: &str,
        state: &CurrentState,
        event: &NextEvent,
        slope: SlopeEstimate,
    ) -> PredictionResult {
        let no_heating = |status, confidence| PredictionResult {
            zone_id: zone_id.to_string(),
            anticipated_start_time: event.target_time,
            target_time: event.target_time,
            target_temp: event.target_temp,
            estimated_duration_minutes: 0.0,
            learned_slope_used: slope.value,
            confidence,
            slope_source: slope.source,
            status,
        };

        if !state.current_temp.is_finite() || !event.target_temp.is_finite() {
            debug!("Cannot predict for {}: non-finite temperatures", zone_id);
            return no_heating(PredictionStatus::NoData, 0.0);
        }

        let delta = event.target_temp - state.current_temp;
        if delta <= 0.0 {
            debug!(
                "{} already at {:.1}°C for a {:.1}°C target, no pre-heating",
                zone_id, state.current_temp, event.target_temp
            );
            return no_heating(PredictionStatus::NotNeeded, 1.0);
        }

        if !slope.value.is_finite() || slope.value <= 0.0 {
            debug!("Cannot predict for {}: unusable slope {}", zone_id, slope.value);
            return no_heating(PredictionStatus::NoData, 0.0);
        }

        let base_minutes = delta / slope.value * 60.0;
        let correction = self.environmental_correction(state);
        let raw_minutes =
            base_minutes * correction.total() + self.anticipation.safety_buffer_minutes;
        let minutes = raw_minutes.clamp(
            self.anticipation.min_anticipation_minutes,
            self.anticipation.max_anticipation_minutes,
        );

        let confidence = self.confidence(&slope, state);

        debug!(
            "{}: {:.1}°C to gain at {:.2}°C/h ({}) -> {:.1} min base x{:.3} -> {:.1} min",
            zone_id,
            delta,
            slope.value,
            slope.source,
            base_minutes,
            correction.total(),
            minutes
        );

        PredictionResult {
            zone_id: zone_id.to_string(),
            anticipated_start_time: event.target_time - minutes_to_duration(minutes),
            target_time: event.target_time,
            target_temp: event.target_temp,
            estimated_duration_minutes: minutes,
            learned_slope_used: slope.value,
            confidence,
            slope_source: slope.source,
            status: PredictionStatus::Scheduled,
        }
    }

    /// Correction multipliers for the readings in `state`.
    pub fn environmental_correction(&self, state: &CurrentState) -> EnvironmentalCorrection {
        let env = &self.environment;
        let reading = |r: Option<f64>| r.filter(|v| v.is_finite());

        let outdoor = match reading(state.outdoor_temp) {
            Some(t) if t < env.outdoor_reference => {
                (1.0 + (env.outdoor_reference - t) * env.outdoor_factor).min(env.max_outdoor_factor)
            }
            _ => 1.0,
        };

        let humid = |h: Option<f64>| match reading(h) {
            Some(h) if h > env.humidity_reference => {
                (1.0 + (h - env.humidity_reference) * env.humidity_factor)
                    .min(env.max_humidity_factor)
            }
            _ => 1.0,
        };

        let cloud = match reading(state.cloud_cover) {
            Some(c) if c < env.cloud_reference => {
                (1.0 - (env.cloud_reference - c) * env.cloud_factor).max(env.min_cloud_factor)
            }
            _ => 1.0,
        };

        EnvironmentalCorrection {
            outdoor,
            humidity: humid(state.humidity),
            outdoor_humidity: humid(state.outdoor_humidity),
            cloud,
        }
    }

    /// Decide what to do at `now` from `prediction`.
    ///
    /// Heating starts only inside `[anticipated_start_time, target_time)`.
    /// Before that window the decision is to wait; after it the slot is over.
    pub fn decide(&self, prediction: &PredictionResult, now: DateTime<Utc>) -> HeatingDecision {
        let decision = match prediction.status {
            PredictionStatus::NotNeeded => HeatingDecision::no_action(format!(
                "already at target temperature ({:.1}°C)",
                prediction.target_temp
            )),
            PredictionStatus::NoData => HeatingDecision::no_action("no usable prediction"),
            PredictionStatus::Scheduled if prediction.should_start(now) => HeatingDecision::start(
                prediction.target_temp,
                format!(
                    "time to start heating (anticipated start {})",
                    prediction.anticipated_start_time
                ),
            ),
            PredictionStatus::Scheduled if prediction.is_past(now) => {
                HeatingDecision::no_action("schedule time has passed")
            }
            PredictionStatus::Scheduled => HeatingDecision::no_action(format!(
                "wait until {}",
                prediction.anticipated_start_time
            )),
        };

        if decision.is_action() {
            info!("Decision for {}: {}", prediction.zone_id, decision);
        } else {
            debug!("Decision for {}: {}", prediction.zone_id, decision);
        }
        decision
    }

    /// Check whether heating at `current_slope` (°C/h) would overshoot
    /// `event`.
    ///
    /// The room temperature is projected linearly to the target time. Heating
    /// is stopped when the projection exceeds the target by more than the
    /// configured overshoot margin.
    pub fn check_overshoot_risk(
        &self,
        state: &CurrentState,
        event: &NextEvent,
        current_slope: f64,
        now: DateTime<Utc>,
    ) -> HeatingDecision {
        let hours_to_target = duration_to_hours(event.target_time - now);
        if hours_to_target <= 0.0 {
            return HeatingDecision::no_action("target time reached");
        }
        if !state.current_temp.is_finite()
            || !event.target_temp.is_finite()
            || !current_slope.is_finite()
        {
            return HeatingDecision::no_action("cannot project temperature");
        }

        let projected = state.current_temp + current_slope * hours_to_target;
        let threshold = event.target_temp + self.anticipation.overshoot_margin;
        debug!(
            "Projected {:.1}°C at {} (threshold {:.1}°C)",
            projected, event.target_time, threshold
        );

        if projected > threshold {
            let decision = HeatingDecision::stop(format!(
                "overshoot risk (projected {:.1}°C > {:.1}°C)",
                projected, threshold
            ));
            info!("{}", decision);
            decision
        } else {
            HeatingDecision::no_action(format!("no overshoot risk (projected {:.1}°C)", projected))
        }
    }

    /// Confidence of a prediction driven by `slope`.
    pub fn confidence(&self, slope: &SlopeEstimate, state: &CurrentState) -> f64 {
        let bonus = self.environment.sensor_confidence_bonus * state.sensor_count() as f64;
        (slope.source.base_confidence() + bonus).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HeatingAction, SlopeSource};
    use chrono::{Duration, TimeZone};

    fn target() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap()
    }

    fn slope(value: f64, source: SlopeSource) -> SlopeEstimate {
        SlopeEstimate::new(value, source, 1)
    }

    #[test]
    fn test_morning_scenario() {
        let predictor = AnticipationPredictor::default();
        let result = predictor.predict_with_slope(
            "bedroom",
            &CurrentState::new(19.0),
            &NextEvent::new(target(), 21.0),
            slope(4.5, SlopeSource::ContextualComputed),
        );

        assert_eq!(result.status, PredictionStatus::Scheduled);
        assert!((result.estimated_duration_minutes - (2.0 / 4.5 * 60.0 + 5.0)).abs() < 1e-9);
        assert_eq!(
            result.anticipated_start_time,
            Utc.with_ymd_and_hms(2024, 1, 15, 6, 28, 20).unwrap()
        );
        assert_eq!(result.learned_slope_used, 4.5);
        assert!((result.confidence - 0.85).abs() < 1e-9);
        assert_eq!(result.lead_time_formatted(), (0, 32));
    }

    #[test]
    fn test_no_preheat_needed() {
        let predictor = AnticipationPredictor::default();
        for current in [21.0, 22.5] {
            let result = predictor.predict_with_slope(
                "bedroom",
                &CurrentState::new(current),
                &NextEvent::new(target(), 21.0),
                slope(4.5, SlopeSource::GlobalCached),
            );
            assert_eq!(result.status, PredictionStatus::NotNeeded);
            assert_eq!(result.estimated_duration_minutes, 0.0);
            assert_eq!(result.anticipated_start_time, target());
        }
    }

    #[test]
    fn test_clamped_to_max_anticipation() {
        let predictor = AnticipationPredictor::default();
        let result = predictor.predict_with_slope(
            "bedroom",
            &CurrentState::new(15.0),
            &NextEvent::new(target(), 21.0),
            slope(0.001, SlopeSource::Persisted),
        );
        assert_eq!(result.estimated_duration_minutes, 240.0);
        assert_eq!(result.anticipated_start_time, target() - Duration::minutes(240));
    }

    #[test]
    fn test_clamped_to_min_anticipation() {
        let predictor = AnticipationPredictor::new(
            AnticipationConfig {
                safety_buffer_minutes: 0.0,
                min_anticipation_minutes: 10.0,
                ..Default::default()
            },
            EnvironmentConfig::default(),
        );
        let result = predictor.predict_with_slope(
            "bedroom",
            &CurrentState::new(20.9),
            &NextEvent::new(target(), 21.0),
            slope(30.0, SlopeSource::GlobalComputed),
        );
        assert_eq!(result.estimated_duration_minutes, 10.0);
    }

    #[test]
    fn test_unusable_slope_reports_no_data() {
        let predictor = AnticipationPredictor::default();
        for value in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = predictor.predict_with_slope(
                "bedroom",
                &CurrentState::new(18.0),
                &NextEvent::new(target(), 21.0),
                slope(value, SlopeSource::Default),
            );
            assert_eq!(result.status, PredictionStatus::NoData);
            assert_eq!(result.confidence, 0.0);
            assert_eq!(result.anticipated_start_time, target());
            assert!(!result.is_actionable());
        }

        let result = predictor.predict_with_slope(
            "bedroom",
            &CurrentState::new(f64::NAN),
            &NextEvent::new(target(), 21.0),
            slope(2.0, SlopeSource::Default),
        );
        assert_eq!(result.status, PredictionStatus::NoData);
    }

    #[test]
    fn test_environmental_correction() {
        let predictor = AnticipationPredictor::default();
        assert_eq!(
            predictor.environmental_correction(&CurrentState::new(19.0)),
            EnvironmentalCorrection::NONE
        );

        let state = CurrentState::new(19.0)
            .with_outdoor_temp(0.0)
            .with_humidity(70.0)
            .with_outdoor_humidity(100.0)
            .with_cloud_cover(0.0);
        let c = predictor.environmental_correction(&state);
        assert!((c.outdoor - 2.0).abs() < 1e-9);
        assert!((c.humidity - 1.04).abs() < 1e-9);
        assert!((c.outdoor_humidity - 1.1).abs() < 1e-9);
        assert!((c.cloud - 0.9).abs() < 1e-9);
        assert!((c.total() - 2.0 * 1.04 * 1.1 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_correction_caps_and_thresholds() {
        let predictor = AnticipationPredictor::new(
            AnticipationConfig::default(),
            EnvironmentConfig {
                cloud_factor: 0.01,
                ..Default::default()
            },
        );
        let state = CurrentState::new(19.0)
            .with_outdoor_temp(-60.0)
            .with_humidity(40.0)
            .with_cloud_cover(0.0);
        let c = predictor.environmental_correction(&state);
        assert_eq!(c.outdoor, 3.0);
        assert_eq!(c.humidity, 1.0);
        assert_eq!(c.cloud, 0.8);

        let warm = CurrentState::new(19.0).with_outdoor_temp(25.0).with_cloud_cover(100.0);
        assert_eq!(predictor.environmental_correction(&warm), EnvironmentalCorrection::NONE);
    }

    #[test]
    fn test_cold_weather_starts_earlier() {
        let predictor = AnticipationPredictor::default();
        let event = NextEvent::new(target(), 21.0);
        let mild = predictor.predict_with_slope(
            "bedroom",
            &CurrentState::new(19.0),
            &event,
            slope(4.5, SlopeSource::ContextualCached),
        );
        let cold = predictor.predict_with_slope(
            "bedroom",
            &CurrentState::new(19.0).with_outdoor_temp(-5.0),
            &event,
            slope(4.5, SlopeSource::ContextualCached),
        );
        assert!(cold.anticipated_start_time < mild.anticipated_start_time);
        assert!(cold.confidence > mild.confidence);
    }

    #[test]
    fn test_confidence_capped() {
        let predictor = AnticipationPredictor::default();
        let state = CurrentState::new(19.0)
            .with_outdoor_temp(5.0)
            .with_humidity(55.0)
            .with_outdoor_humidity(80.0)
            .with_cloud_cover(50.0);
        let c = predictor.confidence(&slope(4.0, SlopeSource::ContextualCached), &state);
        assert_eq!(c, 1.0);
        let c = predictor.confidence(&slope(2.0, SlopeSource::Default), &state);
        assert!((c - 0.5).abs() < 1e-9);
    }

    fn morning_prediction() -> PredictionResult {
        AnticipationPredictor::default().predict_with_slope(
            "bedroom",
            &CurrentState::new(19.0),
            &NextEvent::new(target(), 21.0),
            slope(4.5, SlopeSource::ContextualComputed),
        )
    }

    #[test]
    fn test_decide_start_inside_window() {
        let predictor = AnticipationPredictor::default();
        let prediction = morning_prediction();

        let decision = predictor.decide(&prediction, prediction.anticipated_start_time);
        assert_eq!(decision.action, HeatingAction::StartHeating { target_temp: 21.0 });

        let decision = predictor.decide(&prediction, target() - Duration::minutes(1));
        assert_eq!(decision.target_temp(), Some(21.0));
    }

    #[test]
    fn test_decide_wait_before_window() {
        let predictor = AnticipationPredictor::default();
        let prediction = morning_prediction();

        let decision = predictor.decide(&prediction, target() - Duration::hours(2));
        assert_eq!(decision.action, HeatingAction::NoAction);
        assert!(decision.reason.starts_with("wait until"));
    }

    #[test]
    fn test_decide_after_target_time() {
        let predictor = AnticipationPredictor::default();
        let prediction = morning_prediction();

        for now in [target(), target() + Duration::hours(3)] {
            let decision = predictor.decide(&prediction, now);
            assert_eq!(decision.action, HeatingAction::NoAction);
            assert_eq!(decision.reason, "schedule time has passed");
        }
    }

    #[test]
    fn test_decide_not_needed_and_no_data() {
        let predictor = AnticipationPredictor::default();
        let event = NextEvent::new(target(), 21.0);
        let warm = predictor.predict_with_slope(
            "bedroom",
            &CurrentState::new(21.5),
            &event,
            slope(4.5, SlopeSource::GlobalCached),
        );
        let now = target() - Duration::minutes(10);
        assert_eq!(predictor.decide(&warm, now).action, HeatingAction::NoAction);

        let blind = predictor.predict_with_slope(
            "bedroom",
            &CurrentState::new(18.0),
            &event,
            slope(0.0, SlopeSource::Default),
        );
        assert_eq!(predictor.decide(&blind, now).action, HeatingAction::NoAction);
    }

    #[test]
    fn test_overshoot_risk_stops_heating() {
        let predictor = AnticipationPredictor::default();
        let event = NextEvent::new(target(), 21.0);
        let now = target() - Duration::minutes(30);

        // 20.0 + 4.0°C/h * 0.5h = 22.0, above 21.5.
        let decision = predictor.check_overshoot_risk(&CurrentState::new(20.0), &event, 4.0, now);
        assert_eq!(decision.action, HeatingAction::StopHeating);
    }

    #[test]
    fn test_no_overshoot_risk() {
        let predictor = AnticipationPredictor::default();
        let event = NextEvent::new(target(), 21.0);
        let now = target() - Duration::minutes(30);

        // 20.0 + 2.0°C/h * 0.5h = 21.0, within the margin.
        let decision = predictor.check_overshoot_risk(&CurrentState::new(20.0), &event, 2.0, now);
        assert_eq!(decision.action, HeatingAction::NoAction);
        assert!(decision.reason.starts_with("no overshoot risk"));

        // Exactly at the threshold is not an overshoot.
        let decision = predictor.check_overshoot_risk(&CurrentState::new(20.0), &event, 3.0, now);
        assert_eq!(decision.action, HeatingAction::NoAction);

        let decision =
            predictor.check_overshoot_risk(&CurrentState::new(20.0), &event, 4.0, target());
        assert_eq!(decision.reason, "target time reached");

        let decision =
            predictor.check_overshoot_risk(&CurrentState::new(20.0), &event, f64::NAN, now);
        assert_eq!(decision.action, HeatingAction::NoAction);
    }
}
