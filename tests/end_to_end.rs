//! End-to-end behavior through the public API.

use chrono::{DateTime, Duration, TimeZone, Utc};
use heating_pilot::{
    CurrentState, EngineConfig, HeatingAction, HeatingEngine, Measurement, MemorySource,
    NextEvent, PredictionStatus, RawMeasurement, SlopeSource,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Heating from 06:00 to 06:40, 18.0°C to 21.0°C.
fn morning_history(source: &MemorySource) {
    source.extend(
        "bedroom",
        [
            Measurement::new(at(5, 30), true, false, 18.0, 18.0),
            Measurement::new(at(6, 0), true, true, 18.0, 21.0),
            Measurement::new(at(6, 10), true, true, 18.8, 21.0),
            Measurement::new(at(6, 20), true, true, 19.5, 21.0),
            Measurement::new(at(6, 30), true, true, 20.3, 21.0),
            Measurement::new(at(6, 40), true, true, 21.0, 21.0),
            Measurement::new(at(6, 45), true, false, 21.0, 21.0),
        ],
    );
}

#[tokio::test]
async fn test_morning_scenario() {
    init_tracing();
    let source = Arc::new(MemorySource::new());
    morning_history(&source);
    let engine = HeatingEngine::new(EngineConfig::default(), source).unwrap();
    let now = at(6, 50);

    engine.refresh("bedroom", now).await.unwrap();
    let cycles = engine.cycles("bedroom", None);
    assert_eq!(cycles.len(), 1);
    assert_eq!((cycles[0].start_time, cycles[0].end_time), (at(6, 0), at(6, 40)));
    assert!((cycles[0].slope() - 4.5).abs() < 1e-9);

    let slope = engine.global_slope("bedroom", now);
    assert_eq!(slope.sample_count, 1);
    assert!((slope.value - 4.5).abs() < 1e-9);

    let result = engine.predict(
        "bedroom",
        &CurrentState::new(19.0),
        &NextEvent::new(at(7, 0), 21.0),
        now,
    );
    assert_eq!(result.status, PredictionStatus::Scheduled);
    assert!((result.estimated_duration_minutes - 31.666_666).abs() < 1e-3);
    assert_eq!(result.anticipated_start_time, at(6, 28) + Duration::seconds(20));

    // Heating runs from the anticipated start until the target time only.
    assert!(result.should_start(at(6, 30)));
    assert!(!result.should_start(at(10, 0)));
    let event = NextEvent::new(at(7, 0), 21.0);
    let state = CurrentState::new(19.0);
    assert_eq!(
        engine.decide("bedroom", &state, &event, at(6, 30)).action,
        HeatingAction::StartHeating { target_temp: 21.0 }
    );
    assert_eq!(
        engine.decide("bedroom", &state, &event, at(10, 0)).action,
        HeatingAction::NoAction
    );
}

#[tokio::test]
async fn test_refresh_idempotent_and_retention() {
    init_tracing();
    let source = Arc::new(MemorySource::new());
    morning_history(&source);
    let mut config = EngineConfig::default();
    config.cache.retention_days = 2;
    let engine = HeatingEngine::new(config, source.clone()).unwrap();

    let now = at(7, 0);
    engine.refresh("bedroom", now).await.unwrap();
    let first = engine.cache().snapshot("bedroom").unwrap();
    engine.refresh("bedroom", now).await.unwrap();
    assert_eq!(engine.cache().snapshot("bedroom").unwrap(), first);

    // Three days later the morning cycle is out of the retention window.
    let later = now + Duration::days(3);
    let report = engine.refresh("bedroom", later).await.unwrap();
    assert_eq!(report.pruned, 1);
    assert!(engine
        .cycles("bedroom", None)
        .iter()
        .all(|c| c.end_time >= later - Duration::days(2)));
}

#[tokio::test]
async fn test_no_history_uses_default_slope() {
    init_tracing();
    let engine =
        HeatingEngine::new(EngineConfig::default(), Arc::new(MemorySource::new())).unwrap();
    let now = at(6, 0);
    engine.refresh("guest", now).await.unwrap();

    let result = engine.predict(
        "guest",
        &CurrentState::new(18.0),
        &NextEvent::new(at(8, 0), 20.0),
        now,
    );
    assert_eq!(result.slope_source, SlopeSource::Default);
    assert_eq!(result.learned_slope_used, 2.0);
    // 2°C at 2°C/h plus the buffer.
    assert!((result.estimated_duration_minutes - 65.0).abs() < 1e-9);
    assert!((result.confidence - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_malformed_and_hvac_samples() {
    init_tracing();
    let source = Arc::new(MemorySource::new());
    source.extend(
        "office",
        [
            RawMeasurement::from_hvac(
                at(9, 0),
                Some("heat"),
                Some("heating"),
                Some(17.0),
                Some(20.0),
            ),
            RawMeasurement::from_hvac(at(9, 10), Some("heat"), Some("heating"), None, Some(20.0)),
            RawMeasurement::from_hvac(
                at(9, 20),
                Some("heat"),
                Some("heating"),
                Some(f64::NAN),
                Some(20.0),
            ),
            RawMeasurement::from_hvac(at(9, 30), Some("off"), Some("idle"), Some(19.0), Some(20.0)),
        ],
    );
    let engine = HeatingEngine::new(EngineConfig::default(), source).unwrap();

    let report = engine.refresh("office", at(10, 0)).await.unwrap();
    assert_eq!(report.skipped, 2);
    let cycles = engine.cycles("office", None);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].end_time, at(9, 30));
    assert!((cycles[0].slope() - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_no_op_prediction() {
    let engine =
        HeatingEngine::new(EngineConfig::default(), Arc::new(MemorySource::new())).unwrap();
    let event = NextEvent::new(at(7, 0), 20.0);
    let result = engine.predict("bedroom", &CurrentState::new(20.5), &event, at(6, 0));
    assert_eq!(result.status, PredictionStatus::NotNeeded);
    assert_eq!(result.estimated_duration_minutes, 0.0);
    assert_eq!(result.anticipated_start_time, event.target_time);
}
