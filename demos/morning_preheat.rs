//! Morning preheat example - learn from a week of history and plan tomorrow
//!
//! Run with: cargo run --example morning_preheat

use chrono::{Duration, TimeZone, Utc};
use heating_pilot::{
    CurrentState, EngineConfig, HeatingEngine, MemorySource, PresetTable, RawMeasurement, Result,
    ScheduleAction, ScheduleNormalizer, SchedulerPayload,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Morning Preheat Example");
    println!("=======================\n");

    let now = Utc.with_ymd_and_hms(2024, 1, 15, 5, 0, 0).unwrap();
    let source = Arc::new(MemorySource::new());

    // Seven mornings: the room starts at 17-18°C and reaches 21°C.
    for day in 1..=7i64 {
        let start = now - Duration::days(day) + Duration::minutes(60);
        let start_temp = 17.0 + (day % 2) as f64;
        let minutes = 45 + day * 3;
        for step in 0..=minutes / 5 {
            let t = start + Duration::minutes(step * 5);
            let progress = (step * 5) as f64 / minutes as f64;
            let temp = start_temp + (21.0 - start_temp) * progress;
            source.push(
                "bedroom",
                RawMeasurement::from_hvac(t, Some("heat"), Some("heating"), Some(temp), Some(21.0)),
            );
        }
        source.push(
            "bedroom",
            RawMeasurement::from_hvac(
                start + Duration::minutes(minutes + 10),
                Some("heat"),
                Some("idle"),
                Some(21.0),
                Some(21.0),
            ),
        );
    }

    let config = EngineConfig::default();
    let engine = HeatingEngine::new(config, source)?;

    let _callback = engine.on_prediction(|prediction| {
        println!(
            "[scheduler] {} should start heating at {}",
            prediction.zone_id, prediction.anticipated_start_time
        );
    });

    let report = engine.refresh("bedroom", now).await?;
    println!(
        "Learned from {} samples: {} cycles cached\n",
        report.measurements, report.total
    );

    for cycle in engine.cycles("bedroom", None) {
        println!(
            "  {}  {:4.1} min  {:4.1}°C -> {:4.1}°C  ({:.2}°C/h)",
            cycle.start_time.format("%a %H:%M"),
            cycle.duration_minutes(),
            cycle.start_temp,
            cycle.end_temp,
            cycle.slope()
        );
    }

    let global = engine.global_slope("bedroom", now);
    println!("\nGlobal slope: {:.2}°C/h ({})", global.value, global.source);

    // Tomorrow's comfort slot, as published by the scheduler.
    let normalizer = ScheduleNormalizer::new(
        engine.config().lhs.utc_offset_minutes,
        PresetTable::new().with("comfort", 21.0).with("eco", 17.0),
    );
    let payload = SchedulerPayload::Standard {
        next_trigger: "2024-01-15T07:00:00Z".to_string(),
        next_slot: 1,
        actions: vec![
            ScheduleAction::SetPreset {
                preset: "eco".to_string(),
            },
            ScheduleAction::SetPreset {
                preset: "comfort".to_string(),
            },
        ],
    };
    let event = normalizer.normalize(&payload)?;

    let state = CurrentState::new(17.5)
        .with_outdoor_temp(2.0)
        .with_humidity(55.0)
        .with_cloud_cover(90.0);

    let prediction = engine.predict("bedroom", &state, &event, now);
    let (hours, minutes) = prediction.lead_time_formatted();

    println!(
        "\nTarget {:.1}°C at {}: start at {} ({}h{:02} ahead)",
        event.target_temp,
        event.target_time.format("%H:%M"),
        prediction.anticipated_start_time.format("%H:%M:%S"),
        hours,
        minutes
    );
    println!(
        "Slope {:.2}°C/h from {}, confidence {:.0}%",
        prediction.learned_slope_used,
        prediction.slope_source,
        prediction.confidence * 100.0
    );

    // Decide at the anticipated start, then watch for overshoot while heating.
    let decision = engine.decide("bedroom", &state, &event, prediction.anticipated_start_time);
    println!("\nAt {}: {}", prediction.anticipated_start_time.format("%H:%M"), decision);
    let check = engine.check_overshoot_risk(
        "bedroom",
        &CurrentState::new(20.0),
        &event,
        5.0,
        event.target_time - Duration::minutes(30),
    );
    println!("Half an hour before target at 5°C/h: {}", check);

    // Let the callback task print before exiting.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    Ok(())
}
