//! Heating cycle detection.
//!
//! A two-state machine (idle / heating) runs over time-ordered measurements
//! and yields closed [`HeatingCycle`]s lazily through the [`Cycles`] iterator.
//!
//! - **Idle → Heating** when heating is enabled, the heater is running, and the
//!   set point exceeds the room temperature by more than the detection
//!   threshold.
//! - **Heating → Idle** on the first later sample where heating is disabled or
//!   the room is within the threshold of the set point.
//!
//! Detection is edge-triggered with no debounce: a room hovering around the
//! closing boundary produces several short cycles, and those shorter than the
//! minimum duration are dropped.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::data::{HeatingCycle, Measurement, OpenCycle};

/// Detects heating cycles in measurement streams.
#[derive(Debug, Clone, Default)]
pub struct CycleDetector {
    config: DetectionConfig,
}

impl CycleDetector {
    /// Create a detector with the given settings.
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Get the detection settings.
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect cycles in `measurements`, starting idle.
    ///
    /// The returned iterator is lazy and consumes `measurements` as it goes.
    pub fn detect<I>(&self, measurements: I, zone_id: &str) -> Cycles<I::IntoIter>
    where
        I: IntoIterator<Item = Measurement>,
    {
        self.resume(measurements, zone_id, None)
    }

    /// Detect cycles in `measurements`, continuing from a previous scan.
    ///
    /// `open` is the cycle that was still heating when the previous scan
    /// ended, as reported by [`Cycles::open_cycle`].
    pub fn resume<I>(
        &self,
        measurements: I,
        zone_id: &str,
        open: Option<OpenCycle>,
    ) -> Cycles<I::IntoIter>
    where
        I: IntoIterator<Item = Measurement>,
    {
        Cycles {
            measurements: measurements.into_iter(),
            config: self.config.clone(),
            zone_id: zone_id.to_string(),
            open,
            last_timestamp: None,
            pending: VecDeque::new(),
        }
    }
}

/// Lazy sequence of detected cycles.
///
/// Finite and not restartable: once the underlying measurements are
/// exhausted, the iterator is done.
#[derive(Debug)]
pub struct Cycles<I> {
    measurements: I,
    config: DetectionConfig,
    zone_id: String,
    open: Option<OpenCycle>,
    last_timestamp: Option<DateTime<Utc>>,
    pending: VecDeque<HeatingCycle>,
}

impl<I> Cycles<I> {
    /// The cycle still heating after the last consumed measurement.
    pub fn open_cycle(&self) -> Option<OpenCycle> {
        self.open
    }

    /// Timestamp of the last measurement accepted by the state machine.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    fn step(&mut self, m: Measurement) {
        if let Some(last) = self.last_timestamp {
            if m.timestamp < last {
                warn!(
                    "Skipping out-of-order measurement for {} at {} (last seen {})",
                    self.zone_id, m.timestamp, last
                );
                return;
            }
        }
        self.last_timestamp = Some(m.timestamp);

        let threshold = self.config.detection_threshold;

        match self.open {
            None => {
                if m.heating_enabled && m.heating_active && m.temperature_gap() > threshold {
                    debug!(
                        "Heating cycle started for {} at {} (room {:.1}°C, target {:.1}°C)",
                        self.zone_id, m.timestamp, m.current_temp, m.target_temp
                    );
                    self.open = Some(OpenCycle {
                        start_time: m.timestamp,
                        start_temp: m.current_temp,
                        target_temp: m.target_temp,
                    });
                }
            }
            Some(start) => {
                let disabled = !m.heating_enabled;
                let reached = m.current_temp >= m.target_temp - threshold;
                if disabled || reached {
                    debug!(
                        "Heating cycle ended for {} at {} ({})",
                        self.zone_id,
                        m.timestamp,
                        if disabled { "heating disabled" } else { "target reached" }
                    );
                    self.open = None;
                    self.close(start, m);
                }
            }
        }
    }

    fn close(&mut self, start: OpenCycle, end: Measurement) {
        let duration = end.timestamp - start.start_time;
        if duration < self.config.min_cycle_duration()
            || duration > self.config.max_cycle_duration()
        {
            debug!(
                "Discarding cycle for {} from {} lasting {} min (allowed {}-{} min)",
                self.zone_id,
                start.start_time,
                duration.num_minutes(),
                self.config.min_cycle_duration_minutes,
                self.config.max_cycle_duration_minutes
            );
            return;
        }

        let cycle = HeatingCycle {
            zone_id: self.zone_id.clone(),
            start_time: start.start_time,
            end_time: end.timestamp,
            start_temp: start.start_temp,
            end_temp: end.current_temp,
            target_temp: start.target_temp,
        };

        match self.config.cycle_split_duration() {
            Some(split) if duration > split => {
                let parts = split_cycle(&cycle, split, self.config.min_cycle_duration());
                debug!(
                    "Split {}-minute cycle for {} into {} sub-cycles",
                    duration.num_minutes(),
                    self.zone_id,
                    parts.len()
                );
                self.pending.extend(parts);
            }
            _ => self.pending.push_back(cycle),
        }
    }
}

impl<I> Iterator for Cycles<I>
where
    I: Iterator<Item = Measurement>,
{
    type Item = HeatingCycle;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cycle) = self.pending.pop_front() {
                return Some(cycle);
            }
            let m = self.measurements.next()?;
            self.step(m);
        }
    }
}

/// Cut a cycle into contiguous sub-cycles of `split` length.
///
/// Temperatures are linearly interpolated between the endpoints of `cycle`.
/// A trailing remainder shorter than `min_duration` is merged into the last
/// full sub-cycle so every part stays within the duration bounds.
pub fn split_cycle(
    cycle: &HeatingCycle,
    split: Duration,
    min_duration: Duration,
) -> Vec<HeatingCycle> {
    let total = cycle.duration();
    let total_ms = total.num_milliseconds();
    let split_ms = split.num_milliseconds();
    if total_ms <= 0 || split_ms <= 0 || total <= split {
        return vec![cycle.clone()];
    }

    let temp_at = |t: DateTime<Utc>| {
        let elapsed = (t - cycle.start_time).num_milliseconds() as f64;
        cycle.start_temp + cycle.temperature_gain() * elapsed / total_ms as f64
    };

    let mut bounds: Vec<DateTime<Utc>> = Vec::new();
    let mut t = cycle.start_time;
    while t < cycle.end_time {
        bounds.push(t);
        t += split;
    }
    bounds.push(cycle.end_time);

    // A short tail is folded into the previous slice.
    if bounds.len() > 2 {
        let n = bounds.len();
        if bounds[n - 1] - bounds[n - 2] < min_duration {
            bounds.remove(n - 2);
        }
    }

    bounds
        .windows(2)
        .map(|w| HeatingCycle {
            zone_id: cycle.zone_id.clone(),
            start_time: w[0],
            end_time: w[1],
            start_temp: temp_at(w[0]),
            end_temp: if w[1] == cycle.end_time {
                cycle.end_temp
            } else {
                temp_at(w[1])
            },
            target_temp: cycle.target_temp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap()
    }

    fn at(minute: i64) -> DateTime<Utc> {
        base() + Duration::minutes(minute)
    }

    fn heating(minute: i64, current: f64, target: f64) -> Measurement {
        Measurement::new(at(minute), true, true, current, target)
    }

    fn idle(minute: i64, current: f64, target: f64) -> Measurement {
        Measurement::new(at(minute), true, false, current, target)
    }

    fn off(minute: i64, current: f64) -> Measurement {
        Measurement::new(at(minute), false, false, current, 21.0)
    }

    #[test]
    fn test_single_cycle() {
        let measurements = vec![
            idle(-10, 18.0, 18.0),
            heating(0, 18.0, 21.0),
            heating(20, 19.5, 21.0),
            heating(40, 21.0, 21.0),
            idle(50, 21.0, 21.0),
        ];
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "lounge").collect();

        assert_eq!(cycles.len(), 1);
        let c = &cycles[0];
        assert_eq!(c.zone_id, "lounge");
        assert_eq!(c.start_time, at(0));
        assert_eq!(c.end_time, at(40));
        assert_eq!(c.start_temp, 18.0);
        assert_eq!(c.end_temp, 21.0);
        assert!((c.slope() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_start_requires_enabled_active_and_gap() {
        let measurements = vec![
            // Heater not running.
            idle(0, 18.0, 21.0),
            // Gap below threshold.
            heating(5, 20.9, 21.0),
            // Heating disabled.
            Measurement::new(at(10), false, true, 18.0, 21.0),
            heating(15, 18.0, 21.0),
            heating(45, 20.85, 21.0),
        ];
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "z").collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].start_time, at(15));
        assert_eq!(cycles[0].end_time, at(45));
    }

    #[test]
    fn test_mode_off_closes_cycle() {
        let measurements = vec![heating(0, 17.0, 21.0), heating(10, 18.0, 21.0), off(30, 19.0)];
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "z").collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].end_time, at(30));
        assert_eq!(cycles[0].end_temp, 19.0);
    }

    #[test]
    fn test_heater_pausing_does_not_close_cycle() {
        // Only mode-off or reaching the target closes; an idle action does not.
        let measurements = vec![
            heating(0, 18.0, 21.0),
            idle(10, 19.0, 21.0),
            heating(20, 19.5, 21.0),
            heating(30, 21.0, 21.0),
        ];
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "z").collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].end_time, at(30));
    }

    #[test]
    fn test_duration_bounds_discard() {
        let measurements = vec![
            heating(0, 18.0, 21.0),
            heating(3, 21.0, 21.0), // 3 minutes: too short
            heating(10, 18.0, 21.0),
            heating(320, 21.0, 21.0), // 310 minutes: too long
            heating(400, 18.0, 21.0),
            heating(430, 21.0, 21.0), // valid
        ];
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "z").collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].start_time, at(400));
    }

    #[test]
    fn test_boundary_oscillation_fragments() {
        let measurements = vec![
            heating(0, 18.0, 21.0),
            heating(10, 20.9, 21.0), // closes (10 min)
            heating(12, 20.7, 21.0), // reopens
            heating(14, 20.9, 21.0), // closes (2 min, discarded)
            heating(20, 20.5, 21.0), // reopens
            heating(30, 20.85, 21.0), // closes (10 min)
        ];
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "z").collect();
        let starts: Vec<_> = cycles.iter().map(|c| c.start_time).collect();
        assert_eq!(starts, vec![at(0), at(20)]);
    }

    #[test]
    fn test_out_of_order_measurement_skipped() {
        let measurements = vec![
            heating(0, 18.0, 21.0),
            heating(20, 19.5, 21.0),
            heating(10, 21.0, 21.0), // out of order: ignored
            heating(40, 21.0, 21.0),
        ];
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "z").collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].end_time, at(40));
    }

    #[test]
    fn test_equal_timestamps_tolerated() {
        let measurements = vec![
            heating(0, 18.0, 21.0),
            heating(0, 18.0, 21.0),
            heating(30, 21.0, 21.0),
            heating(30, 21.0, 21.0),
        ];
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "z").collect();
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn test_unfinished_cycle_reported_open() {
        let detector = CycleDetector::default();
        let samples = vec![heating(0, 18.0, 21.0), heating(20, 19.0, 21.0)];
        let mut cycles = detector.detect(samples, "z");
        assert!(cycles.by_ref().next().is_none());
        let open = cycles.open_cycle().unwrap();
        assert_eq!(open.start_time, at(0));
        assert_eq!(cycles.last_timestamp(), Some(at(20)));

        let resumed: Vec<_> = detector
            .resume(vec![heating(40, 21.0, 21.0)], "z", Some(open))
            .collect();
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].start_time, at(0));
        assert_eq!(resumed[0].end_time, at(40));
    }

    #[test]
    fn test_split_long_cycle() {
        let config = DetectionConfig {
            cycle_split_duration_minutes: Some(30),
            ..Default::default()
        };
        let measurements = vec![heating(0, 16.0, 22.0), heating(100, 21.0, 22.0)];
        let cycles: Vec<_> = CycleDetector::new(config).detect(measurements, "z").collect();

        let bounds: Vec<_> = cycles.iter().map(|c| (c.start_time, c.end_time)).collect();
        assert_eq!(
            bounds,
            vec![(at(0), at(30)), (at(30), at(60)), (at(60), at(90)), (at(90), at(100))]
        );
        assert_eq!(cycles[0].start_temp, 16.0);
        assert!((cycles[1].start_temp - 17.5).abs() < 1e-9);
        assert_eq!(cycles[3].end_temp, 21.0);
        for c in &cycles {
            assert!((c.slope() - 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_split_merges_short_tail() {
        let cycle = HeatingCycle {
            zone_id: "z".to_string(),
            start_time: at(0),
            end_time: at(62),
            start_temp: 18.0,
            end_temp: 21.1,
            target_temp: 22.0,
        };
        let parts = split_cycle(&cycle, Duration::minutes(30), Duration::minutes(5));
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].start_time, at(30));
        assert_eq!(parts[1].end_time, at(62));
        assert_eq!(parts[1].end_temp, 21.1);
    }

    #[test]
    fn test_short_cycle_not_split() {
        let config = DetectionConfig {
            cycle_split_duration_minutes: Some(60),
            ..Default::default()
        };
        let measurements = vec![heating(0, 18.0, 21.0), heating(40, 21.0, 21.0)];
        let cycles: Vec<_> = CycleDetector::new(config).detect(measurements, "z").collect();
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn test_detection_is_lazy() {
        // An endless stream still yields cycles on demand.
        let measurements = (0i64..).map(|i| {
            if i % 2 == 0 {
                heating(i * 30, 18.0, 21.0)
            } else {
                heating(i * 30, 21.0, 21.0)
            }
        });
        let cycles: Vec<_> = CycleDetector::default().detect(measurements, "z").take(3).collect();
        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[2].start_time, at(120));
    }

    fn arb_measurements() -> impl Strategy<Value = Vec<Measurement>> {
        prop::collection::vec(
            (1i64..90, any::<bool>(), any::<bool>(), 15.0f64..23.0, 18.0f64..23.0),
            0..80,
        )
        .prop_map(|steps| {
            let mut minute = 0;
            steps
                .into_iter()
                .map(|(step, enabled, active, current, target)| {
                    minute += step;
                    Measurement::new(at(minute), enabled, active, current, target)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_emitted_cycles_respect_duration_bounds(
            measurements in arb_measurements(),
            split in prop::option::of(5u32..120),
        ) {
            let config = DetectionConfig {
                cycle_split_duration_minutes: split,
                ..Default::default()
            };
            let min = config.min_cycle_duration();
            let max = config.max_cycle_duration();
            for cycle in CycleDetector::new(config).detect(measurements, "z") {
                prop_assert!(cycle.end_time > cycle.start_time);
                prop_assert!(cycle.duration() >= min);
                prop_assert!(cycle.duration() <= max);
            }
        }
    }
}
