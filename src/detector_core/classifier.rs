//! Detection classifier: decides whether a snapshot qualifies as a pump
//! under a profile, and how.
//!
//! Two modes, selected by the profile:
//! - Threshold: 24h percent change and 24h volume against inclusive bounds
//! - Anomaly: the latest 1h candle against trailing volume/body averages
//!
//! A symbol already being tracked is suppressed outright, so a still-pumping
//! symbol never produces a duplicate event.

use super::profile::DetectionProfile;
use super::snapshot::{Snapshot, Timeframe};
use serde::{Deserialize, Serialize};

/// What triggered a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    /// 24h percent change and volume both over the profile thresholds.
    Threshold,
    /// Single-candle spike against the trailing baseline.
    Anomaly {
        volume_ratio: f64,
        body_ratio: f64,
    },
}

/// A qualifying detection, carrying the pump magnitude the tracker needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Percent move that qualified: the 24h change in threshold mode, the
    /// triggering candle's own move in anomaly mode.
    pub pump_percent: f64,
    pub trigger: Trigger,
}

/// Classification result for one (snapshot, profile) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectionOutcome {
    /// Thresholds not met.
    NoEvent,
    /// Qualifies and no event is currently open for the symbol.
    NewEvent(Detection),
    /// The symbol already has an open event under this profile.
    Suppressed,
}

/// Classify one snapshot against a profile.
///
/// `has_open_event` is the store's answer for (symbol, profile); when true
/// the outcome is `Suppressed` no matter what the thresholds say.
pub fn classify(
    snapshot: &Snapshot,
    profile: &DetectionProfile,
    has_open_event: bool,
) -> DetectionOutcome {
    if has_open_event {
        return DetectionOutcome::Suppressed;
    }

    match profile.anomaly.as_ref() {
        Some(thresholds) => classify_anomaly(snapshot, thresholds),
        None => classify_threshold(snapshot, profile),
    }
}

fn classify_threshold(snapshot: &Snapshot, profile: &DetectionProfile) -> DetectionOutcome {
    // Bounds are inclusive: a symbol exactly at threshold qualifies
    if snapshot.percent_change_24h >= profile.min_percent
        && snapshot.volume_24h >= profile.min_volume
    {
        DetectionOutcome::NewEvent(Detection {
            pump_percent: snapshot.percent_change_24h,
            trigger: Trigger::Threshold,
        })
    } else {
        DetectionOutcome::NoEvent
    }
}

fn classify_anomaly(
    snapshot: &Snapshot,
    thresholds: &super::profile::AnomalyThresholds,
) -> DetectionOutcome {
    let hourly = match snapshot.candles.get(Timeframe::OneHour) {
        Some(candles) => candles,
        None => return DetectionOutcome::NoEvent,
    };

    // Baseline excludes the candle under test so a spike cannot inflate
    // its own reference average.
    if hourly.len() < thresholds.lookback_candles + 1 {
        return DetectionOutcome::NoEvent;
    }
    let current = &hourly[hourly.len() - 1];
    let baseline = &hourly[hourly.len() - 1 - thresholds.lookback_candles..hourly.len() - 1];

    let avg_volume = baseline.iter().map(|c| c.volume).sum::<f64>() / baseline.len() as f64;
    let avg_body = baseline.iter().map(|c| c.body()).sum::<f64>() / baseline.len() as f64;

    // A dead baseline is non-qualifying, not a division error
    if avg_volume <= 0.0 || avg_body <= 0.0 {
        return DetectionOutcome::NoEvent;
    }

    let volume_ratio = current.volume / avg_volume;
    let body_ratio = current.body() / avg_body;
    let candle_percent = current.percent_change();

    if volume_ratio >= thresholds.volume_spike_multiplier
        && body_ratio >= thresholds.body_multiplier
        && candle_percent >= thresholds.min_pump_percent
    {
        DetectionOutcome::NewEvent(Detection {
            pump_percent: candle_percent,
            trigger: Trigger::Anomaly {
                volume_ratio,
                body_ratio,
            },
        })
    } else {
        DetectionOutcome::NoEvent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector_core::profile::AnomalyThresholds;
    use crate::detector_core::snapshot::{Candle, CandleSeries};

    fn threshold_profile() -> DetectionProfile {
        let mut profile = DetectionProfile::main_defaults();
        profile.min_percent = 7.0;
        profile.min_volume = 1_000_000.0;
        profile
    }

    fn anomaly_profile(lookback: usize) -> DetectionProfile {
        let mut profile = DetectionProfile::anomaly_defaults();
        profile.anomaly = Some(AnomalyThresholds {
            volume_spike_multiplier: 5.0,
            body_multiplier: 3.0,
            min_pump_percent: 5.0,
            lookback_candles: lookback,
        });
        profile
    }

    fn hourly_candle(open: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
            quote_volume: volume * close,
        }
    }

    /// Snapshot with `lookback` quiet baseline candles plus one hot candle.
    fn anomaly_snapshot(
        lookback: usize,
        baseline_volume: f64,
        baseline_body: f64,
        current: Candle,
    ) -> Snapshot {
        let mut candles: Vec<Candle> = (0..lookback)
            .map(|_| hourly_candle(100.0, 100.0 + baseline_body, baseline_volume))
            .collect();
        candles.push(current);

        let mut series = CandleSeries::new();
        series.insert(Timeframe::OneHour, candles);

        let mut snapshot = Snapshot::ticker("FOOUSDT", 100.0, 2_000_000.0, 1.0, 1_700_000_000);
        snapshot.candles = series;
        snapshot
    }

    #[test]
    fn test_threshold_exact_boundary_qualifies() {
        // Inclusive bound: exactly at min_percent and min_volume
        let snapshot = Snapshot::ticker("FOOUSDT", 10.0, 1_000_000.0, 7.0, 0);
        let outcome = classify(&snapshot, &threshold_profile(), false);

        match outcome {
            DetectionOutcome::NewEvent(detection) => {
                assert_eq!(detection.pump_percent, 7.0);
                assert_eq!(detection.trigger, Trigger::Threshold);
            }
            other => panic!("expected NewEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_threshold_epsilon_below_is_no_event() {
        let snapshot = Snapshot::ticker("FOOUSDT", 10.0, 1_000_000.0, 6.999_999, 0);
        assert_eq!(
            classify(&snapshot, &threshold_profile(), false),
            DetectionOutcome::NoEvent
        );
    }

    #[test]
    fn test_threshold_volume_gate() {
        // Percent qualifies but the volume floor does not
        let snapshot = Snapshot::ticker("FOOUSDT", 10.0, 999_999.0, 12.0, 0);
        assert_eq!(
            classify(&snapshot, &threshold_profile(), false),
            DetectionOutcome::NoEvent
        );
    }

    #[test]
    fn test_open_event_suppresses() {
        let snapshot = Snapshot::ticker("FOOUSDT", 10.0, 5_000_000.0, 15.0, 0);
        assert_eq!(
            classify(&snapshot, &threshold_profile(), true),
            DetectionOutcome::Suppressed
        );
    }

    #[test]
    fn test_anomaly_spike_qualifies() {
        // Baseline: volume 100, body 1. Current: volume 600 (6x), body 8 (8x), +8%
        let current = hourly_candle(100.0, 108.0, 600.0);
        let snapshot = anomaly_snapshot(24, 100.0, 1.0, current);

        match classify(&snapshot, &anomaly_profile(24), false) {
            DetectionOutcome::NewEvent(detection) => {
                assert!((detection.pump_percent - 8.0).abs() < 1e-9);
                match detection.trigger {
                    Trigger::Anomaly {
                        volume_ratio,
                        body_ratio,
                    } => {
                        assert!((volume_ratio - 6.0).abs() < 1e-9);
                        assert!((body_ratio - 8.0).abs() < 1e-9);
                    }
                    other => panic!("expected anomaly trigger, got {:?}", other),
                }
            }
            other => panic!("expected NewEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_anomaly_requires_all_three_conditions() {
        // Volume spikes but the candle body stays near baseline
        let current = hourly_candle(100.0, 101.5, 600.0);
        let snapshot = anomaly_snapshot(24, 100.0, 1.0, current);
        assert_eq!(
            classify(&snapshot, &anomaly_profile(24), false),
            DetectionOutcome::NoEvent
        );

        // Body spikes but volume stays near baseline
        let current = hourly_candle(100.0, 108.0, 120.0);
        let snapshot = anomaly_snapshot(24, 100.0, 1.0, current);
        assert_eq!(
            classify(&snapshot, &anomaly_profile(24), false),
            DetectionOutcome::NoEvent
        );

        // Volume and body spike but the candle moved less than min percent
        let current = hourly_candle(100.0, 104.0, 600.0);
        let snapshot = anomaly_snapshot(24, 100.0, 1.0, current);
        assert_eq!(
            classify(&snapshot, &anomaly_profile(24), false),
            DetectionOutcome::NoEvent
        );
    }

    #[test]
    fn test_anomaly_zero_baseline_volume_is_no_event() {
        // Dead market baseline: average volume 0 must not divide by zero
        let current = hourly_candle(100.0, 110.0, 500.0);
        let snapshot = anomaly_snapshot(24, 0.0, 1.0, current);
        assert_eq!(
            classify(&snapshot, &anomaly_profile(24), false),
            DetectionOutcome::NoEvent
        );
    }

    #[test]
    fn test_anomaly_zero_baseline_body_is_no_event() {
        let current = hourly_candle(100.0, 110.0, 500.0);
        let snapshot = anomaly_snapshot(24, 100.0, 0.0, current);
        assert_eq!(
            classify(&snapshot, &anomaly_profile(24), false),
            DetectionOutcome::NoEvent
        );
    }

    #[test]
    fn test_anomaly_insufficient_history() {
        // 24 candles total = 23 baseline + current, one short of lookback 24
        let current = hourly_candle(100.0, 110.0, 600.0);
        let snapshot = anomaly_snapshot(23, 100.0, 1.0, current);
        assert_eq!(
            classify(&snapshot, &anomaly_profile(24), false),
            DetectionOutcome::NoEvent
        );
    }

    #[test]
    fn test_anomaly_missing_hourly_series() {
        let snapshot = Snapshot::ticker("FOOUSDT", 100.0, 2_000_000.0, 9.0, 0);
        assert_eq!(
            classify(&snapshot, &anomaly_profile(24), false),
            DetectionOutcome::NoEvent
        );
    }

    #[test]
    fn test_anomaly_baseline_excludes_current_candle() {
        // If the spike candle leaked into its own baseline the average
        // volume would be (24*100 + 2300)/25 = 188 and the 2300 candle
        // would only be a 12.2x spike. With exclusion the ratio is exactly
        // 23x and the event must fire at multiplier 20.
        let mut profile = anomaly_profile(24);
        profile.anomaly.as_mut().unwrap().volume_spike_multiplier = 20.0;
        profile.anomaly.as_mut().unwrap().body_multiplier = 1.0;

        let current = hourly_candle(100.0, 110.0, 2_300.0);
        let snapshot = anomaly_snapshot(24, 100.0, 10.0, current);

        match classify(&snapshot, &profile, false) {
            DetectionOutcome::NewEvent(detection) => match detection.trigger {
                Trigger::Anomaly { volume_ratio, .. } => {
                    assert!((volume_ratio - 23.0).abs() < 1e-9);
                }
                other => panic!("expected anomaly trigger, got {:?}", other),
            },
            other => panic!("expected NewEvent, got {:?}", other),
        }
    }
}
