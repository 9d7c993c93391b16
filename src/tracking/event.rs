//! The tracked pump event: one row per detection, mutated only by the
//! reversal monitor while open, frozen once closed.

use serde::{Deserialize, Serialize};

/// Lifecycle state persisted with every record. Recovery decides open vs
/// closed from `deadline` against the clock, never from in-memory flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventState {
    Open,
    Closed,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Open => "open",
            EventState::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<EventState> {
        match s {
            "open" => Some(EventState::Open),
            "closed" => Some(EventState::Closed),
            _ => None,
        }
    }
}

/// Final outcome assigned when an event closes, by deepest retrace reached:
/// 50% or more is a success, 25% a partial, anything less a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOutcome {
    Success,
    Partial,
    Failed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Success => "success",
            EventOutcome::Partial => "partial",
            EventOutcome::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<EventOutcome> {
        match s {
            "success" => Some(EventOutcome::Success),
            "partial" => Some(EventOutcome::Partial),
            "failed" => Some(EventOutcome::Failed),
            _ => None,
        }
    }
}

/// One monitored pump. Keyed by (profile, symbol, detected_at); at most one
/// open event per (profile, symbol) exists at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    /// Row id once persisted.
    pub id: Option<i64>,
    pub profile: String,
    pub symbol: String,
    pub detected_at: i64,
    pub detection_price: f64,
    pub detection_volume: f64,
    /// Percent move that triggered detection.
    pub pump_percent: f64,
    /// Derived reference level the retrace is measured against:
    /// `detection_price / (1 + pump_percent/100)`. `None` disables retrace
    /// tracking for the event (extremes still update).
    pub pre_pump_price: Option<f64>,
    /// Monitoring ends here; the event closes on the first pass at or past it.
    pub deadline: i64,
    /// Monotonically non-increasing while open.
    pub lowest_price: f64,
    /// Monotonically non-decreasing while open.
    pub highest_price: f64,
    pub last_price: f64,
    pub last_checked_at: i64,
    pub max_drop_from_high_pct: f64,
    /// Elapsed seconds from detection to each retrace milestone. Set once,
    /// first observation wins.
    pub time_to_25pct_secs: Option<i64>,
    pub time_to_50pct_secs: Option<i64>,
    pub time_to_75pct_secs: Option<i64>,
    /// 100% retrace: price back at or below the pre-pump reference.
    pub time_to_full_reversal_secs: Option<i64>,
    pub state: EventState,
    pub outcome: Option<EventOutcome>,
    pub closed_at: Option<i64>,
}

impl TrackedEvent {
    /// Open a new event at detection time.
    pub fn open(
        profile: &str,
        symbol: &str,
        detection_price: f64,
        detection_volume: f64,
        pump_percent: f64,
        detected_at: i64,
        horizon_secs: i64,
    ) -> Self {
        let pre_pump_price = if pump_percent > 0.0 {
            Some(detection_price / (1.0 + pump_percent / 100.0))
        } else {
            None
        };

        Self {
            id: None,
            profile: profile.to_string(),
            symbol: symbol.to_string(),
            detected_at,
            detection_price,
            detection_volume,
            pump_percent,
            pre_pump_price,
            deadline: detected_at + horizon_secs,
            lowest_price: detection_price,
            highest_price: detection_price,
            last_price: detection_price,
            last_checked_at: detected_at,
            max_drop_from_high_pct: 0.0,
            time_to_25pct_secs: None,
            time_to_50pct_secs: None,
            time_to_75pct_secs: None,
            time_to_full_reversal_secs: None,
            state: EventState::Open,
            outcome: None,
            closed_at: None,
        }
    }

    /// Retrace progress at `price`, in percent of the detection-to-pre-pump
    /// span. 0 while above detection price, 100 at the pre-pump level,
    /// `None` when the event has no usable reference.
    pub fn retrace_percent(&self, price: f64) -> Option<f64> {
        let pre_pump = self.pre_pump_price?;
        let span = self.detection_price - pre_pump;
        if span <= 0.0 {
            return None;
        }
        Some(((self.detection_price - price) / span * 100.0).max(0.0))
    }

    pub fn is_open(&self) -> bool {
        self.state == EventState::Open
    }

    /// Success on the 50%-retrace criterion.
    pub fn hit_half_retrace(&self) -> bool {
        self.time_to_50pct_secs.is_some()
    }

    pub fn fully_reversed(&self) -> bool {
        self.time_to_full_reversal_secs.is_some()
    }
}
