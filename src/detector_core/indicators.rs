//! Pure indicator math: Wilder RSI, SMA trend, funding severity, ATH check.
//!
//! Every function degrades to `None` (indicator unavailable) when the input
//! series is shorter than its lookback window. Callers never get an error
//! from insufficient history.

use super::snapshot::{Candle, Snapshot, Timeframe};
use serde::{Deserialize, Serialize};

/// RSI smoothing period. Needs `RSI_PERIOD + 1` closes.
pub const RSI_PERIOD: usize = 14;
/// Short SMA window for trend classification.
pub const TREND_SHORT_WINDOW: usize = 10;
/// Long SMA window for trend classification; also the minimum close count.
pub const TREND_LONG_WINDOW: usize = 20;
/// Price within 1% of the historical high counts as "at ATH".
pub const ATH_PROXIMITY_FACTOR: f64 = 0.99;
/// Funding-rate fraction at which severity becomes Caution (0.5%).
pub const FUNDING_CAUTION_RATE: f64 = 0.005;
/// Funding-rate fraction at which severity becomes Alert (1.0%).
pub const FUNDING_ALERT_RATE: f64 = 0.01;

/// Trend direction from SMA spread and price position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Neutral,
    Down,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "UP",
            Trend::Neutral => "NEUTRAL",
            Trend::Down => "DOWN",
        }
    }
}

/// RSI severity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiTier {
    Oversold,
    Neutral,
    Elevated,
    Overbought,
}

impl RsiTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsiTier::Oversold => "OVERSOLD",
            RsiTier::Neutral => "NEUTRAL",
            RsiTier::Elevated => "ELEVATED",
            RsiTier::Overbought => "OVERBOUGHT",
        }
    }
}

/// Funding-rate severity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingSeverity {
    Normal,
    Caution,
    Alert,
}

impl FundingSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingSeverity::Normal => "NORMAL",
            FundingSeverity::Caution => "CAUTION",
            FundingSeverity::Alert => "ALERT",
        }
    }
}

/// Position of the current price relative to the retained high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AthStatus {
    pub at_high: bool,
    pub ath_price: f64,
    /// Percent below the high; 0 when at or above it.
    pub below_pct: f64,
}

/// Trend of the reference symbol (BTC), computed once per scan cycle and
/// shared across every symbol evaluated in that cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrends {
    pub daily: Option<Trend>,
    pub weekly: Option<Trend>,
}

/// Indicator values derived from one snapshot. Recomputed every cycle,
/// never cached across cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorContext {
    pub rsi_1m: Option<f64>,
    pub rsi_1m_tier: Option<RsiTier>,
    pub rsi_1h: Option<f64>,
    pub rsi_1h_tier: Option<RsiTier>,
    pub trend_daily: Option<Trend>,
    pub trend_weekly: Option<Trend>,
    pub reference_trend_daily: Option<Trend>,
    pub reference_trend_weekly: Option<Trend>,
    pub funding_rate: Option<f64>,
    pub funding_severity: Option<FundingSeverity>,
    pub ath: Option<AthStatus>,
}

/// Wilder-smoothed RSI over closing prices (oldest to newest).
///
/// Returns `None` with fewer than `period + 1` closes. A series with no
/// losses returns exactly 100.0. Result is rounded to 2 decimal places.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain: f64 = deltas[..period]
        .iter()
        .map(|d| if *d > 0.0 { *d } else { 0.0 })
        .sum::<f64>()
        / period as f64;
    let mut avg_loss: f64 = deltas[..period]
        .iter()
        .map(|d| if *d < 0.0 { -*d } else { 0.0 })
        .sum::<f64>()
        / period as f64;

    // Wilder smoothing over the remaining deltas
    for delta in &deltas[period..] {
        let gain = if *delta > 0.0 { *delta } else { 0.0 };
        let loss = if *delta < 0.0 { -*delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);
    Some(round2(rsi))
}

/// Classify RSI into its severity bucket.
pub fn rsi_tier(value: f64) -> RsiTier {
    if value > 80.0 {
        RsiTier::Overbought
    } else if value > 70.0 {
        RsiTier::Elevated
    } else if value >= 30.0 {
        RsiTier::Neutral
    } else {
        RsiTier::Oversold
    }
}

/// Trend from short/long SMA spread plus price position.
///
/// Up when the short SMA sits above the long SMA and price above the short
/// SMA; Down when mirrored; Neutral otherwise. Needs at least
/// `TREND_LONG_WINDOW` closes, else `None`.
pub fn determine_trend(closes: &[f64]) -> Option<Trend> {
    if closes.len() < TREND_LONG_WINDOW {
        return None;
    }

    let sma_short = mean(&closes[closes.len() - TREND_SHORT_WINDOW..]);
    let sma_long = mean(&closes[closes.len() - TREND_LONG_WINDOW..]);
    let price = closes[closes.len() - 1];

    if sma_short > sma_long && price > sma_short {
        Some(Trend::Up)
    } else if sma_short < sma_long && price < sma_short {
        Some(Trend::Down)
    } else {
        Some(Trend::Neutral)
    }
}

/// Bucket the absolute funding-rate fraction.
pub fn funding_severity(rate: f64) -> FundingSeverity {
    let magnitude = rate.abs();
    if magnitude >= FUNDING_ALERT_RATE {
        FundingSeverity::Alert
    } else if magnitude >= FUNDING_CAUTION_RATE {
        FundingSeverity::Caution
    } else {
        FundingSeverity::Normal
    }
}

/// Compare the current price against the highest high of the retained
/// daily history. `None` when there is no history to compare against.
pub fn check_ath(daily_candles: &[Candle], current_price: f64) -> Option<AthStatus> {
    if daily_candles.is_empty() {
        return None;
    }

    let ath_price = daily_candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    if ath_price <= 0.0 {
        return None;
    }

    let at_high = current_price >= ath_price * ATH_PROXIMITY_FACTOR;
    let below_pct = ((ath_price - current_price) / ath_price * 100.0).max(0.0);

    Some(AthStatus {
        at_high,
        ath_price,
        below_pct: round2(below_pct),
    })
}

/// Assemble the full indicator context for one snapshot.
///
/// Absent candle series degrade the corresponding fields to `None`; this
/// function never fails.
pub fn build_context(snapshot: &Snapshot, reference: &ReferenceTrends) -> IndicatorContext {
    let rsi_1m = snapshot
        .candles
        .closes(Timeframe::OneMinute)
        .and_then(|closes| calculate_rsi(&closes, RSI_PERIOD));
    let rsi_1h = snapshot
        .candles
        .closes(Timeframe::OneHour)
        .and_then(|closes| calculate_rsi(&closes, RSI_PERIOD));

    let trend_daily = snapshot
        .candles
        .closes(Timeframe::Daily)
        .and_then(|closes| determine_trend(&closes));
    let trend_weekly = snapshot
        .candles
        .closes(Timeframe::Weekly)
        .and_then(|closes| determine_trend(&closes));

    let ath = snapshot
        .candles
        .get(Timeframe::Daily)
        .and_then(|candles| check_ath(candles, snapshot.last_price));

    IndicatorContext {
        rsi_1m,
        rsi_1m_tier: rsi_1m.map(rsi_tier),
        rsi_1h,
        rsi_1h_tier: rsi_1h.map(rsi_tier),
        trend_daily,
        trend_weekly,
        reference_trend_daily: reference.daily,
        reference_trend_weekly: reference.weekly,
        funding_rate: snapshot.funding_rate,
        funding_severity: snapshot.funding_rate.map(funding_severity),
        ath,
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
