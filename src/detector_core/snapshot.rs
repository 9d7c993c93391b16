//! Market snapshot types shared by providers, classifier and monitor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Candle timeframes the scanner works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1w")]
    Weekly,
}

impl Timeframe {
    /// Interval string used by exchange kline endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::OneHour => "1h",
            Timeframe::Daily => "1d",
            Timeframe::Weekly => "1w",
        }
    }

    /// Candle duration in seconds.
    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::OneMinute => 60,
            Timeframe::OneHour => 3_600,
            Timeframe::Daily => 86_400,
            Timeframe::Weekly => 604_800,
        }
    }

    /// Parse from an interval string.
    pub fn from_str(s: &str) -> Option<Timeframe> {
        match s {
            "1m" => Some(Timeframe::OneMinute),
            "1h" => Some(Timeframe::OneHour),
            "1d" => Some(Timeframe::Daily),
            "1w" => Some(Timeframe::Weekly),
            _ => None,
        }
    }

    /// All timeframes, shortest first.
    pub fn all() -> [Timeframe; 4] {
        [
            Timeframe::OneMinute,
            Timeframe::OneHour,
            Timeframe::Daily,
            Timeframe::Weekly,
        ]
    }
}

/// One OHLCV bar. Series are ordered oldest to newest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Base-asset volume.
    pub volume: f64,
    /// Quote-asset volume.
    pub quote_volume: f64,
}

impl Candle {
    /// Absolute candle body size (|close - open|).
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Percent move of this single candle, close vs open.
    pub fn percent_change(&self) -> f64 {
        if self.open <= 0.0 {
            return 0.0;
        }
        (self.close - self.open) / self.open * 100.0
    }
}

/// Candle series keyed by timeframe. A missing timeframe means the
/// provider returned nothing for it this cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandleSeries {
    series: HashMap<Timeframe, Vec<Candle>>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series.insert(timeframe, candles);
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<&[Candle]> {
        self.series.get(&timeframe).map(|c| c.as_slice())
    }

    /// Closing prices for a timeframe, oldest to newest.
    pub fn closes(&self, timeframe: Timeframe) -> Option<Vec<f64>> {
        self.series
            .get(&timeframe)
            .map(|c| c.iter().map(|k| k.close).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Point-in-time observation of one futures symbol.
///
/// `percent_change_24h` is in percent units (7.0 = +7%). `funding_rate`
/// is the raw exchange fraction (0.005 = 0.5%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub last_price: f64,
    pub volume_24h: f64,
    pub percent_change_24h: f64,
    pub funding_rate: Option<f64>,
    pub candles: CandleSeries,
    pub observed_at: i64,
}

impl Snapshot {
    /// Ticker-only snapshot; candles get attached by the scan cycle when
    /// the profile needs them.
    pub fn ticker(
        symbol: impl Into<String>,
        last_price: f64,
        volume_24h: f64,
        percent_change_24h: f64,
        observed_at: i64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            last_price,
            volume_24h,
            percent_change_24h,
            funding_rate: None,
            candles: CandleSeries::new(),
            observed_at,
        }
    }
}
