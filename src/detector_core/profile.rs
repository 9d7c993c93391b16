//! Detection profile configuration from environment variables
//!
//! Each profile is one independent detector instance: its own thresholds,
//! monitoring horizon, symbol universe, scan interval and store namespace.

use std::env;

/// Spike thresholds for anomaly-mode detection. A profile carrying these
/// classifies on single-candle spikes instead of the 24h thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyThresholds {
    /// Candle volume must be at least this multiple of the trailing average.
    pub volume_spike_multiplier: f64,
    /// Candle body must be at least this multiple of the trailing average.
    pub body_multiplier: f64,
    /// Minimum percent move of the triggering candle itself.
    pub min_pump_percent: f64,
    /// Trailing candles forming the baseline, excluding the candle under test.
    pub lookback_candles: usize,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            volume_spike_multiplier: 5.0,
            body_multiplier: 3.0,
            min_pump_percent: 5.0,
            lookback_candles: 24,
        }
    }
}

/// One detector instance's configuration.
///
/// The profile name doubles as the tracking-store namespace, so two
/// profiles never see each other's events.
#[derive(Debug, Clone)]
pub struct DetectionProfile {
    pub name: String,
    /// Symbol universe scanned each cycle.
    pub symbols: Vec<String>,
    /// Minimum 24h percent change (threshold mode). Inclusive bound.
    pub min_percent: f64,
    /// Minimum 24h quote volume (threshold mode). Inclusive bound.
    pub min_volume: f64,
    /// When set, the profile runs in anomaly mode.
    pub anomaly: Option<AnomalyThresholds>,
    /// How long a detected event stays open.
    pub monitoring_hours: i64,
    /// Closed events required before per-symbol history is shown.
    pub min_pumps_for_history: u32,
    pub scan_interval_secs: u64,
    pub enabled: bool,
}

impl DetectionProfile {
    /// Main profile: 24h threshold detector, strict volume gate.
    pub fn main_defaults() -> Self {
        Self {
            name: "main".to_string(),
            symbols: Vec::new(),
            min_percent: 7.0,
            min_volume: 1_000_000.0,
            anomaly: None,
            monitoring_hours: 12,
            min_pumps_for_history: 1,
            scan_interval_secs: 60,
            enabled: false,
        }
    }

    /// Watchlist profile: softer thresholds over a curated universe.
    pub fn watchlist_defaults() -> Self {
        Self {
            name: "watchlist".to_string(),
            symbols: Vec::new(),
            min_percent: 5.0,
            min_volume: 500_000.0,
            anomaly: None,
            monitoring_hours: 12,
            min_pumps_for_history: 3,
            scan_interval_secs: 60,
            enabled: false,
        }
    }

    /// Anomaly profile: single-candle volume/body spike detector.
    pub fn anomaly_defaults() -> Self {
        Self {
            name: "anomaly".to_string(),
            symbols: Vec::new(),
            min_percent: 0.0,
            min_volume: 0.0,
            anomaly: Some(AnomalyThresholds::default()),
            monitoring_hours: 48,
            min_pumps_for_history: 1,
            scan_interval_secs: 60,
            enabled: false,
        }
    }

    /// Load a profile from environment variables, starting from the named
    /// profile's defaults. The variable prefix is the uppercased name.
    ///
    /// Environment variables (for prefix `MAIN`):
    /// - `MAIN_ENABLED` (default: false)
    /// - `MAIN_SYMBOLS` - comma-separated universe
    /// - `MAIN_MIN_PERCENT`
    /// - `MAIN_MIN_VOLUME`
    /// - `MAIN_MONITORING_HOURS`
    /// - `MAIN_MIN_PUMPS_FOR_HISTORY`
    /// - `MAIN_SCAN_INTERVAL_SECS`
    ///
    /// Anomaly-mode profiles additionally read:
    /// - `ANOMALY_SPIKE_MULTIPLIER`
    /// - `ANOMALY_BODY_MULTIPLIER`
    /// - `ANOMALY_MIN_PUMP_PERCENT`
    /// - `ANOMALY_LOOKBACK_CANDLES`
    pub fn from_env(name: &str) -> Self {
        let mut profile = match name {
            "watchlist" => Self::watchlist_defaults(),
            "anomaly" => Self::anomaly_defaults(),
            _ => {
                let mut base = Self::main_defaults();
                base.name = name.to_string();
                base
            }
        };
        let prefix = name.to_ascii_uppercase();

        profile.enabled = env::var(format!("{}_ENABLED", prefix))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(profile.enabled);

        profile.symbols = env::var(format!("{}_SYMBOLS", prefix))
            .map(|raw| parse_symbol_list(&raw))
            .unwrap_or(profile.symbols);

        profile.min_percent = env::var(format!("{}_MIN_PERCENT", prefix))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(profile.min_percent);

        profile.min_volume = env::var(format!("{}_MIN_VOLUME", prefix))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(profile.min_volume);

        profile.monitoring_hours = env::var(format!("{}_MONITORING_HOURS", prefix))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(profile.monitoring_hours);

        profile.min_pumps_for_history = env::var(format!("{}_MIN_PUMPS_FOR_HISTORY", prefix))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(profile.min_pumps_for_history);

        profile.scan_interval_secs = env::var(format!("{}_SCAN_INTERVAL_SECS", prefix))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(profile.scan_interval_secs);

        if let Some(thresholds) = profile.anomaly.as_mut() {
            thresholds.volume_spike_multiplier = env::var(format!("{}_SPIKE_MULTIPLIER", prefix))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(thresholds.volume_spike_multiplier);

            thresholds.body_multiplier = env::var(format!("{}_BODY_MULTIPLIER", prefix))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(thresholds.body_multiplier);

            thresholds.min_pump_percent = env::var(format!("{}_MIN_PUMP_PERCENT", prefix))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(thresholds.min_pump_percent);

            thresholds.lookback_candles = env::var(format!("{}_LOOKBACK_CANDLES", prefix))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(thresholds.lookback_candles);
        }

        profile
    }

    /// The three built-in profiles, keeping only the enabled ones.
    pub fn enabled_from_env() -> Vec<DetectionProfile> {
        ["main", "watchlist", "anomaly"]
            .iter()
            .map(|name| Self::from_env(name))
            .filter(|p| p.enabled)
            .collect()
    }

    pub fn is_anomaly(&self) -> bool {
        self.anomaly.is_some()
    }

    pub fn horizon_secs(&self) -> i64 {
        self.monitoring_hours * 3_600
    }
}

fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
