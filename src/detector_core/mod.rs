//! # Detection Core
//!
//! Stateless building blocks of the pump scanner:
//! - Market snapshot and candle types shared by providers and the classifier
//! - Technical indicators (RSI, SMA trend, funding severity, ATH proximity)
//! - Detection profiles (threshold and anomaly configurations)
//! - The classifier that turns a snapshot into a detection outcome
//!
//! Everything here is pure: no I/O, no clocks, no storage. The `scan`
//! module owns orchestration and the `tracking` module owns state.
//!
//! ## Module Organization
//!
//! - `snapshot` - Snapshot, Candle, Timeframe, CandleSeries
//! - `indicators` - pure indicator math and IndicatorContext assembly
//! - `profile` - DetectionProfile configuration, env loading
//! - `classifier` - threshold/anomaly classification

pub mod classifier;
pub mod indicators;
pub mod profile;
pub mod snapshot;

// Re-export commonly used types
pub use classifier::{classify, Detection, DetectionOutcome, Trigger};
pub use indicators::{
    build_context, calculate_rsi, check_ath, determine_trend, funding_severity, rsi_tier,
    AthStatus, FundingSeverity, IndicatorContext, ReferenceTrends, RsiTier, Trend,
};
pub use profile::{AnomalyThresholds, DetectionProfile};
pub use snapshot::{Candle, CandleSeries, Snapshot, Timeframe};
