//! One scan-analyze-update cycle for a detection profile.
//!
//! Phases, in order:
//! 1. reference trends for the cycle (computed once, shared by all symbols)
//! 2. concurrent snapshot fetch across the profile's symbols (`JoinSet`),
//!    every call under its own timeout; a failed symbol is skipped this cycle
//! 3. sequential classify-and-persist pass; a fresh detection enriches its
//!    snapshot with candles and funding before the alert goes out
//! 4. reversal monitoring over the cycle's prices
//! 5. stats publication when the closed-event count moved

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::current_timestamp;
use crate::detector_core::indicators::{RSI_PERIOD, TREND_LONG_WINDOW};
use crate::detector_core::{
    build_context, classify, determine_trend, DetectionOutcome, DetectionProfile,
    ReferenceTrends, Snapshot, Timeframe, Trend,
};
use crate::market::{MarketDataProvider, ProviderError};
use crate::notify::{DetectionEvent, Notifier};
use crate::tracking::{run_monitor_pass, summarize, StoreError, TrackedEvent, TrackingStore};

/// Daily candles fetched for trend and high-proximity checks.
const DAILY_CANDLE_LIMIT: usize = 30;
/// Weekly candles fetched for the long trend.
const WEEKLY_CANDLE_LIMIT: usize = TREND_LONG_WINDOW;
/// Candles needed for one RSI value.
const RSI_CANDLE_LIMIT: usize = RSI_PERIOD + 1;

const INSERT_RETRY_LIMIT: usize = 3;
const INSERT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// What one cycle did, for logging and tests.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub symbols_scanned: usize,
    pub fetch_failures: usize,
    pub detections: usize,
    pub suppressed: usize,
    pub events_checked: usize,
    pub events_closed: usize,
    pub stats_published: bool,
}

/// Everything one profile's scan loop needs. Profiles share the provider,
/// the store and the notifiers but never any mutable state.
pub struct ProfileScanner {
    profile: DetectionProfile,
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn TrackingStore>,
    notifiers: Vec<Arc<dyn Notifier>>,
    reference_symbol: String,
    call_timeout: Duration,
}

impl ProfileScanner {
    pub fn new(
        profile: DetectionProfile,
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn TrackingStore>,
        notifiers: Vec<Arc<dyn Notifier>>,
        reference_symbol: String,
        call_timeout: Duration,
    ) -> Self {
        Self {
            profile,
            provider,
            store,
            notifiers,
            reference_symbol,
            call_timeout,
        }
    }

    pub fn profile(&self) -> &DetectionProfile {
        &self.profile
    }

    /// Warn once about configured symbols no venue lists.
    pub async fn validate_symbols(&self) {
        for symbol in &self.profile.symbols {
            match with_timeout(self.call_timeout, self.provider.has_symbol(symbol)).await {
                Ok(true) => {}
                Ok(false) => log::warn!(
                    "⚠️ [{}] {} is not listed on any configured venue",
                    self.profile.name,
                    symbol
                ),
                Err(err) => log::debug!(
                    "[{}] Could not verify {}: {}",
                    self.profile.name,
                    symbol,
                    err
                ),
            }
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let reference = self.reference_trends().await;

        // Phase 2: concurrent fetch. Anomaly profiles need the hourly series
        // before classification; threshold profiles classify on the ticker
        // alone and enrich later.
        let hourly_limit = self
            .profile
            .anomaly
            .as_ref()
            .map(|a| a.lookback_candles + 1);

        let mut tasks: JoinSet<(String, Result<Snapshot, ProviderError>)> = JoinSet::new();
        for symbol in self.profile.symbols.clone() {
            let provider = Arc::clone(&self.provider);
            let call_timeout = self.call_timeout;
            tasks.spawn(async move {
                let result =
                    fetch_symbol(provider.as_ref(), &symbol, hourly_limit, call_timeout).await;
                (symbol, result)
            });
        }

        let mut snapshots = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(snapshot))) => snapshots.push(snapshot),
                Ok((symbol, Err(err))) => {
                    report.fetch_failures += 1;
                    log::warn!(
                        "⚠️ [{}] Skipping {} this cycle: {}",
                        self.profile.name,
                        symbol,
                        err
                    );
                }
                Err(join_err) => {
                    report.fetch_failures += 1;
                    log::error!("❌ [{}] Fetch task failed: {}", self.profile.name, join_err);
                }
            }
        }
        report.symbols_scanned = snapshots.len();
        // Join order is arrival order; make the evaluation pass deterministic
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let prices: HashMap<String, f64> = snapshots
            .iter()
            .map(|s| (s.symbol.clone(), s.last_price))
            .collect();

        // Phase 3: sequential classify-and-persist
        for mut snapshot in snapshots {
            self.evaluate_snapshot(&mut snapshot, &reference, &mut report)
                .await;
        }

        // Phase 4: reversal monitoring over this cycle's prices
        let now = current_timestamp();
        match run_monitor_pass(self.store.as_ref(), &self.profile.name, &prices, now).await {
            Ok(summary) => {
                report.events_checked = summary.checked;
                report.events_closed = summary.closed.len();
                for event in &summary.closed {
                    self.notify_closure(event).await;
                }
            }
            Err(err) => {
                log::error!("❌ [{}] Monitor pass failed: {}", self.profile.name, err);
            }
        }

        // Phase 5: stats
        match self.publish_stats_if_changed(now).await {
            Ok(published) => report.stats_published = published,
            Err(err) => {
                log::error!(
                    "❌ [{}] Stats publication failed: {}",
                    self.profile.name,
                    err
                );
            }
        }

        log::info!(
            "🔄 [{}] Cycle done: {}/{} symbols, {} new, {} suppressed, {} open checked, {} closed",
            self.profile.name,
            report.symbols_scanned,
            self.profile.symbols.len(),
            report.detections,
            report.suppressed,
            report.events_checked,
            report.events_closed
        );
        report
    }

    async fn evaluate_snapshot(
        &self,
        snapshot: &mut Snapshot,
        reference: &ReferenceTrends,
        report: &mut CycleReport,
    ) {
        let has_open = match self
            .store
            .has_open_event(&self.profile.name, &snapshot.symbol)
            .await
        {
            Ok(open) => open,
            Err(err) => {
                log::error!(
                    "❌ [{}] Open-event lookup for {} failed: {}",
                    self.profile.name,
                    snapshot.symbol,
                    err
                );
                return;
            }
        };

        let detection = match classify(snapshot, &self.profile, has_open) {
            DetectionOutcome::NoEvent => return,
            DetectionOutcome::Suppressed => {
                report.suppressed += 1;
                log::debug!(
                    "[{}] {} already tracking, no new alert",
                    self.profile.name,
                    snapshot.symbol
                );
                return;
            }
            DetectionOutcome::NewEvent(detection) => detection,
        };

        let now = current_timestamp();
        self.enrich_snapshot(snapshot).await;
        let indicators = build_context(snapshot, reference);

        let mut event = TrackedEvent::open(
            &self.profile.name,
            &snapshot.symbol,
            snapshot.last_price,
            snapshot.volume_24h,
            detection.pump_percent,
            now,
            self.profile.horizon_secs(),
        );
        let Some(id) = insert_with_retry(self.store.as_ref(), &event).await else {
            return;
        };
        event.id = Some(id);
        report.detections += 1;

        let payload = DetectionEvent {
            profile: self.profile.name.clone(),
            symbol: snapshot.symbol.clone(),
            pump_percent: detection.pump_percent,
            trigger: detection.trigger,
            indicators,
            snapshot: snapshot.clone(),
            detected_at: now,
        };
        for notifier in &self.notifiers {
            if let Err(err) = notifier.send_detection(&payload).await {
                log::error!("❌ {} detection delivery failed: {}", notifier.name(), err);
            }
        }
    }

    /// Pull indicator inputs for a snapshot that already qualified. Every
    /// fetch degrades independently; a miss costs that indicator, never the
    /// detection.
    async fn enrich_snapshot(&self, snapshot: &mut Snapshot) {
        let wanted = [
            (Timeframe::OneMinute, RSI_CANDLE_LIMIT),
            (Timeframe::OneHour, RSI_CANDLE_LIMIT),
            (Timeframe::Daily, DAILY_CANDLE_LIMIT),
            (Timeframe::Weekly, WEEKLY_CANDLE_LIMIT),
        ];
        for (timeframe, limit) in wanted {
            let have = snapshot
                .candles
                .get(timeframe)
                .map(|c| c.len())
                .unwrap_or(0);
            if have >= limit {
                continue;
            }
            match with_timeout(
                self.call_timeout,
                self.provider.fetch_candles(&snapshot.symbol, timeframe, limit),
            )
            .await
            {
                Ok(candles) => snapshot.candles.insert(timeframe, candles),
                Err(err) => log::debug!(
                    "[{}] {} {} candles unavailable: {}",
                    self.profile.name,
                    snapshot.symbol,
                    timeframe.as_str(),
                    err
                ),
            }
        }

        if snapshot.funding_rate.is_none() {
            match with_timeout(
                self.call_timeout,
                self.provider.fetch_funding_rate(&snapshot.symbol),
            )
            .await
            {
                Ok(rate) => snapshot.funding_rate = rate,
                Err(err) => log::debug!(
                    "[{}] {} funding unavailable: {}",
                    self.profile.name,
                    snapshot.symbol,
                    err
                ),
            }
        }
    }

    /// Reference-symbol context, computed once per cycle.
    async fn reference_trends(&self) -> ReferenceTrends {
        ReferenceTrends {
            daily: self.reference_trend(Timeframe::Daily).await,
            weekly: self.reference_trend(Timeframe::Weekly).await,
        }
    }

    async fn reference_trend(&self, timeframe: Timeframe) -> Option<Trend> {
        match with_timeout(
            self.call_timeout,
            self.provider
                .fetch_candles(&self.reference_symbol, timeframe, TREND_LONG_WINDOW),
        )
        .await
        {
            Ok(candles) => {
                let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                determine_trend(&closes)
            }
            Err(err) => {
                log::debug!(
                    "Reference {} {} trend unavailable: {}",
                    self.reference_symbol,
                    timeframe.as_str(),
                    err
                );
                None
            }
        }
    }

    async fn notify_closure(&self, event: &TrackedEvent) {
        for notifier in &self.notifiers {
            if let Err(err) = notifier.send_closure(event).await {
                log::error!("❌ {} closure delivery failed: {}", notifier.name(), err);
            }
        }
    }

    /// Publish the aggregate summary when the closed-event count moved since
    /// the last publication. The stored marker makes republishing idempotent
    /// across cycles and restarts.
    async fn publish_stats_if_changed(&self, now: i64) -> Result<bool, StoreError> {
        let closed_count = self.store.count_closed_events(&self.profile.name).await?;
        if self.store.pinned_marker(&self.profile.name).await? == Some(closed_count) {
            return Ok(false);
        }

        let mut events = self.store.list_open_events(&self.profile.name).await?;
        events.extend(self.store.list_closed_events(&self.profile.name, None).await?);
        let stats = summarize(&events, &self.profile);

        for notifier in &self.notifiers {
            if let Err(err) = notifier.publish_stats(&stats).await {
                log::error!("❌ {} stats publish failed: {}", notifier.name(), err);
            }
        }

        self.store
            .set_pinned_marker(&self.profile.name, closed_count, now)
            .await?;
        Ok(true)
    }
}

async fn fetch_symbol(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    hourly_limit: Option<usize>,
    call_timeout: Duration,
) -> Result<Snapshot, ProviderError> {
    let mut snapshot = with_timeout(call_timeout, provider.fetch_snapshot(symbol)).await?;

    if let Some(limit) = hourly_limit {
        let candles = with_timeout(
            call_timeout,
            provider.fetch_candles(symbol, Timeframe::OneHour, limit),
        )
        .await?;
        snapshot.candles.insert(Timeframe::OneHour, candles);
    }
    Ok(snapshot)
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}

/// A dropped detection is logged loudly; the symbol stays eligible and will
/// re-qualify next cycle if the move holds.
async fn insert_with_retry(store: &dyn TrackingStore, event: &TrackedEvent) -> Option<i64> {
    for attempt in 1..=INSERT_RETRY_LIMIT {
        match store.insert_event(event).await {
            Ok(id) => return Some(id),
            Err(err) if attempt < INSERT_RETRY_LIMIT => {
                log::warn!(
                    "⚠️ Insert for {} failed (attempt {}/{}): {}",
                    event.symbol,
                    attempt,
                    INSERT_RETRY_LIMIT,
                    err
                );
                tokio::time::sleep(INSERT_RETRY_DELAY).await;
            }
            Err(err) => {
                log::error!(
                    "❌ Dropping detection for {} after {} attempts: {}",
                    event.symbol,
                    INSERT_RETRY_LIMIT,
                    err
                );
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector_core::Candle;
    use crate::notify::LogNotifier;
    use crate::tracking::{EventOutcome, SqliteTrackingStore};
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::NamedTempFile;

    struct ScriptedProvider {
        snapshots: HashMap<String, Snapshot>,
        hourly: HashMap<String, Vec<Candle>>,
    }

    impl ScriptedProvider {
        fn new() -> Self {
            Self {
                snapshots: HashMap::new(),
                hourly: HashMap::new(),
            }
        }

        fn with_ticker(mut self, symbol: &str, price: f64, volume: f64, change: f64) -> Self {
            self.snapshots
                .insert(symbol.to_string(), Snapshot::ticker(symbol, price, volume, change, 0));
            self
        }

        fn with_hourly(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
            self.hourly.insert(symbol.to_string(), candles);
            self
        }
    }

    #[async_trait]
    impl MarketDataProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, ProviderError> {
            self.snapshots
                .get(symbol)
                .cloned()
                .ok_or(ProviderError::UnknownSymbol {
                    provider: "scripted",
                    symbol: symbol.to_string(),
                })
        }

        async fn fetch_candles(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            limit: usize,
        ) -> Result<Vec<Candle>, ProviderError> {
            if timeframe == Timeframe::OneHour {
                if let Some(candles) = self.hourly.get(symbol) {
                    let take = candles.len().min(limit);
                    return Ok(candles[candles.len() - take..].to_vec());
                }
            }
            Err(ProviderError::UnknownSymbol {
                provider: "scripted",
                symbol: symbol.to_string(),
            })
        }

        async fn fetch_funding_rate(&self, _symbol: &str) -> Result<Option<f64>, ProviderError> {
            Ok(Some(0.0001))
        }
    }

    fn schema_dir() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("sql")
    }

    fn make_scanner(
        profile: DetectionProfile,
        provider: ScriptedProvider,
    ) -> (ProfileScanner, Arc<SqliteTrackingStore>, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = Arc::new(SqliteTrackingStore::open(file.path(), &schema_dir()).unwrap());
        let scanner = ProfileScanner::new(
            profile,
            Arc::new(provider),
            Arc::clone(&store) as Arc<dyn TrackingStore>,
            vec![Arc::new(LogNotifier)],
            "BTCUSDT".to_string(),
            Duration::from_secs(5),
        );
        (scanner, store, file)
    }

    fn threshold_profile(symbols: &[&str]) -> DetectionProfile {
        let mut profile = DetectionProfile::main_defaults();
        profile.symbols = symbols.iter().map(|s| s.to_string()).collect();
        profile
    }

    fn quiet_candle(open_time: i64) -> Candle {
        Candle {
            open_time,
            open: 100.0,
            high: 100.6,
            low: 99.9,
            close: 100.5,
            volume: 100.0,
            quote_volume: 10_000.0,
        }
    }

    #[tokio::test]
    async fn test_cycle_detects_and_opens_event() {
        let provider = ScriptedProvider::new()
            .with_ticker("FOOUSDT", 2.5, 2_500_000.0, 9.2)
            .with_ticker("BARUSDT", 1.0, 5_000_000.0, 3.0);
        let profile = threshold_profile(&["FOOUSDT", "BARUSDT", "GONEUSDT"]);
        let (scanner, store, _file) = make_scanner(profile, provider);

        let report = scanner.run_cycle().await;
        assert_eq!(report.symbols_scanned, 2);
        assert_eq!(report.fetch_failures, 1);
        assert_eq!(report.detections, 1);
        assert_eq!(report.suppressed, 0);
        // First publication: no marker yet
        assert!(report.stats_published);

        let open = store.list_open_events("main").await.unwrap();
        assert_eq!(open.len(), 1);
        let event = &open[0];
        assert_eq!(event.symbol, "FOOUSDT");
        assert_eq!(event.pump_percent, 9.2);
        assert_eq!(event.detection_price, 2.5);
        assert!(event.pre_pump_price.is_some());
    }

    #[tokio::test]
    async fn test_second_cycle_suppresses_open_symbol() {
        let provider = ScriptedProvider::new().with_ticker("FOOUSDT", 2.5, 2_500_000.0, 9.2);
        let profile = threshold_profile(&["FOOUSDT"]);
        let (scanner, store, _file) = make_scanner(profile, provider);

        let first = scanner.run_cycle().await;
        assert_eq!(first.detections, 1);

        let second = scanner.run_cycle().await;
        assert_eq!(second.detections, 0);
        assert_eq!(second.suppressed, 1);

        // Still exactly one event in the store
        assert_eq!(store.list_open_events("main").await.unwrap().len(), 1);
        assert_eq!(store.count_closed_events("main").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_anomaly_cycle_detects_spike() {
        // 24 quiet baseline candles plus one spike: +10% move, 23x volume,
        // 20x body against the baseline averages
        let mut candles: Vec<Candle> = (0..24).map(|i| quiet_candle(i * 3_600)).collect();
        candles.push(Candle {
            open_time: 24 * 3_600,
            open: 100.0,
            high: 110.5,
            low: 99.8,
            close: 110.0,
            volume: 2_300.0,
            quote_volume: 240_000.0,
        });

        let provider = ScriptedProvider::new()
            .with_ticker("SPIKEUSDT", 110.0, 800_000.0, 4.0)
            .with_hourly("SPIKEUSDT", candles);

        let mut profile = DetectionProfile::anomaly_defaults();
        profile.symbols = vec!["SPIKEUSDT".to_string()];
        let (scanner, store, _file) = make_scanner(profile, provider);

        let report = scanner.run_cycle().await;
        assert_eq!(report.detections, 1);

        let open = store.list_open_events("anomaly").await.unwrap();
        assert_eq!(open.len(), 1);
        // Pump percent is the triggering candle's own move
        assert!((open[0].pump_percent - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_horizon_event_closes_same_cycle() {
        let provider = ScriptedProvider::new().with_ticker("FOOUSDT", 2.5, 2_500_000.0, 9.2);
        let mut profile = threshold_profile(&["FOOUSDT"]);
        profile.monitoring_hours = 0;
        let (scanner, store, _file) = make_scanner(profile, provider);

        let report = scanner.run_cycle().await;
        assert_eq!(report.detections, 1);
        assert_eq!(report.events_closed, 1);
        assert!(report.stats_published);

        let closed = store.list_closed_events("main", None).await.unwrap();
        assert_eq!(closed.len(), 1);
        // Price never moved off the detection level
        assert_eq!(closed[0].outcome, Some(EventOutcome::Failed));

        // The slot is free again for the next qualifying move
        assert!(!store.has_open_event("main", "FOOUSDT").await.unwrap());
    }

    #[tokio::test]
    async fn test_stats_republish_only_on_closed_change() {
        let provider = ScriptedProvider::new().with_ticker("FOOUSDT", 2.5, 2_500_000.0, 9.2);
        let profile = threshold_profile(&["FOOUSDT"]);
        let (scanner, _store, _file) = make_scanner(profile, provider);

        let first = scanner.run_cycle().await;
        assert!(first.stats_published);

        // No closures since: marker matches, nothing republished
        let second = scanner.run_cycle().await;
        assert!(!second.stats_published);
    }

    #[tokio::test]
    async fn test_cycle_without_symbols_still_monitors() {
        let profile = threshold_profile(&[]);
        let (scanner, store, _file) = make_scanner(profile, ScriptedProvider::new());

        // An event left over from an earlier configuration, already expired
        let event = TrackedEvent::open("main", "OLDUSDT", 50.0, 1_000_000.0, 10.0, 1_000, 60);
        store.insert_event(&event).await.unwrap();

        let report = scanner.run_cycle().await;
        assert_eq!(report.symbols_scanned, 0);
        assert_eq!(report.events_checked, 1);
        assert_eq!(report.events_closed, 1);

        let closed = store.list_closed_events("main", None).await.unwrap();
        assert_eq!(closed[0].outcome, Some(EventOutcome::Failed));
    }
}
