//! Reversal monitoring for open pump events.
//!
//! Every scan cycle feeds the latest prices through [`run_monitor_pass`],
//! which updates extremes, records retrace milestones (set once, first
//! observation wins) and closes events whose monitoring window has ended.
//! [`recover_open_events`] replays the same close rule over rows left open
//! by a previous process.

use std::collections::HashMap;
use std::time::Duration;

use crate::tracking::event::{EventOutcome, EventState, TrackedEvent};
use crate::tracking::store::{StoreError, TrackingStore};

const WRITE_RETRY_LIMIT: usize = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Retrace depth checkpoints, in percent of the detection-to-pre-pump span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Quarter,
    Half,
    ThreeQuarters,
    Full,
}

impl Milestone {
    pub const ALL: [Milestone; 4] = [
        Milestone::Quarter,
        Milestone::Half,
        Milestone::ThreeQuarters,
        Milestone::Full,
    ];

    pub fn threshold(&self) -> f64 {
        match self {
            Milestone::Quarter => 25.0,
            Milestone::Half => 50.0,
            Milestone::ThreeQuarters => 75.0,
            Milestone::Full => 100.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::Quarter => "25%",
            Milestone::Half => "50%",
            Milestone::ThreeQuarters => "75%",
            Milestone::Full => "100%",
        }
    }
}

/// Fold one observed price into an open event. Returns the milestones this
/// observation reached for the first time; a single deep tick can claim
/// several at once.
pub fn apply_price(event: &mut TrackedEvent, price: f64, now: i64) -> Vec<Milestone> {
    if !event.is_open() || price <= 0.0 {
        return Vec::new();
    }

    event.last_price = price;
    event.last_checked_at = now;
    if price < event.lowest_price {
        event.lowest_price = price;
    }
    if price > event.highest_price {
        event.highest_price = price;
    }

    if event.highest_price > 0.0 {
        let drop_pct = (event.highest_price - price) / event.highest_price * 100.0;
        if drop_pct > event.max_drop_from_high_pct {
            event.max_drop_from_high_pct = drop_pct;
        }
    }

    let Some(retrace) = event.retrace_percent(price) else {
        return Vec::new();
    };

    let elapsed = now - event.detected_at;
    let mut hit = Vec::new();
    for milestone in Milestone::ALL {
        if retrace < milestone.threshold() {
            continue;
        }
        let slot = match milestone {
            Milestone::Quarter => &mut event.time_to_25pct_secs,
            Milestone::Half => &mut event.time_to_50pct_secs,
            Milestone::ThreeQuarters => &mut event.time_to_75pct_secs,
            Milestone::Full => &mut event.time_to_full_reversal_secs,
        };
        if slot.is_none() {
            *slot = Some(elapsed);
            hit.push(milestone);
        }
    }
    hit
}

/// Close an open event and assign its outcome from the deepest milestone
/// reached. Calling it on an already closed event changes nothing.
pub fn close(event: &mut TrackedEvent, now: i64) {
    if !event.is_open() {
        return;
    }
    event.state = EventState::Closed;
    event.closed_at = Some(now);
    event.outcome = Some(if event.time_to_50pct_secs.is_some() {
        EventOutcome::Success
    } else if event.time_to_25pct_secs.is_some() {
        EventOutcome::Partial
    } else {
        EventOutcome::Failed
    });
}

#[derive(Debug, Default)]
pub struct MonitorSummary {
    /// Open events examined this pass.
    pub checked: usize,
    /// Newly recorded milestones across all events.
    pub milestone_hits: usize,
    /// Events closed this pass, for downstream notification.
    pub closed: Vec<TrackedEvent>,
}

/// One monitoring sweep for a profile: fold the cycle's prices into every
/// open event, close the ones past deadline and persist the result.
pub async fn run_monitor_pass(
    store: &dyn TrackingStore,
    profile: &str,
    prices: &HashMap<String, f64>,
    now: i64,
) -> Result<MonitorSummary, StoreError> {
    let mut summary = MonitorSummary::default();

    for mut event in store.list_open_events(profile).await? {
        summary.checked += 1;

        match prices.get(&event.symbol) {
            Some(&price) => {
                let hit = apply_price(&mut event, price, now);
                for milestone in &hit {
                    log::info!(
                        "📉 [{}] {} retraced {} ({}s after detection, price {:.6})",
                        profile,
                        event.symbol,
                        milestone.as_str(),
                        now - event.detected_at,
                        price
                    );
                }
                summary.milestone_hits += hit.len();
            }
            None => {
                log::warn!(
                    "⚠️ [{}] No price for {} this cycle, event left as-is",
                    profile,
                    event.symbol
                );
            }
        }

        if now >= event.deadline {
            close(&mut event, now);
            let outcome = event.outcome.map(|o| o.as_str()).unwrap_or("unknown");
            log::info!(
                "🏁 [{}] {} monitoring ended: {} (low {:.6}, max drop {:.2}%)",
                profile,
                event.symbol,
                outcome,
                event.lowest_price,
                event.max_drop_from_high_pct
            );
            summary.closed.push(event.clone());
        }

        update_with_retry(store, &event).await;
    }

    Ok(summary)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub resumed: usize,
    pub closed: usize,
}

/// Bring persisted open events back in line with the clock after a restart.
/// Events whose deadline already passed are closed with the extremes and
/// milestones they had on disk; the rest resume monitoring untouched.
/// Errors here are fatal, the caller must not start scanning on a store it
/// cannot write to.
pub async fn recover_open_events(
    store: &dyn TrackingStore,
    profile: &str,
    now: i64,
) -> Result<RecoveryReport, StoreError> {
    let mut report = RecoveryReport::default();

    for mut event in store.list_open_events(profile).await? {
        if event.deadline <= now {
            close(&mut event, now);
            store.update_event(&event).await?;
            log::info!(
                "🧹 [{}] Closed stale event for {} (deadline passed while down, outcome {})",
                profile,
                event.symbol,
                event.outcome.map(|o| o.as_str()).unwrap_or("unknown")
            );
            report.closed += 1;
        } else {
            report.resumed += 1;
        }
    }

    if report.resumed > 0 {
        log::info!("▶️ [{}] Resumed {} open event(s)", profile, report.resumed);
    }

    Ok(report)
}

/// Persist with a short bounded retry. A monitor update that still fails is
/// logged and dropped, the next pass recomputes from the last stored state.
async fn update_with_retry(store: &dyn TrackingStore, event: &TrackedEvent) {
    for attempt in 1..=WRITE_RETRY_LIMIT {
        match store.update_event(event).await {
            Ok(()) => return,
            Err(e) if attempt < WRITE_RETRY_LIMIT => {
                log::warn!(
                    "⚠️ Update for {} failed (attempt {}/{}): {}",
                    event.symbol,
                    attempt,
                    WRITE_RETRY_LIMIT,
                    e
                );
                tokio::time::sleep(WRITE_RETRY_DELAY).await;
            }
            Err(e) => {
                log::error!(
                    "❌ Dropping update for {} after {} attempts: {}",
                    event.symbol,
                    WRITE_RETRY_LIMIT,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::store::SqliteTrackingStore;
    use std::path::Path;
    use tempfile::NamedTempFile;

    fn schema_dir() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("sql")
    }

    fn create_test_store() -> (SqliteTrackingStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteTrackingStore::open(file.path(), &schema_dir()).unwrap();
        (store, file)
    }

    /// Detection at 100 with a pinned pre-pump reference of 90, so retrace
    /// percentages come out as round numbers.
    fn tracked_event() -> TrackedEvent {
        let mut event = TrackedEvent::open("main", "FOOUSDT", 100.0, 2_000_000.0, 11.1, 1_000, 3_600);
        event.pre_pump_price = Some(90.0);
        event
    }

    #[test]
    fn test_drop_to_half_claims_quarter_and_half_together() {
        let mut event = tracked_event();

        let hit = apply_price(&mut event, 95.0, 1_060);
        assert_eq!(hit, vec![Milestone::Quarter, Milestone::Half]);
        assert_eq!(event.time_to_25pct_secs, Some(60));
        assert_eq!(event.time_to_50pct_secs, Some(60));
        assert_eq!(event.time_to_75pct_secs, None);
        assert_eq!(event.lowest_price, 95.0);
    }

    #[test]
    fn test_milestones_are_first_win() {
        let mut event = tracked_event();

        apply_price(&mut event, 95.0, 1_060);
        // Price bounces back; retrace shrinks but recorded times stay put
        let hit = apply_price(&mut event, 97.0, 1_120);
        assert!(hit.is_empty());
        assert_eq!(event.time_to_25pct_secs, Some(60));
        assert_eq!(event.time_to_50pct_secs, Some(60));
        // Lowest never rises
        assert_eq!(event.lowest_price, 95.0);
        assert_eq!(event.last_price, 97.0);
    }

    #[test]
    fn test_deeper_drop_extends_the_ladder() {
        let mut event = tracked_event();

        apply_price(&mut event, 95.0, 1_060);
        let hit = apply_price(&mut event, 92.0, 1_180);
        assert_eq!(hit, vec![Milestone::ThreeQuarters]);
        assert_eq!(event.time_to_75pct_secs, Some(180));

        let hit = apply_price(&mut event, 89.5, 1_240);
        assert_eq!(hit, vec![Milestone::Full]);
        assert_eq!(event.time_to_full_reversal_secs, Some(240));
    }

    #[test]
    fn test_highest_and_max_drop_track_the_squeeze() {
        let mut event = tracked_event();

        apply_price(&mut event, 104.0, 1_060);
        assert_eq!(event.highest_price, 104.0);
        assert_eq!(event.max_drop_from_high_pct, 0.0);

        apply_price(&mut event, 98.0, 1_120);
        let expected = (104.0 - 98.0) / 104.0 * 100.0;
        assert!((event.max_drop_from_high_pct - expected).abs() < 1e-9);

        // A partial rebound must not shrink the recorded drawdown
        apply_price(&mut event, 101.0, 1_180);
        assert!((event.max_drop_from_high_pct - expected).abs() < 1e-9);
        assert_eq!(event.highest_price, 104.0);
    }

    #[test]
    fn test_event_without_reference_still_tracks_extremes() {
        let mut event = TrackedEvent::open("main", "FOOUSDT", 100.0, 1.0, 0.0, 1_000, 3_600);
        assert_eq!(event.pre_pump_price, None);

        let hit = apply_price(&mut event, 60.0, 1_060);
        assert!(hit.is_empty());
        assert_eq!(event.lowest_price, 60.0);
        assert_eq!(event.time_to_25pct_secs, None);
    }

    #[test]
    fn test_garbage_tick_is_ignored() {
        let mut event = tracked_event();
        let hit = apply_price(&mut event, 0.0, 1_060);
        assert!(hit.is_empty());
        assert_eq!(event.lowest_price, 100.0);
        assert_eq!(event.last_price, 100.0);
    }

    #[test]
    fn test_close_outcomes_by_deepest_milestone() {
        let mut failed = tracked_event();
        close(&mut failed, 4_600);
        assert_eq!(failed.outcome, Some(EventOutcome::Failed));

        let mut partial = tracked_event();
        apply_price(&mut partial, 97.0, 1_060); // 30% retrace
        close(&mut partial, 4_600);
        assert_eq!(partial.outcome, Some(EventOutcome::Partial));

        let mut success = tracked_event();
        apply_price(&mut success, 94.0, 1_060); // 60% retrace
        close(&mut success, 4_600);
        assert_eq!(success.outcome, Some(EventOutcome::Success));
        assert_eq!(success.closed_at, Some(4_600));
    }

    #[test]
    fn test_close_is_idempotent_and_freezes_the_event() {
        let mut event = tracked_event();
        close(&mut event, 4_600);
        assert_eq!(event.closed_at, Some(4_600));

        close(&mut event, 9_999);
        assert_eq!(event.closed_at, Some(4_600));

        let hit = apply_price(&mut event, 50.0, 9_999);
        assert!(hit.is_empty());
        assert_eq!(event.lowest_price, 100.0);
    }

    #[tokio::test]
    async fn test_monitor_pass_updates_and_closes() {
        let (store, _file) = create_test_store();

        // One event still inside its window, one already past deadline
        let mut live = tracked_event();
        live.id = Some(store.insert_event(&live).await.unwrap());
        let mut stale = TrackedEvent::open("main", "BARUSDT", 50.0, 1_000_000.0, 25.0, 500, 600);
        stale.id = Some(store.insert_event(&stale).await.unwrap());

        let mut prices = HashMap::new();
        prices.insert("FOOUSDT".to_string(), 95.0);
        prices.insert("BARUSDT".to_string(), 41.0);

        let summary = run_monitor_pass(&store, "main", &prices, 2_000).await.unwrap();
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.closed.len(), 1);
        assert_eq!(summary.closed[0].symbol, "BARUSDT");

        let live_row = store.get_event(live.id.unwrap()).await.unwrap().unwrap();
        assert!(live_row.is_open());
        assert_eq!(live_row.last_price, 95.0);
        assert_eq!(live_row.time_to_50pct_secs, Some(1_000));

        // 41.0 against detection 50 / pre-pump 40 is a 90% retrace
        let stale_row = store.get_event(stale.id.unwrap()).await.unwrap().unwrap();
        assert!(!stale_row.is_open());
        assert_eq!(stale_row.outcome, Some(EventOutcome::Success));
        assert_eq!(stale_row.closed_at, Some(2_000));
    }

    #[tokio::test]
    async fn test_monitor_pass_without_price_leaves_event_untouched() {
        let (store, _file) = create_test_store();
        let mut event = tracked_event();
        event.id = Some(store.insert_event(&event).await.unwrap());

        let summary = run_monitor_pass(&store, "main", &HashMap::new(), 2_000).await.unwrap();
        assert_eq!(summary.checked, 1);
        assert!(summary.closed.is_empty());

        let row = store.get_event(event.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(row.last_price, 100.0);
        assert_eq!(row.last_checked_at, 1_000);
    }

    #[tokio::test]
    async fn test_recovery_splits_on_deadline() {
        let (store, _file) = create_test_store();

        // Expired while the process was down, with a milestone already stored
        let mut expired = tracked_event();
        expired.time_to_25pct_secs = Some(300);
        expired.id = Some(store.insert_event(&expired).await.unwrap());

        let mut ongoing = TrackedEvent::open("main", "BARUSDT", 50.0, 1_000_000.0, 10.0, 9_000, 3_600);
        ongoing.id = Some(store.insert_event(&ongoing).await.unwrap());

        let report = recover_open_events(&store, "main", 10_000).await.unwrap();
        assert_eq!(report, RecoveryReport { resumed: 1, closed: 1 });

        let expired_row = store.get_event(expired.id.unwrap()).await.unwrap().unwrap();
        assert!(!expired_row.is_open());
        assert_eq!(expired_row.outcome, Some(EventOutcome::Partial));
        assert_eq!(expired_row.closed_at, Some(10_000));

        let ongoing_row = store.get_event(ongoing.id.unwrap()).await.unwrap().unwrap();
        assert!(ongoing_row.is_open());
    }
}
