//! Integration tests for the tracking lifecycle over a real SQLite store.
//!
//! Tests drive scripted price sequences through the public monitoring API
//! against a file-backed store, the same way the scanner does each cycle.
//!
//! Key integration points tested:
//! - Detection rows surviving repeated monitor passes with milestones intact
//! - Startup recovery resuming live events and closing expired ones
//! - Restart mid-tracking producing the same closed state as an
//!   uninterrupted run over the same prices

#[cfg(test)]
mod tracking_integration_tests {
    use pumpwatch::tracking::{
        recover_open_events, run_monitor_pass, EventOutcome, SqliteTrackingStore, TrackedEvent,
        TrackingStore,
    };
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::NamedTempFile;

    fn schema_dir() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("sql")
    }

    fn prices(symbol: &str, price: f64) -> HashMap<String, f64> {
        HashMap::from([(symbol.to_string(), price)])
    }

    #[tokio::test]
    async fn test_milestones_persist_across_monitor_passes() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteTrackingStore::open(file.path(), &schema_dir()).unwrap();

        // 1. A +25% detection at 100: pre-pump reference 80, 5 min horizon
        let event = TrackedEvent::open("main", "ALPHAUSDT", 100.0, 5_000_000.0, 25.0, 1_000, 300);
        let id = store.insert_event(&event).await.unwrap();

        // 2. Give back half the move
        let pass = run_monitor_pass(&store, "main", &prices("ALPHAUSDT", 90.0), 1_060)
            .await
            .unwrap();
        assert_eq!(pass.milestone_hits, 2);
        assert!(pass.closed.is_empty());

        // 3. Deeper slide, then a rebound into the deadline
        run_monitor_pass(&store, "main", &prices("ALPHAUSDT", 84.0), 1_120)
            .await
            .unwrap();
        let final_pass = run_monitor_pass(&store, "main", &prices("ALPHAUSDT", 88.0), 1_300)
            .await
            .unwrap();
        assert_eq!(final_pass.closed.len(), 1);

        // 4. The stored row carries the whole history
        let stored = store.get_event(id).await.unwrap().unwrap();
        assert!(!stored.is_open());
        assert_eq!(stored.outcome, Some(EventOutcome::Success));
        assert_eq!(stored.lowest_price, 84.0);
        assert_eq!(stored.highest_price, 100.0);
        assert_eq!(stored.last_price, 88.0);
        assert_eq!(stored.time_to_25pct_secs, Some(60));
        assert_eq!(stored.time_to_50pct_secs, Some(60));
        assert_eq!(stored.time_to_75pct_secs, Some(120));
        assert_eq!(stored.time_to_full_reversal_secs, None);
        assert_eq!(stored.max_drop_from_high_pct, 16.0);
    }

    #[tokio::test]
    async fn test_recovery_resumes_live_and_closes_expired() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteTrackingStore::open(file.path(), &schema_dir()).unwrap();

        // 1. One event still inside its horizon at recovery time
        let live = TrackedEvent::open("main", "LIVEUSDT", 10.0, 800_000.0, 8.0, 9_000, 3_600);
        let live_id = store.insert_event(&live).await.unwrap();

        // 2. One whose deadline passed while the process was down, with a
        //    25% milestone already on disk
        let mut stale = TrackedEvent::open("main", "STALEUSDT", 50.0, 900_000.0, 10.0, 1_000, 60);
        stale.lowest_price = 48.5;
        stale.time_to_25pct_secs = Some(30);
        let stale_id = store.insert_event(&stale).await.unwrap();

        // 3. Recover as the scanner does at startup
        let report = recover_open_events(&store, "main", 10_000).await.unwrap();
        assert_eq!(report.resumed, 1);
        assert_eq!(report.closed, 1);

        // 4. The live event is untouched, the stale one closed from its
        //    stored state
        let live_row = store.get_event(live_id).await.unwrap().unwrap();
        assert!(live_row.is_open());
        assert_eq!(live_row.lowest_price, 10.0);

        let stale_row = store.get_event(stale_id).await.unwrap().unwrap();
        assert!(!stale_row.is_open());
        assert_eq!(stale_row.outcome, Some(EventOutcome::Partial));
        assert_eq!(stale_row.closed_at, Some(10_000));
        assert_eq!(stale_row.lowest_price, 48.5);
    }

    #[tokio::test]
    async fn test_restart_mid_tracking_matches_uninterrupted_run() {
        // The same detection and price sequence, run once without
        // interruption and once with a close-and-reopen in the middle,
        // must land on identical closed rows.
        let ticks: [(i64, f64); 4] = [(1_060, 96.0), (1_120, 90.0), (1_300, 84.0), (1_600, 88.0)];
        let restart_after = 1; // reopen between the second and third tick

        let file_a = NamedTempFile::new().unwrap();
        let store_a = SqliteTrackingStore::open(file_a.path(), &schema_dir()).unwrap();
        let file_b = NamedTempFile::new().unwrap();
        let mut store_b = SqliteTrackingStore::open(file_b.path(), &schema_dir()).unwrap();

        let event = TrackedEvent::open("main", "ALPHAUSDT", 100.0, 5_000_000.0, 25.0, 1_000, 600);
        let id_a = store_a.insert_event(&event).await.unwrap();
        let id_b = store_b.insert_event(&event).await.unwrap();

        for (i, (now, price)) in ticks.iter().enumerate() {
            run_monitor_pass(&store_a, "main", &prices("ALPHAUSDT", *price), *now)
                .await
                .unwrap();

            if i == restart_after + 1 {
                // Simulate a process restart for run B before this tick:
                // drop the handle, reopen the same file, recover
                store_b = SqliteTrackingStore::open(file_b.path(), &schema_dir()).unwrap();
                let report = recover_open_events(&store_b, "main", now - 10).await.unwrap();
                assert_eq!(report.resumed, 1);
                assert_eq!(report.closed, 0);
            }
            run_monitor_pass(&store_b, "main", &prices("ALPHAUSDT", *price), *now)
                .await
                .unwrap();
        }

        let final_a = store_a.get_event(id_a).await.unwrap().unwrap();
        let final_b = store_b.get_event(id_b).await.unwrap().unwrap();
        assert!(!final_a.is_open());
        assert_eq!(final_a.outcome, Some(EventOutcome::Success));
        assert_eq!(final_a, final_b);
    }
}
