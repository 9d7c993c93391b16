//! Per-profile scan loop.
//!
//! Each enabled profile runs on its own tokio task with its own interval.
//! Cycles never overlap within a profile: the next tick waits for the
//! current cycle to finish.

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::scan::ProfileScanner;

/// Drive one profile forever. Spawned once per enabled profile at startup.
pub async fn profile_scan_task(scanner: ProfileScanner) {
    let profile = scanner.profile();
    log::info!(
        "🔍 [{}] Scanning {} symbol(s) every {}s ({})",
        profile.name,
        profile.symbols.len(),
        profile.scan_interval_secs,
        if profile.is_anomaly() {
            "candle anomaly mode"
        } else {
            "24h threshold mode"
        }
    );

    scanner.validate_symbols().await;

    let mut ticker = interval(Duration::from_secs(scanner.profile().scan_interval_secs));
    // A slow cycle delays the next tick instead of firing a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        scanner.run_cycle().await;
    }
}
