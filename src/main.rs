
pub mod config;
pub mod detector_core;
pub mod market;
pub mod notify;
pub mod scan;
pub mod tracking;

pub use config::ScannerConfig;

use {
    detector_core::DetectionProfile,
    dotenv::dotenv,
    log::{error, info, warn},
    market::{build_chain, MarketDataProvider},
    notify::build_notifiers,
    scan::{profile_scan_task, ProfileScanner},
    std::{path::Path, sync::Arc},
    tracking::{recover_open_events, SqliteTrackingStore, TrackingStore},
};

/// Current wall-clock time as epoch seconds.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::init();

    info!("🚀 Pump Scanner Runtime");
    info!("   ├─ Version: {}", env!("CARGO_PKG_VERSION"));
    info!("   └─ Mode: detect, track reversal, report");

    // Load configuration
    let config = ScannerConfig::from_env();
    let profiles = DetectionProfile::enabled_from_env();

    if profiles.is_empty() {
        warn!("⚠️  No profiles enabled (set MAIN_ENABLED=true to activate)");
        info!("   └─ Exiting gracefully...");
        return Ok(());
    }

    info!("✅ {} profile(s) enabled", profiles.len());
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Providers: {}", config.provider_priority.join(" → "));
    info!("   ├─ Reference symbol: {}", config.reference_symbol);
    info!(
        "   └─ Webhook: {}",
        if config.webhook_url.is_some() {
            "configured"
        } else {
            "log only"
        }
    );

    // Initialize store (migrations are idempotent)
    info!("🔧 Initializing store...");
    let store = Arc::new(SqliteTrackingStore::open(
        Path::new(&config.db_path),
        Path::new(&config.schema_dir),
    )?);
    info!("✅ Store initialized");

    // Recover open events before any scanning starts. A store that cannot
    // serve recovery must not serve a scan loop either.
    let now = current_timestamp();
    for profile in &profiles {
        let report = recover_open_events(store.as_ref(), &profile.name, now).await?;
        info!(
            "   ├─ [{}] recovery: {} resumed, {} closed",
            profile.name, report.resumed, report.closed
        );
    }
    info!("   └─ ✅ Recovery complete");

    // Shared HTTP client for providers and webhook
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    let chain = build_chain(&config.provider_priority, &client);
    if chain.is_empty() {
        error!("❌ No usable providers in PUMPWATCH_PROVIDERS");
        return Err("no usable providers configured".into());
    }
    let provider: Arc<dyn MarketDataProvider> = Arc::new(chain);

    let notifiers = build_notifiers(config.webhook_url.as_deref(), &client);

    // Spawn one scan task per profile
    info!("🚀 Spawning scan tasks...");
    let last = profiles.len() - 1;
    for (i, profile) in profiles.into_iter().enumerate() {
        let glyph = if i == last { "└─" } else { "├─" };
        info!(
            "   {} [{}] every {}s over {} symbol(s)",
            glyph,
            profile.name,
            profile.scan_interval_secs,
            profile.symbols.len()
        );
        let scanner = ProfileScanner::new(
            profile,
            Arc::clone(&provider),
            Arc::clone(&store) as Arc<dyn TrackingStore>,
            notifiers.clone(),
            config.reference_symbol.clone(),
            config.call_timeout,
        );
        tokio::spawn(profile_scan_task(scanner));
    }

    info!("✅ All scan tasks running");
    info!("");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    // Wait for CTRL+C
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    info!("✅ Pump scanner stopped");
    Ok(())
}
