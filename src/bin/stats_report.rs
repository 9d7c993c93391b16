//! Stats Report Binary
//!
//! One-shot dump of a profile's tracking statistics from the store,
//! printed to stdout. Useful for checking performance without waiting
//! for the scanner's next publication.
//!
//! Usage:
//!   cargo run --release --bin stats_report [profile]
//!
//! Defaults to the `main` profile. Reads the same PUMPWATCH_DB_PATH /
//! PUMPWATCH_SCHEMA_DIR variables as the scanner.

use dotenv::dotenv;
use pumpwatch::detector_core::DetectionProfile;
use pumpwatch::notify::format::format_stats;
use pumpwatch::tracking::{summarize, SqliteTrackingStore, TrackingStore};
use pumpwatch::ScannerConfig;
use std::env;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let profile_name = env::args().nth(1).unwrap_or_else(|| "main".to_string());
    let profile = DetectionProfile::from_env(&profile_name);

    let config = ScannerConfig::from_env();
    let store = SqliteTrackingStore::open(
        Path::new(&config.db_path),
        Path::new(&config.schema_dir),
    )?;

    let mut events = store.list_open_events(&profile.name).await?;
    events.extend(store.list_closed_events(&profile.name, None).await?);

    if events.is_empty() {
        println!("No tracked events for profile '{}' yet", profile.name);
        return Ok(());
    }

    let stats = summarize(&events, &profile);
    println!("{}", format_stats(&stats));
    Ok(())
}
