use std::env;
use std::time::Duration;

/// Global runtime configuration loaded from environment variables.
/// Per-profile thresholds live on `DetectionProfile` and are loaded
/// separately with the profile-name prefix.
pub struct ScannerConfig {
    pub db_path: String,
    pub schema_dir: String,
    /// Venues queried in order until one answers.
    pub provider_priority: Vec<String>,
    /// Optional JSON webhook for detections, closures and stats.
    pub webhook_url: Option<String>,
    /// Symbol whose daily/weekly trend frames every alert.
    pub reference_symbol: String,
    pub http_timeout: Duration,
    /// Outer guard around every provider call.
    pub call_timeout: Duration,
}

impl ScannerConfig {
    /// Load configuration from environment variables
    ///
    /// Every variable has a default; a bare environment starts a scanner
    /// against Binance futures with a local SQLite file.
    ///
    /// - `PUMPWATCH_DB_PATH` (default: pumpwatch.db)
    /// - `PUMPWATCH_SCHEMA_DIR` (default: sql)
    /// - `PUMPWATCH_PROVIDERS` - comma-separated priority (default: binance,bybit)
    /// - `PUMPWATCH_WEBHOOK_URL` - optional
    /// - `PUMPWATCH_REFERENCE_SYMBOL` (default: BTCUSDT)
    /// - `PUMPWATCH_HTTP_TIMEOUT_SECS` (default: 10)
    /// - `PUMPWATCH_CALL_TIMEOUT_SECS` (default: 15)
    pub fn from_env() -> Self {
        let db_path =
            env::var("PUMPWATCH_DB_PATH").unwrap_or_else(|_| "pumpwatch.db".to_string());

        let schema_dir = env::var("PUMPWATCH_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string());

        let provider_priority = env::var("PUMPWATCH_PROVIDERS")
            .map(|s| {
                s.split(',')
                    .map(|name| name.trim().to_ascii_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| vec!["binance".to_string(), "bybit".to_string()]);

        let webhook_url = env::var("PUMPWATCH_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let reference_symbol = env::var("PUMPWATCH_REFERENCE_SYMBOL")
            .map(|s| s.trim().to_ascii_uppercase())
            .unwrap_or_else(|_| "BTCUSDT".to_string());

        let http_timeout_secs: u64 = env::var("PUMPWATCH_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let call_timeout_secs: u64 = env::var("PUMPWATCH_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        Self {
            db_path,
            schema_dir,
            provider_priority,
            webhook_url,
            reference_symbol,
            http_timeout: Duration::from_secs(http_timeout_secs),
            call_timeout: Duration::from_secs(call_timeout_secs),
        }
    }
}
