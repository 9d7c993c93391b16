//! # Notifications
//!
//! Delivery of detection alerts, tracking closures and aggregate stats to
//! the configured channels. Delivery is strictly fire-and-forget from the
//! engine's point of view: a failed send is logged and never rolls back or
//! re-triggers detection and tracking state.
//!
//! ## Module Organization
//!
//! - `format` - human-readable message rendering shared by all backends
//! - `webhook` - JSON POST backend
//! - `log_notifier` - log-only backend, always active

pub mod format;
pub mod log_notifier;
pub mod webhook;

pub use log_notifier::LogNotifier;
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::detector_core::{IndicatorContext, Snapshot, Trigger};
use crate::tracking::{AggregateStats, TrackedEvent};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything a channel needs to announce one fresh detection.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEvent {
    pub profile: String,
    pub symbol: String,
    pub pump_percent: f64,
    pub trigger: Trigger,
    pub indicators: IndicatorContext,
    pub snapshot: Snapshot,
    pub detected_at: i64,
}

/// One delivery channel. Implementations must not retry into the engine;
/// whatever happens here, detection and tracking state stand.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_detection(&self, event: &DetectionEvent) -> Result<(), NotifyError>;

    /// A tracked event finished monitoring.
    async fn send_closure(&self, event: &TrackedEvent) -> Result<(), NotifyError>;

    /// Periodic aggregate summary for pinned display.
    async fn publish_stats(&self, stats: &AggregateStats) -> Result<(), NotifyError>;
}

/// The log backend is always on; a webhook is added when a URL is
/// configured.
pub fn build_notifiers(
    webhook_url: Option<&str>,
    client: &reqwest::Client,
) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if let Some(url) = webhook_url {
        notifiers.push(Arc::new(WebhookNotifier::new(client.clone(), url.to_string())));
        log::info!("📣 Webhook notifications enabled");
    }
    notifiers
}
