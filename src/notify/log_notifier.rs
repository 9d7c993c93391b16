//! Log-only notification backend, always active. Keeps every alert visible
//! in the scanner output even when no webhook is configured.

use async_trait::async_trait;

use crate::notify::format::{format_closure, format_detection, format_stats};
use crate::notify::{DetectionEvent, Notifier, NotifyError};
use crate::tracking::{AggregateStats, TrackedEvent};

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send_detection(&self, event: &DetectionEvent) -> Result<(), NotifyError> {
        log::info!("{}", format_detection(event));
        Ok(())
    }

    async fn send_closure(&self, event: &TrackedEvent) -> Result<(), NotifyError> {
        log::info!("{}", format_closure(event));
        Ok(())
    }

    async fn publish_stats(&self, stats: &AggregateStats) -> Result<(), NotifyError> {
        log::info!("{}", format_stats(stats));
        Ok(())
    }
}
