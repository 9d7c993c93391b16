//! JSON webhook notification backend.
//!
//! Every message goes out as a small envelope:
//! `{"kind": "detection|closure|stats", "text": "...", "data": {...}}`
//! where `text` is the rendered human-readable message and `data` the raw
//! payload. Any 2xx response counts as delivered.

use async_trait::async_trait;
use serde::Serialize;

use crate::notify::format::{format_closure, format_detection, format_stats};
use crate::notify::{DetectionEvent, Notifier, NotifyError};
use crate::tracking::{AggregateStats, TrackedEvent};

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    async fn post<T: Serialize>(
        &self,
        kind: &str,
        text: String,
        data: &T,
    ) -> Result<(), NotifyError> {
        let data = serde_json::to_value(data)?;
        let payload = serde_json::json!({
            "kind": kind,
            "text": text,
            "data": data,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send_detection(&self, event: &DetectionEvent) -> Result<(), NotifyError> {
        self.post("detection", format_detection(event), event).await
    }

    async fn send_closure(&self, event: &TrackedEvent) -> Result<(), NotifyError> {
        self.post("closure", format_closure(event), event).await
    }

    async fn publish_stats(&self, stats: &AggregateStats) -> Result<(), NotifyError> {
        self.post("stats", format_stats(stats), stats).await
    }
}
