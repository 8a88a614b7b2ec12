pub mod notify;
pub mod upload;

pub use notify::{NotifySink, WebhookNotifySink};
pub use upload::{HttpUploadSink, UploadSink};

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("sink not configured")]
    NotConfigured,
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Bounded retry owned by the caller (the Recording Coordinator), not the
/// sink itself — a `TransientError` per the error taxonomy is only
/// surfaced to the caller after these attempts are exhausted.
pub async fn with_retry<F, Fut, T>(mut attempt: F) -> Result<T, SinkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SinkError>>,
{
    let mut last_err = SinkError::NotConfigured;
    for attempt_number in 1..=RETRY_ATTEMPTS {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(attempt = attempt_number, error = %err, "sink attempt failed, retrying");
                last_err = err;
                if attempt_number < RETRY_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_err)
}
