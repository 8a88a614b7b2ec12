use async_trait::async_trait;
use std::path::Path;

use super::SinkError;

/// Remote-upload collaborator. The original program speaks SFTP; no SFTP
/// client exists anywhere in this crate's dependency lineage, and outbound
/// HTTP is the idiomatic substitute already used elsewhere in this
/// ecosystem for "ship a file to a remote service" — the trait boundary is
/// unchanged, so a real SFTP sink can be dropped in without touching the
/// Recording Coordinator.
#[async_trait]
pub trait UploadSink: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<(), SinkError>;
}

pub struct HttpUploadSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpUploadSink {
    pub fn new(endpoint: String) -> Self {
        HttpUploadSink {
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl UploadSink for HttpUploadSink {
    async fn upload(&self, path: &Path) -> Result<(), SinkError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Transport(format!(
                "upload endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

pub struct NullUploadSink;

#[async_trait]
impl UploadSink for NullUploadSink {
    async fn upload(&self, _path: &Path) -> Result<(), SinkError> {
        Err(SinkError::NotConfigured)
    }
}
