use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::capture::CaptureProducer;
use crate::config::Config;
use crate::motion::MotionConfig;
use crate::relay::{FrameRelay, FrameSubscription};

/// Owns the primary (right) capture, always running, and the secondary
/// (left) capture, reference-counted and only live while at least one
/// stereo session holds a reference.
pub struct CameraManager {
    primary: CaptureProducer,
    secondary_cfg: crate::config::CaptureConfig,
    secondary: Mutex<Option<CaptureProducer>>,
    stereo_refs: Mutex<u32>,
    motion_cfg: MotionConfig,
}

impl CameraManager {
    pub fn new(config: &Config) -> Result<Self> {
        let motion_cfg = MotionConfig {
            threshold: 25,
            sensitivity: 1.0,
            sensitivity_scale: 1000.0,
        };
        let primary = CaptureProducer::start(config.camera_right.clone(), motion_cfg)?;
        info!("camera manager started primary capture");
        Ok(CameraManager {
            primary,
            secondary_cfg: config.camera_left.clone(),
            secondary: Mutex::new(None),
            stereo_refs: Mutex::new(0),
            motion_cfg,
        })
    }

    pub fn primary_relay(&self) -> Arc<FrameRelay> {
        self.primary.relay()
    }

    pub fn motion_detected(&self) -> bool {
        self.primary.motion_detected()
    }

    /// Acquires a stereo reference, starting the secondary capture if this
    /// is the first holder. Returns an RAII guard whose `Drop` releases the
    /// reference at most once, regardless of how teardown is triggered.
    pub fn acquire_stereo(self: &Arc<Self>) -> Result<StereoGuard> {
        let mut refs = self.stereo_refs.lock();
        if *refs == 0 {
            let producer = CaptureProducer::start(self.secondary_cfg.clone(), self.motion_cfg)?;
            *self.secondary.lock() = Some(producer);
            debug!("secondary (stereo) capture started");
        }
        *refs += 1;
        Ok(StereoGuard {
            manager: self.clone(),
            released: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn secondary_relay(&self) -> Option<Arc<FrameRelay>> {
        self.secondary.lock().as_ref().map(|p| p.relay())
    }

    fn release_stereo(&self) {
        let mut refs = self.stereo_refs.lock();
        *refs = refs.saturating_sub(1);
        if *refs == 0 {
            debug!("stereo reference count reached zero, stopping secondary capture");
            *self.secondary.lock() = None;
        }
    }

    pub fn stereo_ref_count(&self) -> u32 {
        *self.stereo_refs.lock()
    }

    pub fn subscribe(&self, stereo: bool) -> (FrameSubscription, Option<FrameSubscription>) {
        let primary_sub = self.primary.relay().subscribe();
        let secondary_sub = if stereo {
            self.secondary_relay().map(|r| r.subscribe())
        } else {
            None
        };
        (primary_sub, secondary_sub)
    }
}

/// Releases a stereo reference exactly once, even under repeated or
/// spurious `drop`/`release` calls — mirrors the teacher's
/// `CleanupGuard`/`PipelineElement` Drop idiom, generalized from pipeline
/// teardown to reference-count release.
pub struct StereoGuard {
    manager: Arc<CameraManager>,
    released: std::sync::atomic::AtomicBool,
}

impl StereoGuard {
    pub fn release(&self) {
        if !self.released.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.manager.release_stereo();
        }
    }
}

impl Drop for StereoGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, ColorConvert, PixelFormat};

    fn test_config() -> Config {
        let capture = CaptureConfig {
            index: 0,
            width: 16,
            height: 16,
            max_fps: Some(1000),
            pixel_format: PixelFormat::Rgb24,
            swap_rb: false,
            buffer_count: 1,
            queue: 1,
            color_convert: ColorConvert::Auto,
            test_pattern: true,
        };
        Config {
            server: crate::config::ServerConfig {
                bind_addr: "127.0.0.1:0".into(),
                stream_backend: "python".into(),
            },
            camera_left: capture.clone(),
            camera_right: capture,
            webrtc: crate::config::WebRtcConfig {
                ice_servers: vec![],
                max_peers: 8,
            },
            token: crate::config::TokenConfig {
                secret: "test-secret".into(),
                expire_minutes: 60,
                admin_g_pass: "a".into(),
                admin_d_pass: "b".into(),
            },
            storage: crate::config::StorageConfig {
                user_db_path: ":memory:".into(),
                user_key_path: "/tmp/nonexistent.key".into(),
                recording_dir: "/tmp".into(),
                retention_days: 7,
                low_space_threshold_bytes: 0,
            },
            log: crate::config::LogConfig {
                dir: "/tmp".into(),
                max_bytes: 1024,
                backup_count: 1,
            },
            sinks: Default::default(),
        }
    }

    #[test]
    fn stereo_reference_release_exactly_once_under_spurious_releases() {
        let manager = Arc::new(CameraManager::new(&test_config()).unwrap());
        let guard_a = manager.acquire_stereo().unwrap();
        let guard_b = manager.acquire_stereo().unwrap();
        assert_eq!(manager.stereo_ref_count(), 2);

        guard_a.release();
        guard_a.release(); // spurious repeat, must not double-decrement
        assert_eq!(manager.stereo_ref_count(), 1);

        drop(guard_b);
        assert_eq!(manager.stereo_ref_count(), 0);
    }
}
