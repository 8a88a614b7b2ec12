pub mod convert;
mod source;

pub use source::{FrameSource, OpenError, TestPatternSource};
#[cfg(feature = "v4l-capture")]
pub use source::V4lSource;

use anyhow::Result;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::CaptureConfig;
use crate::motion::{MotionAnalyzer, MotionConfig};
use crate::relay::FrameRelay;

/// Grace period after opening the sensor before frames leave the relay —
/// absorbs auto-exposure / auto-white-balance settling.
const STARTUP_GRACE: Duration = Duration::from_millis(2000);

/// Drives one camera's dedicated capture thread: opens the source, paces
/// itself to the configured FPS, converts pixels, runs the motion
/// analyzer, and publishes onto the relay. Falls back to a deterministic
/// test pattern if the real sensor fails to open.
pub struct CaptureProducer {
    relay: Arc<FrameRelay>,
    motion: Arc<parking_lot::Mutex<bool>>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureProducer {
    pub fn start(cfg: CaptureConfig, motion_cfg: MotionConfig) -> Result<Self> {
        let relay = FrameRelay::new();
        let motion_flag = Arc::new(parking_lot::Mutex::new(false));
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let thread_relay = relay.clone();
        let thread_motion = motion_flag.clone();
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name(format!("capture-{}", cfg.index))
            .spawn(move || run_capture_loop(cfg, motion_cfg, thread_relay, thread_motion, thread_shutdown))
            .expect("failed to spawn capture thread");

        Ok(CaptureProducer {
            relay,
            motion: motion_flag,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn relay(&self) -> Arc<FrameRelay> {
        self.relay.clone()
    }

    pub fn motion_detected(&self) -> bool {
        *self.motion.lock()
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_source(cfg: &CaptureConfig) -> Box<dyn FrameSource> {
    if cfg.test_pattern {
        info!(index = cfg.index, "using deterministic test pattern (CAMERA_TEST_PATTERN=true)");
        return Box::new(TestPatternSource::new(cfg.width, cfg.height));
    }

    #[cfg(feature = "v4l-capture")]
    {
        match V4lSource::open(cfg) {
            Ok(src) => return Box::new(src),
            Err(err) => {
                warn!(index = cfg.index, error = %err, "failed to open sensor, falling back to test pattern");
            }
        }
    }

    Box::new(TestPatternSource::new(cfg.width, cfg.height))
}

fn run_capture_loop(
    cfg: CaptureConfig,
    motion_cfg: MotionConfig,
    relay: Arc<FrameRelay>,
    motion_flag: Arc<parking_lot::Mutex<bool>>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
) {
    let mut source = open_source(&cfg);
    let mut analyzer = MotionAnalyzer::new(motion_cfg);
    let start = Instant::now();
    let frame_period = cfg
        .max_fps
        .filter(|fps| *fps > 0)
        .map(|fps| Duration::from_secs_f64(1.0 / fps as f64));
    let mut next_deadline = Instant::now();
    let mut consecutive_open_failures = 0u32;

    loop {
        if shutdown.load(std::sync::atomic::Ordering::SeqCst) {
            break;
        }

        match source.read_frame(&cfg) {
            Ok(frame) => {
                consecutive_open_failures = 0;
                if start.elapsed() >= STARTUP_GRACE {
                    let detected = analyzer.analyze(&frame);
                    *motion_flag.lock() = detected;
                    relay.publish(frame);
                }
            }
            Err(err) => {
                warn!(index = cfg.index, error = %err, "frame acquisition failed");
                consecutive_open_failures += 1;
                if consecutive_open_failures >= 2 && start.elapsed() < STARTUP_GRACE {
                    error!(index = cfg.index, "two consecutive open failures at startup, falling back to test pattern");
                    source = Box::new(TestPatternSource::new(cfg.width, cfg.height));
                }
            }
        }

        if let Some(period) = frame_period {
            next_deadline += period;
            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            } else {
                next_deadline = now;
            }
        }
    }
}
