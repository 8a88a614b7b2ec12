use bytes::Bytes;
use thiserror::Error;

use crate::config::{CaptureConfig, PixelFormat};
use crate::frame::Frame;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

/// The opaque sensor-driver boundary. Raw sensor drivers are out of scope;
/// this trait is the seam a real driver plugs into without the relay,
/// motion analyzer, or HTTP surface knowing the difference.
pub trait FrameSource: Send {
    fn read_frame(&mut self, cfg: &CaptureConfig) -> anyhow::Result<Frame>;
}

/// Always-available fallback: deterministic vertical color bars (SMPTE-style),
/// identical to the teacher's `videotestsrc pattern=0` fallback used "for
/// testing (no camera hardware required)".
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_counter: u64,
}

const BAR_COLORS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        TestPatternSource {
            width,
            height,
            frame_counter: 0,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn read_frame(&mut self, _cfg: &CaptureConfig) -> anyhow::Result<Frame> {
        let bar_width = (self.width as usize / BAR_COLORS.len()).max(1);
        let mut bytes = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for _y in 0..self.height {
            for x in 0..self.width as usize {
                let bar = (x / bar_width).min(BAR_COLORS.len() - 1);
                bytes.extend_from_slice(&BAR_COLORS[bar]);
            }
        }
        self.frame_counter += 1;
        Ok(Frame::new(
            self.width,
            self.height,
            PixelFormat::Rgb24,
            Bytes::from(bytes),
        ))
    }
}

#[cfg(feature = "v4l-capture")]
pub struct V4lSource {
    stream: v4l::io::mmap::Stream<'static>,
}

#[cfg(feature = "v4l-capture")]
impl V4lSource {
    pub fn open(cfg: &CaptureConfig) -> anyhow::Result<Self> {
        use v4l::video::Capture;

        let device = v4l::Device::new(cfg.index)
            .map_err(|e| OpenError::Unavailable(e.to_string()))?;
        let mut format = device.format()?;
        format.width = cfg.width;
        format.height = cfg.height;
        device.set_format(&format)?;

        // The device handle lives for the process lifetime (one per
        // configured camera), so leaking it to obtain a `'static` borrow
        // for the mmap stream is deliberate, not an oversight.
        let device: &'static v4l::Device = Box::leak(Box::new(device));
        let stream = v4l::io::mmap::Stream::with_buffers(
            device,
            v4l::buffer::Type::VideoCapture,
            cfg.buffer_count,
        )?;

        Ok(V4lSource { stream })
    }
}

#[cfg(feature = "v4l-capture")]
impl FrameSource for V4lSource {
    fn read_frame(&mut self, cfg: &CaptureConfig) -> anyhow::Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (raw, _meta) = self.stream.next()?;
        let converted = crate::capture::convert::convert(raw, cfg);
        Ok(Frame::new(cfg.width, cfg.height, PixelFormat::Rgb24, converted))
    }
}
