use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

use crate::config::PixelFormat;

/// An immutable captured frame. Cheap to clone (an `Arc` around the pixel
/// bytes); freed once the last subscriber drops its `Arc`.
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub captured_at: Instant,
    pub bytes: Arc<Bytes>,
}

impl Frame {
    pub fn bytes_per_pixel(format: &PixelFormat) -> f32 {
        match format {
            PixelFormat::Rgb24 => 3.0,
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => 4.0,
            PixelFormat::Yuv420 => 1.5,
        }
    }

    pub fn new(width: u32, height: u32, format: PixelFormat, bytes: Bytes) -> Self {
        debug_assert_eq!(
            bytes.len() as f32,
            width as f32 * height as f32 * Self::bytes_per_pixel(&format),
            "frame buffer size does not match width*height*bytes_per_pixel"
        );
        Frame {
            width,
            height,
            format,
            captured_at: Instant::now(),
            bytes: Arc::new(bytes),
        }
    }
}
