use crate::frame::Frame;

/// Frame-difference motion heuristic. Runs at most once per captured frame
/// and must never block the producer; the `analyze` call itself is cheap
/// (grayscale + threshold + count) and is meant to be invoked from the
/// producer's own loop, not spawned separately.
pub struct MotionAnalyzer {
    previous_gray: Option<Vec<u8>>,
    threshold: u8,
    sensitivity: f32,
    sensitivity_scale: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MotionConfig {
    pub threshold: u8,
    pub sensitivity: f32,
    /// Multiplier applied to `sensitivity` to get the changed-pixel count
    /// that flips `motion_detected`. The original program hard-codes this
    /// at 1000; kept configurable here.
    pub sensitivity_scale: f32,
}

impl Default for MotionAnalyzer {
    fn default() -> Self {
        MotionAnalyzer::new(MotionConfig {
            threshold: 25,
            sensitivity: 1.0,
            sensitivity_scale: 1000.0,
        })
    }
}

impl MotionAnalyzer {
    pub fn new(cfg: MotionConfig) -> Self {
        MotionAnalyzer {
            previous_gray: None,
            threshold: cfg.threshold,
            sensitivity: cfg.sensitivity,
            sensitivity_scale: cfg.sensitivity_scale,
        }
    }

    /// Returns whether motion was detected in this frame relative to the
    /// previous one. The first call always returns `false` and only seeds
    /// the reference frame.
    pub fn analyze(&mut self, frame: &Frame) -> bool {
        let gray = to_grayscale(frame);
        let gray = blur(&gray, frame.width as usize, frame.height as usize);

        let Some(prev) = self.previous_gray.replace(gray.clone()) else {
            return false;
        };

        if prev.len() != gray.len() {
            return false;
        }

        let changed = prev
            .iter()
            .zip(gray.iter())
            .filter(|(a, b)| (**a as i16 - **b as i16).unsigned_abs() as u8 > self.threshold)
            .count();

        changed as f32 > self.sensitivity * self.sensitivity_scale
    }
}

fn to_grayscale(frame: &Frame) -> Vec<u8> {
    let bpp = Frame::bytes_per_pixel(&frame.format).round() as usize;
    let pixels = (frame.width as usize) * (frame.height as usize);
    let mut out = Vec::with_capacity(pixels);
    for i in 0..pixels {
        let base = i * bpp;
        if base + 3 <= frame.bytes.len() {
            let r = frame.bytes[base] as u32;
            let g = frame.bytes[base + 1] as u32;
            let b = frame.bytes[base + 2] as u32;
            out.push(((r * 299 + g * 587 + b * 114) / 1000) as u8);
        } else if base < frame.bytes.len() {
            out.push(frame.bytes[base]);
        } else {
            out.push(0);
        }
    }
    out
}

/// A small box blur approximating a 21px Gaussian kernel, cheap enough to
/// run once per frame on the producer thread.
fn blur(gray: &[u8], width: usize, height: usize) -> Vec<u8> {
    const RADIUS: isize = 3;
    let mut out = vec![0u8; gray.len()];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dy in -RADIUS..=RADIUS {
                for dx in -RADIUS..=RADIUS {
                    let (sx, sy) = (x + dx, y + dy);
                    if sx >= 0 && sy >= 0 && (sx as usize) < width && (sy as usize) < height {
                        sum += gray[sy as usize * width + sx as usize] as u32;
                        count += 1;
                    }
                }
            }
            out[y as usize * width + x as usize] = (sum / count.max(1)) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PixelFormat;
    use bytes::Bytes;

    fn solid_frame(value: u8) -> Frame {
        Frame::new(8, 8, PixelFormat::Rgb24, Bytes::from(vec![value; 8 * 8 * 3]))
    }

    #[test]
    fn first_frame_never_reports_motion() {
        let mut analyzer = MotionAnalyzer::default();
        assert!(!analyzer.analyze(&solid_frame(10)));
    }

    #[test]
    fn identical_frames_report_no_motion() {
        let mut analyzer = MotionAnalyzer::default();
        analyzer.analyze(&solid_frame(10));
        assert!(!analyzer.analyze(&solid_frame(10)));
    }

    #[test]
    fn large_change_reports_motion() {
        let mut analyzer = MotionAnalyzer::new(MotionConfig {
            threshold: 5,
            sensitivity: 0.01,
            sensitivity_scale: 1.0,
        });
        analyzer.analyze(&solid_frame(0));
        assert!(analyzer.analyze(&solid_frame(255)));
    }
}
