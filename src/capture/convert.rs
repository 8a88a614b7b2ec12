use bytes::Bytes;

use crate::config::{CaptureConfig, ColorConvert};

/// Applies the §4.1 pixel conversion rules, producing packed BGR bytes.
/// Deterministic: given the same input and config, always the same output.
pub fn convert(raw: &[u8], cfg: &CaptureConfig) -> Bytes {
    let mode = resolve_mode(cfg, raw.len());
    match mode {
        ColorConvert::Yuv420 => yuv420_to_bgr(raw, cfg.width, cfg.height),
        ColorConvert::Rgba2Bgr => packed4_to_bgr(raw, false),
        ColorConvert::Bgra2Bgr => packed4_to_bgr(raw, true),
        ColorConvert::Rgb2Bgr => swap_rb(raw),
        ColorConvert::None => Bytes::copy_from_slice(raw),
        ColorConvert::Auto => Bytes::copy_from_slice(raw),
    }
}

fn resolve_mode(cfg: &CaptureConfig, len: usize) -> ColorConvert {
    if cfg.color_convert != ColorConvert::Auto {
        return cfg.color_convert.clone();
    }
    let pixels = (cfg.width as usize) * (cfg.height as usize);
    if len == pixels * 3 / 2 {
        ColorConvert::Yuv420
    } else if len == pixels * 4 {
        ColorConvert::Rgba2Bgr
    } else if len == pixels * 3 {
        if cfg.swap_rb {
            ColorConvert::Rgb2Bgr
        } else {
            ColorConvert::None
        }
    } else {
        ColorConvert::None
    }
}

fn swap_rb(raw: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(raw.len());
    for chunk in raw.chunks_exact(3) {
        out.push(chunk[2]);
        out.push(chunk[1]);
        out.push(chunk[0]);
    }
    Bytes::from(out)
}

fn packed4_to_bgr(raw: &[u8], already_bgra: bool) -> Bytes {
    let mut out = Vec::with_capacity(raw.len() / 4 * 3);
    for chunk in raw.chunks_exact(4) {
        if already_bgra {
            out.extend_from_slice(&chunk[0..3]);
        } else {
            out.push(chunk[2]);
            out.push(chunk[1]);
            out.push(chunk[0]);
        }
    }
    Bytes::from(out)
}

/// NV12 (2-plane 4:2:0) -> packed BGR, BT.601 full-range approximation.
fn yuv420_to_bgr(raw: &[u8], width: u32, height: u32) -> Bytes {
    let (w, h) = (width as usize, height as usize);
    let y_plane = &raw[0..w * h];
    let uv_plane = &raw[w * h..];
    let mut out = vec![0u8; w * h * 3];

    for row in 0..h {
        for col in 0..w {
            let y = y_plane[row * w + col] as i32;
            let uv_row = row / 2;
            let uv_col = (col / 2) * 2;
            let uv_index = uv_row * w + uv_col;
            let (u, v) = if uv_index + 1 < uv_plane.len() {
                (uv_plane[uv_index] as i32 - 128, uv_plane[uv_index + 1] as i32 - 128)
            } else {
                (0, 0)
            };

            let r = (y + (91881 * v >> 16)).clamp(0, 255) as u8;
            let g = (y - (22554 * u >> 16) - (46802 * v >> 16)).clamp(0, 255) as u8;
            let b = (y + (116130 * u >> 16)).clamp(0, 255) as u8;

            let idx = (row * w + col) * 3;
            out[idx] = b;
            out[idx + 1] = g;
            out[idx + 2] = r;
        }
    }

    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PixelFormat;

    fn cfg(color_convert: ColorConvert, swap_rb: bool) -> CaptureConfig {
        CaptureConfig {
            index: 0,
            width: 2,
            height: 2,
            max_fps: None,
            pixel_format: PixelFormat::Rgb24,
            swap_rb,
            buffer_count: 1,
            queue: 1,
            color_convert,
            test_pattern: false,
        }
    }

    #[test]
    fn swaps_red_and_blue_when_requested() {
        let raw = [10u8, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120];
        let out = convert(&raw, &cfg(ColorConvert::Rgb2Bgr, true));
        assert_eq!(&out[0..3], &[30, 20, 10]);
    }

    #[test]
    fn rgba_drops_alpha_and_swaps() {
        let raw = [10u8, 20, 30, 255, 40, 50, 60, 255, 70, 80, 90, 255, 100, 110, 120, 255];
        let out = convert(&raw, &cfg(ColorConvert::Rgba2Bgr, false));
        assert_eq!(out.len(), 12);
        assert_eq!(&out[0..3], &[30, 20, 10]);
    }

    #[test]
    fn passthrough_when_no_conversion_requested() {
        let raw = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let out = convert(&raw, &cfg(ColorConvert::None, false));
        assert_eq!(out.as_ref(), &raw);
    }
}
