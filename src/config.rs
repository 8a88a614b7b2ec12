use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Process-wide configuration, assembled from environment variables at
/// startup. A missing required secret is fatal; everything else has a
/// documented default.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub camera_left: CaptureConfig,
    pub camera_right: CaptureConfig,
    pub webrtc: WebRtcConfig,
    pub token: TokenConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
    pub sinks: SinkConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// "python" mirrors the original single-process layout; "external" is
    /// reserved for a future split-process capture backend.
    pub stream_backend: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub enum PixelFormat {
    Rgb24,
    Rgba32,
    Bgra32,
    Yuv420,
}

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub enum ColorConvert {
    Auto,
    None,
    Rgb2Bgr,
    Rgba2Bgr,
    Bgra2Bgr,
    Yuv420,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub max_fps: Option<u32>,
    pub pixel_format: PixelFormat,
    pub swap_rb: bool,
    pub buffer_count: u32,
    pub queue: usize,
    pub color_convert: ColorConvert,
    pub test_pattern: bool,
}

#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    pub ice_servers: Vec<String>,
    pub max_peers: usize,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub expire_minutes: i64,
    pub admin_g_pass: String,
    pub admin_d_pass: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub user_db_path: String,
    pub user_key_path: String,
    pub recording_dir: String,
    pub retention_days: u32,
    pub low_space_threshold_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: String,
    pub max_bytes: u64,
    pub backup_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SinkConfig {
    pub upload_endpoint: Option<String>,
    pub notify_webhook: Option<String>,
}

fn env_var(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_size(spec: &str) -> Result<(u32, u32)> {
    let (w, h) = spec
        .split_once('x')
        .or_else(|| spec.split_once('X'))
        .with_context(|| format!("CAMERA_SIZE must be WxH, got '{spec}'"))?;
    Ok((w.parse()?, h.parse()?))
}

fn parse_pixel_format(spec: &str) -> PixelFormat {
    match spec {
        "rgb24" => PixelFormat::Rgb24,
        "rgba32" => PixelFormat::Rgba32,
        "bgra32" => PixelFormat::Bgra32,
        _ => PixelFormat::Yuv420,
    }
}

fn parse_color_convert(spec: &str) -> ColorConvert {
    match spec {
        "none" => ColorConvert::None,
        "rgb2bgr" => ColorConvert::Rgb2Bgr,
        "rgba2bgr" => ColorConvert::Rgba2Bgr,
        "bgra2bgr" => ColorConvert::Bgra2Bgr,
        "yuv420" => ColorConvert::Yuv420,
        _ => ColorConvert::Auto,
    }
}

impl CaptureConfig {
    fn from_env(index: usize) -> Result<Self> {
        let size = env_var_or("CAMERA_SIZE", "640x480");
        let (width, height) = parse_size(&size)?;
        Ok(CaptureConfig {
            index,
            width,
            height,
            max_fps: env::var("CAMERA_MAX_FPS").ok().and_then(|v| v.parse().ok()),
            pixel_format: parse_pixel_format(&env_var_or("CAMERA_PIXEL_FORMAT", "yuv420")),
            swap_rb: env_parse_or("CAMERA_SWAP_RB", false),
            buffer_count: env_parse_or("CAMERA_BUFFER_COUNT", 4u32),
            queue: env_parse_or("CAMERA_QUEUE", 2usize),
            color_convert: parse_color_convert(&env_var_or("CAMERA_COLOR_CONVERT", "auto")),
            test_pattern: env_parse_or("CAMERA_TEST_PATTERN", false),
        })
    }
}

impl Config {
    /// Load from the environment. Secrets (`JWT_SECRET`, `JWT_EXPIRE_MINUTES`)
    /// are required; everything else falls back to a documented default.
    pub fn from_env() -> Result<Self> {
        let left_index: usize = env_parse_or("CAMERA_LEFT_INDEX", 0);
        let right_index: usize = env_parse_or("CAMERA_RIGHT_INDEX", 1);

        let mut camera_right = CaptureConfig::from_env(right_index)?;
        let mut camera_left = CaptureConfig::from_env(left_index)?;
        camera_right.index = right_index;
        camera_left.index = left_index;

        Ok(Config {
            server: ServerConfig {
                bind_addr: env_var_or("BIND_ADDR", "0.0.0.0:8080"),
                stream_backend: env_var_or("STREAM_BACKEND", "python"),
            },
            camera_right,
            camera_left,
            webrtc: WebRtcConfig {
                ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
                max_peers: env_parse_or("WEBRTC_MAX_PEERS", 8usize),
            },
            token: TokenConfig {
                secret: env_var("JWT_SECRET")?,
                expire_minutes: env_var("JWT_EXPIRE_MINUTES")?
                    .parse()
                    .context("JWT_EXPIRE_MINUTES must be an integer")?,
                admin_g_pass: env_var_or("ADMIN_G_PASS", "admin1234"),
                admin_d_pass: env_var_or("ADMIN_D_PASS", "123456789"),
            },
            storage: StorageConfig {
                user_db_path: env_var_or("USER_DB_PATH", "data/users.db"),
                user_key_path: env_var_or("USER_KEY_PATH", "data/users.key"),
                recording_dir: env_var_or("RECORDING_DIR", "data/recordings"),
                retention_days: env_parse_or("RECORDING_RETENTION_DAYS", 7u32),
                low_space_threshold_bytes: env_parse_or(
                    "STORAGE_LOW_THRESHOLD_BYTES",
                    100 * 1024 * 1024u64,
                ),
            },
            log: LogConfig {
                dir: env_var_or("LOG_DIR", "logs"),
                max_bytes: env_parse_or("LOG_MAX_BYTES", 50 * 1024 * 1024u64),
                backup_count: env_parse_or("LOG_BACKUP_COUNT", 5u32),
            },
            sinks: SinkConfig {
                upload_endpoint: env::var("UPLOAD_ENDPOINT").ok(),
                notify_webhook: env::var("NOTIFY_WEBHOOK").ok(),
            },
        })
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs((self.token.expire_minutes.max(0) as u64) * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camera_size() {
        assert_eq!(parse_size("640x480").unwrap(), (640, 480));
        assert_eq!(parse_size("1280X720").unwrap(), (1280, 720));
        assert!(parse_size("nope").is_err());
    }

    #[test]
    fn defaults_to_auto_color_convert() {
        assert_eq!(parse_color_convert("bogus"), ColorConvert::Auto);
        assert_eq!(parse_color_convert("yuv420"), ColorConvert::Yuv420);
    }
}
