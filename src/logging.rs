use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::LogConfig;

/// A `std::io::Write` sink that rotates its backing file once it would
/// exceed `max_bytes`, keeping up to `backup_count` numbered backups
/// (`name.log.1` .. `name.log.N`, oldest discarded) — the same contract as
/// Python's `logging.handlers.RotatingFileHandler`, which nothing in the
/// async-logging ecosystem reproduces directly.
#[derive(Clone)]
pub struct RotatingFileWriter {
    inner: Arc<Mutex<RotatingInner>>,
}

struct RotatingInner {
    path: PathBuf,
    file: File,
    size: u64,
    max_bytes: u64,
    backup_count: u32,
}

impl RotatingFileWriter {
    pub fn new(path: impl AsRef<Path>, max_bytes: u64, backup_count: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(RotatingFileWriter {
            inner: Arc::new(Mutex::new(RotatingInner {
                path,
                file,
                size,
                max_bytes,
                backup_count,
            })),
        })
    }
}

impl RotatingInner {
    fn rotate(&mut self) -> io::Result<()> {
        if self.backup_count == 0 {
            self.file.set_len(0)?;
            self.size = 0;
            return Ok(());
        }
        let oldest = self.path.with_extension(format!("log.{}", self.backup_count));
        let _ = fs::remove_file(&oldest);
        for i in (1..self.backup_count).rev() {
            let from = self.path.with_extension(format!("log.{i}"));
            let to = self.path.with_extension(format!("log.{}", i + 1));
            if from.exists() {
                let _ = fs::rename(&from, &to);
            }
        }
        let first_backup = self.path.with_extension("log.1");
        let _ = fs::rename(&self.path, &first_backup);
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        if inner.size + buf.len() as u64 > inner.max_bytes && inner.size > 0 {
            inner.rotate()?;
        }
        let written = inner.file.write(buf)?;
        inner.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Access-log line, the `User: ... | Action: ... | IP: ... | Details: ...`
/// shape the original program writes to `access.log`.
pub fn log_access(user: &str, action: &str, remote_ip: Option<&str>, details: Option<&str>) {
    let ip = remote_ip.unwrap_or("-");
    let details = details.unwrap_or("");
    tracing::info!(target: "access", user, action, ip, details, "access");
}

/// Install three independent tracing layers (access / error / system), each
/// backed by its own `RotatingFileWriter`, plus a console sink on the system
/// stream filtered by `RUST_LOG`.
pub fn init(cfg: &LogConfig) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, Layer};

    let dir = Path::new(&cfg.dir);
    let access_writer = RotatingFileWriter::new(dir.join("access.log"), cfg.max_bytes, cfg.backup_count)?;
    let error_writer = RotatingFileWriter::new(dir.join("error.log"), cfg.max_bytes, cfg.backup_count)?;
    let system_writer = RotatingFileWriter::new(dir.join("system.log"), cfg.max_bytes, cfg.backup_count)?;

    let access_layer = fmt::layer()
        .with_writer(access_writer)
        .with_target(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() == "access"
        }));

    let error_layer = fmt::layer()
        .with_writer(error_writer)
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.level() <= &tracing::Level::ERROR
        }));

    let system_layer = fmt::layer()
        .with_writer(system_writer)
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() != "access"
        }));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::registry()
        .with(access_layer)
        .with(error_layer)
        .with(system_layer)
        .with(console_layer)
        .init();

    Ok(())
}
