//! Tracing setup for the `jubilee-update` binary.
//!
//! Output goes to stderr for interactive use and is appended to
//! `logs/update.log` in the data directory. The log file is rotated to
//! `update.log.1` once it would grow past its size ceiling, so at most two
//! generations are kept.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// A size-capped, append-only log file usable as a tracing writer.
#[derive(Debug, Clone)]
pub struct RotatingLog {
    inner: Arc<Mutex<LogFile>>,
}

#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    max_bytes: u64,
    file: Option<File>,
    written: u64,
}

impl RotatingLog {
    /// Opens (or creates) `path` for appending.
    ///
    /// # Errors
    ///
    /// Fails when the directory or file cannot be created.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let (file, written) = open_append(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(LogFile {
                path,
                max_bytes,
                file: Some(file),
                written,
            })),
        })
    }

    /// Path of the older generation.
    #[must_use]
    pub fn rotated_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    let written = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, written))
}

impl LogFile {
    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        std::fs::rename(&self.path, RotatingLog::rotated_path(&self.path))?;
        let (file, written) = open_append(&self.path).map_err(io::Error::other)?;
        self.file = Some(file);
        self.written = written;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let incoming = buf.len() as u64;
        if self.written > 0 && self.written + incoming > self.max_bytes {
            self.rotate()?;
        }
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                let (file, written) = open_append(&self.path).map_err(io::Error::other)?;
                self.written = written;
                self.file.insert(file)
            }
        };
        file.write_all(buf)?;
        self.written += incoming;
        Ok(buf.len())
    }
}

pub struct RotatingLogWriter {
    inner: Arc<Mutex<LogFile>>,
}

impl Write for RotatingLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut log = self.inner.lock().map_err(|_| io::Error::other("log file mutex poisoned"))?;
        log.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut log = self.inner.lock().map_err(|_| io::Error::other("log file mutex poisoned"))?;
        match log.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RotatingLog {
    type Writer = RotatingLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingLogWriter {
            inner: self.inner.clone(),
        }
    }
}

/// Logging options resolved from the command line.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Suppress the stderr layer.
    pub quiet: bool,
    pub file: Option<RotatingLog>,
}

fn filter(level: &str) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails when a global subscriber is already set.
pub fn init_logging(options: LogOptions) -> Result<()> {
    let stderr = (!options.quiet).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_filter(filter(&options.level))
    });

    // The file always keeps at least info, even when the terminal is quiet.
    let file_level = if options.level == "debug" || options.level == "trace" {
        options.level.as_str()
    } else {
        "info"
    };
    let file = options.file.map(|log| {
        tracing_subscriber::fmt::layer()
            .with_writer(log)
            .with_ansi(false)
            .with_filter(filter(file_level))
    });

    tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()
        .context("Failed to initialize logging")
}
