//! Logging setup and configuration
//!
//! Diagnostics go through `tracing`. The formatted output is written into a
//! [`LogSink`], a process-wide destination that can be redirected to a file
//! at runtime. Standard output is never used so that it stays free for the
//! host protocol.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

enum Destination {
    Stderr,
    File { path: PathBuf, file: File },
}

/// Redirectable diagnostic destination
///
/// Cloning yields another handle to the same destination.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<Destination>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::stderr()
    }
}

impl LogSink {
    /// Sink writing to standard error
    pub fn stderr() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Destination::Stderr)),
        }
    }

    /// Redirect output to `path`, truncating it
    ///
    /// If the file cannot be opened the previous destination stays in place,
    /// the failure is logged there and returned to the caller.
    pub fn set_log_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let path = path.as_ref();

        match File::create(path) {
            Ok(file) => {
                *self.lock() = Destination::File {
                    path: path.to_path_buf(),
                    file,
                };
                tracing::debug!("Logging to {}", path.display());
                Ok(())
            }
            Err(source) => {
                tracing::error!(
                    "Failed to open log file {}, keeping previous destination: {}",
                    path.display(),
                    source
                );
                Err(crate::Error::LogFile {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Switch back to standard error
    pub fn use_stderr(&self) {
        *self.lock() = Destination::Stderr;
    }

    /// Path of the current log file, `None` when writing to standard error
    pub fn current_file(&self) -> Option<PathBuf> {
        match &*self.lock() {
            Destination::Stderr => None,
            Destination::File { path, .. } => Some(path.clone()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Destination> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Writer handed to the fmt layer for each event
pub struct LogWriter {
    inner: Arc<Mutex<Destination>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut dest = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *dest {
            Destination::Stderr => io::stderr().write(buf),
            Destination::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut dest = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *dest {
            Destination::Stderr => io::stderr().flush(),
            Destination::File { file, .. } => file.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Setup tracing subscriber for the application
///
/// Returns the sink so callers can redirect output later. A log file that
/// cannot be opened is reported and logging continues on standard error.
pub fn setup_logging(default_level: &str, log_file: Option<&Path>) -> crate::Result<LogSink> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    let sink = LogSink::stderr();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(sink.clone()))
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))?;

    if let Some(path) = log_file {
        // Failure already logged; stderr remains the destination
        let _ = sink.set_log_file(path);
    }

    Ok(sink)
}
