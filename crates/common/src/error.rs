//! Common error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The enumeration root (libusb context, system_profiler, ...) is unreachable
    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Mount resolution error: {0}")]
    Mount(String),

    #[error("Failed to unmount {}: {message}", path.display())]
    Unmount { path: PathBuf, message: String },

    #[error("Failed to open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
