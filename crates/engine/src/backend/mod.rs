//! Platform backends
//!
//! One type per OS family implements [`Collector`] and [`Unmounter`];
//! [`PlatformBackend`] names the one for the current target.

pub mod macos;
pub mod mounts;
pub mod sysfs;

#[cfg(target_os = "linux")]
pub mod linux;

use common::{Collector, Error, Result, Unmounter};
use protocol::RawDevice;

#[cfg(target_os = "linux")]
pub use linux::LinuxBackend;
pub use macos::MacBackend;

/// Backend for the current target
#[cfg(target_os = "linux")]
pub type PlatformBackend = LinuxBackend;

/// Backend for the current target
#[cfg(target_os = "macos")]
pub type PlatformBackend = MacBackend;

/// Backend for the current target
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub type PlatformBackend = UnsupportedBackend;

/// Create the backend for the current target
pub fn default_backend() -> PlatformBackend {
    PlatformBackend::default()
}

/// Backend for targets without USB storage support
///
/// Every collection fails, so polls come back empty.
#[derive(Debug, Clone, Default)]
pub struct UnsupportedBackend;

impl Collector for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn collect(&self) -> Result<Vec<RawDevice>> {
        Err(Error::Unsupported(std::env::consts::OS.to_string()))
    }

    fn resolve_mount(&self, _handle: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

impl Unmounter for UnsupportedBackend {
    fn unmount(&self, _mount_point: &str) -> Result<()> {
        Err(Error::Unsupported(std::env::consts::OS.to_string()))
    }
}
