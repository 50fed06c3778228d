//! Platform capability traits
//!
//! Each supported OS provides one backend type implementing both traits.
//! The registry engine depends only on these traits, never on OS types.

use protocol::RawDevice;

/// Source of raw device observations and mount paths
pub trait Collector: Send {
    /// Short backend name used in diagnostics
    fn name(&self) -> &'static str;

    /// Enumerate attached USB mass-storage devices
    ///
    /// Zero devices is an empty vector. A device whose identity attributes
    /// cannot be read is left out rather than failing the whole call; an
    /// error means the enumeration root itself was unreachable.
    fn collect(&self) -> crate::Result<Vec<RawDevice>>;

    /// Resolve the current mount path for a device's mount handle
    ///
    /// `Ok(None)` means the device has no mounted volume. Errors are
    /// transient OS failures; the caller logs them and treats the device as
    /// unmounted.
    fn resolve_mount(&self, handle: &str) -> crate::Result<Option<String>>;
}

/// OS unmount facility
pub trait Unmounter: Send {
    /// Unmount the volume at `mount_point`, reporting the OS result
    fn unmount(&self, mount_point: &str) -> crate::Result<()>;
}

/// A complete platform backend
pub trait Platform: Collector + Unmounter {}

impl<T: Collector + Unmounter> Platform for T {}
