//! Device type definitions
//!
//! This module defines the device-related types shared between the engine,
//! its platform backends and the host binding: stable identifiers, the raw
//! observations produced by a collector, the snapshots handed to callers and
//! the outcome of an unmount request.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Stable device identifier (engine-assigned)
///
/// Minted once per physical device the first time it is reconciled and never
/// changed for the lifetime of the registry record. The textual form is
/// `{vendorId}-{productId}[-{serialNumber}]-{counter}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the unassigned (empty) identifier
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        DeviceId(value)
    }
}

/// One raw device observation from a platform collector
///
/// Collectors produce these fresh on every enumeration and never keep them;
/// the registry folds them into owned records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDevice {
    /// Position in the USB topology (transient, OS-assigned)
    pub location_id: u32,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Serial number string (if available)
    pub serial_number: Option<String>,
    /// Product string (if available)
    pub product: Option<String>,
    /// Vendor (manufacturer) string (if available)
    pub vendor: Option<String>,
    /// Backend-specific handle used to resolve the mount point
    ///
    /// A sysfs directory on Linux, a BSD disk name on macOS.
    pub mount_handle: Option<String>,
}

/// Device information returned by poll and lookup
///
/// Serialized with the field names host applications already consume;
/// empty strings are emitted as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Stable engine-assigned identifier
    pub id: DeviceId,
    /// Position in the USB topology at the last observation
    pub location_id: u32,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Product string (if available)
    #[serde(serialize_with = "non_empty")]
    pub product: Option<String>,
    /// Serial number string (if available)
    #[serde(serialize_with = "non_empty")]
    pub serial_number: Option<String>,
    /// Vendor string (if available)
    #[serde(rename = "manufacturer", serialize_with = "non_empty")]
    pub vendor: Option<String>,
    /// Filesystem mount path, `None` when not mounted
    #[serde(rename = "mount", serialize_with = "non_empty")]
    pub mount_point: Option<String>,
}

impl DeviceSnapshot {
    /// True when the snapshot carries a mount path
    pub fn is_mounted(&self) -> bool {
        self.mount_point.as_deref().is_some_and(|m| !m.is_empty())
    }
}

fn non_empty<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value.as_deref() {
        Some(s) if !s.is_empty() => serializer.serialize_str(s),
        _ => serializer.serialize_none(),
    }
}

/// Result of an unmount request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnmountOutcome {
    /// The OS unmounted the volume and the record was cleared
    Unmounted,
    /// The device is known but has no mount point
    NotMounted,
    /// No record with this identifier exists
    NotFound,
    /// The OS refused or failed the unmount
    Failed {
        /// Reason reported by the backend
        reason: String,
    },
}

impl UnmountOutcome {
    /// Boolean form exposed to hosts: true only when this call unmounted the device
    pub fn succeeded(&self) -> bool {
        matches!(self, UnmountOutcome::Unmounted)
    }
}

impl fmt::Display for UnmountOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmountOutcome::Unmounted => f.write_str("unmounted"),
            UnmountOutcome::NotMounted => f.write_str("not mounted"),
            UnmountOutcome::NotFound => f.write_str("no such device"),
            UnmountOutcome::Failed { reason } => write!(f, "unmount failed: {}", reason),
        }
    }
}
