//! Test utilities for usb-drives
//!
//! Provides a scripted platform backend and helper functions for testing
//! across crates.
//!
//! # Example
//!
//! ```
//! use common::platform::Collector;
//! use common::test_utils::{FakePlatform, create_mock_raw_device};
//!
//! let platform = FakePlatform::new();
//! platform.add_device(create_mock_raw_device(5, 0x1234, 0x5678, None));
//! platform.set_mount("handle-5", "/Volumes/A");
//!
//! assert_eq!(platform.collect().unwrap().len(), 1);
//! ```

use crate::platform::{Collector, Unmounter};
use protocol::RawDevice;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock RawDevice for testing
///
/// The mount handle is `handle-{location_id}`.
///
/// # Example
/// ```
/// use common::test_utils::create_mock_raw_device;
///
/// let device = create_mock_raw_device(5, 0x1234, 0x5678, Some("SN1"));
/// assert_eq!(device.mount_handle.as_deref(), Some("handle-5"));
/// ```
pub fn create_mock_raw_device(
    location_id: u32,
    vendor_id: u16,
    product_id: u16,
    serial_number: Option<&str>,
) -> RawDevice {
    RawDevice {
        location_id,
        vendor_id,
        product_id,
        serial_number: serial_number.map(str::to_string),
        product: Some(format!("Test Product {}", location_id)),
        vendor: Some("Test Vendor".to_string()),
        mount_handle: Some(format!("handle-{}", location_id)),
    }
}

/// Create a list of mock devices at locations 1..=count
pub fn create_mock_raw_device_list(count: u32) -> Vec<RawDevice> {
    (1..=count)
        .map(|i| create_mock_raw_device(i, 0x1000 + (i as u16), 0x2000 + (i as u16), None))
        .collect()
}

#[derive(Default)]
struct FakeState {
    devices: Vec<RawDevice>,
    mounts: HashMap<String, String>,
    mount_errors: HashSet<String>,
    collect_error: Option<String>,
    unmount_failures: HashMap<String, String>,
    unmount_calls: Vec<String>,
    collect_calls: usize,
}

/// Scripted platform backend
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another. A successful unmount removes the mount, so the next collection
/// sees the device as unmounted.
#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
}

impl FakePlatform {
    /// Empty backend with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device
    pub fn add_device(&self, device: RawDevice) {
        self.lock().devices.push(device);
    }

    /// Replace the whole attached set
    pub fn set_devices(&self, devices: Vec<RawDevice>) {
        self.lock().devices = devices;
    }

    /// Detach every device at `location_id`
    pub fn remove_device(&self, location_id: u32) {
        self.lock().devices.retain(|d| d.location_id != location_id);
    }

    /// Mount `handle` at `mount_point`
    pub fn set_mount(&self, handle: &str, mount_point: &str) {
        self.lock()
            .mounts
            .insert(handle.to_string(), mount_point.to_string());
    }

    /// Unmount `handle` behind the engine's back
    pub fn clear_mount(&self, handle: &str) {
        self.lock().mounts.remove(handle);
    }

    /// Make mount resolution for `handle` fail
    pub fn fail_mount(&self, handle: &str) {
        self.lock().mount_errors.insert(handle.to_string());
    }

    /// Make the next collections fail as if the OS service were unreachable
    pub fn fail_collection(&self, message: &str) {
        self.lock().collect_error = Some(message.to_string());
    }

    /// Undo [`FakePlatform::fail_collection`]
    pub fn restore_collection(&self) {
        self.lock().collect_error = None;
    }

    /// Make unmounting `mount_point` fail with `reason`
    pub fn fail_unmount(&self, mount_point: &str, reason: &str) {
        self.lock()
            .unmount_failures
            .insert(mount_point.to_string(), reason.to_string());
    }

    /// Mount points the engine asked to unmount, in order
    pub fn unmount_calls(&self) -> Vec<String> {
        self.lock().unmount_calls.clone()
    }

    /// Number of collect() calls so far
    pub fn collect_calls(&self) -> usize {
        self.lock().collect_calls
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Collector for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn collect(&self) -> crate::Result<Vec<RawDevice>> {
        let mut state = self.lock();
        state.collect_calls += 1;

        if let Some(message) = &state.collect_error {
            return Err(crate::Error::Collection(message.clone()));
        }

        Ok(state.devices.clone())
    }

    fn resolve_mount(&self, handle: &str) -> crate::Result<Option<String>> {
        let state = self.lock();

        if state.mount_errors.contains(handle) {
            return Err(crate::Error::Mount(format!("cannot open {}", handle)));
        }

        Ok(state.mounts.get(handle).cloned())
    }
}

impl Unmounter for FakePlatform {
    fn unmount(&self, mount_point: &str) -> crate::Result<()> {
        let mut state = self.lock();
        state.unmount_calls.push(mount_point.to_string());

        if let Some(reason) = state.unmount_failures.get(mount_point) {
            return Err(crate::Error::Unmount {
                path: mount_point.into(),
                message: reason.clone(),
            });
        }

        state.mounts.retain(|_, m| m != mount_point);
        Ok(())
    }
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
