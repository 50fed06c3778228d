//! Registry engine
//!
//! Ties a platform backend to the device registry: polling collects raw
//! observations and reconciles them, lookups read the registry only, and
//! unmount drives the mount state of a record through the OS.

use crate::registry::{DeviceRecord, DeviceRegistry};
use common::Platform;
use protocol::{DeviceId, DeviceSnapshot, RawDevice, UnmountOutcome};
use tracing::{debug, error, info, warn};

/// Engine tuning taken from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// VID:PID allow-list; empty allows every device
    pub filters: Vec<String>,
    /// Evict records missing from this many consecutive polls
    pub evict_after_missed_polls: Option<u64>,
}

/// Device identity and registry engine
///
/// Owns its registry exclusively. Methods take `&mut self`, so sharing an
/// engine between threads requires a lock or a dedicated owning thread
/// (see [`crate::worker`]).
pub struct DeviceEngine<P: Platform> {
    platform: P,
    registry: DeviceRegistry,
    options: EngineOptions,
}

impl<P: Platform> DeviceEngine<P> {
    /// Engine with default options
    pub fn new(platform: P) -> Self {
        Self::with_options(platform, EngineOptions::default())
    }

    /// Engine with explicit options
    pub fn with_options(platform: P, options: EngineOptions) -> Self {
        Self {
            platform,
            registry: DeviceRegistry::new(),
            options,
        }
    }

    /// Collect attached devices and fold them into the registry
    ///
    /// Returns the devices observed by this collection. A collection that
    /// fails outright is logged and yields an empty list; the registry is
    /// left untouched in that case.
    pub fn poll(&mut self) -> Vec<DeviceSnapshot> {
        let raw_devices = match self.platform.collect() {
            Ok(devices) => devices,
            Err(e) => {
                error!("Device collection via {} failed: {}", self.platform.name(), e);
                return Vec::new();
            }
        };

        let generation = self.registry.advance_generation();
        debug!(
            "Poll {} collected {} device(s) via {}",
            generation,
            raw_devices.len(),
            self.platform.name()
        );

        let mut snapshots: Vec<DeviceSnapshot> = Vec::with_capacity(raw_devices.len());

        for raw in &raw_devices {
            if !check_filter(raw.vendor_id, raw.product_id, &self.options.filters) {
                debug!(
                    "Device ignored by filter: location={:#010x}, vid={:#06x}, pid={:#06x}",
                    raw.location_id, raw.vendor_id, raw.product_id
                );
                continue;
            }

            let mount_point = resolve_mount(&self.platform, raw);
            let record = self.registry.reconcile(raw);
            update_mount(record, mount_point);

            let snapshot = record.snapshot();
            match snapshots.iter_mut().find(|s| s.id == snapshot.id) {
                // Same location reported twice in one collection
                Some(previous) => *previous = snapshot,
                None => snapshots.push(snapshot),
            }
        }

        if let Some(max_missed) = self.options.evict_after_missed_polls {
            self.registry.evict_stale(max_missed);
        }

        snapshots
    }

    /// Look up a device without touching the OS
    pub fn get(&self, id: &DeviceId) -> Option<DeviceSnapshot> {
        self.registry.lookup(id).map(DeviceRecord::snapshot)
    }

    /// Every record held by the registry, including devices no longer attached
    pub fn list_all(&self) -> Vec<DeviceSnapshot> {
        self.registry.list_all().map(DeviceRecord::snapshot).collect()
    }

    /// Unmount a device's volume
    ///
    /// The record's mount point is cleared only when the OS reports success.
    pub fn unmount(&mut self, id: &DeviceId) -> UnmountOutcome {
        let mount_point = match self.registry.lookup(id) {
            None => {
                info!("Unmount requested for unknown device {}", id);
                return UnmountOutcome::NotFound;
            }
            Some(record) if !record.is_mounted() => {
                info!("Unmount requested for {} which is not mounted", id);
                return UnmountOutcome::NotMounted;
            }
            Some(record) => record.mount_point.clone(),
        };

        match self.platform.unmount(&mount_point) {
            Ok(()) => {
                if let Some(record) = self.registry.lookup_mut(id) {
                    record.mount_point.clear();
                }
                info!("Unmounted {} from {}", id, mount_point);
                UnmountOutcome::Unmounted
            }
            Err(e) => {
                warn!("Unmount of {} at {} failed: {}", id, mount_point, e);
                UnmountOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Read-only view of the registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The platform backend
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Active options
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }
}

/// Resolve the mount path of a raw observation, logging transient failures
fn resolve_mount<P: Platform>(platform: &P, raw: &RawDevice) -> String {
    let Some(handle) = raw.mount_handle.as_deref() else {
        return String::new();
    };

    match platform.resolve_mount(handle) {
        Ok(Some(path)) => path,
        Ok(None) => String::new(),
        Err(e) => {
            warn!("Could not resolve mount point for {}: {}", handle, e);
            String::new()
        }
    }
}

fn update_mount(record: &mut DeviceRecord, mount_point: String) {
    if record.mount_point != mount_point {
        match (record.is_mounted(), mount_point.is_empty()) {
            (_, false) => debug!("{} mounted at {}", record.id, mount_point),
            (true, true) => debug!("{} no longer mounted", record.id),
            (false, true) => {}
        }
        record.mount_point = mount_point;
    }
}

/// Check if a VID/PID pair is allowed by the filters
///
/// Filters have the form `0xVID:0xPID` with `*` as wildcard on either side.
/// An empty filter list allows everything.
pub fn check_filter(vid: u16, pid: u16, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }

    filters.iter().any(|filter| {
        let Some((filter_vid, filter_pid)) = filter.split_once(':') else {
            return false;
        };

        matches_id(filter_vid, vid) && matches_id(filter_pid, pid)
    })
}

fn matches_id(pattern: &str, value: u16) -> bool {
    if pattern == "*" {
        return true;
    }

    let hex = pattern
        .strip_prefix("0x")
        .or_else(|| pattern.strip_prefix("0X"))
        .unwrap_or(pattern);

    u16::from_str_radix(hex, 16)
        .map(|v| v == value)
        .unwrap_or(false)
}
