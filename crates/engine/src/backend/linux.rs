//! Linux backend
//!
//! Enumerates USB devices through libusb, resolves mounts through sysfs and
//! the mount table, and unmounts with `umount2(2)`.

use super::mounts::{self, PROC_MOUNTS};
use super::sysfs::{self, SYS_USB_DEVICES};
use common::{Collector, Error, Result, Unmounter};
use nix::errno::Errno;
use nix::mount::{MntFlags, umount2};
use protocol::RawDevice;
use rusb::{Context, Device, DeviceDescriptor, UsbContext};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// USB Mass Storage class code
const CLASS_MASS_STORAGE: u8 = 0x08;

/// Linux platform backend
#[derive(Debug, Clone)]
pub struct LinuxBackend {
    /// Directory holding one entry per USB device (`1-2`, `1-2.4`, ...)
    usb_devices: PathBuf,
    /// Mount table in `/proc/self/mounts` format
    mount_table: PathBuf,
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxBackend {
    /// Backend using the live sysfs and mount table
    pub fn new() -> Self {
        Self::with_paths(SYS_USB_DEVICES, PROC_MOUNTS)
    }

    /// Backend reading sysfs and the mount table from other locations
    pub fn with_paths(usb_devices: impl Into<PathBuf>, mount_table: impl Into<PathBuf>) -> Self {
        Self {
            usb_devices: usb_devices.into(),
            mount_table: mount_table.into(),
        }
    }

    /// Build the raw observation for one libusb device
    ///
    /// Returns `None` for devices that are not mass storage or whose
    /// descriptor cannot be read.
    fn observe(&self, device: &Device<Context>) -> Option<RawDevice> {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "Skipping device bus={} addr={}: cannot read descriptor: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                return None;
            }
        };

        if !is_mass_storage(device, &descriptor) {
            return None;
        }

        let bus = device.bus_number();
        let ports = device.port_numbers().unwrap_or_default();
        let device_dir = self.usb_devices.join(sysfs::device_dir_name(bus, &ports));

        // Each string falls back to sysfs on its own, so one failed
        // descriptor read does not change the serial used for identity
        let handle = match device.open() {
            Ok(handle) => Some(handle),
            Err(e) => {
                debug!(
                    "Cannot open {} ({}), reading strings from sysfs",
                    device_dir.display(),
                    e
                );
                None
            }
        };
        let read = |index: Option<u8>, attr: &str| {
            let from_device = handle
                .as_ref()
                .zip(index)
                .and_then(|(h, i)| h.read_string_descriptor_ascii(i).ok());
            string_or_sysfs(from_device, &device_dir, attr)
        };

        let vendor = read(descriptor.manufacturer_string_index(), "manufacturer");
        let product = read(descriptor.product_string_index(), "product");
        let serial_number = read(descriptor.serial_number_string_index(), "serial");

        Some(RawDevice {
            location_id: sysfs::location_id(bus, &ports),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            serial_number,
            product,
            vendor,
            mount_handle: Some(device_dir.to_string_lossy().into_owned()),
        })
    }
}

/// Descriptor string when it was read, else the sysfs attribute
fn string_or_sysfs(from_device: Option<String>, device_dir: &Path, attr: &str) -> Option<String> {
    from_device
        .filter(|value| !value.is_empty())
        .or_else(|| sysfs::read_attr(device_dir, attr))
}

/// Mass storage at device level or on any interface of the first configuration
fn is_mass_storage(device: &Device<Context>, descriptor: &DeviceDescriptor) -> bool {
    if descriptor.class_code() == CLASS_MASS_STORAGE {
        return true;
    }

    match device.config_descriptor(0) {
        Ok(config) => config.interfaces().any(|interface| {
            interface
                .descriptors()
                .any(|d| d.class_code() == CLASS_MASS_STORAGE)
        }),
        Err(e) => {
            debug!(
                "No configuration descriptor for bus={} addr={}: {}",
                device.bus_number(),
                device.address(),
                e
            );
            false
        }
    }
}

/// Give every observation of one collection its own location id
///
/// Only hashed ids can clash; a clash moves the later device to the next
/// free hashed id.
fn ensure_unique_locations(devices: &mut [RawDevice]) {
    let mut seen = HashSet::with_capacity(devices.len());

    for device in devices.iter_mut() {
        let mut location = device.location_id;
        while !seen.insert(location) {
            location = sysfs::next_hashed_location(location);
        }

        if location != device.location_id {
            warn!(
                "Location id {:#010x} already taken by another device, using {:#010x}",
                device.location_id, location
            );
            device.location_id = location;
        }
    }
}

impl Collector for LinuxBackend {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn collect(&self) -> Result<Vec<RawDevice>> {
        // Context lives for this collection only
        let context =
            Context::new().map_err(|e| Error::Collection(format!("libusb unavailable: {}", e)))?;
        let devices = context
            .devices()
            .map_err(|e| Error::Collection(format!("Failed to list USB devices: {}", e)))?;

        let mut found: Vec<RawDevice> =
            devices.iter().filter_map(|d| self.observe(&d)).collect();
        ensure_unique_locations(&mut found);
        debug!("Found {} mass-storage device(s)", found.len());
        Ok(found)
    }

    fn resolve_mount(&self, handle: &str) -> Result<Option<String>> {
        let names = sysfs::block_devices(Path::new(handle));
        if names.is_empty() {
            debug!("No block device below {}", handle);
            return Ok(None);
        }

        let table = mounts::read_mount_table(&self.mount_table)?;
        Ok(mounts::find_mount_point(&table, &names))
    }
}

impl Unmounter for LinuxBackend {
    fn unmount(&self, mount_point: &str) -> Result<()> {
        match umount2(mount_point, MntFlags::empty()) {
            Ok(()) => Ok(()),
            Err(Errno::EPERM) => {
                debug!("umount2 not permitted for {}, trying umount", mount_point);
                unmount_with_command(mount_point)
            }
            Err(errno) => Err(Error::Unmount {
                path: mount_point.into(),
                message: errno.desc().to_string(),
            }),
        }
    }
}

/// Unmount through the `umount` helper, which honours `user` mounts
fn unmount_with_command(mount_point: &str) -> Result<()> {
    let output = Command::new("umount").arg(mount_point).output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(Error::Unmount {
            path: mount_point.into(),
            message: stderr,
        });
    }

    Ok(())
}
