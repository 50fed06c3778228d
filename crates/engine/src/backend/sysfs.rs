//! sysfs helpers for USB mass-storage devices
//!
//! Location id encoding, USB device directory naming, attribute reads and
//! discovery of the block devices that sit below a USB device.

use std::fs;
use std::path::Path;

/// Default root of USB device directories
pub const SYS_USB_DEVICES: &str = "/sys/bus/usb/devices";

/// Deepest hub chain encoded in a compact location id
pub const MAX_LOCATION_DEPTH: usize = 6;

/// Set on location ids derived from the device directory name
pub const HASHED_LOCATION: u32 = 0x8000_0000;

/// Directory nesting searched below a USB device for `block/` entries
const MAX_BLOCK_SEARCH_DEPTH: usize = 8;

/// Encode bus and port chain as a location id
///
/// The compact form puts the bus in the top byte and one nibble per port,
/// first port in bits 20..24, the next in 16..20 and so on. It is used when
/// the bus is below 128, every port is below 16 and the chain is at most six
/// levels deep. Any other topology is identified by a CRC32 of its
/// directory name with [`HASHED_LOCATION`] set, so it never aliases a
/// compact id.
pub fn location_id(bus: u8, ports: &[u8]) -> u32 {
    let compact = bus < 0x80
        && ports.len() <= MAX_LOCATION_DEPTH
        && ports.iter().all(|port| *port <= 0x0f);

    if !compact {
        let hash = crc32fast::hash(device_dir_name(bus, ports).as_bytes());
        return HASHED_LOCATION | (hash & !HASHED_LOCATION);
    }

    ports
        .iter()
        .enumerate()
        .fold(u32::from(bus) << 24, |acc, (level, port)| {
            acc | (u32::from(*port) << (20 - 4 * level))
        })
}

/// Next candidate when a hashed location id is already taken
pub fn next_hashed_location(location_id: u32) -> u32 {
    HASHED_LOCATION | (location_id.wrapping_add(1) & !HASHED_LOCATION)
}

/// Kernel name of a USB device directory, e.g. `1-2.4`
///
/// Root hubs (empty port chain) are named `usb<bus>`.
pub fn device_dir_name(bus: u8, ports: &[u8]) -> String {
    if ports.is_empty() {
        return format!("usb{}", bus);
    }

    let chain: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
    format!("{}-{}", bus, chain.join("."))
}

/// Read a sysfs attribute, trimmed; `None` when missing or empty
pub fn read_attr(dir: &Path, name: &str) -> Option<String> {
    let value = fs::read_to_string(dir.join(name)).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Block device names below a USB device directory
///
/// Each disk is listed before its partitions; partitions are sorted by name.
/// Symlinks are not followed.
pub fn block_devices(device_dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    collect_block_devices(device_dir, 0, &mut names);
    names
}

fn collect_block_devices(dir: &Path, depth: usize, names: &mut Vec<String>) {
    if depth > MAX_BLOCK_SEARCH_DEPTH {
        return;
    }

    for entry in sorted_subdirs(dir) {
        let path = dir.join(&entry);
        if entry == "block" {
            for disk in sorted_subdirs(&path) {
                let disk_dir = path.join(&disk);
                let partitions: Vec<String> = sorted_subdirs(&disk_dir)
                    .into_iter()
                    .filter(|p| p.starts_with(disk.as_str()))
                    .collect();

                names.push(disk);
                names.extend(partitions);
            }
        } else {
            collect_block_devices(&path, depth + 1, names);
        }
    }
}

fn sorted_subdirs(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}
