//! macOS backend
//!
//! Enumerates USB devices from `system_profiler SPUSBDataType -json`, resolves
//! mounts with `diskutil info` and unmounts with `diskutil unmount`. The
//! parsers are plain functions so they can be exercised on any host.

use common::{Collector, Error, Result, Unmounter};
use protocol::RawDevice;
use serde_json::Value;
use std::process::{Command, Output};
use tracing::{debug, warn};

/// macOS platform backend
#[derive(Debug, Clone, Default)]
pub struct MacBackend;

impl MacBackend {
    /// Backend using the system tools
    pub fn new() -> Self {
        Self
    }
}

impl Collector for MacBackend {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn collect(&self) -> Result<Vec<RawDevice>> {
        let output = run("system_profiler", &["SPUSBDataType", "-json"])
            .map_err(|e| Error::Collection(e.to_string()))?;

        if !output.status.success() {
            return Err(Error::Collection(format!(
                "system_profiler failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_usb_tree(&String::from_utf8_lossy(&output.stdout))
    }

    fn resolve_mount(&self, handle: &str) -> Result<Option<String>> {
        let output = run("diskutil", &["info", handle])
            .map_err(|e| Error::Mount(e.to_string()))?;

        if !output.status.success() {
            return Err(Error::Mount(format!(
                "diskutil info {} failed: {}",
                handle,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_mount_point(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Unmounter for MacBackend {
    fn unmount(&self, mount_point: &str) -> Result<()> {
        let output = run("diskutil", &["unmount", mount_point])?;

        if !output.status.success() {
            // diskutil reports some failures on stdout
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(Error::Unmount {
                path: mount_point.into(),
                message,
            });
        }

        Ok(())
    }
}

fn run(program: &str, args: &[&str]) -> std::io::Result<Output> {
    debug!("Running {} {}", program, args.join(" "));
    Command::new(program).args(args).output()
}

/// Parse `system_profiler SPUSBDataType -json` output
///
/// Entries carrying a `Media` list are mass storage. Entries whose ids
/// cannot be parsed are skipped.
pub fn parse_usb_tree(json: &str) -> Result<Vec<RawDevice>> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| Error::Collection(format!("Invalid system_profiler output: {}", e)))?;

    let buses = root
        .get("SPUSBDataType")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Collection("system_profiler output lacks SPUSBDataType".into()))?;

    let mut devices = Vec::new();
    for bus in buses {
        collect_items(bus, &mut devices);
    }
    Ok(devices)
}

fn collect_items(node: &Value, devices: &mut Vec<RawDevice>) {
    let Some(items) = node.get("_items").and_then(Value::as_array) else {
        return;
    };

    for item in items {
        if let Some(media) = item.get("Media").and_then(Value::as_array) {
            match observe(item, media) {
                Some(device) => devices.push(device),
                None => warn!(
                    "Skipping storage device {:?}: missing identity attributes",
                    string_field(item, "_name")
                ),
            }
        }

        // Hubs nest further devices
        collect_items(item, devices);
    }
}

fn observe(item: &Value, media: &[Value]) -> Option<RawDevice> {
    let vendor_id = string_field(item, "vendor_id").and_then(|s| parse_hex_prefix(&s))?;
    let product_id = string_field(item, "product_id").and_then(|s| parse_hex_prefix(&s))?;
    let location_id = string_field(item, "location_id").and_then(|s| parse_hex_prefix(&s))?;

    Some(RawDevice {
        location_id,
        vendor_id: u16::try_from(vendor_id).ok()?,
        product_id: u16::try_from(product_id).ok()?,
        serial_number: string_field(item, "serial_num"),
        product: string_field(item, "_name"),
        vendor: string_field(item, "manufacturer"),
        mount_handle: media_bsd_name(media),
    })
}

/// First volume's BSD name, else the whole medium's
fn media_bsd_name(media: &[Value]) -> Option<String> {
    let medium = media.first()?;

    medium
        .get("volumes")
        .and_then(Value::as_array)
        .and_then(|volumes| volumes.first())
        .and_then(|volume| string_field(volume, "bsd_name"))
        .or_else(|| string_field(medium, "bsd_name"))
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the leading hex number of strings like `0x0781  (SanDisk)` or
/// `0x14200000 / 3`
pub fn parse_hex_prefix(value: &str) -> Option<u32> {
    let token = value.split_whitespace().next()?;
    let hex = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))?;
    u32::from_str_radix(hex, 16).ok()
}

/// Extract the mount point from `diskutil info` output
pub fn parse_mount_point(info: &str) -> Option<String> {
    info.lines().find_map(|line| {
        let value = line.trim().strip_prefix("Mount Point:")?.trim();
        (!value.is_empty() && !value.starts_with("Not applicable")).then(|| value.to_string())
    })
}
