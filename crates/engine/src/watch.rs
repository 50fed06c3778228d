//! Change detection between consecutive polls

use protocol::{DeviceId, DeviceSnapshot};
use std::collections::HashMap;
use std::fmt;

/// A difference between two polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    /// Device observed now but not in the previous poll
    Arrived(DeviceSnapshot),
    /// Device observed previously but not now
    Departed(DeviceSnapshot),
    /// Device present in both polls with a different mount point
    MountChanged {
        device: DeviceSnapshot,
        previous: Option<String>,
    },
}

impl fmt::Display for DeviceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceChange::Arrived(d) => write!(
                f,
                "+ [{}] {:04x}:{:04x} - {}{}",
                d.id,
                d.vendor_id,
                d.product_id,
                d.product.as_deref().unwrap_or("Unknown Product"),
                mount_suffix(d)
            ),
            DeviceChange::Departed(d) => write!(f, "- [{}]", d.id),
            DeviceChange::MountChanged { device, .. } => match &device.mount_point {
                Some(mount) => write!(f, "~ [{}] mounted at {}", device.id, mount),
                None => write!(f, "~ [{}] unmounted", device.id),
            },
        }
    }
}

fn mount_suffix(device: &DeviceSnapshot) -> String {
    device
        .mount_point
        .as_deref()
        .map(|m| format!(" @ {}", m))
        .unwrap_or_default()
}

/// Compare two poll results by device id
///
/// Arrivals and mount changes follow the order of `current`, departures the
/// order of `previous`.
pub fn diff_polls(previous: &[DeviceSnapshot], current: &[DeviceSnapshot]) -> Vec<DeviceChange> {
    let before: HashMap<&DeviceId, &DeviceSnapshot> =
        previous.iter().map(|d| (&d.id, d)).collect();
    let after: HashMap<&DeviceId, &DeviceSnapshot> = current.iter().map(|d| (&d.id, d)).collect();

    let mut changes = Vec::new();

    for device in current {
        match before.get(&device.id) {
            None => changes.push(DeviceChange::Arrived(device.clone())),
            Some(old) if old.mount_point != device.mount_point => {
                changes.push(DeviceChange::MountChanged {
                    device: device.clone(),
                    previous: old.mount_point.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for device in previous {
        if !after.contains_key(&device.id) {
            changes.push(DeviceChange::Departed(device.clone()));
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, mount: Option<&str>) -> DeviceSnapshot {
        DeviceSnapshot {
            id: DeviceId::from(id),
            location_id: 1,
            vendor_id: 0x1234,
            product_id: 0x5678,
            product: Some("Drive A".to_string()),
            serial_number: None,
            vendor: None,
            mount_point: mount.map(str::to_string),
        }
    }

    #[test]
    fn test_no_changes() {
        let polls = vec![snapshot("a", Some("/media/a"))];
        assert!(diff_polls(&polls, &polls).is_empty());
    }

    #[test]
    fn test_arrival_and_departure() {
        let previous = vec![snapshot("a", None)];
        let current = vec![snapshot("b", None)];

        let changes = diff_polls(&previous, &current);
        assert_eq!(
            changes,
            vec![
                DeviceChange::Arrived(snapshot("b", None)),
                DeviceChange::Departed(snapshot("a", None)),
            ]
        );
    }

    #[test]
    fn test_mount_change() {
        let previous = vec![snapshot("a", Some("/media/a"))];
        let current = vec![snapshot("a", None)];

        let changes = diff_polls(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to_string(), "~ [a] unmounted");
    }

    #[test]
    fn test_display_arrival() {
        let change = DeviceChange::Arrived(snapshot("4660-22136-0", Some("/Volumes/A")));
        assert_eq!(
            change.to_string(),
            "+ [4660-22136-0] 1234:5678 - Drive A @ /Volumes/A"
        );
    }
}
