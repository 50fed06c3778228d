//! Device registry
//!
//! In-memory store of every device seen by this process, keyed by stable
//! identifier. Fresh observations are folded in by [`DeviceRegistry::reconcile`],
//! which correlates them with existing records through the location id.

use crate::identity::IdGenerator;
use protocol::{DeviceId, DeviceSnapshot, RawDevice};
use std::collections::HashMap;
use tracing::{debug, info};

/// One physical device as currently known
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Stable identifier, never changed once assigned
    pub id: DeviceId,
    /// Position in the USB topology at the last observation
    pub location_id: u32,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Serial number, empty when the device has none
    pub serial_number: String,
    /// Product string
    pub product: String,
    /// Vendor string
    pub vendor: String,
    /// Mount path, empty when not mounted
    pub mount_point: String,
    /// Poll generation this record was last observed in
    last_seen: u64,
}

impl DeviceRecord {
    /// True when the record carries a mount path
    pub fn is_mounted(&self) -> bool {
        !self.mount_point.is_empty()
    }

    /// Poll generation this record was last observed in
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Copy of the record for callers outside the registry
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.id.clone(),
            location_id: self.location_id,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            product: non_empty(&self.product),
            serial_number: non_empty(&self.serial_number),
            vendor: non_empty(&self.vendor),
            mount_point: non_empty(&self.mount_point),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Registry of known devices
///
/// Records are created the first time a location is observed and updated in
/// place afterwards. Nothing is removed unless [`DeviceRegistry::evict_stale`]
/// is called.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    records: HashMap<DeviceId, DeviceRecord>,
    ids: IdGenerator,
    generation: u64,
}

impl DeviceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new poll generation
    ///
    /// Records reconciled afterwards are stamped with the returned value.
    pub fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Current poll generation (0 before the first successful poll)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Merge one observation into the registry
    ///
    /// A record with the same location id is reused, keeping its identifier
    /// and mount point; otherwise a new record is created. Identity fields
    /// are always overwritten with the observed values.
    ///
    /// Two different devices reporting the same location id one after the
    /// other share a record: the newcomer inherits the old identity.
    pub fn reconcile(&mut self, raw: &RawDevice) -> &mut DeviceRecord {
        // O(n) over the USB topology
        let existing = self
            .records
            .values()
            .find(|r| r.location_id == raw.location_id)
            .map(|r| r.id.clone());

        let mut record = match existing.and_then(|id| self.records.remove(&id)) {
            Some(record) => record,
            None => {
                debug!(
                    "New device at location {:#010x}: {:04x}:{:04x}",
                    raw.location_id, raw.vendor_id, raw.product_id
                );
                DeviceRecord::default()
            }
        };

        record.location_id = raw.location_id;
        record.vendor_id = raw.vendor_id;
        record.product_id = raw.product_id;
        record.serial_number = raw.serial_number.clone().unwrap_or_default();
        record.product = raw.product.clone().unwrap_or_default();
        record.vendor = raw.vendor.clone().unwrap_or_default();
        record.last_seen = self.generation;

        let id = self.ids.assign(
            &record.id,
            record.vendor_id,
            record.product_id,
            Some(record.serial_number.as_str()),
        );
        if record.id != id {
            info!("Assigned id {} to device at location {:#010x}", id, record.location_id);
        }
        record.id = id.clone();

        self.records.entry(id).insert_entry(record).into_mut()
    }

    /// Look up a record by identifier
    pub fn lookup(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.records.get(id)
    }

    /// Mutable lookup by identifier
    pub fn lookup_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceRecord> {
        self.records.get_mut(id)
    }

    /// Every record, in no particular order
    pub fn list_all(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.values()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no device has been seen yet
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records not observed in the last `max_missed` generations
    ///
    /// Returns the evicted identifiers.
    pub fn evict_stale(&mut self, max_missed: u64) -> Vec<DeviceId> {
        let generation = self.generation;
        let stale: Vec<DeviceId> = self
            .records
            .values()
            .filter(|r| generation.saturating_sub(r.last_seen) >= max_missed)
            .map(|r| r.id.clone())
            .collect();

        for id in &stale {
            self.records.remove(id);
            info!("Evicted device {} after {} missed polls", id, max_missed);
        }

        stale
    }
}
