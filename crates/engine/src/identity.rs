//! Device identifier minting
//!
//! Identifiers have the form `{vendorId}-{productId}[-{serialNumber}]-{counter}`
//! with decimal ids. The counter disambiguates identical devices without a
//! serial number plugged in at the same time.

use protocol::DeviceId;

/// Process-local identifier generator
///
/// Owned by the registry; callers that share a registry across threads must
/// serialize access to it.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    /// Generator starting at counter 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirm an existing identifier or mint a new one
    ///
    /// A non-empty `current` is returned unchanged and the counter is left
    /// alone.
    pub fn assign(
        &mut self,
        current: &DeviceId,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> DeviceId {
        if !current.is_empty() {
            return current.clone();
        }

        let counter = self.next;
        self.next += 1;

        let id = match serial_number.filter(|s| !s.is_empty()) {
            Some(serial) => format!("{}-{}-{}-{}", vendor_id, product_id, serial, counter),
            None => format!("{}-{}-{}", vendor_id, product_id, counter),
        };

        DeviceId(id)
    }

    /// Number of identifiers minted so far
    pub fn minted(&self) -> u64 {
        self.next
    }
}
