//! Device-to-slot association table.

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{device::DeviceId, error::GatewayError};

/// Concurrent map from device to the pool slot reassembling its message.
///
/// Entries are created when a device's first fragment claims a slot and
/// removed when that session tears down.
#[derive(Debug, Default)]
pub struct Associations(DashMap<DeviceId, usize>);

impl Associations {
    /// Slot associated with `device`, if any.
    #[must_use]
    pub fn get(&self, device: &DeviceId) -> Option<usize> { self.0.get(device).map(|slot| *slot) }

    /// Lock the entry for `device`. Holding the entry serializes concurrent
    /// first fragments from the same device.
    pub(crate) fn entry(&self, device: DeviceId) -> Entry<'_, DeviceId, usize> { self.0.entry(device) }

    /// Remove the association for `device`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AssociationNotFound`] if the device has none.
    pub fn disassociate(&self, device: &DeviceId) -> Result<usize, GatewayError> {
        self.0
            .remove(device)
            .map(|(_, slot)| slot)
            .ok_or_else(|| GatewayError::AssociationNotFound(device.clone()))
    }

    /// Remove the association only if it still points at `slot`.
    pub(crate) fn release(&self, device: &DeviceId, slot: usize) -> bool {
        self.0.remove_if(device, |_, current| *current == slot).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Devices currently associated with a slot.
    ///
    /// This iterates every shard under a read lock.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceId> { self.0.iter().map(|entry| entry.key().clone()).collect() }
}
