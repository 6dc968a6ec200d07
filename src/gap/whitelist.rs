//! The whitelist
//!
//! The whitelist is the controller's filter accept list. The host keeps a mirror of the list so
//! that setting a new whitelist only sends the difference between the two lists. If the
//! controller rejects a change part way through, the changes already made are undone so the
//! controller's list and the mirror stay the same.

use super::{EventHandler, Gap};
use crate::address::{BluetoothDeviceAddress, IdentityAddressType};
use crate::error::Error;
use crate::hci::HostControllerInterface;
use crate::platform::Platform;
use alloc::vec::Vec;

pub use crate::hci::FilterAcceptListEntry as WhitelistEntry;

#[derive(Debug, Default)]
pub(crate) struct Whitelist {
    /// The size of the controller's list, read from the controller the first time it is needed
    capacity: Option<u8>,
    entries: Vec<WhitelistEntry>,
}

/// Check the entries of a new whitelist and remove the duplicates
fn validate_whitelist(entries: &[WhitelistEntry]) -> Result<Vec<WhitelistEntry>, Error> {
    let mut unique: Vec<WhitelistEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.address == BluetoothDeviceAddress::ZERO {
            return Err(Error::InvalidParameter);
        }

        if entry.address_type == IdentityAddressType::Public
            && (entry.address.is_resolvable() || entry.address.is_non_resolvable())
        {
            return Err(Error::InvalidParameter);
        }

        if entry.address_type == IdentityAddressType::RandomStatic && !entry.address.is_static_random() {
            return Err(Error::InvalidParameter);
        }

        if !unique.contains(entry) {
            unique.push(*entry);
        }
    }

    Ok(unique)
}

impl<C, P, H> Gap<C, P, H>
where
    C: HostControllerInterface,
    P: Platform,
    H: EventHandler,
{
    /// Get the maximum number of devices within the whitelist
    pub fn get_max_whitelist_size(&mut self) -> Result<u8, Error> {
        if !cfg!(feature = "whitelist") {
            return Err(Error::NotImplemented);
        }

        match self.whitelist.capacity {
            Some(capacity) => Ok(capacity),
            None => {
                let capacity = self.hci.read_filter_accept_list_size()?;

                log::debug!("(GAP) the whitelist holds {} devices", capacity);

                self.whitelist.capacity = Some(capacity);

                Ok(capacity)
            }
        }
    }

    /// Get the whitelist
    pub fn get_whitelist(&self) -> Result<&[WhitelistEntry], Error> {
        if !cfg!(feature = "whitelist") {
            return Err(Error::NotImplemented);
        }

        Ok(&self.whitelist.entries)
    }

    /// Set the whitelist
    ///
    /// Duplicate entries are ignored. If the controller rejects a change, the whitelist is put
    /// back to what it was before this call and the controller's error is returned.
    ///
    /// # Error
    /// * `InvalidParameter` - an address is zero, or a random address is not static
    /// * `NoMemory` - there are more entries than fit within the controller's list
    /// * `Busy` - scanning, initiating, or advertising is using the whitelist
    pub fn set_whitelist(&mut self, entries: &[WhitelistEntry]) -> Result<(), Error> {
        if !cfg!(feature = "whitelist") {
            return Err(Error::NotImplemented);
        }

        let entries = validate_whitelist(entries)?;

        if entries.len() > usize::from(self.get_max_whitelist_size()?) {
            return Err(Error::NoMemory);
        }

        if self.scan.uses_filter_accept_list()
            || self.connection.uses_filter_accept_list()
            || self.advertising.uses_filter_accept_list()
        {
            return Err(Error::Busy);
        }

        let removals: Vec<WhitelistEntry> = self
            .whitelist
            .entries
            .iter()
            .filter(|entry| !entries.contains(entry))
            .copied()
            .collect();

        let additions: Vec<WhitelistEntry> = entries
            .iter()
            .filter(|entry| !self.whitelist.entries.contains(entry))
            .copied()
            .collect();

        for (index, entry) in removals.iter().enumerate() {
            if let Err(e) = self.hci.remove_device_from_filter_accept_list(*entry) {
                log::warn!("(GAP) failed to remove {} from the whitelist, {}", entry.address, e);

                self.restore_whitelist(&removals[..index], &[]);

                return Err(e.into());
            }
        }

        for (index, entry) in additions.iter().enumerate() {
            if let Err(e) = self.hci.add_device_to_filter_accept_list(*entry) {
                log::warn!("(GAP) failed to add {} to the whitelist, {}", entry.address, e);

                self.restore_whitelist(&removals, &additions[..index]);

                return Err(e.into());
            }
        }

        log::debug!(
            "(GAP) whitelist set, {} removed and {} added",
            removals.len(),
            additions.len()
        );

        self.whitelist.entries = entries;

        Ok(())
    }

    /// Undo a partially applied whitelist change, in reverse order
    fn restore_whitelist(&mut self, removed: &[WhitelistEntry], added: &[WhitelistEntry]) {
        for entry in added.iter().rev() {
            if let Err(e) = self.hci.remove_device_from_filter_accept_list(*entry) {
                log::error!("(GAP) failed to restore the whitelist, {}", e);
            }
        }

        for entry in removed.iter().rev() {
            if let Err(e) = self.hci.add_device_to_filter_accept_list(*entry) {
                log::error!("(GAP) failed to restore the whitelist, {}", e);
            }
        }
    }
}
