//! Periodic advertising synchronization
//!
//! Synchronizing to a periodic advertising train is done either with a specific advertiser or with
//! any advertiser within the periodic advertiser list. Only one synchronization can be created at
//! a time, and the periodic advertiser list cannot change while it is used for a synchronization
//! that is being created.

use super::{EventHandler, Gap};
use crate::address::PeerAddressType;
use crate::error::Error;
use crate::hci::common::{LeFeature, SyncHandle, SyncTimeout};
use crate::hci::events::{PeriodicAdvertisingReport, PeriodicAdvertisingSyncEstablished};
use crate::hci::{CreateSyncParameters, HostControllerInterface, PeriodicAdvertiser};
use crate::platform::Platform;
use alloc::vec::Vec;

/// The maximum number of periodic advertising events that can be skipped
pub const MAX_SYNC_SKIP: u16 = 0x01F3;

#[derive(Debug, Clone, Copy)]
struct PendingSync {
    uses_advertiser_list: bool,
    cancel_requested: bool,
}

#[derive(Debug, Default)]
pub(crate) struct PeriodicSync {
    active: Vec<SyncHandle>,
    pending: Option<PendingSync>,
    advertiser_list: Vec<PeriodicAdvertiser>,
    list_capacity: Option<u8>,
}

impl PeriodicSync {
    fn is_list_in_use(&self) -> bool {
        self.pending.map_or(false, |pending| pending.uses_advertiser_list)
    }
}

fn validate_advertiser(advertiser: &PeriodicAdvertiser) -> Result<(), Error> {
    if advertiser.sid > super::advertise::MAX_ADVERTISING_SID || advertiser.address_type == PeerAddressType::Anonymous {
        Err(Error::InvalidParameter)
    } else {
        Ok(())
    }
}

impl<C, P, H> Gap<C, P, H>
where
    C: HostControllerInterface,
    P: Platform,
    H: EventHandler,
{
    fn check_periodic_sync_support(&self) -> Result<(), Error> {
        if self.is_feature_supported(LeFeature::LePeriodicAdvertising) {
            Ok(())
        } else {
            Err(Error::NotImplemented)
        }
    }

    /// Synchronize with the periodic advertising of an advertiser
    ///
    /// [`on_periodic_advertising_sync_established`] is called with the result.
    ///
    /// # Error
    /// * `InvalidParameter` - the SID or the skip is out of range, or the advertiser is anonymous
    /// * `Busy` - a synchronization is already being created
    ///
    /// [`on_periodic_advertising_sync_established`]: super::EventHandler::on_periodic_advertising_sync_established
    pub fn create_sync(&mut self, advertiser: PeriodicAdvertiser, skip: u16, sync_timeout: SyncTimeout) -> Result<(), Error> {
        self.check_periodic_sync_support()?;

        validate_advertiser(&advertiser)?;

        self.request_sync(Some(advertiser), skip, sync_timeout)
    }

    /// Synchronize with the periodic advertising of any device within the periodic advertiser list
    ///
    /// # Error
    /// * `InvalidState` - the periodic advertiser list is empty
    /// * `InvalidParameter` - the skip is out of range
    /// * `Busy` - a synchronization is already being created
    pub fn create_sync_from_advertiser_list(&mut self, skip: u16, sync_timeout: SyncTimeout) -> Result<(), Error> {
        self.check_periodic_sync_support()?;

        if self.sync.advertiser_list.is_empty() {
            return Err(Error::InvalidState);
        }

        self.request_sync(None, skip, sync_timeout)
    }

    fn request_sync(
        &mut self,
        advertiser: Option<PeriodicAdvertiser>,
        skip: u16,
        sync_timeout: SyncTimeout,
    ) -> Result<(), Error> {
        if skip > MAX_SYNC_SKIP {
            return Err(Error::InvalidParameter);
        }

        if self.sync.pending.is_some() {
            return Err(Error::Busy);
        }

        self.hci.periodic_advertising_create_sync(&CreateSyncParameters {
            advertiser,
            skip,
            sync_timeout,
        })?;

        self.sync.pending = Some(PendingSync {
            uses_advertiser_list: advertiser.is_none(),
            cancel_requested: false,
        });

        Ok(())
    }

    /// Cancel the creation of a synchronization
    ///
    /// Cancelling when no synchronization is being created does nothing.
    pub fn cancel_create_sync(&mut self) -> Result<(), Error> {
        self.check_periodic_sync_support()?;

        match self.sync.pending {
            Some(pending) if !pending.cancel_requested => {
                self.hci.periodic_advertising_create_sync_cancel()?;

                self.sync.pending = Some(PendingSync {
                    cancel_requested: true,
                    ..pending
                });

                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Stop synchronization with a periodic advertising train
    ///
    /// # Error
    /// `InvalidParameter` is returned if `handle` is not an established synchronization.
    pub fn terminate_sync(&mut self, handle: SyncHandle) -> Result<(), Error> {
        self.check_periodic_sync_support()?;

        let index = self
            .sync
            .active
            .iter()
            .position(|active| *active == handle)
            .ok_or(Error::InvalidParameter)?;

        self.hci.periodic_advertising_terminate_sync(handle)?;

        self.sync.active.remove(index);

        log::debug!("(GAP) terminated periodic advertising sync {}", handle);

        Ok(())
    }

    /// Get the established synchronizations
    pub fn periodic_syncs(&self) -> &[SyncHandle] {
        &self.sync.active
    }

    pub fn get_max_periodic_advertiser_list_size(&mut self) -> Result<u8, Error> {
        self.check_periodic_sync_support()?;

        match self.sync.list_capacity {
            Some(capacity) => Ok(capacity),
            None => {
                let capacity = self.hci.read_periodic_advertiser_list_size()?;

                self.sync.list_capacity = Some(capacity);

                Ok(capacity)
            }
        }
    }

    /// Add a device to the periodic advertiser list
    ///
    /// # Error
    /// * `InvalidParameter` - the advertiser is invalid or already in the list
    /// * `NoMemory` - the list is full
    /// * `Busy` - the list is used by a synchronization being created
    pub fn add_device_to_periodic_advertiser_list(&mut self, advertiser: PeriodicAdvertiser) -> Result<(), Error> {
        self.check_periodic_sync_support()?;

        validate_advertiser(&advertiser)?;

        if self.sync.is_list_in_use() {
            return Err(Error::Busy);
        }

        if self.sync.advertiser_list.contains(&advertiser) {
            return Err(Error::InvalidParameter);
        }

        if self.sync.advertiser_list.len() >= usize::from(self.get_max_periodic_advertiser_list_size()?) {
            return Err(Error::NoMemory);
        }

        self.hci.add_device_to_periodic_advertiser_list(advertiser)?;

        self.sync.advertiser_list.push(advertiser);

        Ok(())
    }

    /// Remove a device from the periodic advertiser list
    ///
    /// # Error
    /// * `InvalidParameter` - the advertiser is not in the list
    /// * `Busy` - the list is used by a synchronization being created
    pub fn remove_device_from_periodic_advertiser_list(&mut self, advertiser: PeriodicAdvertiser) -> Result<(), Error> {
        self.check_periodic_sync_support()?;

        if self.sync.is_list_in_use() {
            return Err(Error::Busy);
        }

        let index = self
            .sync
            .advertiser_list
            .iter()
            .position(|listed| *listed == advertiser)
            .ok_or(Error::InvalidParameter)?;

        self.hci.remove_device_from_periodic_advertiser_list(advertiser)?;

        self.sync.advertiser_list.remove(index);

        Ok(())
    }

    pub fn clear_periodic_advertiser_list(&mut self) -> Result<(), Error> {
        self.check_periodic_sync_support()?;

        if self.sync.is_list_in_use() {
            return Err(Error::Busy);
        }

        self.hci.clear_periodic_advertiser_list()?;

        self.sync.advertiser_list.clear();

        Ok(())
    }

    pub fn periodic_advertiser_list(&self) -> &[PeriodicAdvertiser] {
        &self.sync.advertiser_list
    }

    pub(super) fn on_periodic_advertising_sync_established(&mut self, established: PeriodicAdvertisingSyncEstablished) {
        if self.sync.pending.take().is_none() {
            log::warn!("(GAP) periodic advertising sync established without a pending request");
        }

        if established.status.is_ok() {
            log::debug!(
                "(GAP) synchronized with {} (SID {}) as {}",
                established.advertiser_address,
                established.sid,
                established.sync_handle
            );

            if !self.sync.active.contains(&established.sync_handle) {
                self.sync.active.push(established.sync_handle);
            }
        } else {
            log::debug!("(GAP) periodic advertising sync failed, {}", established.status);
        }

        self.notify(|h| h.on_periodic_advertising_sync_established(&established));
    }

    pub(super) fn on_periodic_advertising_report(&mut self, report: PeriodicAdvertisingReport) {
        if !self.sync.active.contains(&report.sync_handle) {
            log::warn!("(GAP) dropping periodic advertising report of unknown sync {}", report.sync_handle);

            return;
        }

        self.notify(|h| h.on_periodic_advertising_report(&report));
    }

    pub(super) fn on_periodic_advertising_sync_lost(&mut self, sync_handle: SyncHandle) {
        match self.sync.active.iter().position(|active| *active == sync_handle) {
            Some(index) => {
                self.sync.active.remove(index);
            }
            None => {
                log::warn!("(GAP) loss of unknown periodic advertising sync {}", sync_handle);

                return;
            }
        }

        log::debug!("(GAP) lost periodic advertising sync {}", sync_handle);

        self.notify(|h| h.on_periodic_advertising_sync_loss(sync_handle));
    }
}
