//! Periodic advertising
//!
//! Periodic advertising is an addition to an extended advertising set. The set must exist and
//! must not be the legacy set, but it does not need to be advertising for periodic advertising
//! to be configured or started.

use super::fragment::Fragments;
use super::SetState;
use crate::error::Error;
use crate::gap::{EventHandler, Gap};
use crate::hci::common::{AdvertisingHandle, LeFeature, PeriodicAdvertisingInterval};
use crate::hci::HostControllerInterface;
use crate::platform::Platform;

/// The parameters of periodic advertising
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeriodicAdvertisingParameters {
    pub interval_min: PeriodicAdvertisingInterval,
    pub interval_max: PeriodicAdvertisingInterval,
    pub include_tx_power: bool,
}

#[derive(Debug, Default)]
pub(crate) struct PeriodicAdvertising {
    pub configured: bool,
    pub active: bool,
}

impl<C, P, H> Gap<C, P, H>
where
    C: HostControllerInterface,
    P: Platform,
    H: EventHandler,
{
    /// Check that periodic advertising can be used with a set
    fn check_periodic_advertising_set(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        if !self.is_feature_supported(LeFeature::LePeriodicAdvertising) {
            return Err(Error::NotImplemented);
        }

        if handle.is_legacy() {
            return Err(Error::InvalidParameter);
        }

        self.check_advertising_handle(handle)?;

        let set = self.advertising_set(handle)?;

        if set.state == SetState::NonExistent || set.uses_legacy_pdu() {
            return Err(Error::InvalidParameter);
        }

        Ok(())
    }

    /// Set the parameters of periodic advertising
    ///
    /// # Error
    /// * `NotImplemented` - periodic advertising is not supported
    /// * `InvalidParameter` - the set does not exist, is the legacy set, uses legacy PDUs, or the
    ///   minimum interval is greater than the maximum interval
    /// * `InvalidState` - periodic advertising is active
    pub fn set_periodic_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        parameters: PeriodicAdvertisingParameters,
    ) -> Result<(), Error> {
        self.check_periodic_advertising_set(handle)?;

        if parameters.interval_min > parameters.interval_max {
            return Err(Error::InvalidParameter);
        }

        if self.advertising_set(handle)?.periodic.active {
            return Err(Error::InvalidState);
        }

        self.hci.set_periodic_advertising_parameters(handle, &parameters)?;

        self.advertising_set_mut(handle)?.periodic.configured = true;

        Ok(())
    }

    /// Set the periodic advertising data of a set
    ///
    /// The data is written in fragments when it is longer than the configured fragment length.
    /// Fragmented data cannot be written while periodic advertising is active.
    pub fn set_periodic_advertising_payload(&mut self, handle: AdvertisingHandle, payload: &[u8]) -> Result<(), Error> {
        self.check_periodic_advertising_set(handle)?;

        if payload.len() > usize::from(self.get_max_advertising_data_length()?) {
            return Err(Error::InvalidParameter);
        }

        let fragments = Fragments::new(payload, usize::from(self.config.max_advertising_fragment_length));

        if fragments.is_fragmented() && self.advertising_set(handle)?.periodic.active {
            return Err(Error::OperationNotPermitted);
        }

        for (operation, fragment) in fragments {
            self.hci.set_periodic_advertising_data(handle, operation, fragment)?;
        }

        Ok(())
    }

    /// Start periodic advertising
    ///
    /// # Error
    /// `InvalidState` is returned if periodic advertising is already active or its parameters
    /// were never set.
    pub fn start_periodic_advertising(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        self.check_periodic_advertising_set(handle)?;

        let periodic = &self.advertising_set(handle)?.periodic;

        if periodic.active || !periodic.configured {
            return Err(Error::InvalidState);
        }

        self.hci.set_periodic_advertising_enable(true, handle)?;

        self.advertising_set_mut(handle)?.periodic.active = true;

        log::debug!("(GAP) periodic advertising started on set {}", handle);

        Ok(())
    }

    /// Stop periodic advertising
    ///
    /// # Error
    /// `InvalidState` is returned if periodic advertising is not active.
    pub fn stop_periodic_advertising(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        self.check_periodic_advertising_set(handle)?;

        if !self.advertising_set(handle)?.periodic.active {
            return Err(Error::InvalidState);
        }

        self.hci.set_periodic_advertising_enable(false, handle)?;

        self.advertising_set_mut(handle)?.periodic.active = false;

        log::debug!("(GAP) periodic advertising stopped on set {}", handle);

        Ok(())
    }

    pub fn is_periodic_advertising_active(&self, handle: AdvertisingHandle) -> bool {
        self.advertising.get(handle).map_or(false, |set| set.periodic.active)
    }
}
