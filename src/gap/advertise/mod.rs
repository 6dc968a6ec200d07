//! Advertising
//!
//! Advertising is done through advertising sets. Every set has its own parameters, payloads, and
//! state. Handle zero is the legacy advertising set, it always uses legacy advertising PDUs and it
//! is the only set of a controller without extended advertising. The other sets are created with
//! [`create_advertising_set`](Gap::create_advertising_set).
//!
//! # Set state
//! A set is `Configured` once its parameters are set. Starting or stopping a set makes it
//! `Pending` until the controller confirms the transition with an `AdvertisingSetStarted` or an
//! `AdvertisingSetTerminated` event. A set is only reconfigured while it is `Configured`.
//!
//! Enabling and disabling extended advertising sets goes through a queue that is flushed as
//! deferred work, so requests made within the same tick are sent as a single command. The
//! legacy set of a controller without extended advertising is enabled and disabled immediately.
//!
//! # Address refresh
//! A set started without a duration and without a maximum number of events is *interruptible*.
//! When privacy regenerates the address an interruptible set uses, the set is stopped and then
//! restarted with the new address. The application is not notified of either half of this.

mod fragment;
mod periodic;
mod queue;

pub use periodic::PeriodicAdvertisingParameters;
pub use queue::ENABLE_QUEUE_CAPACITY;

use super::privacy::RadioOperation;
use super::scan::ScanState;
use super::{AdvertisingEnd, AdvertisingStart, EventHandler, Gap};
use crate::address::{BluetoothDeviceAddress, OwnAddressType, PeerAddressType, PrivateAddressKind};
use crate::error::Error;
use crate::hci;
use crate::hci::common::{AdvertisingHandle, AdvertisingInterval, ConnectionHandle, LeFeature, Phy};
use crate::hci::events::AdvertisingSetTerminated;
use crate::hci::{AdvertisingDataKind, EnableSet, FragmentOperation, HostControllerInterface};
use crate::platform::{DeferredWork, Platform, TimerId};
use alloc::vec::Vec;
use core::time::Duration;
use fragment::Fragments;
use queue::{EnableQueue, QueuedCommand};

/// The maximum length of legacy advertising data and legacy scan response data
pub const LEGACY_ADVERTISING_DATA_LENGTH: u16 = 31;

/// The maximum length of the advertising data of a connectable extended advertising set
pub const MAX_CONNECTABLE_ADVERTISING_DATA_LENGTH: u16 = 191;

/// The maximum advertising SID
pub const MAX_ADVERTISING_SID: u8 = 0x0F;

/// The unit of an advertising duration
const ADVERTISING_DURATION_UNIT: Duration = Duration::from_millis(10);

/// The type of advertising
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingType {
    ConnectableUndirected,
    ConnectableDirected,
    /// High duty cycle directed advertising
    ///
    /// This is only available with legacy PDUs.
    ConnectableDirectedHighDutyCycle,
    ScannableUndirected,
    NonConnectableUndirected,
}

impl AdvertisingType {
    pub fn is_connectable(&self) -> bool {
        matches!(
            self,
            AdvertisingType::ConnectableUndirected
                | AdvertisingType::ConnectableDirected
                | AdvertisingType::ConnectableDirectedHighDutyCycle
        )
    }

    pub fn is_scannable(&self) -> bool {
        matches!(
            self,
            AdvertisingType::ConnectableUndirected | AdvertisingType::ScannableUndirected
        )
    }

    pub fn is_directed(&self) -> bool {
        matches!(
            self,
            AdvertisingType::ConnectableDirected | AdvertisingType::ConnectableDirectedHighDutyCycle
        )
    }
}

impl Default for AdvertisingType {
    fn default() -> Self {
        AdvertisingType::ConnectableUndirected
    }
}

/// The primary advertising channels to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMap {
    pub channel_37: bool,
    pub channel_38: bool,
    pub channel_39: bool,
}

impl ChannelMap {
    pub fn is_empty(&self) -> bool {
        !(self.channel_37 || self.channel_38 || self.channel_39)
    }

    pub fn into_raw(self) -> u8 {
        (self.channel_37 as u8) | (self.channel_38 as u8) << 1 | (self.channel_39 as u8) << 2
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        ChannelMap {
            channel_37: true,
            channel_38: true,
            channel_39: true,
        }
    }
}

/// The advertising filter policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingFilterPolicy {
    ScanAndConnectFromAny,
    ScanFromFilterAcceptList,
    ConnectFromFilterAcceptList,
    ScanAndConnectFromFilterAcceptList,
}

impl AdvertisingFilterPolicy {
    pub fn into_raw(self) -> u8 {
        match self {
            AdvertisingFilterPolicy::ScanAndConnectFromAny => 0x00,
            AdvertisingFilterPolicy::ScanFromFilterAcceptList => 0x01,
            AdvertisingFilterPolicy::ConnectFromFilterAcceptList => 0x02,
            AdvertisingFilterPolicy::ScanAndConnectFromFilterAcceptList => 0x03,
        }
    }

    pub fn uses_filter_accept_list(&self) -> bool {
        *self != AdvertisingFilterPolicy::ScanAndConnectFromAny
    }
}

impl Default for AdvertisingFilterPolicy {
    fn default() -> Self {
        AdvertisingFilterPolicy::ScanAndConnectFromAny
    }
}

/// The parameters of an advertising set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParameters {
    pub advertising_type: AdvertisingType,
    pub interval_min: AdvertisingInterval,
    pub interval_max: AdvertisingInterval,
    pub channel_map: ChannelMap,
    pub filter_policy: AdvertisingFilterPolicy,
    /// The peer of directed advertising
    pub peer_address_type: PeerAddressType,
    pub peer_address: BluetoothDeviceAddress,
    pub primary_phy: Phy,
    pub secondary_phy: Phy,
    /// The requested transmit power in dBm, `None` lets the controller choose
    pub tx_power: Option<i8>,
    /// The advertising SID, at most [`MAX_ADVERTISING_SID`]
    pub sid: u8,
    pub scan_request_notification: bool,
    /// Use legacy advertising PDUs
    ///
    /// This is forced for the legacy advertising set.
    pub use_legacy_pdu: bool,
    /// Omit the advertiser address from the PDUs
    pub anonymous: bool,
    pub include_tx_power: bool,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        AdvertisingParameters {
            advertising_type: AdvertisingType::default(),
            interval_min: AdvertisingInterval::default(),
            interval_max: AdvertisingInterval::default(),
            channel_map: ChannelMap::default(),
            filter_policy: AdvertisingFilterPolicy::default(),
            peer_address_type: PeerAddressType::Public,
            peer_address: BluetoothDeviceAddress::ZERO,
            primary_phy: Phy::Le1M,
            secondary_phy: Phy::Le1M,
            tx_power: None,
            sid: 0,
            scan_request_notification: false,
            use_legacy_pdu: true,
            anonymous: false,
            include_tx_power: false,
        }
    }
}

impl AdvertisingParameters {
    /// Validate the parameters
    ///
    /// # Error
    /// `InvalidParameter` is returned when
    /// * the minimum interval is greater than the maximum interval
    /// * no channel is enabled
    /// * the SID is greater than [`MAX_ADVERTISING_SID`]
    /// * directed advertising does not have a public or random peer address
    /// * the primary PHY is the LE 2M PHY, or legacy PDUs are not on the LE 1M PHY
    /// * anonymous advertising is connectable, scannable, or uses legacy PDUs
    /// * high duty cycle directed advertising does not use legacy PDUs
    pub fn validate(&self) -> Result<(), Error> {
        if self.interval_min > self.interval_max || self.channel_map.is_empty() || self.sid > MAX_ADVERTISING_SID {
            return Err(Error::InvalidParameter);
        }

        if self.advertising_type.is_directed()
            && !matches!(self.peer_address_type, PeerAddressType::Public | PeerAddressType::Random)
        {
            return Err(Error::InvalidParameter);
        }

        if self.primary_phy == Phy::Le2M {
            return Err(Error::InvalidParameter);
        }

        if self.use_legacy_pdu {
            if self.anonymous || self.primary_phy != Phy::Le1M {
                return Err(Error::InvalidParameter);
            }
        } else if self.advertising_type == AdvertisingType::ConnectableDirectedHighDutyCycle {
            return Err(Error::InvalidParameter);
        }

        if self.anonymous && (self.advertising_type.is_connectable() || self.advertising_type.is_scannable()) {
            return Err(Error::InvalidParameter);
        }

        Ok(())
    }
}

/// A transition of an advertising set waiting for confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Starting,
    Stopping,
}

/// The state of an advertising set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetState {
    NonExistent,
    Configured,
    Pending(Transition),
    Active,
}

impl Default for SetState {
    fn default() -> Self {
        SetState::NonExistent
    }
}

/// Progress of the address refresh of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressRefresh {
    None,
    /// The set is being stopped
    Stopping,
    /// The legacy set is stopped and waits for the device random address to be free
    AwaitingRestart,
    /// The set is being restarted
    Restarting,
}

impl Default for AddressRefresh {
    fn default() -> Self {
        AddressRefresh::None
    }
}

#[derive(Debug, Default)]
pub(crate) struct AdvertisingSet {
    state: SetState,
    /// An enable or disable command was sent and is not confirmed yet
    in_flight: bool,
    parameters: Option<AdvertisingParameters>,
    /// The own address type the parameters were written with
    own_address_type: OwnAddressType,
    payload: Vec<u8>,
    scan_response: Vec<u8>,
    /// The payload is too long for connectable advertising
    payload_exceeds_connectable_limit: bool,
    /// The controller holds part of a payload that failed to be written
    payload_incomplete: bool,
    interruptible: bool,
    address_kind: Option<PrivateAddressKind>,
    refresh: AddressRefresh,
    /// The host timed out the legacy set
    timed_out: bool,
    duration: Duration,
    max_events: u8,
    periodic: periodic::PeriodicAdvertising,
}

impl AdvertisingSet {
    fn is_busy(&self) -> bool {
        matches!(self.state, SetState::Pending(_) | SetState::Active) || self.refresh == AddressRefresh::AwaitingRestart
    }

    fn is_connectable(&self) -> bool {
        self.parameters
            .map_or(false, |parameters| parameters.advertising_type.is_connectable())
    }

    fn uses_legacy_pdu(&self) -> bool {
        self.parameters.map_or(true, |parameters| parameters.use_legacy_pdu)
    }
}

#[derive(Debug, Default)]
pub(crate) struct AdvertisingSets {
    /// Indexed by handle, empty until the number of sets is read from the controller
    sets: Vec<AdvertisingSet>,
    pub queue: EnableQueue,
    max_data_length: Option<u16>,
}

impl AdvertisingSets {
    fn get(&self, handle: AdvertisingHandle) -> Option<&AdvertisingSet> {
        self.sets.get(handle.index())
    }

    fn get_mut(&mut self, handle: AdvertisingHandle) -> Option<&mut AdvertisingSet> {
        self.sets.get_mut(handle.index())
    }

    fn handles(&self) -> impl Iterator<Item = AdvertisingHandle> + '_ {
        (0..self.sets.len()).filter_map(|index| AdvertisingHandle::try_from(index as u8).ok())
    }

    pub(crate) fn is_busy(&self, handle: AdvertisingHandle) -> bool {
        self.get(handle).map_or(false, |set| set.is_busy())
    }

    pub(crate) fn any_busy(&self) -> bool {
        self.sets.iter().any(|set| set.is_busy() || set.periodic.active)
    }

    /// Check if a busy set uses the filter accept list
    pub(crate) fn uses_filter_accept_list(&self) -> bool {
        self.sets.iter().any(|set| {
            set.is_busy()
                && set
                    .parameters
                    .map_or(false, |parameters| parameters.filter_policy.uses_filter_accept_list())
        })
    }
}

fn advertising_duration_units(duration: Duration) -> Result<u16, Error> {
    let unit = ADVERTISING_DURATION_UNIT.as_micros();

    u16::try_from((duration.as_micros() + unit - 1) / unit).map_err(|_| Error::InvalidParameter)
}

impl<C, P, H> Gap<C, P, H>
where
    C: HostControllerInterface,
    P: Platform,
    H: EventHandler,
{
    /// Get the number of advertising sets, reading it from the controller the first time
    fn advertising_set_count(&mut self) -> Result<usize, Error> {
        if self.advertising.sets.is_empty() {
            let count = if self.extended_advertising_supported() {
                let count = self.hci.read_number_of_supported_advertising_sets()?;

                usize::from(count).clamp(1, usize::from(AdvertisingHandle::MAX) + 1)
            } else {
                1
            };

            log::debug!("(GAP) {} advertising sets available", count);

            self.advertising.sets.resize_with(count, Default::default);
        }

        Ok(self.advertising.sets.len())
    }

    /// Check that an advertising handle is within the number of sets
    fn check_advertising_handle(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        if handle.index() < self.advertising_set_count()? {
            Ok(())
        } else {
            Err(Error::InvalidParameter)
        }
    }

    fn advertising_set(&self, handle: AdvertisingHandle) -> Result<&AdvertisingSet, Error> {
        self.advertising.get(handle).ok_or(Error::InvalidParameter)
    }

    fn advertising_set_mut(&mut self, handle: AdvertisingHandle) -> Result<&mut AdvertisingSet, Error> {
        self.advertising.get_mut(handle).ok_or(Error::InvalidParameter)
    }

    /// Get the maximum number of advertising sets (including the legacy set)
    pub fn get_max_advertising_set_number(&mut self) -> Result<u8, Error> {
        self.advertising_set_count().map(|count| count as u8)
    }

    /// Get the maximum length of advertising data
    ///
    /// This is read from an extended advertising controller the first time.
    pub fn get_max_advertising_data_length(&mut self) -> Result<u16, Error> {
        if !self.extended_advertising_supported() {
            return Ok(LEGACY_ADVERTISING_DATA_LENGTH);
        }

        match self.advertising.max_data_length {
            Some(length) => Ok(length),
            None => {
                let length = self.hci.read_maximum_advertising_data_length()?;

                self.advertising.max_data_length = Some(length);

                Ok(length)
            }
        }
    }

    /// Get the maximum length of advertising data of a connectable set
    pub fn get_max_connectable_advertising_data_length(&mut self) -> Result<u16, Error> {
        self.get_max_advertising_data_length()
            .map(|length| length.min(MAX_CONNECTABLE_ADVERTISING_DATA_LENGTH))
    }

    pub fn is_advertising_active(&self, handle: AdvertisingHandle) -> bool {
        self.advertising
            .get(handle)
            .map_or(false, |set| set.state == SetState::Active)
    }

    pub fn advertising_set_state(&self, handle: AdvertisingHandle) -> SetState {
        self.advertising.get(handle).map_or(SetState::NonExistent, |set| set.state)
    }

    /// Create a new advertising set
    ///
    /// The set gets the lowest free handle other than the legacy handle.
    ///
    /// # Error
    /// * `NotImplemented` - the controller does not support extended advertising
    /// * `NoMemory` - every advertising set is in use
    /// * any error of [`set_advertising_parameters`](Gap::set_advertising_parameters)
    pub fn create_advertising_set(&mut self, parameters: AdvertisingParameters) -> Result<AdvertisingHandle, Error> {
        if !self.extended_advertising_supported() {
            return Err(Error::NotImplemented);
        }

        let count = self.advertising_set_count()?;

        let handle = (1..count)
            .filter_map(|index| AdvertisingHandle::try_from(index as u8).ok())
            .find(|handle| self.advertising_set_state(*handle) == SetState::NonExistent)
            .ok_or(Error::NoMemory)?;

        self.configure_advertising_set(handle, parameters)?;

        log::debug!("(GAP) created advertising set {}", handle);

        Ok(handle)
    }

    /// Destroy an advertising set
    ///
    /// # Error
    /// * `InvalidParameter` - the handle is the legacy handle or the set does not exist
    /// * `InvalidState` - the set is advertising, or periodic advertising is active
    pub fn destroy_advertising_set(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        if !self.extended_advertising_supported() {
            return Err(Error::NotImplemented);
        }

        if handle.is_legacy() {
            return Err(Error::InvalidParameter);
        }

        self.check_advertising_handle(handle)?;

        let set = self.advertising_set(handle)?;

        if set.state == SetState::NonExistent {
            return Err(Error::InvalidParameter);
        }

        if set.is_busy() || set.periodic.active {
            return Err(Error::InvalidState);
        }

        self.hci.remove_advertising_set(handle)?;

        *self.advertising_set_mut(handle)? = AdvertisingSet::default();

        log::debug!("(GAP) destroyed advertising set {}", handle);

        Ok(())
    }

    /// Set the parameters of an advertising set
    ///
    /// Setting the parameters of the legacy set creates it.
    ///
    /// # Error
    /// * `InvalidParameter` - the set does not exist or the parameters are invalid
    /// * `OperationNotPermitted` - the set is advertising (or changing whether it is advertising)
    /// * `NotImplemented` - a PHY of the parameters is not supported
    pub fn set_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        parameters: AdvertisingParameters,
    ) -> Result<(), Error> {
        self.check_advertising_handle(handle)?;

        let set = self.advertising_set(handle)?;

        if set.state == SetState::NonExistent && !handle.is_legacy() {
            return Err(Error::InvalidParameter);
        }

        if set.is_busy() {
            return Err(Error::OperationNotPermitted);
        }

        self.configure_advertising_set(handle, parameters)
    }

    fn configure_advertising_set(
        &mut self,
        handle: AdvertisingHandle,
        mut parameters: AdvertisingParameters,
    ) -> Result<(), Error> {
        if handle.is_legacy() || !self.extended_advertising_supported() {
            parameters.use_legacy_pdu = true;
        }

        parameters.validate()?;

        self.check_advertising_phys(&parameters)?;

        let connectable = parameters.advertising_type.is_connectable();

        if connectable && !cfg!(feature = "peripheral") {
            return Err(Error::NotImplemented);
        }

        let max_connectable_length = usize::from(self.get_max_connectable_advertising_data_length()?);

        let own_address_type = self.own_address_type();

        self.hci
            .set_advertising_parameters(handle, own_address_type, &parameters)?;

        let set = self.advertising_set_mut(handle)?;

        if set.state == SetState::NonExistent {
            set.state = SetState::Configured;
        }

        set.own_address_type = own_address_type;
        set.payload_exceeds_connectable_limit = connectable && set.payload.len() > max_connectable_length;
        set.parameters = Some(parameters);

        Ok(())
    }

    fn check_advertising_phys(&self, parameters: &AdvertisingParameters) -> Result<(), Error> {
        if parameters.use_legacy_pdu {
            return Ok(());
        }

        let coded = parameters.primary_phy == Phy::LeCoded || parameters.secondary_phy == Phy::LeCoded;

        if coded && !self.is_feature_supported(LeFeature::LeCodedPhy) {
            return Err(Error::NotImplemented);
        }

        if parameters.secondary_phy == Phy::Le2M && !self.is_feature_supported(LeFeature::Le2MPhy) {
            return Err(Error::NotImplemented);
        }

        Ok(())
    }

    /// Set the advertising data of a set
    ///
    /// Data longer than the configured fragment length is written in fragments. When writing a
    /// fragment fails the error is returned, the stored payload of the set is unchanged, and the
    /// stored payload is written back to the controller.
    ///
    /// The payload of a connectable set may be longer than
    /// [`get_max_connectable_advertising_data_length`](Gap::get_max_connectable_advertising_data_length),
    /// but such a set cannot start advertising.
    ///
    /// # Error
    /// * `InvalidParameter` - the set does not exist or the payload is too long
    /// * `OperationNotPermitted` - the set is advertising (or changing whether it is advertising)
    pub fn set_advertising_payload(&mut self, handle: AdvertisingHandle, payload: &[u8]) -> Result<(), Error> {
        self.set_payload(handle, AdvertisingDataKind::Advertising, payload)
    }

    /// Set the scan response data of a set
    ///
    /// This has the same requirements as [`set_advertising_payload`](Gap::set_advertising_payload)
    pub fn set_advertising_scan_response(&mut self, handle: AdvertisingHandle, payload: &[u8]) -> Result<(), Error> {
        self.set_payload(handle, AdvertisingDataKind::ScanResponse, payload)
    }

    fn set_payload(&mut self, handle: AdvertisingHandle, kind: AdvertisingDataKind, payload: &[u8]) -> Result<(), Error> {
        self.check_advertising_handle(handle)?;

        let extended = self.extended_advertising_supported();

        let set = self.advertising_set(handle)?;

        if set.state == SetState::NonExistent && !handle.is_legacy() {
            return Err(Error::InvalidParameter);
        }

        if set.is_busy() {
            return Err(Error::OperationNotPermitted);
        }

        let legacy_pdu = !extended || set.uses_legacy_pdu();

        let connectable = set.is_connectable();

        let max_length = if legacy_pdu {
            LEGACY_ADVERTISING_DATA_LENGTH
        } else {
            self.get_max_advertising_data_length()?
        };

        if payload.len() > usize::from(max_length) {
            return Err(Error::InvalidParameter);
        }

        let max_connectable_length = usize::from(self.get_max_connectable_advertising_data_length()?);

        if legacy_pdu {
            self.hci
                .set_advertising_data(handle, kind, FragmentOperation::Complete, payload)?;
        } else if let Err(e) = self.write_payload_fragments(handle, kind, payload) {
            self.rewrite_stored_payload(handle, kind)?;

            return Err(e.into());
        }

        let set = self.advertising_set_mut(handle)?;

        set.payload_incomplete = false;

        match kind {
            AdvertisingDataKind::Advertising => {
                set.payload = payload.to_vec();
                set.payload_exceeds_connectable_limit = connectable && payload.len() > max_connectable_length;

                if set.payload_exceeds_connectable_limit {
                    log::warn!(
                        "(GAP) payload of set {} is too long for connectable advertising",
                        handle
                    );
                }
            }
            AdvertisingDataKind::ScanResponse => set.scan_response = payload.to_vec(),
        }

        Ok(())
    }

    fn write_payload_fragments(
        &mut self,
        handle: AdvertisingHandle,
        kind: AdvertisingDataKind,
        payload: &[u8],
    ) -> Result<(), hci::Error> {
        let fragment_length = usize::from(self.config.max_advertising_fragment_length);

        for (operation, fragment) in Fragments::new(payload, fragment_length) {
            self.hci
                .set_advertising_data(handle, kind, operation, fragment)
                .map_err(|e| {
                    log::error!("(GAP) failed to write {:?} fragment of set {}, {}", operation, handle, e);

                    e
                })?;
        }

        Ok(())
    }

    /// Write the stored payload back after a failed fragmented write
    ///
    /// The controller discards its data on the first fragment, so the set cannot start until a
    /// complete payload is written if this fails too.
    fn rewrite_stored_payload(&mut self, handle: AdvertisingHandle, kind: AdvertisingDataKind) -> Result<(), Error> {
        let set = self.advertising_set(handle)?;

        let stored = match kind {
            AdvertisingDataKind::Advertising => set.payload.clone(),
            AdvertisingDataKind::ScanResponse => set.scan_response.clone(),
        };

        let incomplete = match self.write_payload_fragments(handle, kind, &stored) {
            Ok(()) => false,
            Err(e) => {
                log::error!("(GAP) failed to restore the payload of set {}, {}", handle, e);

                true
            }
        };

        self.advertising_set_mut(handle)?.payload_incomplete = incomplete;

        Ok(())
    }

    /// Start advertising
    ///
    /// Advertising stops on its own after `duration` or after `max_events` advertising events,
    /// zero is no limit for either. The duration is rounded up to a multiple of 10 ms. Only an
    /// extended advertising controller supports a maximum number of events.
    ///
    /// [`on_advertising_start`](super::EventHandler::on_advertising_start) is called once the
    /// controller confirms advertising started.
    ///
    /// # Error
    /// * `InvalidParameter` - the set does not exist, or the duration or number of events is
    ///   invalid
    /// * `Busy` - the set is already starting or stopping
    /// * `InvalidState` - the set is already advertising, there is no address to advertise with, or
    ///   the last payload write failed and the stored payload could not be restored
    /// * `OperationNotPermitted` - the payload is too long for connectable advertising
    pub fn start_advertising(&mut self, handle: AdvertisingHandle, duration: Duration, max_events: u8) -> Result<(), Error> {
        self.check_advertising_handle(handle)?;

        let set = self.advertising_set(handle)?;

        match set.state {
            SetState::NonExistent => return Err(Error::InvalidParameter),
            SetState::Pending(_) => return Err(Error::Busy),
            SetState::Active => return Err(Error::InvalidState),
            SetState::Configured => (),
        }

        if set.payload_exceeds_connectable_limit {
            log::warn!("(GAP) cannot start set {}, its payload is too long", handle);

            return Err(Error::OperationNotPermitted);
        }

        if set.payload_incomplete {
            log::warn!("(GAP) cannot start set {}, its payload was not completely written", handle);

            return Err(Error::InvalidState);
        }

        if !self.extended_advertising_supported() && max_events != 0 {
            return Err(Error::InvalidParameter);
        }

        advertising_duration_units(duration)?;

        self.advertising_set_mut(handle)?.refresh = AddressRefresh::None;

        self.start_advertising_set(handle, duration, max_events)
    }

    fn start_advertising_set(&mut self, handle: AdvertisingHandle, duration: Duration, max_events: u8) -> Result<(), Error> {
        let extended = self.extended_advertising_supported();

        let set = self.advertising_set(handle)?;

        let parameters = set.parameters.ok_or(Error::InvalidState)?;

        let operation = RadioOperation::Advertising {
            connectable: parameters.advertising_type.is_connectable(),
        };

        let own_address_type = self.own_address_type();

        if set.own_address_type != own_address_type {
            self.hci
                .set_advertising_parameters(handle, own_address_type, &parameters)?;

            self.advertising_set_mut(handle)?.own_address_type = own_address_type;
        }

        if own_address_type == OwnAddressType::Random {
            let address = self
                .get_address_for_operation(operation)
                .ok_or(Error::InvalidState)?;

            if extended {
                self.hci.set_advertising_set_random_address(handle, address)?;
            } else {
                self.set_device_random_address(address)?;
            }
        }

        let enable = EnableSet {
            handle,
            duration: if extended { advertising_duration_units(duration)? } else { 0 },
            max_events,
        };

        if !extended {
            self.hci.set_advertising_enable(true, &[enable])?;
        }

        let address_kind = self.private_address_kind(operation);

        let set = self.advertising_set_mut(handle)?;

        set.state = SetState::Pending(Transition::Starting);
        set.in_flight = !extended;
        set.duration = duration;
        set.max_events = max_events;
        set.interruptible = duration == Duration::ZERO && max_events == 0;
        set.address_kind = address_kind;
        set.timed_out = false;

        if extended {
            self.queue_advertising_command(QueuedCommand { enable: true, set: enable });
        }

        log::debug!("(GAP) advertising set {} starting", handle);

        Ok(())
    }

    /// Stop advertising
    ///
    /// A start that was not yet sent to the controller is dropped.
    /// [`on_advertising_end`](super::EventHandler::on_advertising_end) is called once the
    /// controller confirms advertising stopped.
    ///
    /// # Error
    /// * `InvalidParameter` - the set does not exist
    /// * `InvalidState` - the set is not advertising
    pub fn stop_advertising(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        self.check_advertising_handle(handle)?;

        let set = self.advertising_set_mut(handle)?;

        let refresh = core::mem::take(&mut set.refresh);

        match set.state {
            SetState::NonExistent => Err(Error::InvalidParameter),
            SetState::Configured if refresh == AddressRefresh::AwaitingRestart => {
                self.notify_advertising_end(handle, None, 0, hci::Error::NoError);

                Ok(())
            }
            SetState::Configured => Err(Error::InvalidState),
            SetState::Pending(Transition::Stopping) => Ok(()),
            SetState::Pending(Transition::Starting) if !set.in_flight => {
                set.state = SetState::Configured;

                self.advertising.queue.remove(handle);

                if refresh == AddressRefresh::Restarting {
                    self.notify_advertising_end(handle, None, 0, hci::Error::NoError);
                }

                Ok(())
            }
            SetState::Pending(Transition::Starting) | SetState::Active => self.disable_advertising_set(handle),
        }
    }

    /// Disable an advertising set that is advertising (or whose start is in flight)
    fn disable_advertising_set(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        let disable = EnableSet {
            handle,
            duration: 0,
            max_events: 0,
        };

        if self.extended_advertising_supported() {
            let set = self.advertising_set_mut(handle)?;

            if set.state == SetState::Active {
                set.state = SetState::Pending(Transition::Stopping);
            }

            self.queue_advertising_command(QueuedCommand {
                enable: false,
                set: disable,
            });
        } else {
            self.hci.set_advertising_enable(false, &[disable])?;

            self.platform.cancel_timer(TimerId::AdvertisingTimeout);

            let set = self.advertising_set_mut(handle)?;

            set.state = SetState::Pending(Transition::Stopping);
            set.in_flight = true;
        }

        log::debug!("(GAP) advertising set {} stopping", handle);

        Ok(())
    }

    fn queue_advertising_command(&mut self, command: QueuedCommand) {
        if self.advertising.queue.push(command) {
            self.flush_advertising_queue();
        } else if !self.advertising.queue.flush_scheduled {
            self.advertising.queue.flush_scheduled = true;

            self.platform.defer(DeferredWork::FlushAdvertisingQueue);
        }
    }

    /// Send the queued enable and disable commands
    ///
    /// The flush is postponed while any targeted set has a command in flight, it is retried when
    /// that command is confirmed.
    pub(super) fn flush_advertising_queue(&mut self) {
        if self.advertising.queue.is_empty() {
            return;
        }

        let sets = &self.advertising;

        if sets
            .queue
            .handles()
            .any(|handle| sets.get(handle).map_or(false, |set| set.in_flight))
        {
            log::debug!("(GAP) advertising queue flush postponed");

            self.advertising.queue.flush_postponed = true;

            return;
        }

        self.advertising.queue.flush_postponed = false;

        let (disables, enables) = self.advertising.queue.take();

        if !disables.is_empty() {
            let result = self.hci.set_advertising_enable(false, &disables);

            if let Err(e) = result {
                log::error!("(GAP) failed to disable advertising sets, {}", e);
            }

            for disable in &disables {
                if let Some(set) = self.advertising.get_mut(disable.handle) {
                    if result.is_ok() {
                        set.state = SetState::Pending(Transition::Stopping);
                        set.in_flight = true;
                    } else {
                        set.state = SetState::Active;
                        set.refresh = AddressRefresh::None;
                    }
                }
            }
        }

        if !enables.is_empty() {
            match self.hci.set_advertising_enable(true, &enables) {
                Ok(()) => {
                    for enable in &enables {
                        if let Some(set) = self.advertising.get_mut(enable.handle) {
                            set.in_flight = true;
                        }
                    }
                }
                Err(e) => {
                    log::error!("(GAP) failed to enable advertising sets, {}", e);

                    for enable in &enables {
                        self.on_advertising_set_start_failed(enable.handle, e);
                    }
                }
            }
        }
    }

    fn on_advertising_set_start_failed(&mut self, handle: AdvertisingHandle, status: hci::Error) {
        let refresh = match self.advertising.get_mut(handle) {
            Some(set) => {
                set.state = SetState::Configured;
                set.in_flight = false;

                core::mem::take(&mut set.refresh)
            }
            None => return,
        };

        self.advertising.queue.remove(handle);

        if refresh == AddressRefresh::Restarting {
            self.notify_advertising_end(handle, None, 0, status);
        } else {
            self.notify(|h| h.on_advertising_start(&AdvertisingStart { handle, status }));
        }
    }

    fn notify_advertising_end(
        &mut self,
        handle: AdvertisingHandle,
        connection_handle: Option<ConnectionHandle>,
        completed_events: u8,
        status: hci::Error,
    ) {
        let end = AdvertisingEnd {
            handle,
            connection_handle,
            completed_events,
            status,
        };

        self.notify(|h| h.on_advertising_end(&end));
    }

    pub(super) fn on_advertising_set_started(&mut self, handles: &[AdvertisingHandle], status: hci::Error) {
        let extended = self.extended_advertising_supported();

        for &handle in handles {
            let set = match self.advertising.get_mut(handle) {
                Some(set) if set.state == SetState::Pending(Transition::Starting) => set,
                _ => {
                    log::warn!("(GAP) unexpected start confirmation for advertising set {}", handle);

                    continue;
                }
            };

            if !status.is_ok() {
                log::warn!("(GAP) advertising set {} failed to start, {}", handle, status);

                self.on_advertising_set_start_failed(handle, status);

                continue;
            }

            set.state = SetState::Active;
            set.in_flight = false;

            let restarted = core::mem::take(&mut set.refresh) == AddressRefresh::Restarting;

            let duration = set.duration;

            if !extended && duration != Duration::ZERO {
                self.platform.start_timer(TimerId::AdvertisingTimeout, duration);
            }

            if !restarted {
                self.notify(|h| h.on_advertising_start(&AdvertisingStart { handle, status }));
            }
        }

        if self.advertising.queue.flush_postponed {
            self.flush_advertising_queue();
        }

        if !extended && !status.is_ok() {
            self.resume_suspended_operations();
        }
    }

    pub(super) fn on_advertising_set_terminated(&mut self, terminated: AdvertisingSetTerminated) {
        let extended = self.extended_advertising_supported();

        let handle = terminated.handle;

        let set = match self.advertising.get_mut(handle) {
            Some(set) if matches!(set.state, SetState::Active | SetState::Pending(_)) => set,
            _ => {
                log::warn!("(GAP) unexpected termination of advertising set {}", handle);

                return;
            }
        };

        set.state = SetState::Configured;
        set.in_flight = false;

        let refresh = core::mem::take(&mut set.refresh);

        let timed_out = core::mem::take(&mut set.timed_out);

        self.advertising.queue.remove(handle);

        if !extended {
            self.platform.cancel_timer(TimerId::AdvertisingTimeout);
        }

        if refresh == AddressRefresh::Stopping && terminated.connection_handle.is_none() {
            if extended {
                if let Err(e) = self.restart_advertising(handle) {
                    log::warn!("(GAP) advertising set {} could not be restarted, {}", handle, e);

                    self.notify_advertising_end(handle, None, 0, e.controller_status());
                }
            } else if let Some(set) = self.advertising.get_mut(handle) {
                set.refresh = AddressRefresh::AwaitingRestart;
            }
        } else {
            let status = if timed_out {
                hci::Error::AdvertisingTimeout
            } else {
                terminated.status
            };

            self.notify_advertising_end(
                handle,
                terminated.connection_handle,
                terminated.completed_events,
                status,
            );
        }

        if self.advertising.queue.flush_postponed {
            self.flush_advertising_queue();
        }

        if !extended {
            self.resume_suspended_operations();
        }
    }

    /// Restart a set stopped for an address refresh
    fn restart_advertising(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        let set = self.advertising_set(handle)?;

        let (duration, max_events) = (set.duration, set.max_events);

        self.start_advertising_set(handle, duration, max_events)?;

        self.advertising_set_mut(handle)?.refresh = AddressRefresh::Restarting;

        Ok(())
    }

    /// Restart the legacy set of a controller without extended advertising after its address
    /// refresh
    pub(super) fn restart_suspended_legacy_advertising(&mut self) {
        let handle = AdvertisingHandle::LEGACY;

        let awaiting = self
            .advertising
            .get(handle)
            .map_or(false, |set| set.refresh == AddressRefresh::AwaitingRestart);

        if !awaiting {
            return;
        }

        // the device address is shared with a scan that is still stopping
        if self.scan_state() == ScanState::PendingStop {
            log::debug!("(GAP) legacy advertising waiting for the scan to stop");

            return;
        }

        match self.restart_advertising(handle) {
            Ok(()) => (),
            Err(Error::InvalidState) => log::debug!("(GAP) legacy advertising waiting for the device address"),
            Err(e) => {
                log::warn!("(GAP) legacy advertising could not be restarted, {}", e);

                if let Some(set) = self.advertising.get_mut(handle) {
                    set.refresh = AddressRefresh::None;
                }

                self.notify_advertising_end(handle, None, 0, e.controller_status());
            }
        }
    }

    /// Stop the interruptible sets using a private address that was regenerated
    pub(super) fn refresh_advertising_addresses(&mut self, kind: PrivateAddressKind) {
        let handles: Vec<AdvertisingHandle> = self
            .advertising
            .handles()
            .filter(|handle| {
                self.advertising.get(*handle).map_or(false, |set| {
                    set.state == SetState::Active
                        && set.interruptible
                        && set.address_kind == Some(kind)
                        && set.refresh == AddressRefresh::None
                })
            })
            .collect();

        for handle in handles {
            log::debug!("(GAP) stopping advertising set {} to refresh its address", handle);

            match self.disable_advertising_set(handle) {
                Ok(()) => {
                    if let Some(set) = self.advertising.get_mut(handle) {
                        set.refresh = AddressRefresh::Stopping;
                    }
                }
                Err(e) => log::error!("(GAP) failed to stop advertising set {}, {}", handle, e),
            }
        }
    }

    /// The advertising duration of the legacy set timed by the host has expired
    pub(super) fn on_legacy_advertising_timer_expired(&mut self) {
        let handle = AdvertisingHandle::LEGACY;

        if self.advertising_set_state(handle) != SetState::Active {
            return;
        }

        match self.disable_advertising_set(handle) {
            Ok(()) => {
                if let Some(set) = self.advertising.get_mut(handle) {
                    set.timed_out = true;
                }
            }
            Err(e) => log::error!("(GAP) failed to stop timed out advertising, {}", e),
        }
    }

    /// A connection as a peripheral ended the advertising of a controller without extended
    /// advertising
    pub(crate) fn on_legacy_advertising_connected(&mut self, status: hci::Error, connection_handle: ConnectionHandle) {
        if self.extended_advertising_supported() {
            return;
        }

        let handle = AdvertisingHandle::LEGACY;

        match self.advertising.get_mut(handle) {
            Some(set) if matches!(set.state, SetState::Active | SetState::Pending(_)) => {
                set.state = SetState::Configured;
                set.in_flight = false;
                set.refresh = AddressRefresh::None;
                set.timed_out = false;
            }
            _ => return,
        }

        self.platform.cancel_timer(TimerId::AdvertisingTimeout);

        let connection_handle = status.is_ok().then(|| connection_handle);

        self.notify_advertising_end(handle, connection_handle, 0, status);

        self.resume_suspended_operations();
    }
}
