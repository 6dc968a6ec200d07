//! The Host Controller Interface as seen by the GAP controller
//!
//! The GAP controller does not talk to a Bluetooth controller directly. Instead it issues commands
//! through an implementation of [`HostControllerInterface`] and is fed back the controller's events
//! as an [`Event`](events::Event). How the commands are packaged, sent, and how the resulting
//! events are collected is up to the implementation of the interface.
//!
//! Every command returns immediately with either an acceptance or the reason why the controller
//! (or the transport) rejected it. Operations that complete later are confirmed with an event.

pub mod common;
pub mod error;
pub mod events;

use crate::address::{BluetoothDeviceAddress, IdentityAddressType, OwnAddressType, PeerAddressType};
use crate::gap::advertise::{AdvertisingParameters, PeriodicAdvertisingParameters};
use crate::gap::connection::{ConnectionParameters, ConnectionUpdateParameters};
use crate::gap::scan::ScanParameters;
use common::{AdvertisingHandle, CodedPhyOption, ConnectionHandle, LeFeatures, PhySet, SyncHandle, SyncTimeout};

pub use error::Error;

/// The reason given to the peer when disconnecting
///
/// These are the only controller error codes permitted as the reason of a disconnect command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    AuthenticationFailure,
    RemoteUserTerminatedConnection,
    RemoteDeviceTerminatedConnectionDueToLowResources,
    RemoteDeviceTerminatedConnectionDueToPowerOff,
    UnsupportedRemoteFeature,
    PairingWithUnitKeyNotSupported,
    UnacceptableConnectionParameters,
}

impl DisconnectReason {
    /// Get the controller error code sent as the reason
    pub fn into_raw(self) -> u8 {
        match self {
            DisconnectReason::AuthenticationFailure => 0x05,
            DisconnectReason::RemoteUserTerminatedConnection => 0x13,
            DisconnectReason::RemoteDeviceTerminatedConnectionDueToLowResources => 0x14,
            DisconnectReason::RemoteDeviceTerminatedConnectionDueToPowerOff => 0x15,
            DisconnectReason::UnsupportedRemoteFeature => 0x1A,
            DisconnectReason::PairingWithUnitKeyNotSupported => 0x29,
            DisconnectReason::UnacceptableConnectionParameters => 0x3B,
        }
    }
}

/// An entry of the controller's filter accept list (white list)
///
/// Only identity addresses can be in the list, the anonymous address type is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct FilterAcceptListEntry {
    pub address_type: IdentityAddressType,
    pub address: BluetoothDeviceAddress,
}

impl FilterAcceptListEntry {
    pub fn new(address_type: IdentityAddressType, address: BluetoothDeviceAddress) -> Self {
        FilterAcceptListEntry { address_type, address }
    }
}

/// Duplicate filtering of advertising reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatesFilter {
    Disabled,
    Enabled,
    /// Duplicate filtering is reset at the start of each scan period
    ///
    /// This requires an extended advertising controller.
    PeriodicReset,
}

impl DuplicatesFilter {
    pub fn into_raw(self) -> u8 {
        match self {
            DuplicatesFilter::Disabled => 0x00,
            DuplicatesFilter::Enabled => 0x01,
            DuplicatesFilter::PeriodicReset => 0x02,
        }
    }
}

/// Parameter of the scan enable command
///
/// The duration is in units of 10 ms and the period in units of 1.28 s, both zero on a controller
/// that does not support extended advertising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEnable {
    pub enable: bool,
    pub filter_duplicates: DuplicatesFilter,
    pub duration: u16,
    pub period: u16,
}

/// The payload an advertising data command sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingDataKind {
    Advertising,
    ScanResponse,
}

/// The operation of an advertising data fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOperation {
    Intermediate,
    First,
    Last,
    Complete,
}

impl FragmentOperation {
    pub fn into_raw(self) -> u8 {
        match self {
            FragmentOperation::Intermediate => 0x00,
            FragmentOperation::First => 0x01,
            FragmentOperation::Last => 0x02,
            FragmentOperation::Complete => 0x03,
        }
    }
}

/// An advertising set to enable or disable
///
/// `duration` is in units of 10 ms, zero means there is no duration. A `max_events` of zero means
/// there is no maximum number of advertising events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableSet {
    pub handle: AdvertisingHandle,
    pub duration: u16,
    pub max_events: u8,
}

/// A device within the periodic advertiser list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodicAdvertiser {
    pub address_type: PeerAddressType,
    pub address: BluetoothDeviceAddress,
    pub sid: u8,
}

/// Parameters of the periodic advertising create sync command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateSyncParameters {
    /// The advertiser to synchronize with, `None` when the periodic advertiser list is used
    pub advertiser: Option<PeriodicAdvertiser>,
    pub skip: u16,
    pub sync_timeout: SyncTimeout,
}

/// The interface to the Bluetooth controller
///
/// This is implemented by the transport layer of the host. Every method sends the corresponding
/// HCI command and returns whether the command was accepted. Commands that are *read* commands
/// return their result directly.
pub trait HostControllerInterface {
    fn read_public_address(&mut self) -> Result<BluetoothDeviceAddress, Error>;

    fn read_local_supported_features(&mut self) -> Result<LeFeatures, Error>;

    fn read_filter_accept_list_size(&mut self) -> Result<u8, Error>;

    fn read_number_of_supported_advertising_sets(&mut self) -> Result<u8, Error>;

    fn read_maximum_advertising_data_length(&mut self) -> Result<u16, Error>;

    fn read_periodic_advertiser_list_size(&mut self) -> Result<u8, Error>;

    fn set_random_address(&mut self, address: BluetoothDeviceAddress) -> Result<(), Error>;

    fn set_address_resolution_enable(&mut self, enable: bool) -> Result<(), Error>;

    fn add_device_to_filter_accept_list(&mut self, entry: FilterAcceptListEntry) -> Result<(), Error>;

    fn remove_device_from_filter_accept_list(&mut self, entry: FilterAcceptListEntry) -> Result<(), Error>;

    fn set_scan_parameters(
        &mut self,
        own_address_type: OwnAddressType,
        parameters: &ScanParameters,
    ) -> Result<(), Error>;

    fn set_scan_enable(&mut self, enable: ScanEnable) -> Result<(), Error>;

    fn set_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        own_address_type: OwnAddressType,
        parameters: &AdvertisingParameters,
    ) -> Result<(), Error>;

    fn set_advertising_set_random_address(
        &mut self,
        handle: AdvertisingHandle,
        address: BluetoothDeviceAddress,
    ) -> Result<(), Error>;

    fn set_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        kind: AdvertisingDataKind,
        operation: FragmentOperation,
        data: &[u8],
    ) -> Result<(), Error>;

    fn set_advertising_enable(&mut self, enable: bool, sets: &[EnableSet]) -> Result<(), Error>;

    fn remove_advertising_set(&mut self, handle: AdvertisingHandle) -> Result<(), Error>;

    fn set_periodic_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        parameters: &PeriodicAdvertisingParameters,
    ) -> Result<(), Error>;

    fn set_periodic_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: FragmentOperation,
        data: &[u8],
    ) -> Result<(), Error>;

    fn set_periodic_advertising_enable(&mut self, enable: bool, handle: AdvertisingHandle) -> Result<(), Error>;

    fn periodic_advertising_create_sync(&mut self, parameters: &CreateSyncParameters) -> Result<(), Error>;

    fn periodic_advertising_create_sync_cancel(&mut self) -> Result<(), Error>;

    fn periodic_advertising_terminate_sync(&mut self, handle: SyncHandle) -> Result<(), Error>;

    fn add_device_to_periodic_advertiser_list(&mut self, advertiser: PeriodicAdvertiser) -> Result<(), Error>;

    fn remove_device_from_periodic_advertiser_list(&mut self, advertiser: PeriodicAdvertiser) -> Result<(), Error>;

    fn clear_periodic_advertiser_list(&mut self) -> Result<(), Error>;

    fn create_connection(
        &mut self,
        own_address_type: OwnAddressType,
        peer_address_type: PeerAddressType,
        peer_address: BluetoothDeviceAddress,
        parameters: &ConnectionParameters,
    ) -> Result<(), Error>;

    fn create_connection_cancel(&mut self) -> Result<(), Error>;

    fn connection_update(
        &mut self,
        handle: ConnectionHandle,
        parameters: &ConnectionUpdateParameters,
    ) -> Result<(), Error>;

    fn remote_connection_parameter_request_reply(
        &mut self,
        handle: ConnectionHandle,
        parameters: &ConnectionUpdateParameters,
    ) -> Result<(), Error>;

    fn remote_connection_parameter_request_negative_reply(
        &mut self,
        handle: ConnectionHandle,
        reason: Error,
    ) -> Result<(), Error>;

    fn disconnect(&mut self, handle: ConnectionHandle, reason: DisconnectReason) -> Result<(), Error>;

    fn set_default_phy(&mut self, tx: PhySet, rx: PhySet) -> Result<(), Error>;

    fn set_phy(
        &mut self,
        handle: ConnectionHandle,
        tx: PhySet,
        rx: PhySet,
        coded_option: CodedPhyOption,
    ) -> Result<(), Error>;

    fn read_phy(&mut self, handle: ConnectionHandle) -> Result<(), Error>;
}

/// The interface is often owned by something else, so a mutable reference can be used as well
impl<T> HostControllerInterface for &mut T
where
    T: HostControllerInterface + ?Sized,
{
    fn read_public_address(&mut self) -> Result<BluetoothDeviceAddress, Error> {
        (**self).read_public_address()
    }

    fn read_local_supported_features(&mut self) -> Result<LeFeatures, Error> {
        (**self).read_local_supported_features()
    }

    fn read_filter_accept_list_size(&mut self) -> Result<u8, Error> {
        (**self).read_filter_accept_list_size()
    }

    fn read_number_of_supported_advertising_sets(&mut self) -> Result<u8, Error> {
        (**self).read_number_of_supported_advertising_sets()
    }

    fn read_maximum_advertising_data_length(&mut self) -> Result<u16, Error> {
        (**self).read_maximum_advertising_data_length()
    }

    fn read_periodic_advertiser_list_size(&mut self) -> Result<u8, Error> {
        (**self).read_periodic_advertiser_list_size()
    }

    fn set_random_address(&mut self, address: BluetoothDeviceAddress) -> Result<(), Error> {
        (**self).set_random_address(address)
    }

    fn set_address_resolution_enable(&mut self, enable: bool) -> Result<(), Error> {
        (**self).set_address_resolution_enable(enable)
    }

    fn add_device_to_filter_accept_list(&mut self, entry: FilterAcceptListEntry) -> Result<(), Error> {
        (**self).add_device_to_filter_accept_list(entry)
    }

    fn remove_device_from_filter_accept_list(&mut self, entry: FilterAcceptListEntry) -> Result<(), Error> {
        (**self).remove_device_from_filter_accept_list(entry)
    }

    fn set_scan_parameters(
        &mut self,
        own_address_type: OwnAddressType,
        parameters: &ScanParameters,
    ) -> Result<(), Error> {
        (**self).set_scan_parameters(own_address_type, parameters)
    }

    fn set_scan_enable(&mut self, enable: ScanEnable) -> Result<(), Error> {
        (**self).set_scan_enable(enable)
    }

    fn set_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        own_address_type: OwnAddressType,
        parameters: &AdvertisingParameters,
    ) -> Result<(), Error> {
        (**self).set_advertising_parameters(handle, own_address_type, parameters)
    }

    fn set_advertising_set_random_address(
        &mut self,
        handle: AdvertisingHandle,
        address: BluetoothDeviceAddress,
    ) -> Result<(), Error> {
        (**self).set_advertising_set_random_address(handle, address)
    }

    fn set_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        kind: AdvertisingDataKind,
        operation: FragmentOperation,
        data: &[u8],
    ) -> Result<(), Error> {
        (**self).set_advertising_data(handle, kind, operation, data)
    }

    fn set_advertising_enable(&mut self, enable: bool, sets: &[EnableSet]) -> Result<(), Error> {
        (**self).set_advertising_enable(enable, sets)
    }

    fn remove_advertising_set(&mut self, handle: AdvertisingHandle) -> Result<(), Error> {
        (**self).remove_advertising_set(handle)
    }

    fn set_periodic_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        parameters: &PeriodicAdvertisingParameters,
    ) -> Result<(), Error> {
        (**self).set_periodic_advertising_parameters(handle, parameters)
    }

    fn set_periodic_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: FragmentOperation,
        data: &[u8],
    ) -> Result<(), Error> {
        (**self).set_periodic_advertising_data(handle, operation, data)
    }

    fn set_periodic_advertising_enable(&mut self, enable: bool, handle: AdvertisingHandle) -> Result<(), Error> {
        (**self).set_periodic_advertising_enable(enable, handle)
    }

    fn periodic_advertising_create_sync(&mut self, parameters: &CreateSyncParameters) -> Result<(), Error> {
        (**self).periodic_advertising_create_sync(parameters)
    }

    fn periodic_advertising_create_sync_cancel(&mut self) -> Result<(), Error> {
        (**self).periodic_advertising_create_sync_cancel()
    }

    fn periodic_advertising_terminate_sync(&mut self, handle: SyncHandle) -> Result<(), Error> {
        (**self).periodic_advertising_terminate_sync(handle)
    }

    fn add_device_to_periodic_advertiser_list(&mut self, advertiser: PeriodicAdvertiser) -> Result<(), Error> {
        (**self).add_device_to_periodic_advertiser_list(advertiser)
    }

    fn remove_device_from_periodic_advertiser_list(&mut self, advertiser: PeriodicAdvertiser) -> Result<(), Error> {
        (**self).remove_device_from_periodic_advertiser_list(advertiser)
    }

    fn clear_periodic_advertiser_list(&mut self) -> Result<(), Error> {
        (**self).clear_periodic_advertiser_list()
    }

    fn create_connection(
        &mut self,
        own_address_type: OwnAddressType,
        peer_address_type: PeerAddressType,
        peer_address: BluetoothDeviceAddress,
        parameters: &ConnectionParameters,
    ) -> Result<(), Error> {
        (**self).create_connection(own_address_type, peer_address_type, peer_address, parameters)
    }

    fn create_connection_cancel(&mut self) -> Result<(), Error> {
        (**self).create_connection_cancel()
    }

    fn connection_update(
        &mut self,
        handle: ConnectionHandle,
        parameters: &ConnectionUpdateParameters,
    ) -> Result<(), Error> {
        (**self).connection_update(handle, parameters)
    }

    fn remote_connection_parameter_request_reply(
        &mut self,
        handle: ConnectionHandle,
        parameters: &ConnectionUpdateParameters,
    ) -> Result<(), Error> {
        (**self).remote_connection_parameter_request_reply(handle, parameters)
    }

    fn remote_connection_parameter_request_negative_reply(
        &mut self,
        handle: ConnectionHandle,
        reason: Error,
    ) -> Result<(), Error> {
        (**self).remote_connection_parameter_request_negative_reply(handle, reason)
    }

    fn disconnect(&mut self, handle: ConnectionHandle, reason: DisconnectReason) -> Result<(), Error> {
        (**self).disconnect(handle, reason)
    }

    fn set_default_phy(&mut self, tx: PhySet, rx: PhySet) -> Result<(), Error> {
        (**self).set_default_phy(tx, rx)
    }

    fn set_phy(
        &mut self,
        handle: ConnectionHandle,
        tx: PhySet,
        rx: PhySet,
        coded_option: CodedPhyOption,
    ) -> Result<(), Error> {
        (**self).set_phy(handle, tx, rx, coded_option)
    }

    fn read_phy(&mut self, handle: ConnectionHandle) -> Result<(), Error> {
        (**self).read_phy(handle)
    }
}
