//! Events from the controller
//!
//! These are the events that the GAP controller processes. They are produced by the implementation
//! of [`HostControllerInterface`](super::HostControllerInterface), either by parsing the
//! corresponding HCI event or, for the enable/disable confirmations, from the command complete
//! event of the command.

use super::common::{AdvertisingHandle, ConnectionHandle, Phy, Role, SyncHandle};
use super::error::Error;
use crate::address::{BluetoothDeviceAddress, PeerAddressType};
use alloc::vec::Vec;
use le_gap_macros::EventName;

/// The properties of a received advertising PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvertisingReportProperties {
    pub connectable: bool,
    pub scannable: bool,
    pub directed: bool,
    pub scan_response: bool,
    pub legacy: bool,
}

/// An advertising report
///
/// This is a single report of either a legacy or an extended advertising report event. The fields
/// that exist only in extended reports are `None` for a legacy report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingReport {
    pub properties: AdvertisingReportProperties,
    pub peer_address_type: PeerAddressType,
    pub peer_address: BluetoothDeviceAddress,
    pub primary_phy: Phy,
    pub secondary_phy: Option<Phy>,
    pub sid: Option<u8>,
    pub tx_power: Option<i8>,
    pub rssi: Option<i8>,
    /// The periodic advertising interval in units of 1.25 ms
    pub periodic_advertising_interval: Option<u16>,
    pub direct_address: Option<(PeerAddressType, BluetoothDeviceAddress)>,
    pub data: Vec<u8>,
}

/// The end of advertising for an advertising set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingSetTerminated {
    pub status: Error,
    pub handle: AdvertisingHandle,
    /// The connection that was created, if advertising ended because of a connection
    pub connection_handle: Option<ConnectionHandle>,
    pub completed_events: u8,
}

/// A scan request was received by an advertising set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequestReceived {
    pub handle: AdvertisingHandle,
    pub scanner_address_type: PeerAddressType,
    pub scanner_address: BluetoothDeviceAddress,
}

/// A connection was created (or the creation failed)
///
/// The interval is in units of 1.25 ms, and the supervision timeout is in units of 10 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionComplete {
    pub status: Error,
    pub connection_handle: ConnectionHandle,
    pub role: Role,
    pub peer_address_type: PeerAddressType,
    pub peer_address: BluetoothDeviceAddress,
    pub local_resolvable_private_address: Option<BluetoothDeviceAddress>,
    pub peer_resolvable_private_address: Option<BluetoothDeviceAddress>,
    pub connection_interval: u16,
    pub peripheral_latency: u16,
    pub supervision_timeout: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectionComplete {
    pub status: Error,
    pub connection_handle: ConnectionHandle,
    pub reason: Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionUpdateComplete {
    pub status: Error,
    pub connection_handle: ConnectionHandle,
    pub connection_interval: u16,
    pub peripheral_latency: u16,
    pub supervision_timeout: u16,
}

/// The peer requested new connection parameters
///
/// The intervals are in units of 1.25 ms, and the timeout is in units of 10 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteConnectionParameterRequest {
    pub connection_handle: ConnectionHandle,
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub timeout: u16,
}

/// The PHYs of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyUpdate {
    pub status: Error,
    pub connection_handle: ConnectionHandle,
    pub tx_phy: Phy,
    pub rx_phy: Phy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicAdvertisingSyncEstablished {
    pub status: Error,
    pub sync_handle: SyncHandle,
    pub sid: u8,
    pub advertiser_address_type: PeerAddressType,
    pub advertiser_address: BluetoothDeviceAddress,
    pub advertiser_phy: Phy,
    /// The periodic advertising interval in units of 1.25 ms
    pub periodic_advertising_interval: u16,
}

/// The completeness of the data within a periodic advertising report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    Complete,
    /// More reports will follow with the rest of the data
    Incomplete,
    /// The data is incomplete and no more reports will follow
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicAdvertisingReport {
    pub sync_handle: SyncHandle,
    pub tx_power: Option<i8>,
    pub rssi: Option<i8>,
    pub data_status: DataStatus,
    pub data: Vec<u8>,
}

/// An event from the controller
#[derive(Debug, Clone, PartialEq, Eq, EventName)]
pub enum Event {
    /// Confirmation of the command to enable scanning
    ScanStarted { status: Error },
    /// Confirmation of the command to disable scanning
    ScanStopped { status: Error },
    /// The scan duration of an extended advertising controller has expired
    ScanTimeout,
    AdvertisingReport(AdvertisingReport),
    /// Confirmation of the command to enable the advertising sets `handles`
    AdvertisingSetStarted {
        handles: Vec<AdvertisingHandle>,
        status: Error,
    },
    /// An advertising set stopped advertising
    ///
    /// This is sent for every set disabled by the host as well as for the sets that stopped on
    /// their own (duration expired, maximum events reached, or a connection was made).
    AdvertisingSetTerminated(AdvertisingSetTerminated),
    ScanRequestReceived(ScanRequestReceived),
    ConnectionComplete(ConnectionComplete),
    DisconnectionComplete(DisconnectionComplete),
    ConnectionUpdateComplete(ConnectionUpdateComplete),
    RemoteConnectionParameterRequest(RemoteConnectionParameterRequest),
    PhyUpdateComplete(PhyUpdate),
    ReadPhyComplete(PhyUpdate),
    PeriodicAdvertisingSyncEstablished(PeriodicAdvertisingSyncEstablished),
    PeriodicAdvertisingReport(PeriodicAdvertisingReport),
    PeriodicAdvertisingSyncLost { sync_handle: SyncHandle },
}
