//! Application notifications

use crate::hci;
use crate::hci::common::{AdvertisingHandle, ConnectionHandle, SyncHandle};
use crate::hci::events::{
    AdvertisingReport, ConnectionComplete, ConnectionUpdateComplete, DisconnectionComplete,
    PeriodicAdvertisingReport, PeriodicAdvertisingSyncEstablished, PhyUpdate, RemoteConnectionParameterRequest,
    ScanRequestReceived,
};

/// An advertising set started advertising (or failed to)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingStart {
    pub handle: AdvertisingHandle,
    pub status: hci::Error,
}

/// An advertising set stopped advertising
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingEnd {
    pub handle: AdvertisingHandle,
    /// The connection created by the advertising, if advertising ended because of a connection
    pub connection_handle: Option<ConnectionHandle>,
    pub completed_events: u8,
    pub status: hci::Error,
}

/// The application's event handler
///
/// Every method has an empty default implementation, so only the notifications of interest need
/// to be implemented.
///
/// Addresses within reports and connection events are already resolved when the host resolves
/// private addresses. In that case the peer address type is one of the identity types.
#[allow(unused_variables)]
pub trait EventHandler {
    /// Scanning started, or failed to start when `status` is not `NoError`
    fn on_scan_started(&mut self, status: hci::Error) {}

    /// Scanning stopped because its duration expired
    fn on_scan_timeout(&mut self) {}

    fn on_advertising_report(&mut self, report: &AdvertisingReport) {}

    fn on_scan_request_received(&mut self, request: &ScanRequestReceived) {}

    fn on_advertising_start(&mut self, event: &AdvertisingStart) {}

    fn on_advertising_end(&mut self, event: &AdvertisingEnd) {}

    fn on_connection_complete(&mut self, event: &ConnectionComplete) {}

    fn on_disconnection_complete(&mut self, event: &DisconnectionComplete) {}

    /// The peer requested new connection parameters
    ///
    /// This is only called after the application opted into managing these requests with
    /// [`manage_connection_parameters_update_request`]. The application must answer with either
    /// [`accept_connection_parameters_update`] or [`reject_connection_parameters_update`].
    ///
    /// [`manage_connection_parameters_update_request`]: crate::gap::Gap::manage_connection_parameters_update_request
    /// [`accept_connection_parameters_update`]: crate::gap::Gap::accept_connection_parameters_update
    /// [`reject_connection_parameters_update`]: crate::gap::Gap::reject_connection_parameters_update
    fn on_update_connection_parameters_request(&mut self, request: &RemoteConnectionParameterRequest) {}

    fn on_connection_parameters_update_complete(&mut self, event: &ConnectionUpdateComplete) {}

    fn on_phy_update_complete(&mut self, event: &PhyUpdate) {}

    fn on_read_phy(&mut self, event: &PhyUpdate) {}

    /// Privacy is enabled and the first private addresses were generated
    fn on_privacy_enabled(&mut self) {}

    fn on_periodic_advertising_sync_established(&mut self, event: &PeriodicAdvertisingSyncEstablished) {}

    fn on_periodic_advertising_report(&mut self, report: &PeriodicAdvertisingReport) {}

    fn on_periodic_advertising_sync_loss(&mut self, sync_handle: SyncHandle) {}
}

/// An event handler that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEventHandler;

impl EventHandler for NoEventHandler {}

impl<T> EventHandler for &mut T
where
    T: EventHandler + ?Sized,
{
    fn on_scan_started(&mut self, status: hci::Error) {
        (**self).on_scan_started(status)
    }

    fn on_scan_timeout(&mut self) {
        (**self).on_scan_timeout()
    }

    fn on_advertising_report(&mut self, report: &AdvertisingReport) {
        (**self).on_advertising_report(report)
    }

    fn on_scan_request_received(&mut self, request: &ScanRequestReceived) {
        (**self).on_scan_request_received(request)
    }

    fn on_advertising_start(&mut self, event: &AdvertisingStart) {
        (**self).on_advertising_start(event)
    }

    fn on_advertising_end(&mut self, event: &AdvertisingEnd) {
        (**self).on_advertising_end(event)
    }

    fn on_connection_complete(&mut self, event: &ConnectionComplete) {
        (**self).on_connection_complete(event)
    }

    fn on_disconnection_complete(&mut self, event: &DisconnectionComplete) {
        (**self).on_disconnection_complete(event)
    }

    fn on_update_connection_parameters_request(&mut self, request: &RemoteConnectionParameterRequest) {
        (**self).on_update_connection_parameters_request(request)
    }

    fn on_connection_parameters_update_complete(&mut self, event: &ConnectionUpdateComplete) {
        (**self).on_connection_parameters_update_complete(event)
    }

    fn on_phy_update_complete(&mut self, event: &PhyUpdate) {
        (**self).on_phy_update_complete(event)
    }

    fn on_read_phy(&mut self, event: &PhyUpdate) {
        (**self).on_read_phy(event)
    }

    fn on_privacy_enabled(&mut self) {
        (**self).on_privacy_enabled()
    }

    fn on_periodic_advertising_sync_established(&mut self, event: &PeriodicAdvertisingSyncEstablished) {
        (**self).on_periodic_advertising_sync_established(event)
    }

    fn on_periodic_advertising_report(&mut self, report: &PeriodicAdvertisingReport) {
        (**self).on_periodic_advertising_report(report)
    }

    fn on_periodic_advertising_sync_loss(&mut self, sync_handle: SyncHandle) {
        (**self).on_periodic_advertising_sync_loss(sync_handle)
    }
}
