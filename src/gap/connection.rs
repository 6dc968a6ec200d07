//! Connection creation and connection parameters
//!
//! There can be one connection attempt at a time. A connection attempt is usually the controller
//! initiating a connection, but when the host resolves private addresses and the peer is given by
//! its identity address the controller cannot recognize the peer's advertising. Instead the peer
//! is first searched for with a scan, and once its resolvable private address is found the scan is
//! stopped and the connection is initiated to that address.

use super::privacy::{
    BufferedEvent, CentralResolutionStrategy, PeripheralResolutionStrategy, RadioOperation, Resolution,
};
use super::scan::{PhyScanParameters, ScanParameters, ScanState, ScanType, ScanningFilterPolicy};
use super::{EventHandler, Gap};
use crate::address::{BluetoothDeviceAddress, Identity, OwnAddressType, PeerAddressType};
use crate::error::Error;
use crate::hci;
use crate::hci::common::{
    CodedPhyOption, ConnectionEventLength, ConnectionHandle, ConnectionInterval, LeFeature, Phy, PhySet, Role,
    ScanningInterval, ScanningWindow, SupervisionTimeout,
};
use crate::hci::events::{AdvertisingReport, ConnectionComplete, RemoteConnectionParameterRequest};
use crate::hci::{DisconnectReason, HostControllerInterface};
use crate::platform::Platform;

/// The maximum peripheral latency
pub const MAX_LATENCY: u16 = 0x01F3;

/// Check the supervision timeout against the latency and the maximum connection interval
///
/// The supervision timeout must be larger than `(1 + latency) * max_interval * 2`.
pub fn is_supervision_timeout_valid(
    supervision_timeout: SupervisionTimeout,
    latency: u16,
    interval_max: ConnectionInterval,
) -> bool {
    // timeout units are 10 ms and interval units are 1.25 ms
    u32::from(supervision_timeout.get_raw_val()) * 4 > (1 + u32::from(latency)) * u32::from(interval_max.get_raw_val())
}

fn validate_timing(
    interval_min: ConnectionInterval,
    interval_max: ConnectionInterval,
    latency: u16,
    supervision_timeout: SupervisionTimeout,
) -> Result<(), Error> {
    if interval_min > interval_max
        || latency > MAX_LATENCY
        || !is_supervision_timeout_valid(supervision_timeout, latency, interval_max)
    {
        Err(Error::InvalidParameter)
    } else {
        Ok(())
    }
}

/// The initiator filter policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorFilterPolicy {
    /// Connect to the peer address given to `connect`
    PeerAddress,
    /// Connect to any device within the filter accept list, the peer address is ignored
    FilterAcceptList,
}

impl Default for InitiatorFilterPolicy {
    fn default() -> Self {
        InitiatorFilterPolicy::PeerAddress
    }
}

/// Connection parameters of a single PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyConnectionParameters {
    pub scan_interval: ScanningInterval,
    pub scan_window: ScanningWindow,
    pub connection_interval_min: ConnectionInterval,
    pub connection_interval_max: ConnectionInterval,
    pub latency: u16,
    pub supervision_timeout: SupervisionTimeout,
    pub event_length: ConnectionEventLength,
}

impl Default for PhyConnectionParameters {
    fn default() -> Self {
        PhyConnectionParameters {
            scan_interval: ScanningInterval::default(),
            scan_window: ScanningWindow::default(),
            connection_interval_min: ConnectionInterval::default(),
            connection_interval_max: ConnectionInterval::default(),
            latency: 0,
            supervision_timeout: SupervisionTimeout::default(),
            event_length: ConnectionEventLength::default(),
        }
    }
}

impl PhyConnectionParameters {
    pub fn validate(&self) -> Result<(), Error> {
        if self.scan_window.get_raw_val() > self.scan_interval.get_raw_val() {
            return Err(Error::InvalidParameter);
        }

        validate_timing(
            self.connection_interval_min,
            self.connection_interval_max,
            self.latency,
            self.supervision_timeout,
        )
    }

    fn scan_parameters(&self) -> PhyScanParameters {
        PhyScanParameters {
            scan_type: ScanType::Passive,
            interval: self.scan_interval,
            window: self.scan_window,
        }
    }
}

/// The parameters for creating a connection
///
/// A connection is initiated on every PHY with parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub filter_policy: InitiatorFilterPolicy,
    pub le_1m: Option<PhyConnectionParameters>,
    pub le_2m: Option<PhyConnectionParameters>,
    pub le_coded: Option<PhyConnectionParameters>,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        ConnectionParameters {
            filter_policy: InitiatorFilterPolicy::default(),
            le_1m: Some(PhyConnectionParameters::default()),
            le_2m: None,
            le_coded: None,
        }
    }
}

impl ConnectionParameters {
    fn phys(&self) -> impl Iterator<Item = (Phy, &PhyConnectionParameters)> + '_ {
        [
            (Phy::Le1M, self.le_1m.as_ref()),
            (Phy::Le2M, self.le_2m.as_ref()),
            (Phy::LeCoded, self.le_coded.as_ref()),
        ]
        .into_iter()
        .filter_map(|(phy, parameters)| parameters.map(|p| (phy, p)))
    }

    /// Validate the parameters
    ///
    /// # Error
    /// `InvalidParameter` is returned if there are no parameters for any PHY or the parameters of a
    /// PHY are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if self.phys().next().is_none() {
            return Err(Error::InvalidParameter);
        }

        self.phys().try_for_each(|(_, parameters)| parameters.validate())
    }
}

/// New parameters of an established connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionUpdateParameters {
    pub connection_interval_min: ConnectionInterval,
    pub connection_interval_max: ConnectionInterval,
    pub latency: u16,
    pub supervision_timeout: SupervisionTimeout,
    pub event_length: ConnectionEventLength,
}

impl ConnectionUpdateParameters {
    /// Create update parameters from raw HCI values
    fn try_from_raw(interval_min: u16, interval_max: u16, latency: u16, timeout: u16) -> Result<Self, Error> {
        let parameters = ConnectionUpdateParameters {
            connection_interval_min: ConnectionInterval::try_from_raw(interval_min)
                .map_err(|_| Error::InvalidParameter)?,
            connection_interval_max: ConnectionInterval::try_from_raw(interval_max)
                .map_err(|_| Error::InvalidParameter)?,
            latency,
            supervision_timeout: SupervisionTimeout::try_from_raw(timeout).map_err(|_| Error::InvalidParameter)?,
            event_length: ConnectionEventLength::ZERO,
        };

        parameters.validate().map(|_| parameters)
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_timing(
            self.connection_interval_min,
            self.connection_interval_max,
            self.latency,
            self.supervision_timeout,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Idle,
    /// Scanning for the resolvable private address of the peer
    ScanningForIdentity {
        peer_address_type: PeerAddressType,
        peer_address: BluetoothDeviceAddress,
        parameters: ConnectionParameters,
    },
    /// The peer was found, the connection is initiated once the scan stops
    AwaitingScanStop {
        peer_address_type: PeerAddressType,
        peer_address: BluetoothDeviceAddress,
        parameters: ConnectionParameters,
    },
    Initiating {
        cancel_requested: bool,
        uses_filter_accept_list: bool,
    },
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Idle
    }
}

#[derive(Debug, Default)]
pub(crate) struct ConnectionManager {
    state: ConnectionState,
    /// Requests from the peer to update the connection parameters are given to the application
    manual_parameter_updates: bool,
}

impl ConnectionManager {
    pub(crate) fn is_idle(&self) -> bool {
        self.state == ConnectionState::Idle
    }

    pub(crate) fn is_initiating(&self) -> bool {
        matches!(self.state, ConnectionState::Initiating { .. })
    }

    pub(crate) fn is_awaiting_scan_stop(&self) -> bool {
        matches!(self.state, ConnectionState::AwaitingScanStop { .. })
    }

    pub(crate) fn uses_filter_accept_list(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Initiating {
                uses_filter_accept_list: true,
                ..
            }
        )
    }
}

impl<C, P, H> Gap<C, P, H>
where
    C: HostControllerInterface,
    P: Platform,
    H: EventHandler,
{
    /// Connect to a peer
    ///
    /// [`on_connection_complete`](super::EventHandler::on_connection_complete) is called with the
    /// result of the connection attempt.
    ///
    /// # Error
    /// * `InvalidParameter` - the peer is anonymous, the parameters are invalid, or a PHY is not
    ///   supported
    /// * `InvalidState` - a connection attempt is already in progress, or there is no address to
    ///   initiate with
    /// * `Busy` - the scan session is in use and the peer must be searched for
    pub fn connect(
        &mut self,
        peer_address_type: PeerAddressType,
        peer_address: BluetoothDeviceAddress,
        parameters: ConnectionParameters,
    ) -> Result<(), Error> {
        if !cfg!(feature = "central") {
            return Err(Error::NotImplemented);
        }

        if peer_address_type == PeerAddressType::Anonymous {
            return Err(Error::InvalidParameter);
        }

        parameters.validate()?;

        self.check_connection_phys(&parameters)?;

        if !self.connection.is_idle() {
            return Err(Error::InvalidState);
        }

        let search = parameters.filter_policy == InitiatorFilterPolicy::PeerAddress
            && peer_address_type.is_identity()
            && self.privacy.enabled
            && self.privacy.central.resolution_strategy != CentralResolutionStrategy::DoNotResolve
            && !self.is_feature_supported(LeFeature::LlPrivacy);

        if search {
            let scan_parameters = ScanParameters {
                filter_policy: ScanningFilterPolicy::AcceptAll,
                le_1m: parameters
                    .le_1m
                    .map(|p| p.scan_parameters())
                    .or_else(|| parameters.le_coded.is_none().then(PhyScanParameters::default)),
                le_coded: parameters.le_coded.map(|p| p.scan_parameters()),
            };

            self.begin_identity_scan(scan_parameters)?;

            log::debug!("(GAP) searching for the private address of {}", peer_address);

            self.connection.state = ConnectionState::ScanningForIdentity {
                peer_address_type,
                peer_address,
                parameters,
            };

            return Ok(());
        }

        self.initiate_connection(peer_address_type, peer_address, parameters)
    }

    fn check_connection_phys(&self, parameters: &ConnectionParameters) -> Result<(), Error> {
        for (phy, _) in parameters.phys() {
            let supported = match phy {
                Phy::Le1M => true,
                Phy::Le2M => self.is_feature_supported(LeFeature::Le2MPhy),
                Phy::LeCoded => self.is_feature_supported(LeFeature::LeCodedPhy),
            };

            if !supported {
                return Err(Error::InvalidParameter);
            }
        }

        Ok(())
    }

    fn initiate_connection(
        &mut self,
        peer_address_type: PeerAddressType,
        peer_address: BluetoothDeviceAddress,
        parameters: ConnectionParameters,
    ) -> Result<(), Error> {
        let address = self
            .get_address_for_operation(RadioOperation::Initiating)
            .ok_or(Error::InvalidState)?;

        let own_address_type = self.own_address_type();

        if own_address_type == OwnAddressType::Random {
            self.set_device_random_address(address)?;
        }

        let controller_resolves = self.privacy.enabled && self.is_feature_supported(LeFeature::LlPrivacy);

        let peer_address_type = if controller_resolves {
            peer_address_type
        } else {
            peer_address_type.without_identity()
        };

        self.hci
            .create_connection(own_address_type, peer_address_type, peer_address, &parameters)?;

        log::debug!("(GAP) initiating a connection to {}", peer_address);

        self.connection.state = ConnectionState::Initiating {
            cancel_requested: false,
            uses_filter_accept_list: parameters.filter_policy == InitiatorFilterPolicy::FilterAcceptList,
        };

        Ok(())
    }

    /// Cancel the connection attempt
    ///
    /// Cancelling when there is no connection attempt does nothing. When the controller is
    /// initiating the attempt ends once the controller reports the cancelled connection.
    pub fn cancel_connect(&mut self) -> Result<(), Error> {
        match self.connection.state {
            ConnectionState::Idle => Ok(()),
            ConnectionState::ScanningForIdentity {
                peer_address_type,
                peer_address,
                ..
            }
            | ConnectionState::AwaitingScanStop {
                peer_address_type,
                peer_address,
                ..
            } => {
                self.connection.state = ConnectionState::Idle;

                self.end_identity_scan();

                self.notify_connection_failure(
                    peer_address_type,
                    peer_address,
                    hci::Error::UnknownConnectionIdentifier,
                );

                Ok(())
            }
            ConnectionState::Initiating {
                cancel_requested: true,
                ..
            } => Ok(()),
            ConnectionState::Initiating {
                cancel_requested: false,
                uses_filter_accept_list,
            } => {
                self.hci.create_connection_cancel()?;

                self.connection.state = ConnectionState::Initiating {
                    cancel_requested: true,
                    uses_filter_accept_list,
                };

                Ok(())
            }
        }
    }

    fn notify_connection_failure(
        &mut self,
        peer_address_type: PeerAddressType,
        peer_address: BluetoothDeviceAddress,
        status: hci::Error,
    ) {
        let complete = ConnectionComplete {
            status,
            connection_handle: ConnectionHandle::default(),
            role: Role::Central,
            peer_address_type,
            peer_address,
            local_resolvable_private_address: None,
            peer_resolvable_private_address: None,
            connection_interval: 0,
            peripheral_latency: 0,
            supervision_timeout: 0,
        };

        self.notify(|h| h.on_connection_complete(&complete));
    }

    /// Initiate the connection to a peer found by the identity search once the scan is stopped
    pub(super) fn initiate_pending_connection(&mut self) {
        let (peer_address_type, peer_address, parameters) = match self.connection.state {
            ConnectionState::AwaitingScanStop {
                peer_address_type,
                peer_address,
                parameters,
            } if self.scan.state == ScanState::Idle => (peer_address_type, peer_address, parameters),
            _ => return,
        };

        self.connection.state = ConnectionState::Idle;

        if let Err(e) = self.initiate_connection(peer_address_type, peer_address, parameters) {
            log::warn!("(GAP) failed to initiate the connection to {}, {}", peer_address, e);

            self.notify_connection_failure(peer_address_type, peer_address, e.controller_status());
        }
    }

    /// An advertising report received while searching for a peer's private address
    pub(crate) fn on_identity_search_report(
        &mut self,
        report: &AdvertisingReport,
        private_address: Option<BluetoothDeviceAddress>,
    ) {
        let (peer_address_type, peer_address, parameters) = match self.connection.state {
            ConnectionState::ScanningForIdentity {
                peer_address_type,
                peer_address,
                parameters,
            } => (peer_address_type, peer_address, parameters),
            _ => return,
        };

        if !report.properties.connectable || report.peer_address != peer_address {
            return;
        }

        let target = match private_address {
            Some(private_address) if report.peer_address_type == peer_address_type => {
                (PeerAddressType::Random, private_address)
            }
            None if report.peer_address_type == peer_address_type.without_identity() => {
                (peer_address_type.without_identity(), peer_address)
            }
            _ => return,
        };

        log::debug!("(GAP) found {} advertising with {}", peer_address, target.1);

        self.connection.state = ConnectionState::AwaitingScanStop {
            peer_address_type: target.0,
            peer_address: target.1,
            parameters,
        };

        self.end_identity_scan();

        self.initiate_pending_connection();
    }

    /// The scan searching for a peer failed to start
    pub(crate) fn on_identity_scan_failed(&mut self, status: hci::Error) {
        if let ConnectionState::ScanningForIdentity {
            peer_address_type,
            peer_address,
            ..
        } = self.connection.state
        {
            self.connection.state = ConnectionState::Idle;

            self.notify_connection_failure(peer_address_type, peer_address, status);
        }
    }

    pub(super) fn on_connection_complete(&mut self, complete: ConnectionComplete) {
        let central = complete.role == Role::Central;

        if central {
            if self.connection.is_initiating() {
                self.connection.state = ConnectionState::Idle;
            } else {
                log::warn!("(GAP) connection complete as central while not initiating");
            }
        } else {
            self.on_legacy_advertising_connected(complete.status, complete.connection_handle);
        }

        let resolve = if central {
            self.privacy.central.resolution_strategy != CentralResolutionStrategy::DoNotResolve
        } else {
            self.privacy.peripheral.resolution_strategy != PeripheralResolutionStrategy::DoNotResolve
        };

        if complete.status.is_ok()
            && self.needs_host_resolution(resolve, complete.peer_address_type, &complete.peer_address)
        {
            match self.resolve_peer_address(complete.peer_address) {
                Resolution::Resolved(identity) => self.process_resolved_connection_complete(complete, identity),
                Resolution::Pending => self.buffer_for_resolution(BufferedEvent::ConnectionComplete(complete)),
            }
        } else {
            if complete.status.is_ok() {
                log::info!("(GAP) connected to {}", complete.peer_address);
            }

            self.notify(|h| h.on_connection_complete(&complete));
        }

        if central {
            self.resume_suspended_operations();
        }
    }

    /// Process a connection after the resolution of the peer's private address
    pub(crate) fn process_resolved_connection_complete(
        &mut self,
        mut complete: ConnectionComplete,
        identity: Option<Identity>,
    ) {
        match identity {
            Some(identity) => {
                complete.peer_resolvable_private_address = Some(complete.peer_address);
                complete.peer_address_type = identity.address_type.into();
                complete.peer_address = identity.address;
            }
            None if complete.role == Role::Peripheral
                && self.privacy.peripheral.resolution_strategy
                    == PeripheralResolutionStrategy::RejectNonResolvedAddress =>
            {
                log::info!(
                    "(GAP) disconnecting {}, its address could not be resolved",
                    complete.peer_address
                );

                if let Err(e) = self
                    .hci
                    .disconnect(complete.connection_handle, DisconnectReason::AuthenticationFailure)
                {
                    log::error!("(GAP) failed to disconnect {}, {}", complete.connection_handle, e);
                }

                return;
            }
            None => (),
        }

        log::info!("(GAP) connected to {}", complete.peer_address);

        self.notify(|h| h.on_connection_complete(&complete));
    }

    /// Request new connection parameters
    ///
    /// [`on_connection_parameters_update_complete`] is called when the update is done.
    ///
    /// [`on_connection_parameters_update_complete`]: super::EventHandler::on_connection_parameters_update_complete
    pub fn update_connection_parameters(
        &mut self,
        handle: ConnectionHandle,
        parameters: ConnectionUpdateParameters,
    ) -> Result<(), Error> {
        parameters.validate()?;

        self.hci.connection_update(handle, &parameters)?;

        Ok(())
    }

    /// Choose if the application handles the peer's requests to update the connection parameters
    ///
    /// When managed, requests are given to
    /// [`on_update_connection_parameters_request`](super::EventHandler::on_update_connection_parameters_request)
    /// and must be answered with either `accept_connection_parameters_update` or
    /// `reject_connection_parameters_update`. Otherwise every valid request is accepted.
    pub fn manage_connection_parameters_update_request(&mut self, manage: bool) {
        self.connection.manual_parameter_updates = manage;
    }

    pub fn accept_connection_parameters_update(
        &mut self,
        handle: ConnectionHandle,
        parameters: ConnectionUpdateParameters,
    ) -> Result<(), Error> {
        parameters.validate()?;

        self.hci.remote_connection_parameter_request_reply(handle, &parameters)?;

        Ok(())
    }

    pub fn reject_connection_parameters_update(&mut self, handle: ConnectionHandle) -> Result<(), Error> {
        self.hci
            .remote_connection_parameter_request_negative_reply(handle, hci::Error::UnacceptableConnectionParameters)?;

        Ok(())
    }

    pub(super) fn on_remote_connection_parameter_request(&mut self, request: RemoteConnectionParameterRequest) {
        let handle = request.connection_handle;

        let parameters = match ConnectionUpdateParameters::try_from_raw(
            request.interval_min,
            request.interval_max,
            request.latency,
            request.timeout,
        ) {
            Ok(parameters) => parameters,
            Err(_) => {
                log::debug!("(GAP) rejecting invalid connection parameters from {}", handle);

                self.reply_to_parameter_request(handle, None, hci::Error::InvalidLlParameters);

                return;
            }
        };

        if !self.connection.manual_parameter_updates {
            self.reply_to_parameter_request(handle, Some(parameters), hci::Error::NoError);
        } else if self.event_handler.is_none() {
            log::error!(
                "(GAP) connection parameter request of {} is managed but there is no event handler",
                handle
            );

            self.reply_to_parameter_request(handle, None, hci::Error::UnacceptableConnectionParameters);
        } else {
            self.notify(|h| h.on_update_connection_parameters_request(&request));
        }
    }

    fn reply_to_parameter_request(
        &mut self,
        handle: ConnectionHandle,
        parameters: Option<ConnectionUpdateParameters>,
        reason: hci::Error,
    ) {
        let result = match parameters {
            Some(parameters) => self.hci.remote_connection_parameter_request_reply(handle, &parameters),
            None => self
                .hci
                .remote_connection_parameter_request_negative_reply(handle, reason),
        };

        if let Err(e) = result {
            log::error!("(GAP) failed to reply to the connection parameter request of {}, {}", handle, e);
        }
    }

    /// Disconnect
    ///
    /// [`on_disconnection_complete`](super::EventHandler::on_disconnection_complete) is called once
    /// the connection is terminated.
    pub fn disconnect(&mut self, handle: ConnectionHandle, reason: DisconnectReason) -> Result<(), Error> {
        self.hci.disconnect(handle, reason)?;

        Ok(())
    }

    fn check_phy_set(&self, phys: PhySet) -> Result<(), Error> {
        if !cfg!(feature = "phy-management") {
            return Err(Error::NotImplemented);
        }

        if (phys.le_2m && !self.is_feature_supported(LeFeature::Le2MPhy))
            || (phys.le_coded && !self.is_feature_supported(LeFeature::LeCodedPhy))
        {
            return Err(Error::NotImplemented);
        }

        Ok(())
    }

    /// Set the PHYs preferred for new connections
    ///
    /// An empty set is no preference.
    pub fn set_preferred_phys(&mut self, tx: PhySet, rx: PhySet) -> Result<(), Error> {
        self.check_phy_set(tx)?;
        self.check_phy_set(rx)?;

        self.hci.set_default_phy(tx, rx)?;

        Ok(())
    }

    /// Request the PHYs of a connection
    ///
    /// [`on_phy_update_complete`](super::EventHandler::on_phy_update_complete) is called with the
    /// result.
    pub fn set_phy(
        &mut self,
        handle: ConnectionHandle,
        tx: PhySet,
        rx: PhySet,
        coded_option: CodedPhyOption,
    ) -> Result<(), Error> {
        self.check_phy_set(tx)?;
        self.check_phy_set(rx)?;

        self.hci.set_phy(handle, tx, rx, coded_option)?;

        Ok(())
    }

    /// Read the PHYs of a connection
    ///
    /// The PHYs are given to [`on_read_phy`](super::EventHandler::on_read_phy).
    pub fn read_phy(&mut self, handle: ConnectionHandle) -> Result<(), Error> {
        if !cfg!(feature = "phy-management") {
            return Err(Error::NotImplemented);
        }

        self.hci.read_phy(handle)?;

        Ok(())
    }
}
