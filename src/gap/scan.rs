//! Scanning
//!
//! There is a single scan session. The controller confirms the start and stop of scanning with an
//! event, and while one of these confirmations is pending the session is either `PendingStart` or
//! `PendingStop`. A request to start scanning made during that time is remembered and carried out
//! once the session is idle again.
//!
//! A controller without extended advertising has no scan duration, so the duration is timed by the
//! host with the [`ScanTimeout`](crate::platform::TimerId::ScanTimeout) timer.

use super::privacy::{BufferedEvent, CentralResolutionStrategy, RadioOperation, Resolution};
use super::{EventHandler, Gap};
use crate::address::{BluetoothDeviceAddress, Identity, OwnAddressType, PrivateAddressKind};
use crate::error::Error;
use crate::hci;
use crate::hci::common::{LeFeature, ScanningInterval, ScanningWindow};
use crate::hci::events::AdvertisingReport;
use crate::hci::{DuplicatesFilter, HostControllerInterface, ScanEnable};
use crate::platform::{Platform, TimerId};
use core::time::Duration;

/// The unit of the scan duration
const SCAN_DURATION_UNIT: Duration = Duration::from_millis(10);

/// The unit of the scan period
const SCAN_PERIOD_UNIT: Duration = Duration::from_millis(1280);

/// The state of the scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    PendingStart,
    Scanning,
    PendingStop,
}

impl Default for ScanState {
    fn default() -> Self {
        ScanState::Idle
    }
}

/// The scanning filter policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanningFilterPolicy {
    AcceptAll,
    /// Only accept advertising from devices within the filter accept list
    FilterAcceptListOnly,
    /// Accept all, but directed advertising is only accepted if the target address is this device
    /// or a resolvable private address that cannot be resolved
    AcceptAllExceptUnresolvedDirected,
    FilterAcceptListExceptUnresolvedDirected,
}

impl ScanningFilterPolicy {
    pub fn into_raw(self) -> u8 {
        match self {
            ScanningFilterPolicy::AcceptAll => 0x00,
            ScanningFilterPolicy::FilterAcceptListOnly => 0x01,
            ScanningFilterPolicy::AcceptAllExceptUnresolvedDirected => 0x02,
            ScanningFilterPolicy::FilterAcceptListExceptUnresolvedDirected => 0x03,
        }
    }

    pub fn uses_filter_accept_list(&self) -> bool {
        matches!(
            self,
            ScanningFilterPolicy::FilterAcceptListOnly | ScanningFilterPolicy::FilterAcceptListExceptUnresolvedDirected
        )
    }
}

impl Default for ScanningFilterPolicy {
    fn default() -> Self {
        ScanningFilterPolicy::AcceptAll
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    /// Only listen to advertising
    Passive,
    /// Send scan requests to scannable advertisers
    Active,
}

/// Scan parameters of a single PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyScanParameters {
    pub scan_type: ScanType,
    pub interval: ScanningInterval,
    pub window: ScanningWindow,
}

impl Default for PhyScanParameters {
    fn default() -> Self {
        PhyScanParameters {
            scan_type: ScanType::Passive,
            interval: ScanningInterval::default(),
            window: ScanningWindow::default(),
        }
    }
}

/// The scan parameters
///
/// Scanning is done on every PHY with parameters. Scanning on the LE Coded PHY requires an
/// extended advertising controller that supports the coded PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParameters {
    pub filter_policy: ScanningFilterPolicy,
    pub le_1m: Option<PhyScanParameters>,
    pub le_coded: Option<PhyScanParameters>,
}

impl Default for ScanParameters {
    fn default() -> Self {
        ScanParameters {
            filter_policy: ScanningFilterPolicy::default(),
            le_1m: Some(PhyScanParameters::default()),
            le_coded: None,
        }
    }
}

/// Why the scan session is scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanPurpose {
    /// Scanning requested by the application
    Application,
    /// Scanning to find the private address of a peer to connect to
    IdentitySearch,
}

impl Default for ScanPurpose {
    fn default() -> Self {
        ScanPurpose::Application
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanRequest {
    duration: Duration,
    filter_duplicates: DuplicatesFilter,
    period: Duration,
}

impl Default for ScanRequest {
    fn default() -> Self {
        ScanRequest {
            duration: Duration::ZERO,
            filter_duplicates: DuplicatesFilter::Disabled,
            period: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScanSession {
    pub state: ScanState,
    /// Scanning is wanted, this is cleared by a stop request or a timeout
    pub requested: bool,
    pub purpose: ScanPurpose,
    parameters: Option<ScanParameters>,
    /// The parameters the current (or last) scan was started with
    active_parameters: Option<ScanParameters>,
    request: ScanRequest,
    address_kind: Option<PrivateAddressKind>,
    /// The host timed out a scan of a controller without extended advertising
    timed_out: bool,
    /// The scan was stopped to change its address
    refreshing: bool,
}

impl ScanSession {
    /// Check if the scan currently uses the filter accept list
    pub(crate) fn uses_filter_accept_list(&self) -> bool {
        self.state != ScanState::Idle
            && self
                .active_parameters
                .map_or(false, |parameters| parameters.filter_policy.uses_filter_accept_list())
    }
}

/// Convert a duration to a whole number of units, rounding up
fn duration_to_units(duration: Duration, unit: Duration) -> Result<u16, Error> {
    let units = (duration.as_micros() + unit.as_micros() - 1) / unit.as_micros();

    u16::try_from(units).map_err(|_| Error::InvalidParameter)
}

impl<C, P, H> Gap<C, P, H>
where
    C: HostControllerInterface,
    P: Platform,
    H: EventHandler,
{
    /// Set the scan parameters
    ///
    /// The parameters are applied when scanning is started.
    ///
    /// # Error
    /// * `InvalidState` - the scan session is not idle
    /// * `InvalidParameter` - there are no parameters for any PHY or a scan window is longer than its
    ///   scan interval
    /// * `NotImplemented` - scanning on the LE Coded PHY is not supported
    pub fn set_scan_parameters(&mut self, parameters: ScanParameters) -> Result<(), Error> {
        if !cfg!(feature = "central") {
            return Err(Error::NotImplemented);
        }

        if self.scan.state != ScanState::Idle {
            return Err(Error::InvalidState);
        }

        if parameters.le_1m.is_none() && parameters.le_coded.is_none() {
            return Err(Error::InvalidParameter);
        }

        let window_too_long = |phy: &Option<PhyScanParameters>| {
            phy.map_or(false, |p| p.window.get_raw_val() > p.interval.get_raw_val())
        };

        if window_too_long(&parameters.le_1m) || window_too_long(&parameters.le_coded) {
            return Err(Error::InvalidParameter);
        }

        if parameters.le_coded.is_some()
            && !(self.extended_advertising_supported() && self.is_feature_supported(LeFeature::LeCodedPhy))
        {
            return Err(Error::NotImplemented);
        }

        self.scan.parameters = Some(parameters);

        Ok(())
    }

    /// Get the state of the scan session
    pub fn scan_state(&self) -> ScanState {
        self.scan.state
    }

    /// Start scanning
    ///
    /// A `duration` of zero scans until [`stop_scan`](Gap::stop_scan) is called. A non zero
    /// `period` repeats the scan of `duration` every `period`, which is only supported by an
    /// extended advertising controller. The duration is rounded up to a multiple of 10 ms and the
    /// period to a multiple of 1.28 s.
    ///
    /// If the scan session is busy starting or stopping, the request is carried out once it is
    /// idle.
    ///
    /// # Error
    /// * `InvalidState` - the scan parameters were never set, or there is no address to scan with
    /// * `InvalidParameter` - the controller cannot do a periodic scan, or the duration or period
    ///   is out of range
    /// * `Busy` - scanning is used to connect to a peer
    pub fn start_scan(
        &mut self,
        duration: Duration,
        filter_duplicates: DuplicatesFilter,
        period: Duration,
    ) -> Result<(), Error> {
        if !cfg!(feature = "central") {
            return Err(Error::NotImplemented);
        }

        let parameters = self.scan.parameters.ok_or(Error::InvalidState)?;

        if !self.extended_advertising_supported()
            && (period != Duration::ZERO || filter_duplicates == DuplicatesFilter::PeriodicReset)
        {
            return Err(Error::InvalidParameter);
        }

        let duration_units = duration_to_units(duration, SCAN_DURATION_UNIT)?;

        if period != Duration::ZERO && (duration_units == 0 || duration >= period) {
            return Err(Error::InvalidParameter);
        }

        duration_to_units(period, SCAN_PERIOD_UNIT)?;

        if (self.scan.purpose == ScanPurpose::IdentitySearch && self.scan.state != ScanState::Idle)
            || self.connection.is_awaiting_scan_stop()
        {
            return Err(Error::Busy);
        }

        self.scan.request = ScanRequest {
            duration,
            filter_duplicates,
            period,
        };

        self.scan.requested = true;

        if self.scan.state != ScanState::Idle {
            log::debug!("(GAP) scan requested while the scan session is {:?}", self.scan.state);

            return Ok(());
        }

        self.scan.purpose = ScanPurpose::Application;
        self.scan.refreshing = false;

        self.begin_scan(parameters).map_err(|e| {
            self.scan.requested = false;

            e
        })
    }

    /// Stop scanning
    ///
    /// The scan is stopped once the controller confirms it. Stopping an idle scan session does
    /// nothing.
    ///
    /// # Error
    /// `Busy` is returned if scanning is used to connect to a peer.
    pub fn stop_scan(&mut self) -> Result<(), Error> {
        if !cfg!(feature = "central") {
            return Err(Error::NotImplemented);
        }

        if self.scan.purpose == ScanPurpose::IdentitySearch && self.scan.state != ScanState::Idle {
            return Err(Error::Busy);
        }

        self.scan.requested = false;
        self.scan.refreshing = false;

        if self.scan.state == ScanState::Scanning {
            self.issue_scan_disable()?;
        }

        Ok(())
    }

    /// Program the address and parameters then enable scanning
    fn begin_scan(&mut self, parameters: ScanParameters) -> Result<(), Error> {
        let address = self
            .get_address_for_operation(RadioOperation::Scanning)
            .ok_or(Error::InvalidState)?;

        let own_address_type = self.own_address_type();

        if own_address_type == OwnAddressType::Random {
            self.set_device_random_address(address)?;
        }

        self.hci.set_scan_parameters(own_address_type, &parameters)?;

        let request = self.scan.request;

        let enable = if self.extended_advertising_supported() {
            ScanEnable {
                enable: true,
                filter_duplicates: request.filter_duplicates,
                duration: duration_to_units(request.duration, SCAN_DURATION_UNIT)?,
                period: duration_to_units(request.period, SCAN_PERIOD_UNIT)?,
            }
        } else {
            ScanEnable {
                enable: true,
                filter_duplicates: request.filter_duplicates,
                duration: 0,
                period: 0,
            }
        };

        self.hci.set_scan_enable(enable)?;

        log::debug!("(GAP) scan starting with {}", address);

        self.scan.state = ScanState::PendingStart;
        self.scan.active_parameters = Some(parameters);
        self.scan.address_kind = self.private_address_kind(RadioOperation::Scanning);
        self.scan.timed_out = false;

        Ok(())
    }

    fn issue_scan_disable(&mut self) -> Result<(), Error> {
        self.hci.set_scan_enable(ScanEnable {
            enable: false,
            filter_duplicates: DuplicatesFilter::Disabled,
            duration: 0,
            period: 0,
        })?;

        self.scan.state = ScanState::PendingStop;

        self.platform.cancel_timer(TimerId::ScanTimeout);

        Ok(())
    }

    /// Start a scan used to find the private address of a peer
    pub(crate) fn begin_identity_scan(&mut self, parameters: ScanParameters) -> Result<(), Error> {
        if self.scan.state != ScanState::Idle {
            return Err(Error::Busy);
        }

        let previous = (self.scan.purpose, self.scan.request, self.scan.requested);

        self.scan.purpose = ScanPurpose::IdentitySearch;
        self.scan.request = ScanRequest::default();
        self.scan.requested = true;

        self.begin_scan(parameters).map_err(|e| {
            (self.scan.purpose, self.scan.request, self.scan.requested) = previous;

            e
        })
    }

    /// Stop the scan used to find the private address of a peer
    pub(crate) fn end_identity_scan(&mut self) {
        if self.scan.purpose != ScanPurpose::IdentitySearch {
            return;
        }

        self.scan.requested = false;

        if self.scan.state == ScanState::Scanning {
            if let Err(e) = self.issue_scan_disable() {
                log::error!("(GAP) failed to stop scanning, {}", e);
            }
        }
    }

    /// Restart the application's scan if it is wanted and the session is idle
    pub(super) fn restart_requested_scan(&mut self) {
        if self.scan.state != ScanState::Idle || !self.scan.requested || self.connection.is_awaiting_scan_stop() {
            return;
        }

        if self.scan.purpose == ScanPurpose::IdentitySearch {
            self.scan.requested = false;

            return;
        }

        if let Some(parameters) = self.scan.parameters {
            if let Err(e) = self.begin_scan(parameters) {
                log::warn!("(GAP) scan could not be restarted yet, {}", e);
            }
        }
    }

    /// Stop an indefinite scan using a private address that was regenerated
    pub(super) fn refresh_scan_address(&mut self, kind: PrivateAddressKind) {
        let scan = &self.scan;

        if scan.state != ScanState::Scanning
            || scan.purpose != ScanPurpose::Application
            || scan.request.duration != Duration::ZERO
            || scan.address_kind != Some(kind)
        {
            return;
        }

        log::debug!("(GAP) stopping scan to refresh its address");

        match self.issue_scan_disable() {
            Ok(()) => self.scan.refreshing = true,
            Err(e) => log::error!("(GAP) failed to stop scan for an address refresh, {}", e),
        }
    }

    pub(super) fn on_scan_started(&mut self, status: hci::Error) {
        if self.scan.state != ScanState::PendingStart {
            log::warn!("(GAP) unexpected scan start confirmation while {:?}", self.scan.state);

            return;
        }

        let refreshing = core::mem::take(&mut self.scan.refreshing);

        if status.is_ok() {
            self.scan.state = ScanState::Scanning;

            if !self.scan.requested {
                log::debug!("(GAP) scan was stopped before it started");

                if let Err(e) = self.issue_scan_disable() {
                    log::error!("(GAP) failed to stop scanning, {}", e);
                }

                return;
            }

            if !self.extended_advertising_supported() && self.scan.request.duration != Duration::ZERO {
                self.platform
                    .start_timer(TimerId::ScanTimeout, self.scan.request.duration);
            }

            if self.scan.purpose == ScanPurpose::Application && !refreshing {
                self.notify(|h| h.on_scan_started(status));
            }
        } else {
            log::warn!("(GAP) scan failed to start, {}", status);

            self.scan.state = ScanState::Idle;
            self.scan.requested = false;

            match self.scan.purpose {
                ScanPurpose::Application => self.notify(|h| h.on_scan_started(status)),
                ScanPurpose::IdentitySearch => self.on_identity_scan_failed(status),
            }
        }
    }

    pub(super) fn on_scan_stopped(&mut self, status: hci::Error) {
        if self.scan.state != ScanState::PendingStop {
            log::warn!("(GAP) unexpected scan stop confirmation while {:?}", self.scan.state);

            return;
        }

        if !status.is_ok() {
            log::error!("(GAP) scan failed to stop, {}", status);

            self.scan.state = ScanState::Scanning;
            self.scan.refreshing = false;

            return;
        }

        self.scan.state = ScanState::Idle;

        if core::mem::take(&mut self.scan.timed_out) && self.scan.purpose == ScanPurpose::Application {
            self.notify(|h| h.on_scan_timeout());
        }

        self.resume_suspended_operations();
    }

    /// The scan duration of an extended advertising controller has expired
    pub(super) fn on_scan_timeout(&mut self) {
        if self.scan.state == ScanState::Idle {
            log::warn!("(GAP) scan timeout while not scanning");

            return;
        }

        self.scan.state = ScanState::Idle;
        self.scan.requested = false;

        if self.scan.purpose == ScanPurpose::Application {
            self.notify(|h| h.on_scan_timeout());
        }

        self.resume_suspended_operations();
    }

    /// The scan duration timed by the host has expired
    pub(super) fn on_scan_timer_expired(&mut self) {
        if self.scan.state != ScanState::Scanning {
            return;
        }

        self.scan.requested = false;

        match self.issue_scan_disable() {
            Ok(()) => self.scan.timed_out = true,
            Err(e) => log::error!("(GAP) failed to stop a timed out scan, {}", e),
        }
    }

    pub(super) fn on_advertising_report(&mut self, report: AdvertisingReport) {
        let resolve = self.privacy.central.resolution_strategy != CentralResolutionStrategy::DoNotResolve;

        if self.needs_host_resolution(resolve, report.peer_address_type, &report.peer_address) {
            match self.resolve_peer_address(report.peer_address) {
                Resolution::Resolved(identity) => self.process_resolved_advertising_report(report, identity),
                Resolution::Pending => self.buffer_for_resolution(BufferedEvent::AdvertisingReport(report)),
            }
        } else {
            self.deliver_advertising_report(report, None)
        }
    }

    /// Process a report after the resolution of its private address
    pub(crate) fn process_resolved_advertising_report(
        &mut self,
        mut report: AdvertisingReport,
        identity: Option<Identity>,
    ) {
        let private_address = report.peer_address;

        match identity {
            Some(identity) => {
                report.peer_address_type = identity.address_type.into();
                report.peer_address = identity.address;
            }
            None if self.privacy.central.resolution_strategy == CentralResolutionStrategy::ResolveAndFilter => {
                log::trace!("(GAP) dropping report from unresolved address {}", private_address);

                return;
            }
            None => (),
        }

        self.deliver_advertising_report(report, Some(private_address))
    }

    fn deliver_advertising_report(
        &mut self,
        report: AdvertisingReport,
        private_address: Option<BluetoothDeviceAddress>,
    ) {
        if self.scan.state == ScanState::Idle {
            log::trace!("(GAP) dropping report received after scanning stopped");

            return;
        }

        match self.scan.purpose {
            ScanPurpose::Application => self.notify(|h| h.on_advertising_report(&report)),
            ScanPurpose::IdentitySearch => self.on_identity_search_report(&report, private_address),
        }
    }
}
