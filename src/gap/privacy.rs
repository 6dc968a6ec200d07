//! Privacy
//!
//! When privacy is enabled this device never uses its identity address over the air. Instead it
//! uses either a resolvable private address (RPA), which bonded peers can resolve with the local
//! identity resolving key (IRK), or a non-resolvable private address (NRPA). Both addresses are
//! regenerated when the private address timer expires, and every interruptible operation using a
//! regenerated address is restarted with the new address.
//!
//! # Address resolution
//! A controller with LL privacy resolves peer addresses on its own. Otherwise the host resolves
//! them. Resolution is deferred work, so advertising reports and connection completions with an
//! unresolved private address are buffered until the resolution of that address is done. Events
//! for the same address are always delivered in the order they were received.
//!
//! The results are cached. Changing the resolving list invalidates the cache.

use super::scan::ScanState;
use super::{EventHandler, Gap};
use crate::address::{BluetoothDeviceAddress, Identity, PeerAddressType, PrivateAddressKind};
use crate::error::Error;
use crate::hci::common::{AdvertisingHandle, LeFeature};
use crate::hci::events::{AdvertisingReport, ConnectionComplete};
use crate::hci::HostControllerInterface;
use crate::platform::{DeferredWork, Platform, TimerId};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// How the central role handles the private addresses of peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentralResolutionStrategy {
    /// Addresses are not resolved by the host
    DoNotResolve,
    /// Resolve addresses, reports are forwarded whether or not they were resolved
    ResolveAndForward,
    /// Resolve addresses, reports with an address that does not resolve are dropped
    ResolveAndFilter,
}

/// How the peripheral role handles the private addresses of peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeripheralResolutionStrategy {
    /// Addresses are not resolved by the host
    DoNotResolve,
    /// Connections from a private address that does not resolve are disconnected
    RejectNonResolvedAddress,
    /// Connections from a private address that does not resolve are accepted
    AcceptNonResolvedAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralPrivacyConfiguration {
    /// Scan with a non-resolvable private address instead of a resolvable one
    pub use_non_resolvable_random_address: bool,
    pub resolution_strategy: CentralResolutionStrategy,
}

impl Default for CentralPrivacyConfiguration {
    fn default() -> Self {
        CentralPrivacyConfiguration {
            use_non_resolvable_random_address: false,
            resolution_strategy: CentralResolutionStrategy::ResolveAndForward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralPrivacyConfiguration {
    /// Use a non-resolvable private address for non-connectable advertising
    pub use_non_resolvable_random_address: bool,
    pub resolution_strategy: PeripheralResolutionStrategy,
}

impl Default for PeripheralPrivacyConfiguration {
    fn default() -> Self {
        PeripheralPrivacyConfiguration {
            use_non_resolvable_random_address: false,
            resolution_strategy: PeripheralResolutionStrategy::AcceptNonResolvedAddress,
        }
    }
}

/// An operation of the radio that needs an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioOperation {
    Scanning,
    Initiating,
    Advertising { connectable: bool },
}

/// An entry of the resolving list
///
/// This is the identity of a bonded peer along with its identity resolving key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvingListEntry {
    pub identity: Identity,
    pub irk: u128,
}

/// An event waiting for the resolution of its peer address
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BufferedEvent {
    AdvertisingReport(AdvertisingReport),
    ConnectionComplete(ConnectionComplete),
}

impl BufferedEvent {
    fn peer_address(&self) -> BluetoothDeviceAddress {
        match self {
            BufferedEvent::AdvertisingReport(report) => report.peer_address,
            BufferedEvent::ConnectionComplete(complete) => complete.peer_address,
        }
    }
}

/// The result of a request to resolve a private address
pub(crate) enum Resolution {
    /// The address was resolved (from the cache). `None` if no entry of the resolving list
    /// resolves it.
    Resolved(Option<Identity>),
    /// The address is queued for resolution
    Pending,
}

/// Host based address resolution
#[derive(Debug, Default)]
pub(crate) struct AddressResolution {
    cache: VecDeque<(BluetoothDeviceAddress, Option<Identity>)>,
    cache_capacity: usize,
    /// Addresses waiting for resolution, in the order they were first seen
    queue: VecDeque<BluetoothDeviceAddress>,
    /// A `ResolvePrivateAddress` was deferred and has not run yet
    scheduled: bool,
    buffered: VecDeque<BufferedEvent>,
    buffer_capacity: usize,
}

impl AddressResolution {
    fn new(cache_capacity: usize, buffer_capacity: usize) -> Self {
        AddressResolution {
            cache_capacity,
            buffer_capacity,
            ..Default::default()
        }
    }

    fn cached(&self, address: BluetoothDeviceAddress) -> Option<Option<Identity>> {
        self.cache
            .iter()
            .find(|(cached, _)| *cached == address)
            .map(|(_, identity)| *identity)
    }

    fn cache_result(&mut self, address: BluetoothDeviceAddress, identity: Option<Identity>) {
        if self.cache_capacity == 0 {
            return;
        }

        if self.cache.len() >= self.cache_capacity {
            self.cache.pop_front();
        }

        self.cache.push_back((address, identity));
    }

    /// Buffer an event
    ///
    /// The event is given back if the buffer is full.
    pub(crate) fn buffer(&mut self, event: BufferedEvent) -> Result<(), BufferedEvent> {
        if self.buffered.len() < self.buffer_capacity {
            self.buffered.push_back(event);

            Ok(())
        } else {
            Err(event)
        }
    }

    fn take_buffered_for(&mut self, address: BluetoothDeviceAddress) -> VecDeque<BufferedEvent> {
        let (matching, remaining): (VecDeque<_>, VecDeque<_>) =
            self.buffered.drain(..).partition(|event| event.peer_address() == address);

        self.buffered = remaining;

        matching
    }

    fn clear(&mut self) {
        self.cache.clear();
        self.queue.clear();
        self.buffered.clear();
        self.scheduled = false;
    }
}

#[derive(Debug)]
pub(crate) struct PrivacyState {
    pub enabled: bool,
    /// Privacy was enabled but no private address was generated yet
    pub initialization_pending: bool,
    generation_scheduled: bool,
    pub local_irk: u128,
    pub resolvable_address: Option<BluetoothDeviceAddress>,
    pub non_resolvable_address: Option<BluetoothDeviceAddress>,
    /// Sorted by identity
    pub resolving_list: Vec<ResolvingListEntry>,
    pub central: CentralPrivacyConfiguration,
    pub peripheral: PeripheralPrivacyConfiguration,
    pub resolution: AddressResolution,
}

impl PrivacyState {
    pub(crate) fn new(config: &super::GapConfig, local_irk: u128) -> Self {
        PrivacyState {
            enabled: false,
            initialization_pending: false,
            generation_scheduled: false,
            local_irk,
            resolvable_address: None,
            non_resolvable_address: None,
            resolving_list: Vec::new(),
            central: config.central_privacy,
            peripheral: config.peripheral_privacy,
            resolution: AddressResolution::new(config.resolution_cache_size, config.resolution_buffer_size),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.enabled = false;
        self.initialization_pending = false;
        self.generation_scheduled = false;
        self.resolvable_address = None;
        self.non_resolvable_address = None;
        self.resolution.clear();
    }

    fn address(&self, kind: PrivateAddressKind) -> Option<BluetoothDeviceAddress> {
        match kind {
            PrivateAddressKind::Resolvable => self.resolvable_address,
            PrivateAddressKind::NonResolvable => self.non_resolvable_address,
        }
    }

    /// The kind of private address used for an operation
    pub(crate) fn address_kind(&self, operation: RadioOperation) -> PrivateAddressKind {
        let non_resolvable = match operation {
            RadioOperation::Scanning => self.central.use_non_resolvable_random_address,
            RadioOperation::Initiating => false,
            RadioOperation::Advertising { connectable: true } => false,
            RadioOperation::Advertising { connectable: false } => self.peripheral.use_non_resolvable_random_address,
        };

        if non_resolvable {
            PrivateAddressKind::NonResolvable
        } else {
            PrivateAddressKind::Resolvable
        }
    }
}

impl<C, P, H> Gap<C, P, H>
where
    C: HostControllerInterface,
    P: Platform,
    H: EventHandler,
{
    /// Enable or disable privacy
    ///
    /// Enabling privacy generates new private addresses. [`on_privacy_enabled`] is called once the
    /// first addresses are generated, operations that need a private address cannot start before
    /// then.
    ///
    /// Enabling privacy when it is already enabled (or disabling it when it is disabled) does
    /// nothing.
    ///
    /// # Error
    /// * `InvalidState` - advertising, scanning, or initiating is in progress
    ///
    /// [`on_privacy_enabled`]: super::EventHandler::on_privacy_enabled
    pub fn enable_privacy(&mut self, enable: bool) -> Result<(), Error> {
        if !cfg!(feature = "privacy") {
            return Err(Error::NotImplemented);
        }

        if enable == self.privacy.enabled {
            return Ok(());
        }

        if self.is_radio_active() {
            return Err(Error::InvalidState);
        }

        if self.is_feature_supported(LeFeature::LlPrivacy) {
            self.hci.set_address_resolution_enable(enable)?;
        }

        self.privacy.enabled = enable;

        if enable {
            log::info!("(GAP) privacy enabled");

            self.schedule_address_generation();

            self.platform
                .start_timer(TimerId::PrivateAddressTimeout, self.config.private_address_timeout);

            if self.privacy.resolvable_address.is_some() {
                self.notify(|h| h.on_privacy_enabled());
            } else {
                self.privacy.initialization_pending = true;
            }
        } else {
            log::info!("(GAP) privacy disabled");

            self.platform.cancel_timer(TimerId::PrivateAddressTimeout);

            self.privacy.initialization_pending = false;
        }

        Ok(())
    }

    pub fn is_privacy_enabled(&self) -> bool {
        self.privacy.enabled
    }

    pub fn set_central_privacy_configuration(&mut self, configuration: CentralPrivacyConfiguration) {
        self.privacy.central = configuration;
    }

    pub fn get_central_privacy_configuration(&self) -> CentralPrivacyConfiguration {
        self.privacy.central
    }

    pub fn set_peripheral_privacy_configuration(&mut self, configuration: PeripheralPrivacyConfiguration) {
        self.privacy.peripheral = configuration;
    }

    pub fn get_peripheral_privacy_configuration(&self) -> PeripheralPrivacyConfiguration {
        self.privacy.peripheral
    }

    /// Add (or replace) the identity resolving key of a peer
    pub fn add_device_to_resolving_list(&mut self, identity: Identity, irk: u128) -> Result<(), Error> {
        if identity.address == BluetoothDeviceAddress::ZERO {
            return Err(Error::InvalidParameter);
        }

        let entry = ResolvingListEntry { identity, irk };

        match self
            .privacy
            .resolving_list
            .binary_search_by(|e| e.identity.cmp(&identity))
        {
            Ok(index) => self.privacy.resolving_list[index] = entry,
            Err(index) => self.privacy.resolving_list.insert(index, entry),
        }

        self.privacy.resolution.cache.clear();

        Ok(())
    }

    /// Remove a peer from the resolving list
    ///
    /// # Error
    /// `InvalidParameter` is returned if the identity is not within the resolving list
    pub fn remove_device_from_resolving_list(&mut self, identity: &Identity) -> Result<(), Error> {
        let index = self
            .privacy
            .resolving_list
            .binary_search_by(|e| e.identity.cmp(identity))
            .map_err(|_| Error::InvalidParameter)?;

        self.privacy.resolving_list.remove(index);

        self.privacy.resolution.cache.clear();

        Ok(())
    }

    pub fn clear_resolving_list(&mut self) {
        self.privacy.resolving_list.clear();

        self.privacy.resolution.cache.clear();
    }

    pub fn resolving_list(&self) -> &[ResolvingListEntry] {
        &self.privacy.resolving_list
    }

    /// Get the current private address of a kind
    pub fn get_private_address(&self, kind: PrivateAddressKind) -> Option<BluetoothDeviceAddress> {
        self.privacy.address(kind)
    }

    /// Get the address to use for a radio operation
    ///
    /// This is the identity address when privacy is disabled. With privacy enabled it is either
    /// the current resolvable or non-resolvable private address.
    ///
    /// `None` is returned when there is no usable address. Either no private address has been
    /// generated yet, or the operation shares the device random address with an active operation
    /// using a different address.
    pub fn get_address_for_operation(&self, operation: RadioOperation) -> Option<BluetoothDeviceAddress> {
        if !self.privacy.enabled {
            return Some(self.identity.address());
        }

        let address = self.privacy.address(self.privacy.address_kind(operation))?;

        match self.device_random_address_in_use(operation) {
            Some(in_use) if in_use != address => {
                log::debug!(
                    "(GAP) {:?} cannot use {}, the device random address {} is in use",
                    operation,
                    address,
                    in_use
                );

                None
            }
            _ => Some(address),
        }
    }

    /// The kind of private address an operation uses, `None` when privacy is disabled
    pub(crate) fn private_address_kind(&self, operation: RadioOperation) -> Option<PrivateAddressKind> {
        self.privacy
            .enabled
            .then(|| self.privacy.address_kind(operation))
    }

    /// Get the device random address when another operation sharing it is active
    ///
    /// Scanning and initiating always use the device random address. Advertising only uses it on
    /// a controller without extended advertising, otherwise each advertising set has its own.
    fn device_random_address_in_use(&self, operation: RadioOperation) -> Option<BluetoothDeviceAddress> {
        let extended = self.extended_advertising_supported();

        if extended && matches!(operation, RadioOperation::Advertising { .. }) {
            return None;
        }

        let scanning = operation != RadioOperation::Scanning && self.scan.state != ScanState::Idle;

        let initiating = operation != RadioOperation::Initiating && self.connection.is_initiating();

        let advertising = !extended
            && !matches!(operation, RadioOperation::Advertising { .. })
            && self.advertising.is_busy(AdvertisingHandle::LEGACY);

        if scanning || initiating || advertising {
            self.random_address
        } else {
            None
        }
    }

    fn schedule_address_generation(&mut self) {
        if !self.privacy.generation_scheduled {
            self.privacy.generation_scheduled = true;

            self.platform.defer(DeferredWork::GeneratePrivateAddresses);
        }
    }

    pub(super) fn on_private_address_timer_expired(&mut self) {
        if !self.privacy.enabled {
            return;
        }

        self.schedule_address_generation();

        self.platform
            .start_timer(TimerId::PrivateAddressTimeout, self.config.private_address_timeout);
    }

    pub(super) fn generate_private_addresses(&mut self) {
        self.privacy.generation_scheduled = false;

        if !self.privacy.enabled {
            return;
        }

        let irk = self.privacy.local_irk;

        let resolvable = BluetoothDeviceAddress::new_resolvable(irk, self.platform.rng());

        let non_resolvable = BluetoothDeviceAddress::new_non_resolvable(self.platform.rng());

        log::debug!(
            "(GAP) generated private addresses, resolvable: {}, non-resolvable: {}",
            resolvable,
            non_resolvable
        );

        self.on_address_generated(PrivateAddressKind::Resolvable, resolvable);

        self.on_address_generated(PrivateAddressKind::NonResolvable, non_resolvable);
    }

    /// Take in a newly generated private address
    ///
    /// Every interruptible operation using the previous address of the same kind is stopped and
    /// then restarted with the new address once the stop is confirmed.
    fn on_address_generated(&mut self, kind: PrivateAddressKind, address: BluetoothDeviceAddress) {
        match kind {
            PrivateAddressKind::Resolvable => self.privacy.resolvable_address = Some(address),
            PrivateAddressKind::NonResolvable => self.privacy.non_resolvable_address = Some(address),
        }

        if !self.privacy.enabled {
            return;
        }

        if self.privacy.initialization_pending {
            self.privacy.initialization_pending = false;

            self.notify(|h| h.on_privacy_enabled());
        }

        self.refresh_advertising_addresses(kind);

        self.refresh_scan_address(kind);
    }

    /// Check if the host must resolve a peer address
    pub(crate) fn needs_host_resolution(
        &self,
        resolve: bool,
        peer_address_type: PeerAddressType,
        peer_address: &BluetoothDeviceAddress,
    ) -> bool {
        resolve
            && self.privacy.enabled
            && !self.is_feature_supported(LeFeature::LlPrivacy)
            && peer_address_type == PeerAddressType::Random
            && peer_address.is_resolvable()
    }

    /// Resolve a private address of a peer
    ///
    /// The result is returned immediately if it is cached, otherwise the address is queued for
    /// resolution and the caller must buffer its event.
    pub(crate) fn resolve_peer_address(&mut self, address: BluetoothDeviceAddress) -> Resolution {
        // an address already queued must wait behind the events buffered for it
        if !self.privacy.resolution.queue.contains(&address) {
            if let Some(identity) = self.privacy.resolution.cached(address) {
                return Resolution::Resolved(identity);
            }

            self.privacy.resolution.queue.push_back(address);
        }

        if !self.privacy.resolution.scheduled {
            self.privacy.resolution.scheduled = true;

            self.platform.defer(DeferredWork::ResolvePrivateAddress);
        }

        Resolution::Pending
    }

    /// Resolve the next queued address
    pub(super) fn resolve_next_private_address(&mut self) {
        self.privacy.resolution.scheduled = false;

        let address = match self.privacy.resolution.queue.pop_front() {
            Some(address) => address,
            None => return,
        };

        let identity = self
            .privacy
            .resolving_list
            .iter()
            .find(|entry| address.resolve(entry.irk))
            .map(|entry| entry.identity);

        if !self.privacy.resolution.queue.is_empty() {
            self.privacy.resolution.scheduled = true;

            self.platform.defer(DeferredWork::ResolvePrivateAddress);
        }

        self.on_identity_resolved(address, identity);
    }

    /// Take in the result of resolving a peer's private address
    ///
    /// The events buffered for the address are processed in the order they were received.
    fn on_identity_resolved(&mut self, address: BluetoothDeviceAddress, identity: Option<Identity>) {
        match identity {
            Some(identity) => log::debug!("(GAP) resolved {} to {:?}", address, identity),
            None => log::debug!("(GAP) {} could not be resolved", address),
        }

        self.privacy.resolution.cache_result(address, identity);

        for event in self.privacy.resolution.take_buffered_for(address) {
            match event {
                BufferedEvent::AdvertisingReport(report) => self.process_resolved_advertising_report(report, identity),
                BufferedEvent::ConnectionComplete(complete) => {
                    self.process_resolved_connection_complete(complete, identity)
                }
            }
        }
    }

    /// Buffer an event until its peer address is resolved
    ///
    /// If the buffer is full the event is processed as if its address did not resolve.
    pub(crate) fn buffer_for_resolution(&mut self, event: BufferedEvent) {
        if let Err(event) = self.privacy.resolution.buffer(event) {
            log::warn!("(GAP) address resolution buffer full, processing event as unresolved");

            match event {
                BufferedEvent::AdvertisingReport(report) => self.process_resolved_advertising_report(report, None),
                BufferedEvent::ConnectionComplete(complete) => self.process_resolved_connection_complete(complete, None),
            }
        }
    }
}
