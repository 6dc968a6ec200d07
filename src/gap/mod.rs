//! The Generic Access Profile controller
//!
//! [`Gap`] owns every GAP state machine of the host. It is the only thing that issues commands to
//! the controller (through a [`HostControllerInterface`]) and the only thing that notifies the
//! application (through an [`EventHandler`]).
//!
//! # Context
//! A `Gap` lives within a single cooperative context. Application calls, controller events
//! ([`on_event`](Gap::on_event)), timer expirations ([`on_timer_expired`](Gap::on_timer_expired)),
//! and deferred work ([`run_deferred`](Gap::run_deferred)) all take `&mut self`, so none of them can
//! run while another is half way through updating the state.
//!
//! # Sub machines
//! * [`privacy`] - private address generation, rotation, and resolution
//! * [`whitelist`] - the controller's filter accept list
//! * [`scan`] - the scan session
//! * [`advertise`] - advertising sets and periodic advertising
//! * [`connection`] - connection creation and connection parameters
//! * [`sync`] - periodic advertising synchronization

pub mod advertise;
pub mod config;
pub mod connection;
mod handler;
pub mod privacy;
pub mod scan;
pub mod sync;
pub mod whitelist;

use crate::address::{BluetoothDeviceAddress, OwnAddressType};
use crate::error::Error;
use crate::hci::common::{LeFeature, LeFeatures};
use crate::hci::events::Event;
use crate::hci::HostControllerInterface;
use crate::platform::{DeferredWork, Platform, TimerId};

pub use config::GapConfig;
pub use handler::{AdvertisingEnd, AdvertisingStart, EventHandler, NoEventHandler};

/// The identity of this device
#[derive(Debug, Clone, Copy)]
struct DeviceIdentity {
    address_type: OwnAddressType,
    public_address: BluetoothDeviceAddress,
    random_static_address: Option<BluetoothDeviceAddress>,
}

impl DeviceIdentity {
    fn address(&self) -> BluetoothDeviceAddress {
        match (self.address_type, self.random_static_address) {
            (OwnAddressType::Random, Some(address)) => address,
            _ => self.public_address,
        }
    }
}

/// The GAP controller
///
/// `C` is the interface to the Bluetooth controller, `P` is the platform, and `H` is the
/// application's event handler.
pub struct Gap<C, P, H> {
    hci: C,
    platform: P,
    event_handler: Option<H>,
    config: GapConfig,
    features: LeFeatures,
    identity: DeviceIdentity,
    /// The random address last written to the controller with `set_random_address`
    random_address: Option<BluetoothDeviceAddress>,
    privacy: privacy::PrivacyState,
    whitelist: whitelist::Whitelist,
    scan: scan::ScanSession,
    advertising: advertise::AdvertisingSets,
    connection: connection::ConnectionManager,
    sync: sync::PeriodicSync,
}

impl<C, P> Gap<C, P, NoEventHandler>
where
    C: HostControllerInterface,
    P: Platform,
{
    /// Create a new `Gap` without an event handler
    ///
    /// The public address and the LE features are read from the controller.
    pub fn new(hci: C, platform: P, config: GapConfig) -> Result<Self, Error> {
        Gap::create(hci, platform, config, None)
    }
}

impl<C, P, H> Gap<C, P, H>
where
    C: HostControllerInterface,
    P: Platform,
    H: EventHandler,
{
    /// Create a new `Gap` with an event handler
    pub fn with_event_handler(hci: C, platform: P, config: GapConfig, event_handler: H) -> Result<Self, Error> {
        Gap::create(hci, platform, config, Some(event_handler))
    }

    fn create(mut hci: C, mut platform: P, config: GapConfig, event_handler: Option<H>) -> Result<Self, Error> {
        config.validate()?;

        let public_address = hci.read_public_address()?;

        let features = hci.read_local_supported_features()?;

        let local_irk = config.local_irk.unwrap_or_else(|| {
            let mut irk = [0u8; 16];

            platform.rng().fill_bytes(&mut irk);

            u128::from_le_bytes(irk)
        });

        log::info!("(GAP) initialized with public address {}", public_address);

        let identity = DeviceIdentity {
            address_type: OwnAddressType::Public,
            public_address,
            random_static_address: None,
        };

        let privacy = privacy::PrivacyState::new(&config, local_irk);

        Ok(Gap {
            hci,
            platform,
            event_handler,
            config,
            features,
            identity,
            random_address: None,
            privacy,
            whitelist: Default::default(),
            scan: Default::default(),
            advertising: Default::default(),
            connection: Default::default(),
            sync: Default::default(),
        })
    }

    /// Set the event handler
    ///
    /// Any previously set handler is returned.
    pub fn set_event_handler(&mut self, event_handler: H) -> Option<H> {
        self.event_handler.replace(event_handler)
    }

    /// Remove the event handler
    pub fn take_event_handler(&mut self) -> Option<H> {
        self.event_handler.take()
    }

    pub fn event_handler(&self) -> Option<&H> {
        self.event_handler.as_ref()
    }

    pub fn event_handler_mut(&mut self) -> Option<&mut H> {
        self.event_handler.as_mut()
    }

    /// Get the interface to the controller
    pub fn controller(&self) -> &C {
        &self.hci
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.hci
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn config(&self) -> &GapConfig {
        &self.config
    }

    /// Check if a feature is supported
    ///
    /// A feature is supported when the cargo feature implementing it was compiled in and the
    /// controller reported it within its LE features.
    pub fn is_feature_supported(&self, feature: LeFeature) -> bool {
        let compiled = match feature {
            LeFeature::LeExtendedAdvertising => cfg!(feature = "extended-advertising"),
            LeFeature::LePeriodicAdvertising => cfg!(feature = "periodic-advertising"),
            LeFeature::Le2MPhy | LeFeature::LeCodedPhy => cfg!(feature = "phy-management"),
            LeFeature::LlPrivacy => cfg!(feature = "privacy"),
            _ => true,
        };

        compiled && self.features.contains(feature)
    }

    fn extended_advertising_supported(&self) -> bool {
        self.is_feature_supported(LeFeature::LeExtendedAdvertising)
    }

    /// Get the identity address of this device
    pub fn get_address(&self) -> (OwnAddressType, BluetoothDeviceAddress) {
        (self.identity.address_type, self.identity.address())
    }

    /// Set a random static address as the identity address
    ///
    /// The own address type changes to random. The address is written to the controller when the
    /// next radio operation starts.
    ///
    /// # Error
    /// * `InvalidParameter` - `address` is not a static random address
    /// * `Busy` - advertising, scanning, or initiating is in progress
    pub fn set_random_static_address(&mut self, address: BluetoothDeviceAddress) -> Result<(), Error> {
        if !address.is_static_random() {
            return Err(Error::InvalidParameter);
        }

        if self.is_radio_active() {
            return Err(Error::Busy);
        }

        self.identity.random_static_address = Some(address);
        self.identity.address_type = OwnAddressType::Random;

        Ok(())
    }

    /// The own address type used in commands
    fn own_address_type(&self) -> OwnAddressType {
        if self.privacy.enabled {
            OwnAddressType::Random
        } else {
            self.identity.address_type
        }
    }

    /// Write the device random address if it differs from the one within the controller
    fn set_device_random_address(&mut self, address: BluetoothDeviceAddress) -> Result<(), Error> {
        if self.random_address != Some(address) {
            self.hci.set_random_address(address)?;

            log::debug!("(GAP) random address set to {}", address);

            self.random_address = Some(address);
        }

        Ok(())
    }

    /// Check if anything is using the radio
    fn is_radio_active(&self) -> bool {
        self.scan.state != scan::ScanState::Idle || !self.connection.is_idle() || self.advertising.any_busy()
    }

    fn notify<F>(&mut self, f: F)
    where
        F: FnOnce(&mut H),
    {
        if let Some(handler) = self.event_handler.as_mut() {
            f(handler)
        }
    }

    /// Process an event from the controller
    pub fn on_event(&mut self, event: Event) {
        log::trace!("(GAP) processing {}", event.name());

        match event {
            Event::ScanStarted { status } => self.on_scan_started(status),
            Event::ScanStopped { status } => self.on_scan_stopped(status),
            Event::ScanTimeout => self.on_scan_timeout(),
            Event::AdvertisingReport(report) => self.on_advertising_report(report),
            Event::AdvertisingSetStarted { handles, status } => self.on_advertising_set_started(&handles, status),
            Event::AdvertisingSetTerminated(terminated) => self.on_advertising_set_terminated(terminated),
            Event::ScanRequestReceived(request) => self.notify(|h| h.on_scan_request_received(&request)),
            Event::ConnectionComplete(complete) => self.on_connection_complete(complete),
            Event::DisconnectionComplete(complete) => self.notify(|h| h.on_disconnection_complete(&complete)),
            Event::ConnectionUpdateComplete(complete) => {
                self.notify(|h| h.on_connection_parameters_update_complete(&complete))
            }
            Event::RemoteConnectionParameterRequest(request) => self.on_remote_connection_parameter_request(request),
            Event::PhyUpdateComplete(update) => self.notify(|h| h.on_phy_update_complete(&update)),
            Event::ReadPhyComplete(phy) => self.notify(|h| h.on_read_phy(&phy)),
            Event::PeriodicAdvertisingSyncEstablished(established) => {
                self.on_periodic_advertising_sync_established(established)
            }
            Event::PeriodicAdvertisingReport(report) => self.on_periodic_advertising_report(report),
            Event::PeriodicAdvertisingSyncLost { sync_handle } => self.on_periodic_advertising_sync_lost(sync_handle),
        }
    }

    /// Process the expiration of a timer
    pub fn on_timer_expired(&mut self, timer: TimerId) {
        log::trace!("(GAP) timer {:?} expired", timer);

        match timer {
            TimerId::ScanTimeout => self.on_scan_timer_expired(),
            TimerId::AdvertisingTimeout => self.on_legacy_advertising_timer_expired(),
            TimerId::PrivateAddressTimeout => self.on_private_address_timer_expired(),
        }
    }

    /// Run work that was deferred with [`Platform::defer`]
    pub fn run_deferred(&mut self, work: DeferredWork) {
        log::trace!("(GAP) running deferred {}", work.name());

        match work {
            DeferredWork::FlushAdvertisingQueue => {
                self.advertising.queue.flush_scheduled = false;

                self.flush_advertising_queue()
            }
            DeferredWork::GeneratePrivateAddresses => self.generate_private_addresses(),
            DeferredWork::ResolvePrivateAddress => self.resolve_next_private_address(),
        }
    }

    /// Resume operations that were waiting on the radio
    ///
    /// This is called whenever scanning, legacy advertising, or initiating ends. A pending
    /// connection is initiated first, then legacy advertising suspended for an address refresh is
    /// restarted, and lastly a requested scan is restarted. Anything that still cannot start stays
    /// pending until the next time this is called.
    fn resume_suspended_operations(&mut self) {
        self.initiate_pending_connection();

        self.restart_suspended_legacy_advertising();

        self.restart_requested_scan();
    }

    /// Reset every state machine
    ///
    /// This is the recovery after the controller was reset. The event handler is removed, pending
    /// address resolutions and buffered events are dropped, every advertising set is forgotten, and
    /// all timers are cancelled. The identity, the local IRK, and the resolving list are kept.
    pub fn reset(&mut self) {
        log::info!("(GAP) reset");

        self.platform.cancel_timer(TimerId::ScanTimeout);
        self.platform.cancel_timer(TimerId::AdvertisingTimeout);
        self.platform.cancel_timer(TimerId::PrivateAddressTimeout);

        self.event_handler = None;
        self.random_address = None;

        self.privacy.reset();
        self.whitelist = Default::default();
        self.scan = Default::default();
        self.advertising = Default::default();
        self.connection = Default::default();
        self.sync = Default::default();
    }
}
