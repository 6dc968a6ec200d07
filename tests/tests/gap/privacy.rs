use le_gap::address::{BluetoothDeviceAddress, Identity, IdentityAddressType, OwnAddressType, PeerAddressType, PrivateAddressKind};
use le_gap::gap::privacy::{
    CentralPrivacyConfiguration, CentralResolutionStrategy, RadioOperation, ResolvingListEntry,
};
use le_gap::gap::scan::ScanParameters;
use le_gap::gap::GapConfig;
use le_gap::hci::common::LeFeature;
use le_gap::hci::events::Event;
use le_gap::hci::{self, DuplicatesFilter};
use le_gap::platform::{DeferredWork, TimerId};
use le_gap::Error;
use le_gap_tests::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

const LOCAL_IRK: u128 = 0xA5A5_0000_1111_2222_3333_4444_5555_6666;

const PEER: BluetoothDeviceAddress = BluetoothDeviceAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

const PEER_IRK: u128 = 0x0123_4567_89AB_CDEF_FEDC_BA98_7654_3210;

fn peer_identity() -> Identity {
    Identity {
        address_type: IdentityAddressType::Public,
        address: PEER,
    }
}

fn private_gap(controller: MockController) -> TestGap {
    let config = GapConfig {
        local_irk: Some(LOCAL_IRK),
        ..Default::default()
    };

    let mut gap = new_gap_with_config(controller, config);

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    take_notifications(&mut gap);

    gap
}

fn start_scanning(gap: &mut TestGap) {
    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    take_notifications(gap);
    take_commands(gap);
}

#[test]
fn enabling_privacy() {
    let config = GapConfig {
        local_irk: Some(LOCAL_IRK),
        ..Default::default()
    };

    let mut gap = new_gap_with_config(MockController::legacy(), config);

    assert!(!gap.is_privacy_enabled());

    assert_eq!(
        Some(PUBLIC_ADDRESS),
        gap.get_address_for_operation(RadioOperation::Scanning)
    );

    gap.enable_privacy(true).unwrap();

    gap.enable_privacy(true).unwrap();

    assert_eq!(
        vec![DeferredWork::GeneratePrivateAddresses],
        gap.platform().deferred.iter().copied().collect::<Vec<_>>()
    );

    assert_eq!(
        Some(&Duration::from_secs(15 * 60)),
        gap.platform().timers.get(&TimerId::PrivateAddressTimeout)
    );

    assert_eq!(None, gap.get_address_for_operation(RadioOperation::Scanning));

    run_deferred(&mut gap);

    assert_eq!(vec![Notification::PrivacyEnabled], take_notifications(&mut gap));

    let resolvable = gap.get_private_address(PrivateAddressKind::Resolvable).unwrap();

    let non_resolvable = gap.get_private_address(PrivateAddressKind::NonResolvable).unwrap();

    assert!(resolvable.resolve(LOCAL_IRK));

    assert!(non_resolvable.is_non_resolvable());

    assert_eq!(
        Some(resolvable),
        gap.get_address_for_operation(RadioOperation::Advertising { connectable: true })
    );

    // the controller does not resolve addresses
    assert!(take_commands(&mut gap).is_empty());

    gap.enable_privacy(false).unwrap();

    assert!(!gap.platform().is_timer_armed(TimerId::PrivateAddressTimeout));

    assert_eq!(
        Some(PUBLIC_ADDRESS),
        gap.get_address_for_operation(RadioOperation::Scanning)
    );
}

#[test]
fn controller_address_resolution() {
    let mut controller = MockController::extended();

    controller.features = le_gap::hci::common::LeFeatures::from_features(&[
        LeFeature::LeExtendedAdvertising,
        LeFeature::LlPrivacy,
    ]);

    let mut gap = new_gap(controller);

    gap.enable_privacy(true).unwrap();

    assert_eq!(vec![Command::SetAddressResolutionEnable(true)], take_commands(&mut gap));

    gap.enable_privacy(false).unwrap();

    assert_eq!(vec![Command::SetAddressResolutionEnable(false)], take_commands(&mut gap));
}

#[test]
fn privacy_cannot_change_while_the_radio_is_busy() {
    let mut gap = new_gap(MockController::legacy());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    assert_eq!(Err(Error::InvalidState), gap.enable_privacy(true));

    assert!(!gap.is_privacy_enabled());
}

#[test]
fn addresses_rotate_on_timeout() {
    let mut gap = private_gap(MockController::legacy());

    let first = gap.get_private_address(PrivateAddressKind::Resolvable).unwrap();

    assert!(expire_timer(&mut gap, TimerId::PrivateAddressTimeout));

    assert!(gap.platform().is_timer_armed(TimerId::PrivateAddressTimeout));

    run_deferred(&mut gap);

    let second = gap.get_private_address(PrivateAddressKind::Resolvable).unwrap();

    assert_ne!(first, second);

    assert!(second.resolve(LOCAL_IRK));

    // privacy was already enabled
    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn resolving_list() {
    let mut gap = new_gap(MockController::legacy());

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.add_device_to_resolving_list(
            Identity {
                address_type: IdentityAddressType::Public,
                address: BluetoothDeviceAddress::ZERO,
            },
            PEER_IRK
        )
    );

    gap.add_device_to_resolving_list(peer_identity(), 1).unwrap();

    // adding the same identity replaces its key
    gap.add_device_to_resolving_list(peer_identity(), PEER_IRK).unwrap();

    assert_eq!(
        &[ResolvingListEntry {
            identity: peer_identity(),
            irk: PEER_IRK,
        }],
        gap.resolving_list()
    );

    gap.remove_device_from_resolving_list(&peer_identity()).unwrap();

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.remove_device_from_resolving_list(&peer_identity())
    );

    assert!(gap.resolving_list().is_empty());
}

#[test]
fn resolving_list_can_be_persisted() {
    let mut gap = new_gap(MockController::legacy());

    let other = Identity {
        address_type: IdentityAddressType::RandomStatic,
        address: BluetoothDeviceAddress([1, 2, 3, 4, 5, 0xC0]),
    };

    gap.add_device_to_resolving_list(other, 0xFFFF).unwrap();
    gap.add_device_to_resolving_list(peer_identity(), PEER_IRK).unwrap();

    let stored = bincode::serialize(gap.resolving_list()).unwrap();

    let loaded: Vec<ResolvingListEntry> = bincode::deserialize(&stored).unwrap();

    let mut restored = new_gap(MockController::legacy());

    for entry in &loaded {
        restored
            .add_device_to_resolving_list(entry.identity, entry.irk)
            .unwrap();
    }

    assert_eq!(gap.resolving_list(), restored.resolving_list());
}

#[test]
fn reports_are_resolved() {
    let mut gap = private_gap(MockController::legacy());

    gap.add_device_to_resolving_list(peer_identity(), PEER_IRK).unwrap();

    start_scanning(&mut gap);

    let private_address = BluetoothDeviceAddress::new_resolvable(PEER_IRK, &mut StdRng::seed_from_u64(1));

    gap.on_event(Event::AdvertisingReport(advertising_report(
        PeerAddressType::Random,
        private_address,
    )));

    // the report waits for the resolution
    assert!(take_notifications(&mut gap).is_empty());

    run_deferred(&mut gap);

    let expected = advertising_report(PeerAddressType::PublicIdentity, PEER);

    assert_eq!(
        vec![Notification::AdvertisingReport(expected.clone())],
        take_notifications(&mut gap)
    );

    // the result is cached
    gap.on_event(Event::AdvertisingReport(advertising_report(
        PeerAddressType::Random,
        private_address,
    )));

    assert!(gap.platform().deferred.is_empty());

    assert_eq!(
        vec![Notification::AdvertisingReport(expected)],
        take_notifications(&mut gap)
    );
}

#[test]
fn reports_of_the_same_address_keep_their_order() {
    let mut gap = private_gap(MockController::legacy());

    gap.add_device_to_resolving_list(peer_identity(), PEER_IRK).unwrap();

    start_scanning(&mut gap);

    let private_address = BluetoothDeviceAddress::new_resolvable(PEER_IRK, &mut StdRng::seed_from_u64(2));

    for rssi in [-40, -50, -60] {
        let mut report = advertising_report(PeerAddressType::Random, private_address);

        report.rssi = Some(rssi);

        gap.on_event(Event::AdvertisingReport(report));
    }

    run_deferred(&mut gap);

    let rssis: Vec<Option<i8>> = take_notifications(&mut gap)
        .into_iter()
        .filter_map(|notification| match notification {
            Notification::AdvertisingReport(report) => Some(report.rssi),
            _ => None,
        })
        .collect();

    assert_eq!(vec![Some(-40), Some(-50), Some(-60)], rssis);
}

#[test]
fn full_resolution_buffer_forwards_unresolved() {
    let config = GapConfig {
        local_irk: Some(LOCAL_IRK),
        resolution_buffer_size: 2,
        ..Default::default()
    };

    let mut gap = new_gap_with_config(MockController::legacy(), config);

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    gap.add_device_to_resolving_list(peer_identity(), PEER_IRK).unwrap();

    start_scanning(&mut gap);

    let private_address = BluetoothDeviceAddress::new_resolvable(PEER_IRK, &mut StdRng::seed_from_u64(4));

    for rssi in [-40, -50, -60] {
        let mut report = advertising_report(PeerAddressType::Random, private_address);

        report.rssi = Some(rssi);

        gap.on_event(Event::AdvertisingReport(report));
    }

    let mut overflow = advertising_report(PeerAddressType::Random, private_address);

    overflow.rssi = Some(-60);

    // the buffered reports are kept, the one that did not fit is not held back
    assert_eq!(
        vec![Notification::AdvertisingReport(overflow)],
        take_notifications(&mut gap)
    );

    run_deferred(&mut gap);

    let resolved: Vec<(PeerAddressType, Option<i8>)> = take_notifications(&mut gap)
        .into_iter()
        .filter_map(|notification| match notification {
            Notification::AdvertisingReport(report) => Some((report.peer_address_type, report.rssi)),
            _ => None,
        })
        .collect();

    assert_eq!(
        vec![
            (PeerAddressType::PublicIdentity, Some(-40)),
            (PeerAddressType::PublicIdentity, Some(-50)),
        ],
        resolved
    );
}

#[test]
fn unresolved_reports() {
    let mut gap = private_gap(MockController::legacy());

    start_scanning(&mut gap);

    let private_address = BluetoothDeviceAddress::new_resolvable(PEER_IRK, &mut StdRng::seed_from_u64(3));

    let report = advertising_report(PeerAddressType::Random, private_address);

    gap.on_event(Event::AdvertisingReport(report.clone()));

    run_deferred(&mut gap);

    assert_eq!(
        vec![Notification::AdvertisingReport(report.clone())],
        take_notifications(&mut gap)
    );

    gap.set_central_privacy_configuration(CentralPrivacyConfiguration {
        use_non_resolvable_random_address: false,
        resolution_strategy: CentralResolutionStrategy::ResolveAndFilter,
    });

    gap.on_event(Event::AdvertisingReport(report));

    run_deferred(&mut gap);

    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn random_static_identity() {
    let mut gap = new_gap(MockController::legacy());

    assert_eq!((OwnAddressType::Public, PUBLIC_ADDRESS), gap.get_address());

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.set_random_static_address(BluetoothDeviceAddress([1, 2, 3, 4, 5, 0x40]))
    );

    let address = BluetoothDeviceAddress([1, 2, 3, 4, 5, 0xC6]);

    gap.set_random_static_address(address).unwrap();

    assert_eq!((OwnAddressType::Random, address), gap.get_address());

    assert_eq!(Some(address), gap.get_address_for_operation(RadioOperation::Initiating));
}

#[test]
fn reset_keeps_the_resolving_list() {
    let mut gap = private_gap(MockController::legacy());

    gap.add_device_to_resolving_list(peer_identity(), PEER_IRK).unwrap();

    gap.reset();

    assert!(!gap.is_privacy_enabled());

    assert!(gap.event_handler().is_none());

    assert!(!gap.platform().is_timer_armed(TimerId::PrivateAddressTimeout));

    assert_eq!(1, gap.resolving_list().len());
}
