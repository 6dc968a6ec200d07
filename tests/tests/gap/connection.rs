use le_gap::address::{BluetoothDeviceAddress, Identity, IdentityAddressType, OwnAddressType, PeerAddressType};
use le_gap::gap::connection::{ConnectionParameters, ConnectionUpdateParameters, PhyConnectionParameters};
use le_gap::gap::privacy::PeripheralResolutionStrategy;
use le_gap::gap::privacy::PeripheralPrivacyConfiguration;
use le_gap::gap::scan::ScanState;
use le_gap::hci::common::{
    CodedPhyOption, ConnectionEventLength, ConnectionInterval, PhySet, Role, SupervisionTimeout,
};
use le_gap::hci::events::{Event, RemoteConnectionParameterRequest};
use le_gap::hci::{self, DisconnectReason};
use le_gap::Error;
use le_gap_tests::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const PEER: BluetoothDeviceAddress = BluetoothDeviceAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

const PEER_IRK: u128 = 0x0123_4567_89AB_CDEF_FEDC_BA98_7654_3210;

fn parameter_request(handle: u16, interval_max: u16, latency: u16, timeout: u16) -> Event {
    Event::RemoteConnectionParameterRequest(RemoteConnectionParameterRequest {
        connection_handle: connection_handle(handle),
        interval_min: 6,
        interval_max,
        latency,
        timeout,
    })
}

#[test]
fn anonymous_peer_is_rejected() {
    let mut gap = new_gap(MockController::extended());

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.connect(PeerAddressType::Anonymous, PEER, ConnectionParameters::default())
    );

    assert!(take_commands(&mut gap).is_empty());
}

#[test]
fn invalid_connection_parameters() {
    let mut gap = new_gap(MockController::legacy());

    let no_phy = ConnectionParameters {
        le_1m: None,
        ..Default::default()
    };

    assert_eq!(Err(Error::InvalidParameter), gap.connect(PeerAddressType::Public, PEER, no_phy));

    let short_timeout = ConnectionParameters {
        le_1m: Some(PhyConnectionParameters {
            connection_interval_min: ConnectionInterval::try_from_raw(80).unwrap(),
            connection_interval_max: ConnectionInterval::try_from_raw(80).unwrap(),
            latency: 4,
            supervision_timeout: SupervisionTimeout::try_from_raw(100).unwrap(),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.connect(PeerAddressType::Public, PEER, short_timeout)
    );

    let coded = ConnectionParameters {
        le_coded: Some(PhyConnectionParameters::default()),
        ..Default::default()
    };

    assert_eq!(Err(Error::InvalidParameter), gap.connect(PeerAddressType::Public, PEER, coded));

    assert!(take_commands(&mut gap).is_empty());
}

#[test]
fn connect_and_cancel() {
    let mut gap = new_gap(MockController::legacy());

    gap.connect(PeerAddressType::Public, PEER, ConnectionParameters::default())
        .unwrap();

    assert_eq!(
        vec![Command::CreateConnection {
            own_address_type: OwnAddressType::Public,
            peer_address_type: PeerAddressType::Public,
            peer_address: PEER,
        }],
        take_commands(&mut gap)
    );

    assert_eq!(
        Err(Error::InvalidState),
        gap.connect(PeerAddressType::Public, PEER, ConnectionParameters::default())
    );

    gap.cancel_connect().unwrap();

    gap.cancel_connect().unwrap();

    assert_eq!(vec![Command::CreateConnectionCancel], take_commands(&mut gap));

    let mut cancelled = connection_complete(Role::Central, connection_handle(0), PeerAddressType::Public, PEER);

    cancelled.status = hci::Error::UnknownConnectionIdentifier;

    gap.on_event(Event::ConnectionComplete(cancelled));

    assert_eq!(
        vec![Notification::ConnectionComplete(cancelled)],
        take_notifications(&mut gap)
    );

    // a new attempt can be made
    assert_eq!(
        Ok(()),
        gap.connect(PeerAddressType::Public, PEER, ConnectionParameters::default())
    );
}

#[test]
fn identity_peer_is_searched_for() {
    let mut gap = new_gap(MockController::legacy());

    let identity = Identity {
        address_type: IdentityAddressType::Public,
        address: PEER,
    };

    gap.add_device_to_resolving_list(identity, PEER_IRK).unwrap();

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    take_notifications(&mut gap);

    gap.connect(PeerAddressType::PublicIdentity, PEER, ConnectionParameters::default())
        .unwrap();

    assert_eq!(ScanState::PendingStart, gap.scan_state());

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    take_commands(&mut gap);

    let private_address = BluetoothDeviceAddress::new_resolvable(PEER_IRK, &mut StdRng::seed_from_u64(7));

    gap.on_event(Event::AdvertisingReport(advertising_report(
        PeerAddressType::Random,
        private_address,
    )));

    run_deferred(&mut gap);

    assert_eq!(ScanState::PendingStop, gap.scan_state());

    assert!(!take_commands(&mut gap)
        .iter()
        .any(|command| matches!(command, Command::CreateConnection { .. })));

    gap.on_event(Event::ScanStopped {
        status: hci::Error::NoError,
    });

    assert_eq!(
        Some(Command::CreateConnection {
            own_address_type: OwnAddressType::Random,
            peer_address_type: PeerAddressType::Random,
            peer_address: private_address,
        }),
        take_commands(&mut gap).pop()
    );

    // the search is internal, the application sees no scan
    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn cancelled_identity_search() {
    let mut gap = new_gap(MockController::legacy());

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    take_notifications(&mut gap);

    gap.connect(PeerAddressType::PublicIdentity, PEER, ConnectionParameters::default())
        .unwrap();

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    gap.cancel_connect().unwrap();

    assert_eq!(ScanState::PendingStop, gap.scan_state());

    match take_notifications(&mut gap).as_slice() {
        [Notification::ConnectionComplete(complete)] => {
            assert_eq!(hci::Error::UnknownConnectionIdentifier, complete.status);
            assert_eq!(PEER, complete.peer_address);
        }
        notifications => panic!("unexpected notifications {:?}", notifications),
    }
}

#[test]
fn unresolved_peripheral_connection_is_rejected() {
    let mut gap = new_gap(MockController::legacy());

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    take_notifications(&mut gap);

    gap.set_peripheral_privacy_configuration(PeripheralPrivacyConfiguration {
        use_non_resolvable_random_address: false,
        resolution_strategy: PeripheralResolutionStrategy::RejectNonResolvedAddress,
    });

    let private_address = BluetoothDeviceAddress::new_resolvable(PEER_IRK, &mut StdRng::seed_from_u64(7));

    let handle = connection_handle(0x10);

    gap.on_event(Event::ConnectionComplete(connection_complete(
        Role::Peripheral,
        handle,
        PeerAddressType::Random,
        private_address,
    )));

    run_deferred(&mut gap);

    assert_eq!(
        vec![Command::Disconnect {
            handle,
            reason: DisconnectReason::AuthenticationFailure,
        }],
        take_commands(&mut gap)
    );

    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn resolved_peripheral_connection() {
    let mut gap = new_gap(MockController::legacy());

    let identity = Identity {
        address_type: IdentityAddressType::Public,
        address: PEER,
    };

    gap.add_device_to_resolving_list(identity, PEER_IRK).unwrap();

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    take_notifications(&mut gap);

    let private_address = BluetoothDeviceAddress::new_resolvable(PEER_IRK, &mut StdRng::seed_from_u64(9));

    gap.on_event(Event::ConnectionComplete(connection_complete(
        Role::Peripheral,
        connection_handle(0x10),
        PeerAddressType::Random,
        private_address,
    )));

    run_deferred(&mut gap);

    match take_notifications(&mut gap).as_slice() {
        [Notification::ConnectionComplete(complete)] => {
            assert_eq!(PeerAddressType::PublicIdentity, complete.peer_address_type);
            assert_eq!(PEER, complete.peer_address);
            assert_eq!(Some(private_address), complete.peer_resolvable_private_address);
        }
        notifications => panic!("unexpected notifications {:?}", notifications),
    }
}

#[test]
fn parameter_requests_are_accepted_by_default() {
    let mut gap = new_gap(MockController::legacy());

    gap.on_event(parameter_request(1, 0x28, 0, 0x1F4));

    assert_eq!(
        vec![Command::ParameterRequestReply(connection_handle(1))],
        take_commands(&mut gap)
    );

    // (1 + 4) * 80 is not less than 4 * 100
    gap.on_event(parameter_request(1, 80, 4, 100));

    assert_eq!(
        vec![Command::ParameterRequestNegativeReply {
            handle: connection_handle(1),
            reason: hci::Error::InvalidLlParameters,
        }],
        take_commands(&mut gap)
    );

    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn managed_parameter_requests() {
    let mut gap = new_gap(MockController::legacy());

    gap.manage_connection_parameters_update_request(true);

    gap.on_event(parameter_request(2, 0x28, 0, 0x1F4));

    assert!(take_commands(&mut gap).is_empty());

    assert!(matches!(
        take_notifications(&mut gap).as_slice(),
        [Notification::ConnectionParametersRequest(_)]
    ));

    gap.reject_connection_parameters_update(connection_handle(2))
        .unwrap();

    assert_eq!(
        vec![Command::ParameterRequestNegativeReply {
            handle: connection_handle(2),
            reason: hci::Error::UnacceptableConnectionParameters,
        }],
        take_commands(&mut gap)
    );

    // without an event handler the request cannot be answered by the application
    gap.take_event_handler();

    gap.on_event(parameter_request(2, 0x28, 0, 0x1F4));

    assert_eq!(
        vec![Command::ParameterRequestNegativeReply {
            handle: connection_handle(2),
            reason: hci::Error::UnacceptableConnectionParameters,
        }],
        take_commands(&mut gap)
    );
}

#[test]
fn connection_update() {
    let mut gap = new_gap(MockController::legacy());

    let mut parameters = ConnectionUpdateParameters {
        connection_interval_min: ConnectionInterval::try_from_raw(80).unwrap(),
        connection_interval_max: ConnectionInterval::try_from_raw(80).unwrap(),
        latency: 4,
        supervision_timeout: SupervisionTimeout::try_from_raw(101).unwrap(),
        event_length: ConnectionEventLength::ZERO,
    };

    gap.update_connection_parameters(connection_handle(3), parameters)
        .unwrap();

    parameters.supervision_timeout = SupervisionTimeout::try_from_raw(100).unwrap();

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.update_connection_parameters(connection_handle(3), parameters)
    );

    assert_eq!(
        vec![Command::ConnectionUpdate(connection_handle(3))],
        take_commands(&mut gap)
    );
}

#[test]
fn phy_management() {
    let two_megabit = PhySet {
        le_1m: true,
        le_2m: true,
        le_coded: false,
    };

    let mut gap = new_gap(MockController::legacy());

    assert_eq!(Err(Error::NotImplemented), gap.set_preferred_phys(two_megabit, two_megabit));

    assert_eq!(Ok(()), gap.set_preferred_phys(PhySet::LE_1M, PhySet::default()));

    let mut gap = new_gap(MockController::extended());

    let handle = connection_handle(4);

    gap.set_phy(handle, two_megabit, two_megabit, CodedPhyOption::NoPreference)
        .unwrap();

    gap.read_phy(handle).unwrap();

    assert_eq!(
        vec![Command::SetPhy(handle), Command::ReadPhy(handle)],
        take_commands(&mut gap)
    );
}

#[test]
fn disconnect() {
    let mut gap = new_gap(MockController::legacy());

    gap.disconnect(connection_handle(5), DisconnectReason::RemoteUserTerminatedConnection)
        .unwrap();

    gap.controller_mut()
        .fail_after(0, hci::Error::UnknownConnectionIdentifier);

    assert_eq!(
        Err(Error::Controller(hci::Error::UnknownConnectionIdentifier)),
        gap.disconnect(connection_handle(6), DisconnectReason::RemoteUserTerminatedConnection)
    );

    assert_eq!(
        vec![Command::Disconnect {
            handle: connection_handle(5),
            reason: DisconnectReason::RemoteUserTerminatedConnection,
        }],
        take_commands(&mut gap)
    );
}
