use le_gap::address::PrivateAddressKind;
use le_gap::gap::advertise::{AdvertisingParameters, AdvertisingType, SetState, Transition};
use le_gap::gap::scan::{ScanParameters, ScanState};
use le_gap::gap::{AdvertisingEnd, AdvertisingStart, GapConfig};
use le_gap::hci::common::{AdvertisingHandle, Role};
use le_gap::hci::events::{AdvertisingSetTerminated, Event};
use le_gap::hci::{self, AdvertisingDataKind, DuplicatesFilter, FragmentOperation, ScanEnable};
use le_gap::platform::{DeferredWork, TimerId};
use le_gap::address::PeerAddressType;
use le_gap::Error;
use le_gap_tests::*;
use std::time::Duration;

fn extended_parameters(advertising_type: AdvertisingType) -> AdvertisingParameters {
    AdvertisingParameters {
        advertising_type,
        use_legacy_pdu: false,
        ..Default::default()
    }
}

fn started(handle: AdvertisingHandle) -> Notification {
    Notification::AdvertisingStart(AdvertisingStart {
        handle,
        status: hci::Error::NoError,
    })
}

#[test]
fn legacy_advertising_start_and_stop() {
    let mut gap = new_gap(MockController::legacy());

    let handle = AdvertisingHandle::LEGACY;

    gap.set_advertising_parameters(handle, AdvertisingParameters::default())
        .unwrap();

    gap.set_advertising_payload(handle, &[0x02, 0x01, 0x06]).unwrap();

    gap.start_advertising(handle, Duration::ZERO, 0).unwrap();

    assert_eq!(SetState::Pending(Transition::Starting), gap.advertising_set_state(handle));

    gap.on_event(advertising_started(&[handle]));

    assert!(gap.is_advertising_active(handle));

    assert_eq!(vec![started(handle)], take_notifications(&mut gap));

    gap.stop_advertising(handle).unwrap();

    gap.on_event(advertising_terminated(handle));

    assert_eq!(SetState::Configured, gap.advertising_set_state(handle));

    assert_eq!(
        vec![Notification::AdvertisingEnd(AdvertisingEnd {
            handle,
            connection_handle: None,
            completed_events: 0,
            status: hci::Error::NoError,
        })],
        take_notifications(&mut gap)
    );

    let enables: Vec<bool> = take_commands(&mut gap)
        .into_iter()
        .filter_map(|command| match command {
            Command::SetAdvertisingEnable { enable, .. } => Some(enable),
            _ => None,
        })
        .collect();

    assert_eq!(vec![true, false], enables);
}

#[test]
fn legacy_advertising_payload_limit() {
    let mut gap = new_gap(MockController::legacy());

    let handle = AdvertisingHandle::LEGACY;

    gap.set_advertising_parameters(handle, AdvertisingParameters::default())
        .unwrap();

    assert_eq!(Ok(31), gap.get_max_advertising_data_length());

    assert_eq!(Err(Error::InvalidParameter), gap.set_advertising_payload(handle, &[0; 32]));

    assert_eq!(Err(Error::NotImplemented), gap.create_advertising_set(AdvertisingParameters::default()));
}

#[test]
fn legacy_advertising_timeout() {
    let mut gap = new_gap(MockController::legacy());

    let handle = AdvertisingHandle::LEGACY;

    gap.set_advertising_parameters(handle, AdvertisingParameters::default())
        .unwrap();

    gap.start_advertising(handle, Duration::from_secs(2), 0).unwrap();

    assert_eq!(Err(Error::Busy), gap.start_advertising(handle, Duration::ZERO, 0));

    gap.on_event(advertising_started(&[handle]));

    assert_eq!(
        Some(&Duration::from_secs(2)),
        gap.platform().timers.get(&TimerId::AdvertisingTimeout)
    );

    assert!(expire_timer(&mut gap, TimerId::AdvertisingTimeout));

    gap.on_event(advertising_terminated(handle));

    let notifications = take_notifications(&mut gap);

    assert_eq!(
        Some(&Notification::AdvertisingEnd(AdvertisingEnd {
            handle,
            connection_handle: None,
            completed_events: 0,
            status: hci::Error::AdvertisingTimeout,
        })),
        notifications.last()
    );
}

#[test]
fn legacy_advertising_ended_by_connection() {
    let mut gap = new_gap(MockController::legacy());

    let handle = AdvertisingHandle::LEGACY;

    gap.set_advertising_parameters(handle, AdvertisingParameters::default())
        .unwrap();

    gap.start_advertising(handle, Duration::ZERO, 0).unwrap();

    gap.on_event(advertising_started(&[handle]));

    take_notifications(&mut gap);

    let connection = connection_handle(0x40);

    let complete = connection_complete(Role::Peripheral, connection, PeerAddressType::Public, PUBLIC_ADDRESS);

    gap.on_event(Event::ConnectionComplete(complete));

    assert_eq!(SetState::Configured, gap.advertising_set_state(handle));

    assert_eq!(
        vec![
            Notification::AdvertisingEnd(AdvertisingEnd {
                handle,
                connection_handle: Some(connection),
                completed_events: 0,
                status: hci::Error::NoError,
            }),
            Notification::ConnectionComplete(complete),
        ],
        take_notifications(&mut gap)
    );
}

#[test]
fn extended_sets_are_batched() {
    let mut gap = new_gap(MockController::extended());

    let first = gap
        .create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    let second = gap
        .create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    assert_eq!(advertising_handle(1), first);
    assert_eq!(advertising_handle(2), second);

    take_commands(&mut gap);

    gap.start_advertising(first, Duration::ZERO, 0).unwrap();

    gap.start_advertising(second, Duration::from_millis(1005), 3).unwrap();

    assert!(take_commands(&mut gap).is_empty());

    assert_eq!(
        vec![DeferredWork::FlushAdvertisingQueue],
        gap.platform().deferred.iter().copied().collect::<Vec<_>>()
    );

    run_deferred(&mut gap);

    match take_commands(&mut gap).as_slice() {
        [Command::SetAdvertisingEnable { enable: true, sets }] => {
            assert_eq!(2, sets.len());
            assert_eq!(first, sets[0].handle);
            assert_eq!(0, sets[0].duration);
            assert_eq!(second, sets[1].handle);
            assert_eq!(101, sets[1].duration);
            assert_eq!(3, sets[1].max_events);
        }
        commands => panic!("unexpected commands {:?}", commands),
    }

    gap.on_event(advertising_started(&[first, second]));

    assert_eq!(vec![started(first), started(second)], take_notifications(&mut gap));
}

#[test]
fn stopping_a_queued_start() {
    let mut gap = new_gap(MockController::extended());

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    gap.start_advertising(handle, Duration::ZERO, 0).unwrap();

    gap.stop_advertising(handle).unwrap();

    assert_eq!(SetState::Configured, gap.advertising_set_state(handle));

    take_commands(&mut gap);

    run_deferred(&mut gap);

    assert!(take_commands(&mut gap).is_empty());

    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn fragmented_payload() {
    let config = GapConfig {
        max_advertising_fragment_length: 200,
        ..Default::default()
    };

    let mut gap = new_gap_with_config(MockController::extended(), config);

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    take_commands(&mut gap);

    gap.set_advertising_payload(handle, &[0xAA; 300]).unwrap();

    assert_eq!(
        vec![
            Command::SetAdvertisingData {
                handle,
                kind: AdvertisingDataKind::Advertising,
                operation: FragmentOperation::First,
                length: 200,
            },
            Command::SetAdvertisingData {
                handle,
                kind: AdvertisingDataKind::Advertising,
                operation: FragmentOperation::Last,
                length: 100,
            },
        ],
        take_commands(&mut gap)
    );
}

fn data(handle: AdvertisingHandle, operation: FragmentOperation, length: usize) -> Command {
    Command::SetAdvertisingData {
        handle,
        kind: AdvertisingDataKind::Advertising,
        operation,
        length,
    }
}

#[test]
fn failed_fragment_restores_payload() {
    let config = GapConfig {
        max_advertising_fragment_length: 200,
        ..Default::default()
    };

    let mut gap = new_gap_with_config(MockController::extended(), config);

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::ConnectableUndirected))
        .unwrap();

    gap.set_advertising_payload(handle, &[0x55; 150]).unwrap();

    take_commands(&mut gap);

    // the first fragment is accepted, then the last one is rejected
    gap.controller_mut()
        .fail_after(1, hci::Error::MemoryCapacityExceeded);

    assert_eq!(
        Err(Error::Controller(hci::Error::MemoryCapacityExceeded)),
        gap.set_advertising_payload(handle, &[0x55; 300])
    );

    // the controller discarded the old payload with the first fragment, so it is written again
    assert_eq!(
        vec![
            data(handle, FragmentOperation::First, 200),
            data(handle, FragmentOperation::Complete, 150),
        ],
        take_commands(&mut gap)
    );

    gap.start_advertising(handle, Duration::ZERO, 0).unwrap();

    run_deferred(&mut gap);

    match take_commands(&mut gap).as_slice() {
        [Command::SetAdvertisingEnable { enable: true, sets }] => assert_eq!(handle, sets[0].handle),
        commands => panic!("unexpected commands {:?}", commands),
    }
}

#[test]
fn partially_written_payload_is_not_advertised() {
    let config = GapConfig {
        max_advertising_fragment_length: 200,
        ..Default::default()
    };

    let mut gap = new_gap_with_config(MockController::extended(), config);

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    take_commands(&mut gap);

    // the second fragment and the rewrite of the previous payload are both rejected
    gap.controller_mut()
        .reject_after(1, 2, hci::Error::MemoryCapacityExceeded);

    assert_eq!(
        Err(Error::Controller(hci::Error::MemoryCapacityExceeded)),
        gap.set_advertising_payload(handle, &[0x55; 400])
    );

    assert_eq!(vec![data(handle, FragmentOperation::First, 200)], take_commands(&mut gap));

    assert_eq!(
        Err(Error::InvalidState),
        gap.start_advertising(handle, Duration::ZERO, 0)
    );

    run_deferred(&mut gap);

    assert!(take_commands(&mut gap).is_empty());

    // a complete payload makes the set startable again
    gap.set_advertising_payload(handle, &[0x55; 100]).unwrap();

    assert_eq!(Ok(()), gap.start_advertising(handle, Duration::ZERO, 0));
}

#[test]
fn oversized_connectable_payload() {
    let mut gap = new_gap(MockController::extended());

    assert_eq!(Ok(191), gap.get_max_connectable_advertising_data_length());

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::ConnectableUndirected))
        .unwrap();

    gap.set_advertising_payload(handle, &[0; 250]).unwrap();

    assert_eq!(
        Err(Error::OperationNotPermitted),
        gap.start_advertising(handle, Duration::ZERO, 0)
    );

    // the payload is allowed once the set is no longer connectable
    gap.set_advertising_parameters(handle, extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    assert_eq!(Ok(()), gap.start_advertising(handle, Duration::ZERO, 0));
}

#[test]
fn active_set_cannot_be_reconfigured() {
    let mut gap = new_gap(MockController::extended());

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    gap.start_advertising(handle, Duration::ZERO, 0).unwrap();

    run_deferred(&mut gap);

    gap.on_event(advertising_started(&[handle]));

    assert_eq!(
        Err(Error::OperationNotPermitted),
        gap.set_advertising_parameters(handle, extended_parameters(AdvertisingType::ScannableUndirected))
    );

    assert_eq!(
        Err(Error::OperationNotPermitted),
        gap.set_advertising_payload(handle, &[0x02, 0x01, 0x06])
    );

    assert_eq!(Err(Error::InvalidState), gap.destroy_advertising_set(handle));

    assert_eq!(Err(Error::InvalidState), gap.start_advertising(handle, Duration::ZERO, 0));
}

#[test]
fn advertising_set_exhaustion() {
    let mut gap = new_gap(MockController::extended());

    assert_eq!(Ok(4), gap.get_max_advertising_set_number());

    for _ in 1..4 {
        gap.create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
            .unwrap();
    }

    assert_eq!(
        Err(Error::NoMemory),
        gap.create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
    );

    gap.destroy_advertising_set(advertising_handle(2)).unwrap();

    assert_eq!(SetState::NonExistent, gap.advertising_set_state(advertising_handle(2)));

    assert_eq!(
        Ok(advertising_handle(2)),
        gap.create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
    );

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.start_advertising(advertising_handle(4), Duration::ZERO, 0)
    );
}

#[test]
fn legacy_advertising_follows_scan_address_rotation() {
    let mut gap = new_gap(MockController::legacy());

    let handle = AdvertisingHandle::LEGACY;

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    gap.set_advertising_parameters(handle, AdvertisingParameters::default())
        .unwrap();

    gap.start_advertising(handle, Duration::ZERO, 0).unwrap();

    gap.on_event(advertising_started(&[handle]));

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    take_commands(&mut gap);
    take_notifications(&mut gap);

    let first_address = gap.get_private_address(PrivateAddressKind::Resolvable).unwrap();

    assert!(expire_timer(&mut gap, TimerId::PrivateAddressTimeout));

    run_deferred(&mut gap);

    let second_address = gap.get_private_address(PrivateAddressKind::Resolvable).unwrap();

    assert_ne!(first_address, second_address);

    let commands = take_commands(&mut gap);

    assert!(matches!(
        commands.as_slice(),
        [
            Command::SetAdvertisingEnable { enable: false, .. },
            Command::SetScanEnable(ScanEnable { enable: false, .. }),
        ]
    ));

    gap.on_event(advertising_terminated(handle));

    run_deferred(&mut gap);

    // the device address cannot change until the scan has stopped
    assert!(take_commands(&mut gap).is_empty());

    assert_eq!(ScanState::PendingStop, gap.scan_state());

    gap.on_event(Event::ScanStopped {
        status: hci::Error::NoError,
    });

    run_deferred(&mut gap);

    let commands = take_commands(&mut gap);

    assert_eq!(Some(&Command::SetRandomAddress(second_address)), commands.first());

    assert!(matches!(
        commands.get(1),
        Some(Command::SetAdvertisingEnable { enable: true, .. })
    ));

    assert_eq!(
        1,
        commands
            .iter()
            .filter(|command| matches!(command, Command::SetRandomAddress(_)))
            .count()
    );

    assert!(matches!(
        commands.last(),
        Some(Command::SetScanEnable(ScanEnable { enable: true, .. }))
    ));

    gap.on_event(advertising_started(&[handle]));

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    assert!(gap.is_advertising_active(handle));

    assert_eq!(ScanState::Scanning, gap.scan_state());

    // neither restart is visible to the application
    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn address_rotation_restarts_interruptible_set() {
    let mut gap = new_gap(MockController::extended());

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    assert_eq!(vec![Notification::PrivacyEnabled], take_notifications(&mut gap));

    let first_address = gap.get_private_address(PrivateAddressKind::Resolvable).unwrap();

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::ConnectableUndirected))
        .unwrap();

    gap.start_advertising(handle, Duration::ZERO, 0).unwrap();

    run_deferred(&mut gap);

    gap.on_event(advertising_started(&[handle]));

    assert_eq!(vec![started(handle)], take_notifications(&mut gap));

    assert!(take_commands(&mut gap).contains(&Command::SetAdvertisingSetRandomAddress {
        handle,
        address: first_address,
    }));

    assert!(expire_timer(&mut gap, TimerId::PrivateAddressTimeout));

    run_deferred(&mut gap);

    let second_address = gap.get_private_address(PrivateAddressKind::Resolvable).unwrap();

    assert_ne!(first_address, second_address);

    assert_eq!(SetState::Pending(Transition::Stopping), gap.advertising_set_state(handle));

    gap.on_event(advertising_terminated(handle));

    run_deferred(&mut gap);

    let commands = take_commands(&mut gap);

    assert!(commands.contains(&Command::SetAdvertisingSetRandomAddress {
        handle,
        address: second_address,
    }));

    assert!(matches!(
        commands.last(),
        Some(Command::SetAdvertisingEnable { enable: true, .. })
    ));

    gap.on_event(advertising_started(&[handle]));

    assert!(gap.is_advertising_active(handle));

    // the refresh is invisible to the application
    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn timed_set_is_not_interrupted_by_rotation() {
    let mut gap = new_gap(MockController::extended());

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::ConnectableUndirected))
        .unwrap();

    gap.start_advertising(handle, Duration::from_secs(30), 0).unwrap();

    run_deferred(&mut gap);

    gap.on_event(advertising_started(&[handle]));

    take_commands(&mut gap);

    assert!(expire_timer(&mut gap, TimerId::PrivateAddressTimeout));

    run_deferred(&mut gap);

    assert!(gap.is_advertising_active(handle));

    assert!(take_commands(&mut gap).is_empty());
}

#[test]
fn set_terminated_by_controller() {
    let mut gap = new_gap(MockController::extended());

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    gap.start_advertising(handle, Duration::ZERO, 10).unwrap();

    run_deferred(&mut gap);

    gap.on_event(advertising_started(&[handle]));

    take_notifications(&mut gap);

    gap.on_event(Event::AdvertisingSetTerminated(AdvertisingSetTerminated {
        status: hci::Error::LimitReached,
        handle,
        connection_handle: None,
        completed_events: 10,
    }));

    assert_eq!(
        vec![Notification::AdvertisingEnd(AdvertisingEnd {
            handle,
            connection_handle: None,
            completed_events: 10,
            status: hci::Error::LimitReached,
        })],
        take_notifications(&mut gap)
    );
}

#[test]
fn rejected_start() {
    let mut gap = new_gap(MockController::extended());

    let handle = gap
        .create_advertising_set(extended_parameters(AdvertisingType::NonConnectableUndirected))
        .unwrap();

    gap.start_advertising(handle, Duration::ZERO, 0).unwrap();

    gap.controller_mut()
        .fail_after(0, hci::Error::CommandDisallowed);

    run_deferred(&mut gap);

    assert_eq!(SetState::Configured, gap.advertising_set_state(handle));

    assert_eq!(
        vec![Notification::AdvertisingStart(AdvertisingStart {
            handle,
            status: hci::Error::CommandDisallowed,
        })],
        take_notifications(&mut gap)
    );
}
