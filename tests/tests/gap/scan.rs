use le_gap::address::{BluetoothDeviceAddress, PeerAddressType};
use le_gap::gap::scan::{PhyScanParameters, ScanParameters, ScanState};
use le_gap::hci::common::{ScanningInterval, ScanningWindow};
use le_gap::hci::events::Event;
use le_gap::hci::{self, DuplicatesFilter, ScanEnable};
use le_gap::platform::TimerId;
use le_gap::Error;
use le_gap_tests::*;
use std::time::Duration;

const PEER: BluetoothDeviceAddress = BluetoothDeviceAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

fn scan_enables(commands: &[Command]) -> Vec<ScanEnable> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::SetScanEnable(enable) => Some(*enable),
            _ => None,
        })
        .collect()
}

#[test]
fn host_timed_scan() {
    let mut gap = new_gap(MockController::legacy());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::from_millis(5000), DuplicatesFilter::Enabled, Duration::ZERO)
        .unwrap();

    assert_eq!(ScanState::PendingStart, gap.scan_state());

    assert_eq!(
        vec![ScanEnable {
            enable: true,
            filter_duplicates: DuplicatesFilter::Enabled,
            duration: 0,
            period: 0,
        }],
        scan_enables(&take_commands(&mut gap))
    );

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    assert_eq!(ScanState::Scanning, gap.scan_state());

    assert_eq!(
        Some(&Duration::from_millis(5000)),
        gap.platform().timers.get(&TimerId::ScanTimeout)
    );

    assert!(expire_timer(&mut gap, TimerId::ScanTimeout));

    assert_eq!(ScanState::PendingStop, gap.scan_state());

    gap.on_event(Event::ScanStopped {
        status: hci::Error::NoError,
    });

    // a late confirmation does not produce a second timeout
    gap.on_event(Event::ScanStopped {
        status: hci::Error::NoError,
    });

    assert!(!expire_timer(&mut gap, TimerId::ScanTimeout));

    assert_eq!(ScanState::Idle, gap.scan_state());

    assert_eq!(
        vec![
            Notification::ScanStarted(hci::Error::NoError),
            Notification::ScanTimeout
        ],
        take_notifications(&mut gap)
    );
}

#[test]
fn controller_timed_scan() {
    let mut gap = new_gap(MockController::extended());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::from_millis(5000), DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    assert_eq!(
        vec![ScanEnable {
            enable: true,
            filter_duplicates: DuplicatesFilter::Disabled,
            duration: 500,
            period: 0,
        }],
        scan_enables(&take_commands(&mut gap))
    );

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    assert!(!gap.platform().is_timer_armed(TimerId::ScanTimeout));

    gap.on_event(Event::ScanTimeout);

    assert_eq!(ScanState::Idle, gap.scan_state());

    assert_eq!(
        vec![
            Notification::ScanStarted(hci::Error::NoError),
            Notification::ScanTimeout
        ],
        take_notifications(&mut gap)
    );
}

#[test]
fn periodic_scan_needs_extended_advertising() {
    let mut gap = new_gap(MockController::legacy());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.start_scan(Duration::from_secs(1), DuplicatesFilter::Enabled, Duration::from_secs(5))
    );

    assert_eq!(
        Err(Error::InvalidParameter),
        gap.start_scan(Duration::ZERO, DuplicatesFilter::PeriodicReset, Duration::ZERO)
    );

    let mut gap = new_gap(MockController::extended());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    // the duration must be shorter than the period
    assert_eq!(
        Err(Error::InvalidParameter),
        gap.start_scan(Duration::from_secs(5), DuplicatesFilter::Enabled, Duration::from_secs(5))
    );

    gap.start_scan(Duration::from_secs(1), DuplicatesFilter::PeriodicReset, Duration::from_secs(5))
        .unwrap();

    assert_eq!(
        vec![ScanEnable {
            enable: true,
            filter_duplicates: DuplicatesFilter::PeriodicReset,
            duration: 100,
            period: 4,
        }],
        scan_enables(&take_commands(&mut gap))
    );
}

#[test]
fn scan_parameters() {
    let mut gap = new_gap(MockController::legacy());

    assert_eq!(
        Err(Error::InvalidState),
        gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
    );

    let no_phy = ScanParameters {
        le_1m: None,
        ..Default::default()
    };

    assert_eq!(Err(Error::InvalidParameter), gap.set_scan_parameters(no_phy));

    let long_window = ScanParameters {
        le_1m: Some(PhyScanParameters {
            interval: ScanningInterval::try_from_raw(0x10).unwrap(),
            window: ScanningWindow::try_from_raw(0x20).unwrap(),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert_eq!(Err(Error::InvalidParameter), gap.set_scan_parameters(long_window));

    let coded = ScanParameters {
        le_coded: Some(PhyScanParameters::default()),
        ..Default::default()
    };

    assert_eq!(Err(Error::NotImplemented), gap.set_scan_parameters(coded));

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    assert_eq!(Err(Error::InvalidState), gap.set_scan_parameters(ScanParameters::default()));
}

#[test]
fn stopping_an_idle_scan() {
    let mut gap = new_gap(MockController::legacy());

    assert_eq!(Ok(()), gap.stop_scan());

    assert!(take_commands(&mut gap).is_empty());
}

#[test]
fn stop_before_start_is_confirmed() {
    let mut gap = new_gap(MockController::legacy());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    gap.stop_scan().unwrap();

    take_commands(&mut gap);

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    assert_eq!(ScanState::PendingStop, gap.scan_state());

    assert_eq!(1, scan_enables(&take_commands(&mut gap)).len());

    gap.on_event(Event::ScanStopped {
        status: hci::Error::NoError,
    });

    assert_eq!(ScanState::Idle, gap.scan_state());

    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn failed_scan_start() {
    let mut gap = new_gap(MockController::legacy());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    gap.on_event(Event::ScanStarted {
        status: hci::Error::CommandDisallowed,
    });

    assert_eq!(ScanState::Idle, gap.scan_state());

    assert_eq!(
        vec![Notification::ScanStarted(hci::Error::CommandDisallowed)],
        take_notifications(&mut gap)
    );
}

#[test]
fn reports_are_forwarded_while_scanning() {
    let mut gap = new_gap(MockController::legacy());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    take_notifications(&mut gap);

    let report = advertising_report(PeerAddressType::Public, PEER);

    gap.on_event(Event::AdvertisingReport(report.clone()));

    assert_eq!(
        vec![Notification::AdvertisingReport(report.clone())],
        take_notifications(&mut gap)
    );

    gap.stop_scan().unwrap();

    gap.on_event(Event::ScanStopped {
        status: hci::Error::NoError,
    });

    gap.on_event(Event::AdvertisingReport(report));

    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn scan_with_private_address() {
    let mut gap = new_gap(MockController::legacy());

    gap.enable_privacy(true).unwrap();

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    // no private address was generated yet
    assert_eq!(
        Err(Error::InvalidState),
        gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
    );

    run_deferred(&mut gap);

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    let address = gap
        .get_private_address(le_gap::address::PrivateAddressKind::Resolvable)
        .unwrap();

    let commands = take_commands(&mut gap);

    assert_eq!(Some(&Command::SetRandomAddress(address)), commands.first());

    assert!(commands.contains(&Command::SetScanParameters(le_gap::address::OwnAddressType::Random)));
}

#[test]
fn indefinite_scan_follows_address_rotation() {
    let mut gap = new_gap(MockController::legacy());

    gap.enable_privacy(true).unwrap();

    run_deferred(&mut gap);

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    take_commands(&mut gap);
    take_notifications(&mut gap);

    assert!(expire_timer(&mut gap, TimerId::PrivateAddressTimeout));

    run_deferred(&mut gap);

    assert_eq!(ScanState::PendingStop, gap.scan_state());

    gap.on_event(Event::ScanStopped {
        status: hci::Error::NoError,
    });

    assert_eq!(ScanState::PendingStart, gap.scan_state());

    let address = gap
        .get_private_address(le_gap::address::PrivateAddressKind::Resolvable)
        .unwrap();

    assert!(take_commands(&mut gap).contains(&Command::SetRandomAddress(address)));

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    // the restart is invisible to the application
    assert!(take_notifications(&mut gap).is_empty());
}

#[test]
fn start_requested_while_stopping() {
    let mut gap = new_gap(MockController::legacy());

    gap.set_scan_parameters(ScanParameters::default()).unwrap();

    gap.start_scan(Duration::ZERO, DuplicatesFilter::Disabled, Duration::ZERO)
        .unwrap();

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    gap.stop_scan().unwrap();

    assert_eq!(ScanState::PendingStop, gap.scan_state());

    take_commands(&mut gap);
    take_notifications(&mut gap);

    gap.start_scan(Duration::from_secs(2), DuplicatesFilter::Enabled, Duration::ZERO)
        .unwrap();

    // held until the controller confirms the stop
    assert_eq!(ScanState::PendingStop, gap.scan_state());

    assert!(take_commands(&mut gap).is_empty());

    gap.on_event(Event::ScanStopped {
        status: hci::Error::NoError,
    });

    assert_eq!(ScanState::PendingStart, gap.scan_state());

    assert_eq!(
        vec![
            Command::SetScanParameters(le_gap::address::OwnAddressType::Public),
            Command::SetScanEnable(ScanEnable {
                enable: true,
                filter_duplicates: DuplicatesFilter::Enabled,
                duration: 0,
                period: 0,
            }),
        ],
        take_commands(&mut gap)
    );

    gap.on_event(Event::ScanStarted {
        status: hci::Error::NoError,
    });

    assert_eq!(ScanState::Scanning, gap.scan_state());

    assert_eq!(
        Some(&Duration::from_secs(2)),
        gap.platform().timers.get(&TimerId::ScanTimeout)
    );

    assert_eq!(
        vec![Notification::ScanStarted(hci::Error::NoError)],
        take_notifications(&mut gap)
    );
}
