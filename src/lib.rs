//! A Bluetooth Low Energy GAP controller
//!
//! `le-gap` is the host side of the Generic Access Profile. It owns device addressing,
//! advertising, scanning, connection establishment and parameter negotiation, and the rotation of
//! private addresses. Everything below it (the transport to the Bluetooth controller, the platform
//! timers, and the scheduler) is injected as a collaborator.
//!
//! The entry point is [`Gap`](gap::Gap). It is created with an implementation of
//! [`HostControllerInterface`](hci::HostControllerInterface) for sending commands to the
//! controller and an implementation of [`Platform`](platform::Platform) for timers, deferred work,
//! and random numbers. Events from the controller are fed back with
//! [`Gap::on_event`](gap::Gap::on_event), and the application receives its notifications through an
//! [`EventHandler`](gap::EventHandler).
//!
//! # Features
//! Most of the functionality is gated behind cargo features. An operation whose feature is not
//! enabled returns [`Error::NotImplemented`](error::Error::NotImplemented).
//!
//! * `privacy` - private address generation, rotation, and resolution
//! * `whitelist` - management of the controller's filter accept list
//! * `central` - scanning and connection initiation
//! * `peripheral` - connectable advertising
//! * `extended-advertising` - multiple advertising sets and the batched enable queue
//! * `periodic-advertising` - periodic advertising and periodic advertising sync
//! * `phy-management` - PHY preferences and PHY updates
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod address;
pub mod cryptography;
pub mod error;
pub mod gap;
pub mod hci;
pub mod platform;

pub use address::BluetoothDeviceAddress;
pub use error::Error;
pub use gap::Gap;
