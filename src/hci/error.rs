//! Controller error codes
//!
//! `Error` represents the controller error codes listed in volume one part F of the Bluetooth
//! core specification that a GAP controller can encounter. `Error` is used instead of the raw code
//! because its `Debug` and `Display` print out the error *names* instead of just a number.
//!
//! ### `NoError`
//! The enum `NoError` is created from the error code zero. There is no official error for zero, but
//! it is used by events to signify there was no error.
//!
//! ### `Unknown`
//! A controller can send an error that is not listed here, either because it is a manufacturer
//! specific error, a code not used by GAP, or just a bug. These error codes get turned into
//! `Unknown`.

use core::fmt::{self, Display, Formatter};

macro_rules! controller_errors {
    ( $( $name:ident = $code:literal, $description:literal; )* ) => {
        /// A Controller Error
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Hash)]
        pub enum Error {
            NoError,
            Unknown(u8),
            $( $name, )*
        }

        impl Error {
            /// Get the raw error code
            pub fn into_raw(self) -> u8 {
                match self {
                    Error::NoError => 0x00,
                    Error::Unknown(raw) => raw,
                    $( Error::$name => $code, )*
                }
            }
        }

        impl From<u8> for Error {
            fn from(raw: u8) -> Self {
                match raw {
                    0x00 => Error::NoError,
                    $( $code => Error::$name, )*
                    _ => Error::Unknown(raw),
                }
            }
        }

        impl fmt::Debug for Error {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                match *self {
                    Error::NoError => f.write_str("NoError"),
                    Error::Unknown(val) => write!(f, "Unknown Error Code (0x{:X})", val),
                    $( Error::$name => write!(f, concat!(stringify!($name), " (0x{:X})"), $code), )*
                }
            }
        }

        impl Display for Error {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                match self {
                    Error::NoError => f.write_str("no error"),
                    Error::Unknown(val) => write!(f, "unknown error code (0x{:X})", val),
                    $( Error::$name => {
                        f.write_str(concat!("controller error: ", $description))?;

                        f.write_str(" (see the Bluetooth Core Specification vol 1, part F: Controller Error Codes)")
                    } )*
                }
            }
        }
    };
}

controller_errors! {
    UnknownHciCommand = 0x01, "unknown HCI command";
    UnknownConnectionIdentifier = 0x02, "unknown connection identifier";
    HardwareFailure = 0x03, "hardware failure";
    PageTimeout = 0x04, "page timeout";
    AuthenticationFailure = 0x05, "authentication failure";
    PinOrKeyMissing = 0x06, "PIN or key missing";
    MemoryCapacityExceeded = 0x07, "memory capacity exceeded";
    ConnectionTimeout = 0x08, "connection timeout";
    ConnectionLimitExceeded = 0x09, "connection limit exceeded";
    ConnectionAlreadyExists = 0x0B, "connection already exists";
    CommandDisallowed = 0x0C, "command disallowed";
    ConnectionRejectedDueToLimitedResources = 0x0D, "connection rejected due to limited resources";
    ConnectionRejectedDueToSecurityReasons = 0x0E, "connection rejected due to security reasons";
    ConnectionAcceptTimeoutExceeded = 0x10, "connection accept timeout exceeded";
    UnsupportedFeatureOrParameterValue = 0x11, "unsupported feature or parameter value";
    InvalidHciCommandParameters = 0x12, "invalid HCI command parameters";
    RemoteUserTerminatedConnection = 0x13, "remote user terminated connection";
    RemoteDeviceTerminatedConnectionDueToLowResources = 0x14, "remote device terminated connection due to low resources";
    RemoteDeviceTerminatedConnectionDueToPowerOff = 0x15, "remote device terminated connection due to power off";
    ConnectionTerminatedByLocalHost = 0x16, "connection terminated by local host";
    UnsupportedRemoteFeature = 0x1A, "unsupported remote feature";
    InvalidLlParameters = 0x1E, "invalid LL parameters";
    UnspecifiedError = 0x1F, "unspecified error";
    UnsupportedLlParameterValue = 0x20, "unsupported LL parameter value";
    LlResponseTimeout = 0x22, "LL response timeout";
    LlProcedureCollision = 0x23, "LL procedure collision";
    InstantPassed = 0x28, "instant passed";
    PairingWithUnitKeyNotSupported = 0x29, "pairing with unit key not supported";
    DifferentTransactionCollision = 0x2A, "different transaction collision";
    ParameterOutOfMandatoryRange = 0x30, "parameter out of mandatory range";
    ControllerBusy = 0x3A, "controller busy";
    UnacceptableConnectionParameters = 0x3B, "unacceptable connection parameters";
    AdvertisingTimeout = 0x3C, "advertising timeout";
    ConnectionTerminatedDueToMicFailure = 0x3D, "connection terminated due to MIC failure";
    ConnectionFailedToBeEstablished = 0x3E, "connection failed to be established or synchronization timeout";
    UnknownAdvertisingIdentifier = 0x42, "unknown advertising identifier";
    LimitReached = 0x43, "limit reached";
    OperationCancelledByHost = 0x44, "operation cancelled by host";
    PacketTooLong = 0x45, "packet too long";
}

impl Error {
    pub fn is_ok(&self) -> bool {
        *self == Error::NoError
    }

    pub fn ok_or_else<F, E>(self, err: F) -> Result<(), E>
    where
        F: FnOnce(Self) -> E,
    {
        if let Error::NoError = self {
            Ok(())
        } else {
            Err(err(self))
        }
    }
}

impl Default for Error {
    fn default() -> Self {
        Error::NoError
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
