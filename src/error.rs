//! GAP controller errors

use crate::hci;
use core::fmt::{self, Display, Formatter};

/// An error returned by an operation of the GAP controller
///
/// Every operation validates its input and the state of the controller before issuing any command
/// to the Bluetooth controller. An error other than `Controller` means nothing was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An input was malformed or out of the range permitted by the Bluetooth Specification
    InvalidParameter,
    /// The operation is not legal in the current state
    InvalidState,
    /// The operation is legal but not permitted, for example reconfiguring an active advertising
    /// set
    OperationNotPermitted,
    /// The radio is doing something incompatible with the operation, retry later
    Busy,
    /// A resource is exhausted
    NoMemory,
    /// The operation is not supported by the compiled features or by the controller
    NotImplemented,
    /// The controller rejected a well formed request
    Controller(hci::Error),
    Unspecified,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::InvalidParameter => f.write_str("invalid parameter"),
            Error::InvalidState => f.write_str("invalid state"),
            Error::OperationNotPermitted => f.write_str("operation not permitted"),
            Error::Busy => f.write_str("stack busy"),
            Error::NoMemory => f.write_str("no memory"),
            Error::NotImplemented => f.write_str("not implemented"),
            Error::Controller(e) => write!(f, "{}", e),
            Error::Unspecified => f.write_str("unspecified error"),
        }
    }
}

impl Error {
    /// Get the status reported to the application for this error
    ///
    /// Errors that did not come from the controller are reported as `UnspecifiedError`.
    pub(crate) fn controller_status(&self) -> hci::Error {
        match self {
            Error::Controller(e) => *e,
            _ => hci::Error::UnspecifiedError,
        }
    }
}

impl From<hci::Error> for Error {
    fn from(e: hci::Error) -> Self {
        match e {
            hci::Error::NoError => Error::Unspecified,
            e => Error::Controller(e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
