//! Platform services used by the GAP controller
//!
//! The GAP controller runs within a single cooperative context. It never blocks and it never spawns
//! anything, instead it asks the platform to schedule work and to arm timers. Both come back to the
//! controller on the same context through [`Gap::run_deferred`] and [`Gap::on_timer_expired`].
//!
//! [`Gap::run_deferred`]: crate::gap::Gap::run_deferred
//! [`Gap::on_timer_expired`]: crate::gap::Gap::on_timer_expired

use core::time::Duration;
use le_gap_macros::EventName;
use rand_core::RngCore;

/// Work that is deferred to a later tick of the scheduler
///
/// The platform must call `Gap::run_deferred` with this work after the current call into the GAP
/// controller has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EventName)]
pub enum DeferredWork {
    /// Send the queued advertising set enable and disable commands
    FlushAdvertisingQueue,
    /// Generate new private addresses
    GeneratePrivateAddresses,
    /// Resolve the next private address waiting for resolution
    ResolvePrivateAddress,
}

/// The timers used by the GAP controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// The scan duration on a controller without extended advertising
    ScanTimeout,
    /// The advertising duration on a controller without extended advertising
    AdvertisingTimeout,
    /// The time until the private addresses are regenerated
    PrivateAddressTimeout,
}

/// The platform
pub trait Platform {
    /// Schedule work for a later tick
    fn defer(&mut self, work: DeferredWork);

    /// Arm (or re-arm) a timer
    ///
    /// When the timer expires the platform must call `Gap::on_timer_expired` with `timer`.
    fn start_timer(&mut self, timer: TimerId, timeout: Duration);

    /// Disarm a timer
    ///
    /// Cancelling a timer that is not running does nothing.
    fn cancel_timer(&mut self, timer: TimerId);

    /// Get the random number generator
    ///
    /// This is used for generating random addresses and should be a cryptographically secure
    /// generator.
    fn rng(&mut self) -> &mut dyn RngCore;
}

impl<T> Platform for &mut T
where
    T: Platform + ?Sized,
{
    fn defer(&mut self, work: DeferredWork) {
        (**self).defer(work)
    }

    fn start_timer(&mut self, timer: TimerId, timeout: Duration) {
        (**self).start_timer(timer, timeout)
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        (**self).cancel_timer(timer)
    }

    fn rng(&mut self) -> &mut dyn RngCore {
        (**self).rng()
    }
}
