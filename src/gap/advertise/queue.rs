//! The queue of advertising set enable and disable commands
//!
//! Enabling or disabling extended advertising sets is batched. Requests made within the same tick
//! are queued, and the queue is flushed as (at most) one disable command followed by one enable
//! command.

use crate::hci::common::AdvertisingHandle;
use crate::hci::EnableSet;
use alloc::vec::Vec;

/// The number of commands the queue holds before it is flushed early
pub const ENABLE_QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueuedCommand {
    pub enable: bool,
    pub set: EnableSet,
}

#[derive(Debug, Default)]
pub(crate) struct EnableQueue {
    commands: Vec<QueuedCommand>,
    /// A `FlushAdvertisingQueue` was deferred and has not run yet
    pub flush_scheduled: bool,
    /// A flush was attempted while a targeted set had a command in flight
    pub flush_postponed: bool,
}

impl EnableQueue {
    /// Add a command
    ///
    /// A previous command for the same set is replaced. Returns true when the queue is full.
    pub(crate) fn push(&mut self, command: QueuedCommand) -> bool {
        self.remove(command.set.handle);

        self.commands.push(command);

        self.commands.len() >= ENABLE_QUEUE_CAPACITY
    }

    /// Remove any command for a set
    ///
    /// Returns the removed command.
    pub(crate) fn remove(&mut self, handle: AdvertisingHandle) -> Option<QueuedCommand> {
        let index = self.commands.iter().position(|c| c.set.handle == handle)?;

        Some(self.commands.remove(index))
    }

    #[cfg(test)]
    fn contains_enable(&self, handle: AdvertisingHandle) -> bool {
        self.commands.iter().any(|c| c.enable && c.set.handle == handle)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn handles(&self) -> impl Iterator<Item = AdvertisingHandle> + '_ {
        self.commands.iter().map(|c| c.set.handle)
    }

    /// Take every command
    ///
    /// Returns the sets to disable and the sets to enable, both in the order they were queued.
    pub(crate) fn take(&mut self) -> (Vec<EnableSet>, Vec<EnableSet>) {
        let (enables, disables): (Vec<_>, Vec<_>) = self.commands.drain(..).partition(|c| c.enable);

        (
            disables.into_iter().map(|c| c.set).collect(),
            enables.into_iter().map(|c| c.set).collect(),
        )
    }
}
