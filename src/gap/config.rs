//! Configuration of the GAP controller

use super::privacy::{CentralPrivacyConfiguration, PeripheralPrivacyConfiguration};
use crate::error::Error;
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// The largest advertising data fragment allowed within a single HCI command
pub const MAX_ADVERTISING_FRAGMENT_LENGTH: u8 = 251;

/// The longest timeout for private addresses permitted by the Bluetooth Specification (0xA1B8
/// seconds)
pub const MAX_PRIVATE_ADDRESS_TIMEOUT: Duration = Duration::from_secs(0xA1B8);

/// The configuration of a [`Gap`](super::Gap)
///
/// The configuration is serializable so it can be stored along with the rest of the persisted
/// data of an application. Any missing field is set to its default when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    /// The length of the fragments that advertising data is split into
    pub max_advertising_fragment_length: u8,
    /// The time between regenerations of the private addresses
    pub private_address_timeout: Duration,
    /// The local identity resolving key
    ///
    /// A random key is generated when this is `None`. The key must be persisted (and given here)
    /// for bonded peers to resolve the addresses of this device after a restart.
    pub local_irk: Option<u128>,
    pub central_privacy: CentralPrivacyConfiguration,
    pub peripheral_privacy: PeripheralPrivacyConfiguration,
    /// The number of address resolution results that are cached
    pub resolution_cache_size: usize,
    /// The number of reports and connection completions that can wait for an address resolution
    pub resolution_buffer_size: usize,
}

impl GapConfig {
    /// Validate the configuration
    ///
    /// # Error
    /// `InvalidParameter` is returned when
    /// * the fragment length is zero or greater than [`MAX_ADVERTISING_FRAGMENT_LENGTH`]
    /// * the private address timeout is less than a second or greater than
    ///   [`MAX_PRIVATE_ADDRESS_TIMEOUT`]
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_advertising_fragment_length == 0
            || self.max_advertising_fragment_length > MAX_ADVERTISING_FRAGMENT_LENGTH
        {
            log::error!(
                "(GAP) invalid advertising fragment length {}",
                self.max_advertising_fragment_length
            );

            return Err(Error::InvalidParameter);
        }

        if self.private_address_timeout < Duration::from_secs(1)
            || self.private_address_timeout > MAX_PRIVATE_ADDRESS_TIMEOUT
        {
            log::error!(
                "(GAP) invalid private address timeout {:?}",
                self.private_address_timeout
            );

            return Err(Error::InvalidParameter);
        }

        Ok(())
    }
}

impl Default for GapConfig {
    fn default() -> Self {
        GapConfig {
            max_advertising_fragment_length: MAX_ADVERTISING_FRAGMENT_LENGTH,
            private_address_timeout: Duration::from_secs(15 * 60),
            local_irk: None,
            central_privacy: Default::default(),
            peripheral_privacy: Default::default(),
            resolution_cache_size: 16,
            resolution_buffer_size: 16,
        }
    }
}
