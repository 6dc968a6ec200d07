//! Bluetooth device addresses
//!
//! A LE device address is 48 bits. Random addresses encode their sub type within the two most
//! significant bits of the address (the upper bits of the last byte, addresses are stored little
//! endian).
//!
//! | sub type            | two most significant bits |
//! |---------------------|---------------------------|
//! | static              | `0b11`                    |
//! | non-resolvable      | `0b00`                    |
//! | resolvable private  | `0b01`                    |

use crate::cryptography::ah;
use core::fmt;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

const SUB_TYPE_MASK: u8 = 0b1100_0000;
const STATIC_BITS: u8 = 0b1100_0000;
const RESOLVABLE_BITS: u8 = 0b0100_0000;
const NON_RESOLVABLE_BITS: u8 = 0b0000_0000;

/// A Bluetooth device address
///
/// The address is stored in little endian order, which is the order it is transferred over the
/// host controller interface. It is displayed in the usual most significant byte first format.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BluetoothDeviceAddress(pub [u8; 6]);

impl BluetoothDeviceAddress {
    /// The all zero address
    ///
    /// This is not a valid address for any device.
    pub const ZERO: Self = BluetoothDeviceAddress([0; 6]);

    /// Create an address from its raw little endian bytes
    pub const fn new(raw: [u8; 6]) -> Self {
        BluetoothDeviceAddress(raw)
    }

    /// Check the random portion of an address (all bits but the two most significant)
    ///
    /// The random part can neither be all zeros nor all ones.
    fn random_part_is_valid(bytes: &[u8]) -> bool {
        let last = bytes.len() - 1;

        let is_zero = bytes[..last].iter().all(|b| *b == 0) && (bytes[last] & !SUB_TYPE_MASK) == 0;

        let is_ones = bytes[..last].iter().all(|b| *b == 0xFF) && (bytes[last] & !SUB_TYPE_MASK) == !SUB_TYPE_MASK;

        !is_zero && !is_ones
    }

    fn sub_type_bits(&self) -> u8 {
        self.0[5] & SUB_TYPE_MASK
    }

    /// Check if this is a valid static random address
    pub fn is_static_random(&self) -> bool {
        self.sub_type_bits() == STATIC_BITS && Self::random_part_is_valid(&self.0)
    }

    /// Check if this is a valid resolvable private address
    ///
    /// Only the random part of the *prand* is checked, this does not try to resolve the address.
    pub fn is_resolvable(&self) -> bool {
        self.sub_type_bits() == RESOLVABLE_BITS && Self::random_part_is_valid(&self.0[3..])
    }

    /// Check if this is a valid non-resolvable private address
    pub fn is_non_resolvable(&self) -> bool {
        self.sub_type_bits() == NON_RESOLVABLE_BITS && Self::random_part_is_valid(&self.0)
    }

    /// Create a new static random address
    pub fn new_static_random<R>(rng: &mut R) -> Self
    where
        R: RngCore + ?Sized,
    {
        loop {
            let mut raw = [0u8; 6];

            rng.fill_bytes(&mut raw);

            raw[5] = (raw[5] & !SUB_TYPE_MASK) | STATIC_BITS;

            let address = BluetoothDeviceAddress(raw);

            if address.is_static_random() {
                break address;
            }
        }
    }

    /// Create a new non-resolvable private address
    pub fn new_non_resolvable<R>(rng: &mut R) -> Self
    where
        R: RngCore + ?Sized,
    {
        loop {
            let mut raw = [0u8; 6];

            rng.fill_bytes(&mut raw);

            raw[5] &= !SUB_TYPE_MASK;

            let address = BluetoothDeviceAddress(raw);

            if address.is_non_resolvable() {
                break address;
            }
        }
    }

    /// Create a new resolvable private address
    ///
    /// The address is generated from the local identity resolving key `irk`. The three least
    /// significant bytes are the hash and the three most significant bytes are the *prand*.
    pub fn new_resolvable<R>(irk: u128, rng: &mut R) -> Self
    where
        R: RngCore + ?Sized,
    {
        let prand = loop {
            let mut prand = [0u8; 3];

            rng.fill_bytes(&mut prand);

            prand[2] = (prand[2] & !SUB_TYPE_MASK) | RESOLVABLE_BITS;

            if Self::random_part_is_valid(&prand) {
                break prand;
            }
        };

        let hash = ah(irk, prand);

        BluetoothDeviceAddress([hash[0], hash[1], hash[2], prand[0], prand[1], prand[2]])
    }

    /// Try to resolve this address with an identity resolving key
    ///
    /// Returns true if this is a resolvable private address that was generated from `irk`.
    pub fn resolve(&self, irk: u128) -> bool {
        let hash = [self.0[0], self.0[1], self.0[2]];
        let prand = [self.0[3], self.0[4], self.0[5]];

        self.is_resolvable() && ah(irk, prand) == hash
    }
}

impl From<[u8; 6]> for BluetoothDeviceAddress {
    fn from(raw: [u8; 6]) -> Self {
        BluetoothDeviceAddress(raw)
    }
}

impl AsRef<[u8]> for BluetoothDeviceAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BluetoothDeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl fmt::Debug for BluetoothDeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The address type used by this device in commands to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnAddressType {
    Public,
    Random,
}

impl OwnAddressType {
    pub fn into_raw(self) -> u8 {
        match self {
            OwnAddressType::Public => 0x00,
            OwnAddressType::Random => 0x01,
        }
    }
}

impl Default for OwnAddressType {
    fn default() -> Self {
        OwnAddressType::Public
    }
}

/// The address type of a peer device
///
/// The identity types are reported by the controller (or substituted by the host) when a private
/// address was resolved to the identity of a bonded device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerAddressType {
    Public,
    Random,
    PublicIdentity,
    RandomStaticIdentity,
    /// Used by anonymous advertising, there is no address
    Anonymous,
}

impl PeerAddressType {
    pub fn try_from_raw(raw: u8) -> Result<Self, u8> {
        match raw {
            0x00 => Ok(PeerAddressType::Public),
            0x01 => Ok(PeerAddressType::Random),
            0x02 => Ok(PeerAddressType::PublicIdentity),
            0x03 => Ok(PeerAddressType::RandomStaticIdentity),
            0xFF => Ok(PeerAddressType::Anonymous),
            _ => Err(raw),
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            PeerAddressType::Public => 0x00,
            PeerAddressType::Random => 0x01,
            PeerAddressType::PublicIdentity => 0x02,
            PeerAddressType::RandomStaticIdentity => 0x03,
            PeerAddressType::Anonymous => 0xFF,
        }
    }

    /// Check if this is an identity address type
    pub fn is_identity(&self) -> bool {
        matches!(
            self,
            PeerAddressType::PublicIdentity | PeerAddressType::RandomStaticIdentity
        )
    }

    /// Get the address type that is sent to a controller that does not resolve addresses
    pub fn without_identity(self) -> Self {
        match self {
            PeerAddressType::PublicIdentity => PeerAddressType::Public,
            PeerAddressType::RandomStaticIdentity => PeerAddressType::Random,
            other => other,
        }
    }
}

/// The address type of an identity address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IdentityAddressType {
    Public,
    RandomStatic,
}

impl IdentityAddressType {
    pub fn into_raw(self) -> u8 {
        match self {
            IdentityAddressType::Public => 0x00,
            IdentityAddressType::RandomStatic => 0x01,
        }
    }
}

impl From<IdentityAddressType> for PeerAddressType {
    fn from(ty: IdentityAddressType) -> Self {
        match ty {
            IdentityAddressType::Public => PeerAddressType::PublicIdentity,
            IdentityAddressType::RandomStatic => PeerAddressType::RandomStaticIdentity,
        }
    }
}

/// The kind of private address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivateAddressKind {
    Resolvable,
    NonResolvable,
}

/// An identity of a peer device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub address_type: IdentityAddressType,
    pub address: BluetoothDeviceAddress,
}
