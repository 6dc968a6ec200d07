//! `hci` common items
//!
//! These are the parameter types shared by the commands and events of the host controller
//! interface.

use core::fmt;

macro_rules! is_bit_set {
    ( $bits:expr, ($indx:expr,$bit:expr) ) => {
        ($bits[$indx] & (1 << $bit)) != 0
    };
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
pub struct ConnectionHandle {
    handle: u16,
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.handle)
    }
}

impl fmt::LowerHex for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.handle)
    }
}

impl fmt::UpperHex for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:X}", self.handle)
    }
}

impl ConnectionHandle {
    pub const MAX: u16 = 0x0EFF;

    /// Try to create a ConnectionHandle from a raw value
    ///
    /// # Error
    /// The raw value was greater then the maximum value.
    pub fn try_from(raw: u16) -> Result<ConnectionHandle, &'static str> {
        if raw <= ConnectionHandle::MAX {
            Ok(ConnectionHandle { handle: raw })
        } else {
            Err("Raw value larger then max")
        }
    }

    pub fn get_raw_handle(&self) -> u16 {
        self.handle
    }
}

/// The handle of an advertising set
///
/// Handle zero is the legacy advertising handle. It is the only handle available on a controller
/// without support for extended advertising.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct AdvertisingHandle(u8);

impl AdvertisingHandle {
    pub const MAX: u8 = 0xEF;

    /// The legacy advertising handle
    pub const LEGACY: AdvertisingHandle = AdvertisingHandle(0);

    pub fn try_from(raw: u8) -> Result<Self, &'static str> {
        if raw <= Self::MAX {
            Ok(AdvertisingHandle(raw))
        } else {
            Err("Raw value larger then max")
        }
    }

    pub fn get_raw_handle(&self) -> u8 {
        self.0
    }

    pub fn is_legacy(&self) -> bool {
        *self == Self::LEGACY
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AdvertisingHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The handle of a periodic advertising train that this device is synchronized to
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct SyncHandle(u16);

impl SyncHandle {
    pub const MAX: u16 = 0x0EFF;

    pub fn try_from(raw: u16) -> Result<Self, &'static str> {
        if raw <= Self::MAX {
            Ok(SyncHandle(raw))
        } else {
            Err("Raw value larger then max")
        }
    }

    pub fn get_raw_handle(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of this device within a connection
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Central,
    Peripheral,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) struct IntervalRange<T: PartialEq + PartialOrd> {
    pub low: T,
    pub hi: T,
    pub micro_sec_conv: u64,
}

impl<T: PartialEq + PartialOrd> IntervalRange<T> {
    pub fn contains(&self, val: &T) -> bool {
        self.low <= *val && *val <= self.hi
    }
}

impl From<IntervalRange<u16>> for IntervalRange<core::time::Duration> {
    fn from(raw: IntervalRange<u16>) -> IntervalRange<core::time::Duration> {
        IntervalRange {
            low: core::time::Duration::from_micros(raw.low as u64 * raw.micro_sec_conv),
            hi: core::time::Duration::from_micros(raw.hi as u64 * raw.micro_sec_conv),
            micro_sec_conv: raw.micro_sec_conv,
        }
    }
}

macro_rules! interval {
    ( $(#[ $expl:meta ])* $name:ident, $raw_low:expr, $raw_hi:expr,
        SpecDef, $raw_default:expr, $micro_sec_conv:expr ) =>
    {
        make_interval!(
            $(#[ $expl ])*
            $name,
            $raw_low,
            $raw_hi,
            #[doc = "This is a Bluetooth Specification defined default value"],
            $raw_default,
            $micro_sec_conv
        );
    };
    ( $(#[ $expl:meta ])* $name:ident, $raw_low:expr, $raw_hi:expr,
        ApiDef, $raw_default:expr, $micro_sec_conv:expr ) =>
    {
        make_interval!(
            $(#[ $expl ])*
            $name,
            $raw_low,
            $raw_hi,
            #[doc = "This is a default value defined by the API, the Bluetooth Specification"]
            #[doc = "does not specify a default for this interval"],
            $raw_default,
            $micro_sec_conv
        );
    }
}

macro_rules! make_interval {
    ( $(#[ $expl:meta ])*
        $name:ident,
        $raw_low:expr,
        $raw_hi:expr,
        $(#[ $raw_default_note:meta ])*,
        $raw_default:expr,
        $micro_sec_conv:expr) =>
    {
        $(#[ $expl ])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            interval: u16,
        }

        impl $name {
            const RAW_RANGE: IntervalRange<u16> = IntervalRange {
                low: $raw_low,
                hi: $raw_hi,
                micro_sec_conv: $micro_sec_conv,
            };

            /// The time of one unit of the raw value in microseconds
            pub const MICRO_SEC_CONV: u64 = $micro_sec_conv;

            /// Create an interval from a raw value
            ///
            /// # Error
            /// The value is out of bounds.
            pub fn try_from_raw(raw: u16) -> Result<Self, &'static str> {
                if $name::RAW_RANGE.contains(&raw) {
                    Ok($name { interval: raw })
                } else {
                    Err(concat!("Raw value out of range: ", $raw_low, "..=", $raw_hi))
                }
            }

            /// Create an interval from a Duration
            ///
            /// The duration is rounded down to a whole number of units.
            ///
            /// # Error
            /// the value is out of bounds.
            pub fn try_from_duration(duration: core::time::Duration) -> Result<Self, &'static str> {
                let duration_range = IntervalRange::<core::time::Duration>::from($name::RAW_RANGE);

                if duration_range.contains(&duration) {
                    Ok($name {
                        interval: (duration.as_micros() / $micro_sec_conv as u128) as u16,
                    })
                } else {
                    Err(concat!(
                        "Duration out of range: ",
                        stringify!(($raw_low * $micro_sec_conv)),
                        "us..=",
                        stringify!(($raw_hi * $micro_sec_conv)),
                        "us"
                    ))
                }
            }

            /// Get the raw value of the interval
            pub fn get_raw_val(&self) -> u16 {
                self.interval
            }

            /// Get the value of the interval as a `Duration`
            pub fn get_duration(&self) -> core::time::Duration {
                core::time::Duration::from_micros((self.interval as u64) * $micro_sec_conv)
            }
        }

        impl Default for $name {
            /// Creates an Interval with the default value for the interval
            ///
            $(#[ $raw_default_note ])*
            fn default() -> Self {
                $name { interval: $raw_default }
            }
        }
    };
}

interval!(
    /// The interval between connection events
    ConnectionInterval,
    0x0006,
    0x0C80,
    ApiDef,
    0x0028,
    1250
);

interval!(
    /// The supervision timeout of a connection
    SupervisionTimeout,
    0x000A,
    0x0C80,
    ApiDef,
    0x01F4,
    10000
);

interval!(
    /// The interval between the start of two consecutive scan windows
    ScanningInterval,
    0x0004,
    0x4000,
    SpecDef,
    0x0010,
    625
);

interval!(
    /// The duration of a scan window
    ScanningWindow,
    0x0004,
    0x4000,
    SpecDef,
    0x0010,
    625
);

interval!(
    /// The interval between advertising events
    AdvertisingInterval,
    0x0020,
    0x4000,
    SpecDef,
    0x0800,
    625
);

interval!(
    /// The interval between periodic advertising events
    PeriodicAdvertisingInterval,
    0x0006,
    0xFFFF,
    ApiDef,
    0x0050,
    1250
);

interval!(
    /// The synchronization timeout of a periodic advertising train
    SyncTimeout,
    0x000A,
    0x4000,
    ApiDef,
    0x0064,
    10000
);

/// The minimum and maximum length of a connection event
///
/// Both values are in units of 0.625 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEventLength {
    pub minimum: u16,
    pub maximum: u16,
}

impl ConnectionEventLength {
    /// A connection event length of zero
    ///
    /// This is used when accepting parameter requests automatically.
    pub const ZERO: Self = ConnectionEventLength { minimum: 0, maximum: 0 };
}

impl Default for ConnectionEventLength {
    fn default() -> Self {
        Self {
            minimum: 0,
            maximum: 0xFFFF,
        }
    }
}

/// A LE physical layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phy {
    Le1M,
    Le2M,
    LeCoded,
}

impl Phy {
    pub fn try_from_raw(raw: u8) -> Result<Self, u8> {
        match raw {
            0x01 => Ok(Phy::Le1M),
            0x02 => Ok(Phy::Le2M),
            0x03 => Ok(Phy::LeCoded),
            _ => Err(raw),
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Phy::Le1M => 0x01,
            Phy::Le2M => 0x02,
            Phy::LeCoded => 0x03,
        }
    }
}

impl Default for Phy {
    fn default() -> Self {
        Phy::Le1M
    }
}

/// A set of PHYs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhySet {
    pub le_1m: bool,
    pub le_2m: bool,
    pub le_coded: bool,
}

impl PhySet {
    pub const LE_1M: PhySet = PhySet {
        le_1m: true,
        le_2m: false,
        le_coded: false,
    };

    pub fn contains(&self, phy: Phy) -> bool {
        match phy {
            Phy::Le1M => self.le_1m,
            Phy::Le2M => self.le_2m,
            Phy::LeCoded => self.le_coded,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.le_1m || self.le_2m || self.le_coded)
    }

    /// Get the bit mask of this set as used by the host controller interface
    pub fn into_raw(self) -> u8 {
        (self.le_1m as u8) | (self.le_2m as u8) << 1 | (self.le_coded as u8) << 2
    }
}

/// The preferred coding when transmitting on the LE Coded PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedPhyOption {
    NoPreference,
    S2,
    S8,
}

/// The LE features supported by the controller
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum LeFeature {
    LeEncryption,
    ConnectionParametersRequestProcedure,
    ExtendedRejectIndication,
    PeripheralInitiatedFeaturesExchange,
    LePing,
    LeDataPacketLengthExtension,
    LlPrivacy,
    ExtendedScannerFilterPolicies,
    Le2MPhy,
    StableModulationIndexTransmitter,
    StableModulationIndexReceiver,
    LeCodedPhy,
    LeExtendedAdvertising,
    LePeriodicAdvertising,
    ChannelSelectionAlgorithm2,
    LePowerClass1,
    MinimumNumberOfUsedChannelsProcedure,
}

impl LeFeature {
    /// The (octet, bit) position of the feature within the LE features mask
    fn bit_position(&self) -> (usize, u8) {
        use LeFeature::*;

        match self {
            LeEncryption => (0, 0),
            ConnectionParametersRequestProcedure => (0, 1),
            ExtendedRejectIndication => (0, 2),
            PeripheralInitiatedFeaturesExchange => (0, 3),
            LePing => (0, 4),
            LeDataPacketLengthExtension => (0, 5),
            LlPrivacy => (0, 6),
            ExtendedScannerFilterPolicies => (0, 7),
            Le2MPhy => (1, 0),
            StableModulationIndexTransmitter => (1, 1),
            StableModulationIndexReceiver => (1, 2),
            LeCodedPhy => (1, 3),
            LeExtendedAdvertising => (1, 4),
            LePeriodicAdvertising => (1, 5),
            ChannelSelectionAlgorithm2 => (1, 6),
            LePowerClass1 => (1, 7),
            MinimumNumberOfUsedChannelsProcedure => (2, 0),
        }
    }
}

/// The LE features mask reported by the controller
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct LeFeatures {
    raw: [u8; 8],
}

impl LeFeatures {
    pub fn from_raw(raw: [u8; 8]) -> Self {
        LeFeatures { raw }
    }

    /// Create a feature mask from a list of features
    pub fn from_features<'a, I>(features: I) -> Self
    where
        I: IntoIterator<Item = &'a LeFeature>,
    {
        let mut raw = [0u8; 8];

        for feature in features {
            let (octet, bit) = feature.bit_position();

            raw[octet] |= 1 << bit;
        }

        LeFeatures { raw }
    }

    pub fn contains(&self, feature: LeFeature) -> bool {
        let (octet, bit) = feature.bit_position();

        is_bit_set!(self.raw, (octet, bit))
    }

    pub fn into_raw(self) -> [u8; 8] {
        self.raw
    }
}
