//! Hardware classification enums and capability flags
//!
//! The numeric values are part of the persisted formats and must not change.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::error::ParseError;

/// Chipset family of a radio interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RadioType {
    #[default]
    Unknown,
    Ralink,
    Atheros,
    Realtek,
    Mediatek,
    Sik,
    Serial,
}

impl RadioType {
    pub fn as_raw(self) -> i32 {
        match self {
            RadioType::Unknown => 0,
            RadioType::Ralink => 1,
            RadioType::Atheros => 2,
            RadioType::Realtek => 3,
            RadioType::Mediatek => 4,
            RadioType::Sik => 5,
            RadioType::Serial => 6,
        }
    }

    pub fn from_raw(value: i32) -> Result<Self, ParseError> {
        Ok(match value {
            0 => RadioType::Unknown,
            1 => RadioType::Ralink,
            2 => RadioType::Atheros,
            3 => RadioType::Realtek,
            4 => RadioType::Mediatek,
            5 => RadioType::Sik,
            6 => RadioType::Serial,
            other => {
                return Err(ParseError::UnknownValue {
                    kind: "radio type",
                    value: other as i64,
                })
            }
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            RadioType::Unknown => "Unknown",
            RadioType::Ralink => "Ralink",
            RadioType::Atheros => "Atheros",
            RadioType::Realtek => "Realtek",
            RadioType::Mediatek => "Mediatek",
            RadioType::Sik => "SiK",
            RadioType::Serial => "Serial",
        }
    }
}

impl fmt::Display for RadioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kernel driver (or serial protocol) used by a radio interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RadioDriver {
    #[default]
    None,
    Atheros,
    Ralink,
    Mediatek,
    Rtl88xxau,
    Rtl8812au,
    Realtek8812au,
    Rtl88x2bu,
    SerialSik,
    Serial,
    Rtl8812eu,
    Rtl8733bu,
}

impl RadioDriver {
    pub fn as_raw(self) -> i32 {
        match self {
            RadioDriver::None => 0,
            RadioDriver::Atheros => 1,
            RadioDriver::Ralink => 2,
            RadioDriver::Mediatek => 3,
            RadioDriver::Rtl88xxau => 4,
            RadioDriver::Rtl8812au => 5,
            RadioDriver::Realtek8812au => 6,
            RadioDriver::Rtl88x2bu => 7,
            RadioDriver::SerialSik => 8,
            RadioDriver::Serial => 9,
            RadioDriver::Rtl8812eu => 10,
            RadioDriver::Rtl8733bu => 15,
        }
    }

    pub fn from_raw(value: i32) -> Result<Self, ParseError> {
        Ok(match value {
            0 => RadioDriver::None,
            1 => RadioDriver::Atheros,
            2 => RadioDriver::Ralink,
            3 => RadioDriver::Mediatek,
            4 => RadioDriver::Rtl88xxau,
            5 => RadioDriver::Rtl8812au,
            6 => RadioDriver::Realtek8812au,
            7 => RadioDriver::Rtl88x2bu,
            8 => RadioDriver::SerialSik,
            9 => RadioDriver::Serial,
            10 => RadioDriver::Rtl8812eu,
            15 => RadioDriver::Rtl8733bu,
            other => {
                return Err(ParseError::UnknownValue {
                    kind: "radio driver",
                    value: other as i64,
                })
            }
        })
    }

    /// Radio type every record using this driver must carry
    ///
    /// `None` matches any type since unknown interfaces have no driver.
    pub fn expected_type(self) -> Option<RadioType> {
        match self {
            RadioDriver::None => None,
            RadioDriver::Atheros => Some(RadioType::Atheros),
            RadioDriver::Ralink => Some(RadioType::Ralink),
            RadioDriver::Mediatek => Some(RadioType::Mediatek),
            RadioDriver::Rtl88xxau
            | RadioDriver::Rtl8812au
            | RadioDriver::Realtek8812au
            | RadioDriver::Rtl88x2bu
            | RadioDriver::Rtl8812eu
            | RadioDriver::Rtl8733bu => Some(RadioType::Realtek),
            RadioDriver::SerialSik => Some(RadioType::Sik),
            RadioDriver::Serial => Some(RadioType::Serial),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RadioDriver::None => "none",
            RadioDriver::Atheros => "ath9k_htc",
            RadioDriver::Ralink => "rt2800usb",
            RadioDriver::Mediatek => "mt7601u",
            RadioDriver::Rtl88xxau => "rtl88xxau",
            RadioDriver::Rtl8812au => "rtl8812au",
            RadioDriver::Realtek8812au => "8812au",
            RadioDriver::Rtl88x2bu => "rtl88x2bu",
            RadioDriver::SerialSik => "sik",
            RadioDriver::Serial => "serial",
            RadioDriver::Rtl8812eu => "rtl8812eu",
            RadioDriver::Rtl8733bu => "rtl8733bu",
        }
    }
}

impl fmt::Display for RadioDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Known radio card models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CardModel {
    #[default]
    Unknown,
    Tplink722n,
    Awus036nha,
    Awus036nh,
    Awus036ach,
    AsusAc56,
    BlueStick,
    Rtl8812auDualAntenna,
    NetgearA6100,
    TendaU12,
    Rtl8812auAf1,
    Zipray,
    ArcherT2uPlus,
    Rtl8814au,
    Awus036acs,
    Blue8812eu,
    AtherosGeneric,
    Rtl8812auGeneric,
    OipcUsight,
    OipcUsight2,
    Rtl8733bu,
    Sik,
    Serial,
    Elrs,
}

impl CardModel {
    pub fn as_raw(self) -> i32 {
        match self {
            CardModel::Unknown => 0,
            CardModel::Tplink722n => 1,
            CardModel::Awus036nha => 2,
            CardModel::Awus036nh => 3,
            CardModel::Awus036ach => 4,
            CardModel::AsusAc56 => 5,
            CardModel::BlueStick => 6,
            CardModel::Rtl8812auDualAntenna => 7,
            CardModel::NetgearA6100 => 8,
            CardModel::TendaU12 => 9,
            CardModel::Rtl8812auAf1 => 10,
            CardModel::Zipray => 11,
            CardModel::ArcherT2uPlus => 12,
            CardModel::Rtl8814au => 13,
            CardModel::Awus036acs => 14,
            CardModel::Blue8812eu => 15,
            CardModel::AtherosGeneric => 16,
            CardModel::Rtl8812auGeneric => 17,
            CardModel::OipcUsight => 18,
            CardModel::OipcUsight2 => 19,
            CardModel::Rtl8733bu => 20,
            CardModel::Sik => 100,
            CardModel::Serial => 101,
            CardModel::Elrs => 102,
        }
    }

    pub fn from_raw(value: i32) -> Result<Self, ParseError> {
        Ok(match value {
            0 => CardModel::Unknown,
            1 => CardModel::Tplink722n,
            2 => CardModel::Awus036nha,
            3 => CardModel::Awus036nh,
            4 => CardModel::Awus036ach,
            5 => CardModel::AsusAc56,
            6 => CardModel::BlueStick,
            7 => CardModel::Rtl8812auDualAntenna,
            8 => CardModel::NetgearA6100,
            9 => CardModel::TendaU12,
            10 => CardModel::Rtl8812auAf1,
            11 => CardModel::Zipray,
            12 => CardModel::ArcherT2uPlus,
            13 => CardModel::Rtl8814au,
            14 => CardModel::Awus036acs,
            15 => CardModel::Blue8812eu,
            16 => CardModel::AtherosGeneric,
            17 => CardModel::Rtl8812auGeneric,
            18 => CardModel::OipcUsight,
            19 => CardModel::OipcUsight2,
            20 => CardModel::Rtl8733bu,
            100 => CardModel::Sik,
            101 => CardModel::Serial,
            102 => CardModel::Elrs,
            other => {
                return Err(ParseError::UnknownValue {
                    kind: "card model",
                    value: other as i64,
                })
            }
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CardModel::Unknown => "Generic",
            CardModel::Tplink722n => "TPLink 722N",
            CardModel::Awus036nha => "Alfa AWUS036NHA",
            CardModel::Awus036nh => "Alfa AWUS036NH",
            CardModel::Awus036ach => "Alfa AWUS036ACH",
            CardModel::AsusAc56 => "ASUS AC56",
            CardModel::BlueStick => "Blue Stick",
            CardModel::Rtl8812auDualAntenna => "RTL8812AU Dual Antenna",
            CardModel::NetgearA6100 => "Netgear A6100",
            CardModel::TendaU12 => "Tenda U12",
            CardModel::Rtl8812auAf1 => "RTL8812AU AF1",
            CardModel::Zipray => "Zipray",
            CardModel::ArcherT2uPlus => "Archer T2U Plus",
            CardModel::Rtl8814au => "RTL8814AU",
            CardModel::Awus036acs => "Alfa AWUS036ACS",
            CardModel::Blue8812eu => "Blue 8812EU",
            CardModel::AtherosGeneric => "Atheros Generic",
            CardModel::Rtl8812auGeneric => "RTL8812AU Generic",
            CardModel::OipcUsight => "OpenIPC USight",
            CardModel::OipcUsight2 => "OpenIPC USight2",
            CardModel::Rtl8733bu => "RTL8733BU",
            CardModel::Sik => "SiK Radio",
            CardModel::Serial => "Serial Radio",
            CardModel::Elrs => "ELRS",
        }
    }

    /// Serial radios report power in dBm rather than through a driver index
    pub fn is_serial_radio(self) -> bool {
        matches!(self, CardModel::Sik | CardModel::Serial | CardModel::Elrs)
    }
}

impl fmt::Display for CardModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability bitmask of an interface or a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CapabilityFlags(u32);

impl CapabilityFlags {
    pub const VIDEO: Self = Self(1);
    pub const DATA: Self = Self(1 << 2);
    pub const RELAY: Self = Self(1 << 4);
    pub const CAN_RX: Self = Self(1 << 5);
    pub const CAN_TX: Self = Self(1 << 6);
    pub const DISABLED: Self = Self(1 << 7);
    pub const HIGH_CAPACITY: Self = Self(1 << 9);
    pub const SERIAL_LINK: Self = Self(1 << 10);
    pub const SIK_RADIO: Self = Self(1 << 11);
    pub const ELRS_RADIO: Self = Self(1 << 12);
    pub const BOOSTER_2W: Self = Self(1 << 13);
    pub const BOOSTER_4W: Self = Self(1 << 14);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Default flags for a newly seen card
    pub fn default_for_card(is_sik: bool) -> Self {
        let mut flags = Self::VIDEO | Self::DATA | Self::CAN_RX | Self::CAN_TX;
        if is_sik {
            flags.remove(Self::VIDEO);
        }
        flags
    }
}

impl BitOr for CapabilityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CapabilityFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Extra record flags
pub mod extra_flags {
    /// SiK firmware older than 2.2
    pub const FIRMWARE_OLD: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_raw_round_trip() {
        for raw in 0..=6 {
            assert_eq!(RadioType::from_raw(raw).unwrap().as_raw(), raw);
        }
        for raw in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 15] {
            assert_eq!(RadioDriver::from_raw(raw).unwrap().as_raw(), raw);
        }
        for raw in (0..=20).chain(100..=102) {
            assert_eq!(CardModel::from_raw(raw).unwrap().as_raw(), raw);
        }
    }

    #[test]
    fn test_unknown_enum_values_rejected() {
        assert!(RadioType::from_raw(7).is_err());
        assert!(RadioDriver::from_raw(11).is_err());
        assert!(CardModel::from_raw(21).is_err());
        assert!(CardModel::from_raw(-1).is_err());
    }

    #[test]
    fn test_driver_type_consistency() {
        assert_eq!(RadioDriver::Rtl8812eu.expected_type(), Some(RadioType::Realtek));
        assert_eq!(RadioDriver::SerialSik.expected_type(), Some(RadioType::Sik));
        assert_eq!(RadioDriver::None.expected_type(), None);
    }

    #[test]
    fn test_capability_flags() {
        let sik = CapabilityFlags::default_for_card(true);
        assert!(!sik.contains(CapabilityFlags::VIDEO));
        assert!(sik.contains(CapabilityFlags::DATA | CapabilityFlags::CAN_TX));

        let mut wifi = CapabilityFlags::default_for_card(false);
        assert!(wifi.contains(CapabilityFlags::VIDEO));
        wifi.set(CapabilityFlags::DISABLED, true);
        assert!(wifi.contains(CapabilityFlags::DISABLED));
        wifi.set(CapabilityFlags::DISABLED, false);
        assert!(!wifi.contains(CapabilityFlags::DISABLED));
        assert_eq!(CapabilityFlags::VIDEO.bits(), 1);
    }
}
