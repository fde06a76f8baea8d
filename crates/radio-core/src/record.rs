//! Radio interface records and their fixed binary layout
//!
//! A record is encoded as a little-endian block of [`RECORD_SIZE`] bytes:
//!
//! | offset | field |
//! |-------:|-------|
//! | 0   | phy index `i32` |
//! | 4   | card model `i32` |
//! | 8   | radio type `i32` |
//! | 12  | driver `i32` |
//! | 16  | supported bands `u32` |
//! | 20  | capability flags `u32` |
//! | 24  | state bits `u32` |
//! | 28  | datarate `i32` |
//! | 32  | current frequency kHz `u32` |
//! | 36  | last failed frequency kHz `u32` |
//! | 40  | extra flags `u32` |
//! | 44  | 16 parameter slots `u32` |
//! | 108 | name, 32 bytes |
//! | 140 | description, 64 bytes |
//! | 204 | driver string / device path, 32 bytes |
//! | 236 | MAC or identity, 20 bytes |
//! | 256 | USB product id, 12 bytes |
//! | 268 | USB port token, 6 bytes |
//! | 274 | padding, 2 bytes |
//!
//! Strings are NUL padded and always NUL terminated inside their field.
//! Open-for-read/write flags are runtime state and are never written.

use crate::bands::{is_in_bands, SupportedBands};
use crate::error::ParseError;
use crate::hardware::{CapabilityFlags, CardModel, RadioDriver, RadioType};
use crate::sik::SikParameterTable;
use crate::MAX_RADIO_HW_PARAMS;

/// Encoded size of one record
pub const RECORD_SIZE: usize = 276;

/// Field capacities in bytes, including the terminating NUL
pub const NAME_LEN: usize = 32;
pub const DESCRIPTION_LEN: usize = 64;
pub const DRIVER_LEN: usize = 32;
pub const MAC_LEN: usize = 20;
pub const PRODUCT_ID_LEN: usize = 12;
pub const USB_PORT_LEN: usize = 6;

const STATE_SUPPORTED: u32 = 1;
const STATE_ENABLED: u32 = 1 << 1;
const STATE_HIGH_CAPACITY: u32 = 1 << 2;
const STATE_SERIAL: u32 = 1 << 3;
const STATE_CONFIGURABLE: u32 = 1 << 4;
const STATE_TX_CAPABLE: u32 = 1 << 5;
const STATE_LAST_FREQ_FAILED: u32 = 1 << 6;

const OFF_PARAMS: usize = 44;
const OFF_NAME: usize = OFF_PARAMS + 4 * MAX_RADIO_HW_PARAMS;
const OFF_DESCRIPTION: usize = OFF_NAME + NAME_LEN;
const OFF_DRIVER: usize = OFF_DESCRIPTION + DESCRIPTION_LEN;
const OFF_MAC: usize = OFF_DRIVER + DRIVER_LEN;
const OFF_PRODUCT_ID: usize = OFF_MAC + MAC_LEN;
const OFF_USB_PORT: usize = OFF_PRODUCT_ID + PRODUCT_ID_LEN;

/// One physical or virtual radio endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RadioInterfaceRecord {
    /// Wireless phy index, -1 for serial radios
    pub phy_index: i32,
    /// Interface name (e.g. `wlan0`) or display name for serial radios
    pub name: String,
    pub description: String,
    /// Kernel driver string, or the device path for serial radios
    pub driver_name: String,
    /// Hardware MAC without separators, or a synthesized identity for serial radios
    pub mac: String,
    /// USB `vid:pid` in lower case
    pub product_id: String,
    /// USB topology ordering token (e.g. `B3`, `X1`)
    pub usb_port: String,
    pub radio_type: RadioType,
    pub driver: RadioDriver,
    pub card_model: CardModel,
    pub supported_bands: SupportedBands,
    pub capabilities: CapabilityFlags,
    pub supported: bool,
    pub enabled: bool,
    pub high_capacity: bool,
    pub serial: bool,
    pub configurable: bool,
    pub tx_capable: bool,
    pub last_freq_set_failed: bool,
    pub datarate: i32,
    pub current_freq_khz: u32,
    /// Last frequency that failed to apply, 0 for none
    pub failed_freq_khz: u32,
    pub extra_flags: u32,
    /// Raw hardware parameter slots, used by SiK modems
    pub params: SikParameterTable,
    pub opened_for_read: bool,
    pub opened_for_write: bool,
}

impl Default for RadioInterfaceRecord {
    fn default() -> Self {
        Self {
            phy_index: -1,
            name: String::new(),
            description: String::new(),
            driver_name: String::new(),
            mac: String::new(),
            product_id: String::new(),
            usb_port: String::new(),
            radio_type: RadioType::Unknown,
            driver: RadioDriver::None,
            card_model: CardModel::Unknown,
            supported_bands: SupportedBands::empty(),
            capabilities: CapabilityFlags::empty(),
            supported: false,
            enabled: false,
            high_capacity: false,
            serial: false,
            configurable: false,
            tx_capable: false,
            last_freq_set_failed: false,
            datarate: 0,
            current_freq_khz: 0,
            failed_freq_khz: 0,
            extra_flags: 0,
            params: SikParameterTable::new(),
            opened_for_read: false,
            opened_for_write: false,
        }
    }
}

impl RadioInterfaceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wi-Fi class interface driven through the kernel networking stack
    pub fn is_wifi(&self) -> bool {
        matches!(
            self.radio_type,
            RadioType::Ralink | RadioType::Atheros | RadioType::Realtek | RadioType::Mediatek
        )
    }

    pub fn is_sik(&self) -> bool {
        self.driver == RadioDriver::SerialSik
    }

    pub fn is_elrs(&self) -> bool {
        self.card_model == CardModel::Elrs
    }

    /// Any radio reached over a serial port
    pub fn is_serial(&self) -> bool {
        self.serial || matches!(self.driver, RadioDriver::SerialSik | RadioDriver::Serial)
    }

    /// Identity used to tell records apart: device path for serial radios, MAC otherwise
    pub fn identity(&self) -> &str {
        if self.is_serial() {
            &self.driver_name
        } else {
            &self.mac
        }
    }

    pub fn supports_frequency(&self, freq_khz: u32) -> bool {
        is_in_bands(freq_khz, self.supported_bands)
    }

    /// Driver must agree with the radio type
    pub fn is_consistent(&self) -> bool {
        match self.driver.expected_type() {
            Some(expected) => expected == self.radio_type,
            None => true,
        }
    }

    /// Clear runtime-only state after loading from disk
    pub fn reset_runtime_state(&mut self) {
        self.opened_for_read = false;
        self.opened_for_write = false;
        if self.supported_bands.has_narrow_band() {
            self.high_capacity = false;
        }
    }

    /// Encode into the fixed binary layout
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        put_i32(&mut buf, 0, self.phy_index);
        put_i32(&mut buf, 4, self.card_model.as_raw());
        put_i32(&mut buf, 8, self.radio_type.as_raw());
        put_i32(&mut buf, 12, self.driver.as_raw());
        put_u32(&mut buf, 16, self.supported_bands.bits());
        put_u32(&mut buf, 20, self.capabilities.bits());
        put_u32(&mut buf, 24, self.state_bits());
        put_i32(&mut buf, 28, self.datarate);
        put_u32(&mut buf, 32, self.current_freq_khz);
        put_u32(&mut buf, 36, self.failed_freq_khz);
        put_u32(&mut buf, 40, self.extra_flags);
        for (i, value) in self.params.slots().iter().enumerate() {
            put_u32(&mut buf, OFF_PARAMS + 4 * i, *value);
        }
        put_str(&mut buf[OFF_NAME..OFF_NAME + NAME_LEN], &self.name);
        put_str(
            &mut buf[OFF_DESCRIPTION..OFF_DESCRIPTION + DESCRIPTION_LEN],
            &self.description,
        );
        put_str(&mut buf[OFF_DRIVER..OFF_DRIVER + DRIVER_LEN], &self.driver_name);
        put_str(&mut buf[OFF_MAC..OFF_MAC + MAC_LEN], &self.mac);
        put_str(
            &mut buf[OFF_PRODUCT_ID..OFF_PRODUCT_ID + PRODUCT_ID_LEN],
            &self.product_id,
        );
        put_str(&mut buf[OFF_USB_PORT..OFF_USB_PORT + USB_PORT_LEN], &self.usb_port);
        buf
    }

    /// Decode one record, rejecting short buffers and unknown enum values
    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < RECORD_SIZE {
            return Err(ParseError::Incomplete {
                needed: RECORD_SIZE - buf.len(),
            });
        }
        let state = get_u32(buf, 24);
        let mut slots = [0u32; MAX_RADIO_HW_PARAMS];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = get_u32(buf, OFF_PARAMS + 4 * i);
        }

        Ok(Self {
            phy_index: get_i32(buf, 0),
            card_model: CardModel::from_raw(get_i32(buf, 4))?,
            radio_type: RadioType::from_raw(get_i32(buf, 8))?,
            driver: RadioDriver::from_raw(get_i32(buf, 12))?,
            supported_bands: SupportedBands::from_bits(get_u32(buf, 16)),
            capabilities: CapabilityFlags::from_bits(get_u32(buf, 20)),
            supported: state & STATE_SUPPORTED != 0,
            enabled: state & STATE_ENABLED != 0,
            high_capacity: state & STATE_HIGH_CAPACITY != 0,
            serial: state & STATE_SERIAL != 0,
            configurable: state & STATE_CONFIGURABLE != 0,
            tx_capable: state & STATE_TX_CAPABLE != 0,
            last_freq_set_failed: state & STATE_LAST_FREQ_FAILED != 0,
            datarate: get_i32(buf, 28),
            current_freq_khz: get_u32(buf, 32),
            failed_freq_khz: get_u32(buf, 36),
            extra_flags: get_u32(buf, 40),
            params: SikParameterTable::from_slots(slots),
            name: get_str(&buf[OFF_NAME..OFF_NAME + NAME_LEN]),
            description: get_str(&buf[OFF_DESCRIPTION..OFF_DESCRIPTION + DESCRIPTION_LEN]),
            driver_name: get_str(&buf[OFF_DRIVER..OFF_DRIVER + DRIVER_LEN]),
            mac: get_str(&buf[OFF_MAC..OFF_MAC + MAC_LEN]),
            product_id: get_str(&buf[OFF_PRODUCT_ID..OFF_PRODUCT_ID + PRODUCT_ID_LEN]),
            usb_port: get_str(&buf[OFF_USB_PORT..OFF_USB_PORT + USB_PORT_LEN]),
            opened_for_read: false,
            opened_for_write: false,
        })
    }

    fn state_bits(&self) -> u32 {
        let mut bits = 0;
        for (on, bit) in [
            (self.supported, STATE_SUPPORTED),
            (self.enabled, STATE_ENABLED),
            (self.high_capacity, STATE_HIGH_CAPACITY),
            (self.serial, STATE_SERIAL),
            (self.configurable, STATE_CONFIGURABLE),
            (self.tx_capable, STATE_TX_CAPABLE),
            (self.last_freq_set_failed, STATE_LAST_FREQ_FAILED),
        ] {
            if on {
                bits |= bit;
            }
        }
        bits
    }
}

/// Truncate `s` so it fits a NUL terminated field of `capacity` bytes
pub fn truncate_to_field(s: &str, capacity: usize) -> &str {
    let max = capacity.saturating_sub(1);
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_str(field: &mut [u8], value: &str) {
    let value = truncate_to_field(value, field.len());
    field[..value.len()].copy_from_slice(value.as_bytes());
}

fn get_i32(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn get_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::Band;

    fn sample() -> RadioInterfaceRecord {
        let mut params = SikParameterTable::new();
        params.set(1, 57);
        params.set(8, 433_050);
        RadioInterfaceRecord {
            phy_index: 2,
            name: "wlan1".into(),
            description: "Realtek".into(),
            driver_name: "rtl88xxau".into(),
            mac: "00C0CAB12345".into(),
            product_id: "bda:8812".into(),
            usb_port: "B3".into(),
            radio_type: RadioType::Realtek,
            driver: RadioDriver::Rtl88xxau,
            card_model: CardModel::Awus036ach,
            supported_bands: SupportedBands::from(Band::Ghz24).with(Band::Ghz58),
            capabilities: CapabilityFlags::CAN_RX | CapabilityFlags::CAN_TX,
            supported: true,
            enabled: true,
            high_capacity: true,
            configurable: true,
            tx_capable: true,
            current_freq_khz: 5_805_000,
            params,
            ..Default::default()
        }
    }

    #[test]
    fn test_layout_offsets() {
        assert_eq!(OFF_NAME, 108);
        assert_eq!(OFF_USB_PORT + USB_PORT_LEN + 2, RECORD_SIZE);
    }

    #[test]
    fn test_encode_decode_preserves_fields() {
        let record = sample();
        let decoded = RadioInterfaceRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_open_flags_not_persisted() {
        let mut record = sample();
        record.opened_for_read = true;
        record.opened_for_write = true;
        let decoded = RadioInterfaceRecord::decode(&record.encode()).unwrap();
        assert!(!decoded.opened_for_read);
        assert!(!decoded.opened_for_write);
    }

    #[test]
    fn test_long_strings_truncated() {
        let mut record = sample();
        record.mac = "A".repeat(40);
        let decoded = RadioInterfaceRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.mac.len(), MAC_LEN - 1);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_to_field("abcé", 5), "abc");
        assert_eq!(truncate_to_field("abc", 5), "abc");
    }

    #[test]
    fn test_decode_rejects_short_and_unknown() {
        let bytes = sample().encode();
        assert_eq!(
            RadioInterfaceRecord::decode(&bytes[..100]),
            Err(ParseError::Incomplete {
                needed: RECORD_SIZE - 100
            })
        );

        let mut bad = bytes;
        bad[8..12].copy_from_slice(&99i32.to_le_bytes());
        assert!(matches!(
            RadioInterfaceRecord::decode(&bad),
            Err(ParseError::UnknownValue { kind: "radio type", .. })
        ));
    }

    #[test]
    fn test_reset_runtime_state_strips_high_capacity_on_narrow_bands() {
        let mut record = sample();
        record.supported_bands = SupportedBands::from(Band::Mhz433);
        record.opened_for_read = true;
        record.reset_runtime_state();
        assert!(!record.high_capacity);
        assert!(!record.opened_for_read);
    }

    #[test]
    fn test_identity_by_kind() {
        let wifi = sample();
        assert_eq!(wifi.identity(), "00C0CAB12345");

        let sik = RadioInterfaceRecord {
            driver: RadioDriver::SerialSik,
            radio_type: RadioType::Sik,
            driver_name: "/dev/ttyUSB0".into(),
            mac: "1-2-3-4-433-0".into(),
            ..Default::default()
        };
        assert!(sik.is_sik());
        assert!(sik.is_consistent());
        assert_eq!(sik.identity(), "/dev/ttyUSB0");
    }
}
