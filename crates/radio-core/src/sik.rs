//! SiK modem register model
//!
//! A SiK modem exposes a small table of numeric registers (`ATSn`). Serial
//! and air speeds are stored in encoded form; the tables here translate
//! between the encoded codes and real bit rates.

use std::ops::Index;

use crate::MAX_RADIO_HW_PARAMS;

/// Sentinel for a register that could not be read
pub const PARAM_UNSET: u32 = u32::MAX;

/// Register indices
pub mod param {
    pub const FORMAT: usize = 0;
    pub const SERIAL_SPEED: usize = 1;
    pub const AIR_SPEED: usize = 2;
    pub const NET_ID: usize = 3;
    pub const TX_POWER: usize = 4;
    pub const ECC: usize = 5;
    pub const MIN_FREQ: usize = 8;
    pub const MAX_FREQ: usize = 9;
    pub const NUM_CHANNELS: usize = 10;
    pub const DUTY_CYCLE: usize = 11;
    pub const LBT_RSSI: usize = 12;
    pub const MANCHESTER: usize = 13;
    pub const MAX_WINDOW: usize = 15;
}

pub const DEFAULT_NET_ID: u32 = 27;
pub const DEFAULT_CHANNELS: u32 = 5;
pub const DEFAULT_FREQ_SPREAD_KHZ: u32 = 1_000;
pub const DEFAULT_AIR_SPEED: u32 = 64_000;
pub const DEFAULT_TX_POWER: u32 = 20;
pub const MAX_TX_POWER: u32 = 30;
pub const DUTY_CYCLE_FULL: u32 = 100;
pub const MAX_WINDOW_MS: u32 = 50;
pub const LBT_RSSI_ON: u32 = 50;

/// Air data rates a SiK modem can be configured for, in bps
pub const AIR_RATES: [u32; 13] = [
    2_000, 4_000, 8_000, 16_000, 19_000, 24_000, 32_000, 48_000, 64_000, 96_000, 128_000,
    192_000, 250_000,
];

/// Serial speed codes and the real rate they stand for
const SERIAL_SPEED_CODES: [(u32, u32); 18] = [
    (1, 1_200),
    (2, 2_400),
    (4, 4_800),
    (8, 8_000),
    (9, 9_600),
    (16, 16_000),
    (19, 19_200),
    (24, 24_000),
    (32, 32_000),
    (38, 38_400),
    (48, 48_000),
    (57, 57_600),
    (64, 64_000),
    (96, 96_000),
    (111, 111_200),
    (115, 115_200),
    (128, 128_000),
    (250, 250_000),
];

const DEFAULT_SERIAL_SPEED: u32 = 57_600;

/// Real serial speed for an encoded `ATS1` value; unknown codes map to 57600
pub fn decode_serial_speed(code: u32) -> u32 {
    SERIAL_SPEED_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, rate)| *rate)
        .unwrap_or(DEFAULT_SERIAL_SPEED)
}

/// Encoded `ATS1` value for a real serial speed
///
/// Picks the first code whose rate is at least `rate`. Rates above the
/// fastest code map to 57600.
pub fn encode_serial_speed(rate: u32) -> u32 {
    SERIAL_SPEED_CODES
        .iter()
        .find(|(_, r)| rate <= *r)
        .map(|(code, _)| *code)
        .unwrap_or(57)
}

/// Encoded `ATS2` value for a real air speed
pub fn encode_air_speed(rate: u32) -> u32 {
    rate / 1000
}

pub fn decode_air_speed(code: u32) -> u32 {
    code.saturating_mul(1000)
}

/// Logical view of the 16 SiK registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SikParameterTable([u32; MAX_RADIO_HW_PARAMS]);

impl Default for SikParameterTable {
    fn default() -> Self {
        Self([PARAM_UNSET; MAX_RADIO_HW_PARAMS])
    }
}

impl SikParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: [u32; MAX_RADIO_HW_PARAMS]) -> Self {
        Self(slots)
    }

    pub fn slots(&self) -> &[u32; MAX_RADIO_HW_PARAMS] {
        &self.0
    }

    /// Register value, `None` when out of range or unset
    pub fn get(&self, index: usize) -> Option<u32> {
        self.0.get(index).copied().filter(|v| *v != PARAM_UNSET)
    }

    /// Store a register value; returns false for an out-of-range index
    pub fn set(&mut self, index: usize, value: u32) -> bool {
        match self.0.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.0 = [PARAM_UNSET; MAX_RADIO_HW_PARAMS];
    }
}

impl Index<usize> for SikParameterTable {
    type Output = u32;

    fn index(&self, index: usize) -> &u32 {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_codes() {
        assert_eq!(decode_serial_speed(57), 57_600);
        assert_eq!(decode_serial_speed(115), 115_200);
        assert_eq!(decode_serial_speed(111), 111_200);
        assert_eq!(decode_serial_speed(3), 57_600);
    }

    #[test]
    fn test_encode_rounds_up_to_next_code() {
        assert_eq!(encode_serial_speed(57_600), 57);
        assert_eq!(encode_serial_speed(115_200), 115);
        assert_eq!(encode_serial_speed(100_000), 111);
        assert_eq!(encode_serial_speed(300), 1);
        assert_eq!(encode_serial_speed(250_000), 250);
        assert_eq!(encode_serial_speed(300_000), 57);
        assert_eq!(encode_serial_speed(1_000_000), 57);
    }

    #[test]
    fn test_air_speed_codes() {
        assert_eq!(encode_air_speed(64_000), 64);
        assert_eq!(decode_air_speed(64), 64_000);
        for rate in AIR_RATES {
            assert_eq!(decode_air_speed(encode_air_speed(rate)), rate);
        }
    }

    #[test]
    fn test_parameter_table_unset_sentinel() {
        let mut table = SikParameterTable::new();
        assert_eq!(table.get(param::NET_ID), None);
        assert!(table.set(param::NET_ID, 0));
        assert_eq!(table.get(param::NET_ID), Some(0));
        assert_eq!(table[param::NET_ID], 0);
        assert!(!table.set(MAX_RADIO_HW_PARAMS, 1));
        assert_eq!(table.get(MAX_RADIO_HW_PARAMS), None);
        table.clear();
        assert_eq!(table[param::NET_ID], PARAM_UNSET);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn serial_speed_round_trip(rate in prop::sample::select(vec![
                1_200u32, 2_400, 4_800, 9_600, 19_200, 38_400, 57_600, 115_200,
            ])) {
                let code = encode_serial_speed(rate);
                prop_assert_eq!(encode_serial_speed(decode_serial_speed(code)), code);
            }

            #[test]
            fn any_rate_round_trips(rate in 1_200u32..400_000) {
                let code = encode_serial_speed(rate);
                prop_assert_eq!(encode_serial_speed(decode_serial_speed(code)), code);
            }
        }
    }
}
