//! Raw power index to milliwatt conversion tables
//!
//! Wi-Fi drivers take a raw power index. Each card model has a table of
//! measured output power at fixed raw index points; values in between are
//! linearly interpolated. A zero entry ends a table early. Serial radios
//! express power in dBm instead.

use crate::hardware::{CardModel, RadioDriver};

/// Raw index values at which the mW tables were measured
pub const RAW_MEASUREMENT_POINTS: [i32; 13] = [1, 10, 20, 30, 40, 45, 50, 53, 56, 60, 63, 68, 70];

/// Power levels offered to users, in mW
pub const UI_POWER_LEVELS_MW: [i32; 20] = [
    1, 5, 10, 25, 50, 75, 100, 150, 200, 250, 300, 350, 400, 450, 500, 600, 700, 800, 900, 1000,
];

/// Selectable raw power values
pub const RAW_POWER_VALUES: [i32; 19] = [
    1, 5, 10, 15, 20, 23, 26, 30, 35, 40, 45, 50, 53, 56, 60, 63, 65, 68, 70,
];

const SERIAL_MAX_MW: i32 = 100;
const SERIAL_MAX_RAW: i32 = 20;

type MwTable = [i32; 13];

const MW_722N: MwTable = [1, 1, 2, 3, 10, 25, 35, 60, 80, 90, 0, 0, 0];
const MW_BLUE_STICK: MwTable = [1, 2, 4, 8, 28, 50, 80, 110, 280, 1000, 0, 0, 0];
const MW_NH: MwTable = [1, 10, 20, 30, 40, 50, 60, 0, 0, 0, 0, 0, 0];
const MW_NHA: MwTable = [1, 1, 2, 6, 17, 70, 120, 180, 215, 310, 460, 0, 0];
const MW_58_GENERIC: MwTable = [1, 5, 17, 50, 150, 170, 190, 210, 261, 310, 0, 0, 0];
const MW_ACH: MwTable = [1, 2, 5, 20, 50, 90, 160, 250, 300, 420, 500, 0, 0];
const MW_ASUS_AC56: MwTable = [1, 4, 13, 42, 116, 190, 280, 360, 420, 490, 540, 0, 0];
const MW_RTL_DUAL_ANTENNA: MwTable = [1, 1, 2, 4, 15, 25, 40, 45, 55, 70, 80, 80, 0];
const MW_ALI_1W: MwTable = [1, 1, 2, 5, 10, 20, 30, 50, 100, 300, 450, 0, 0];
const MW_A6100: MwTable = [1, 1, 3, 10, 17, 19, 22, 23, 25, 0, 0, 0, 0];
const MW_ACS: MwTable = [1, 1, 2, 3, 10, 25, 35, 50, 60, 90, 110, 0, 0];
const MW_ARCHER_T2UP: MwTable = [1, 3, 10, 25, 55, 75, 110, 120, 140, 150, 0, 0, 0];
const MW_RTL8812EU: MwTable = [6, 7, 15, 45, 110, 160, 230, 270, 320, 380, 430, 500, 550];
const MW_OIPC_USIGHT: MwTable = [550, 600, 650, 670, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// Serial radios take power in dBm
pub fn is_serial_radio(driver: RadioDriver, card: CardModel) -> bool {
    matches!(driver, RadioDriver::SerialSik | RadioDriver::Serial) || card.is_serial_radio()
}

/// Measured mW table for a card model
pub fn mw_table(card: CardModel) -> &'static [i32; 13] {
    match card {
        CardModel::Tplink722n | CardModel::AtherosGeneric => &MW_722N,
        CardModel::BlueStick => &MW_BLUE_STICK,
        CardModel::Awus036nh => &MW_NH,
        CardModel::Awus036nha => &MW_NHA,
        CardModel::Rtl8812auGeneric | CardModel::Rtl8812auDualAntenna => &MW_RTL_DUAL_ANTENNA,
        CardModel::AsusAc56 => &MW_ASUS_AC56,
        CardModel::Awus036ach => &MW_ACH,
        CardModel::Awus036acs => &MW_ACS,
        CardModel::Zipray => &MW_ALI_1W,
        CardModel::NetgearA6100 => &MW_A6100,
        CardModel::ArcherT2uPlus => &MW_ARCHER_T2UP,
        CardModel::OipcUsight => &MW_OIPC_USIGHT,
        CardModel::Blue8812eu => &MW_RTL8812EU,
        _ => &MW_58_GENERIC,
    }
}

/// Number of valid entries before the terminating zero
fn usable_len(table: &MwTable) -> usize {
    table.iter().position(|&mw| mw <= 0).unwrap_or(table.len())
}

pub fn max_usable_mw(driver: RadioDriver, card: CardModel) -> i32 {
    if is_serial_radio(driver, card) {
        return SERIAL_MAX_MW;
    }
    let table = mw_table(card);
    table[usable_len(table).max(1) - 1]
}

pub fn max_usable_raw(driver: RadioDriver, card: CardModel) -> i32 {
    if is_serial_radio(driver, card) {
        return SERIAL_MAX_RAW;
    }
    RAW_MEASUREMENT_POINTS[usable_len(mw_table(card)).max(1) - 1]
}

/// Convert a raw power index to mW; negative indexes count as zero
pub fn raw_to_mw(driver: RadioDriver, card: CardModel, raw: i32) -> i32 {
    if is_serial_radio(driver, card) {
        return 10f64.powf(raw as f64 / 10.0) as i32;
    }
    let raw = raw.max(0);
    let table = mw_table(card);
    let points = &RAW_MEASUREMENT_POINTS;
    if raw <= points[0] {
        return table[0] * raw / points[0];
    }
    for i in 0..points.len() - 1 {
        if table[i + 1] <= 0 {
            return table[i];
        }
        if raw >= points[i] && raw <= points[i + 1] {
            return table[i] + (table[i + 1] - table[i]) * (raw - points[i]) / (points[i + 1] - points[i]);
        }
    }
    max_usable_mw(driver, card)
}

/// Convert mW to a raw power index, never below 1
pub fn mw_to_raw(driver: RadioDriver, card: CardModel, mw: i32) -> i32 {
    if is_serial_radio(driver, card) {
        if mw <= 0 {
            return 0;
        }
        return (10.0 * (mw as f64).log10()) as i32;
    }
    let table = mw_table(card);
    let points = &RAW_MEASUREMENT_POINTS;
    if mw <= table[0] {
        return (points[0] * mw / table[0]).max(1);
    }
    for i in 0..points.len() - 1 {
        if table[i + 1] <= 0 {
            return points[i];
        }
        if mw >= table[i] && mw <= table[i + 1] {
            if table[i + 1] == table[i] {
                return points[i];
            }
            return points[i] + (points[i + 1] - points[i]) * (mw - table[i]) / (table[i + 1] - table[i]);
        }
    }
    max_usable_raw(driver, card)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIFI: RadioDriver = RadioDriver::Rtl88xxau;

    #[test]
    fn test_table_selection() {
        assert_eq!(mw_table(CardModel::Awus036ach)[10], 500);
        assert_eq!(mw_table(CardModel::AtherosGeneric), mw_table(CardModel::Tplink722n));
        assert_eq!(mw_table(CardModel::Unknown), &MW_58_GENERIC);
        assert_eq!(mw_table(CardModel::TendaU12), &MW_58_GENERIC);
    }

    #[test]
    fn test_max_usable() {
        assert_eq!(max_usable_mw(WIFI, CardModel::Awus036ach), 500);
        assert_eq!(max_usable_raw(WIFI, CardModel::Awus036ach), 63);
        assert_eq!(max_usable_mw(WIFI, CardModel::Blue8812eu), 550);
        assert_eq!(max_usable_raw(WIFI, CardModel::Blue8812eu), 70);
        assert_eq!(max_usable_mw(RadioDriver::SerialSik, CardModel::Sik), 100);
        assert_eq!(max_usable_raw(RadioDriver::Serial, CardModel::Elrs), 20);
    }

    #[test]
    fn test_raw_to_mw_interpolates() {
        // ACH: raw 30 -> 20 mW, raw 40 -> 50 mW
        assert_eq!(raw_to_mw(WIFI, CardModel::Awus036ach, 30), 20);
        assert_eq!(raw_to_mw(WIFI, CardModel::Awus036ach, 35), 35);
        assert_eq!(raw_to_mw(WIFI, CardModel::Awus036ach, 1), 1);
    }

    #[test]
    fn test_raw_to_mw_negative_is_zero() {
        assert_eq!(raw_to_mw(WIFI, CardModel::Awus036ach, -5), 0);
        assert_eq!(raw_to_mw(WIFI, CardModel::Awus036ach, i32::MIN), 0);
        assert_eq!(raw_to_mw(RadioDriver::SerialSik, CardModel::Sik, i32::MIN), 0);
    }

    #[test]
    fn test_raw_to_mw_past_table_end() {
        // 722N table ends after raw 60
        assert_eq!(raw_to_mw(WIFI, CardModel::Tplink722n, 68), 90);
        assert_eq!(raw_to_mw(WIFI, CardModel::Blue8812eu, 71), 550);
    }

    #[test]
    fn test_mw_to_raw() {
        assert_eq!(mw_to_raw(WIFI, CardModel::Awus036ach, 50), 40);
        assert_eq!(mw_to_raw(WIFI, CardModel::Awus036ach, 0), 1);
        assert_eq!(mw_to_raw(WIFI, CardModel::Awus036ach, 5000), 63);
    }

    #[test]
    fn test_serial_dbm_conversion() {
        assert_eq!(raw_to_mw(RadioDriver::SerialSik, CardModel::Sik, 20), 100);
        assert_eq!(mw_to_raw(RadioDriver::SerialSik, CardModel::Sik, 100), 20);
        assert_eq!(raw_to_mw(RadioDriver::Serial, CardModel::Elrs, 10), 10);
    }
}
