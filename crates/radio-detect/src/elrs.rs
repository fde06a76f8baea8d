//! ELRS serial radios
//!
//! ELRS modules are not probed: a serial port assigned an ELRS role is
//! taken at its word and gets a fixed-frequency radio record.

use radio_core::{
    Band, CapabilityFlags, CardModel, RadioDriver, RadioInterfaceRecord, RadioType, SupportedBands,
};
use tracing::{info, warn};

use crate::error::DetectError;
use crate::registry::RadioContext;
use crate::scanner::SerialContext;

/// Nominal frequency of an ELRS band
fn elrs_frequency(band: Band) -> u32 {
    match band {
        Band::Mhz433 => 433_000,
        Band::Mhz868 => 868_000,
        Band::Mhz915 => 915_000,
        _ => 2_400_000,
    }
}

fn elrs_record(path: &str, band: Band) -> RadioInterfaceRecord {
    let tail: String = {
        let chars: Vec<char> = path.chars().collect();
        chars[chars.len().saturating_sub(4)..].iter().collect()
    };
    RadioInterfaceRecord {
        name: "ELRS".to_string(),
        description: "ELRS radio".to_string(),
        driver_name: path.to_string(),
        mac: format!("ELRS{}", tail),
        usb_port: "X".to_string(),
        radio_type: RadioType::Serial,
        driver: RadioDriver::Serial,
        card_model: CardModel::Elrs,
        supported_bands: SupportedBands::from(band),
        capabilities: CapabilityFlags::DATA
            | CapabilityFlags::CAN_RX
            | CapabilityFlags::CAN_TX
            | CapabilityFlags::SERIAL_LINK
            | CapabilityFlags::ELRS_RADIO,
        supported: true,
        enabled: true,
        serial: true,
        configurable: false,
        tx_capable: true,
        current_freq_khz: elrs_frequency(band),
        ..Default::default()
    }
}

/// Register one record per serial port holding an ELRS role
///
/// A record already on the same path is refreshed in place. The registry
/// is saved if anything was added.
pub fn add_elrs_radios(radios: &mut RadioContext, serial: &SerialContext) -> Result<usize, DetectError> {
    let mut added = 0;
    for port in serial.ports() {
        let Some(band) = port.usage.elrs_band() else {
            continue;
        };
        let record = elrs_record(&port.path, band);
        info!(
            "ELRS radio on {} ({}, {} kHz)",
            port.path,
            band.name(),
            record.current_freq_khz
        );
        match radios.add_record(record) {
            Ok(_) => added += 1,
            Err(e) => {
                warn!("Cannot register ELRS radio on {}: {}", port.path, e);
                break;
            }
        }
    }
    if added > 0 {
        radios.save()?;
    }
    Ok(added)
}
