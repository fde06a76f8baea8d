//! Radio interface registry
//!
//! Owns every [`RadioInterfaceRecord`] for the process lifetime and persists
//! them to a binary file:
//!
//! ```text
//! i32 count | count x record (RECORD_SIZE bytes) | u32 crc32
//! ```
//!
//! The CRC covers the count and all record bytes. Any short read, bad count,
//! unknown enum value or CRC mismatch rejects the whole file.

use std::path::Path;

use radio_core::{RadioInterfaceRecord, RECORD_SIZE, MAX_RADIO_INTERFACES};
use tracing::{debug, info, warn};

use crate::elrs::add_elrs_radios;
use crate::error::DetectError;
use crate::hwprobe::HardwareProbe;
use crate::paths::{write_replace, RadioPaths};
use crate::probe::PortOpener;
use crate::scanner::SerialContext;
use crate::sik::SikEngine;
use crate::wifi::enumerate_wifi;

/// Process-wide radio interface registry
#[derive(Debug, Clone)]
pub struct RadioContext {
    records: Vec<RadioInterfaceRecord>,
    paths: RadioPaths,
}

impl RadioContext {
    pub fn new(paths: RadioPaths) -> Self {
        Self {
            records: Vec::new(),
            paths,
        }
    }

    pub fn paths(&self) -> &RadioPaths {
        &self.paths
    }

    pub fn records(&self) -> &[RadioInterfaceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RadioInterfaceRecord> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RadioInterfaceRecord> {
        self.records.get_mut(index)
    }

    pub fn find_by_mac(&self, mac: &str) -> Option<usize> {
        self.records.iter().position(|r| r.mac == mac)
    }

    pub fn find_by_usb_port(&self, token: &str) -> Option<usize> {
        self.records.iter().position(|r| r.usb_port == token)
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|r| r.name == name)
    }

    /// Serial radio bound to a device path
    pub fn find_by_device_path(&self, path: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.is_serial() && r.driver_name == path)
    }

    /// Replace the whole record set
    pub fn replace_all(&mut self, mut records: Vec<RadioInterfaceRecord>) {
        if records.len() > MAX_RADIO_INTERFACES {
            warn!("Dropping {} radio record(s) over capacity", records.len() - MAX_RADIO_INTERFACES);
            records.truncate(MAX_RADIO_INTERFACES);
        }
        self.records = records;
    }

    /// Add a record, or replace the one with the same identity
    pub fn add_record(&mut self, record: RadioInterfaceRecord) -> Result<usize, DetectError> {
        if let Some(index) = self
            .records
            .iter()
            .position(|r| r.is_serial() == record.is_serial() && r.identity() == record.identity())
        {
            debug!("Replacing radio record {} ({})", index, record.identity());
            self.records[index] = record;
            return Ok(index);
        }
        if self.records.len() >= MAX_RADIO_INTERFACES {
            warn!("No room for radio {} ({})", record.name, record.identity());
            return Err(DetectError::RegistryFull {
                capacity: MAX_RADIO_INTERFACES,
            });
        }
        self.records.push(record);
        Ok(self.records.len() - 1)
    }

    /// Remove the serial radio on `path`, compacting the list
    pub fn remove_serial_radio(&mut self, path: &str) -> bool {
        match self.find_by_device_path(path) {
            Some(index) => {
                let removed = self.records.remove(index);
                info!("Removed serial radio {} on {}", removed.name, path);
                true
            }
            None => false,
        }
    }

    pub fn supports_frequency(&self, index: usize, freq_khz: u32) -> bool {
        self.records
            .get(index)
            .is_some_and(|r| r.supports_frequency(freq_khz))
    }

    /// Set the current frequency after validating it against the bands
    pub fn set_frequency(&mut self, index: usize, freq_khz: u32) -> Result<(), DetectError> {
        let record = self
            .records
            .get_mut(index)
            .ok_or_else(|| DetectError::NotFound(format!("radio interface {}", index)))?;

        let allowed = if record.is_serial() && !record.configurable {
            freq_khz == record.current_freq_khz
        } else {
            record.supports_frequency(freq_khz)
        };
        if !allowed {
            warn!(
                "Interface {} ({}) cannot use {} kHz (bands: {})",
                index, record.name, freq_khz, record.supported_bands
            );
            return Err(DetectError::UnsupportedFrequency { index, freq_khz });
        }
        record.current_freq_khz = freq_khz;
        record.last_freq_set_failed = false;
        record.failed_freq_khz = 0;
        Ok(())
    }

    pub fn supported_count(&self) -> usize {
        self.records.iter().filter(|r| r.supported).count()
    }

    /// True if any interface works on a narrow sub-GHz band
    pub fn has_low_capacity_links(&self) -> bool {
        self.records.iter().any(|r| r.supported_bands.has_narrow_band())
    }

    pub fn sik_records(&self) -> impl Iterator<Item = &RadioInterfaceRecord> {
        self.records.iter().filter(|r| r.is_sik())
    }

    pub fn save(&self) -> Result<(), DetectError> {
        let file = self.paths.hardware_info();
        write_replace(&file, &encode_registry(&self.records))?;
        info!("Saved {} radio interface(s) to {}", self.records.len(), file.display());
        Ok(())
    }

    /// Replace the in-memory set with the persisted one
    pub fn load(&mut self) -> Result<(), DetectError> {
        let file = self.paths.hardware_info();
        let bytes = std::fs::read(&file)?;
        let records = decode_registry(&bytes).map_err(|reason| corrupt(&file, reason))?;
        info!("Loaded {} radio interface(s) from {}", records.len(), file.display());
        self.records = records;
        Ok(())
    }

    /// Fresh discovery of Wi-Fi radios, SiK modems and ELRS radios, then save
    pub async fn enumerate<O: PortOpener>(
        &mut self,
        probe: &dyn HardwareProbe,
        serial: &mut SerialContext,
        sik: &SikEngine<O>,
    ) -> Result<(), DetectError> {
        info!("Enumerating radio interfaces...");
        self.records = enumerate_wifi(probe);

        match sik.detect_radios(self, serial).await {
            Ok(found) => debug!("Found {} SiK radio(s)", found),
            Err(e) => warn!("SiK radio detection failed: {}", e),
        }
        if let Err(e) = add_elrs_radios(self, serial) {
            warn!("ELRS radio detection failed: {}", e);
        }

        info!(
            "Radio enumeration complete: {} interface(s), {} supported",
            self.records.len(),
            self.supported_count()
        );
        self.save()
    }

    /// Load the persisted registry, falling back to a fresh enumeration
    pub async fn init<O: PortOpener>(
        &mut self,
        probe: &dyn HardwareProbe,
        serial: &mut SerialContext,
        sik: &SikEngine<O>,
    ) -> Result<(), DetectError> {
        match self.load() {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Radio configuration unusable ({}), re-enumerating", e);
                self.enumerate(probe, serial, sik).await
            }
        }
    }
}

fn corrupt(file: &Path, reason: String) -> DetectError {
    DetectError::Corrupt {
        file: file.display().to_string(),
        reason,
    }
}

/// Encode records with a leading count and trailing CRC
pub fn encode_registry(records: &[RadioInterfaceRecord]) -> Vec<u8> {
    let mut out = encode_records(records);
    let crc = crc32(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Decode a CRC protected registry file
pub fn decode_registry(bytes: &[u8]) -> Result<Vec<RadioInterfaceRecord>, String> {
    if bytes.len() < 8 {
        return Err(format!("file too short ({} bytes)", bytes.len()));
    }
    let (body, tail) = bytes.split_at(bytes.len() - 4);
    let count = read_count(body)?;
    let expected_len = 4 + count * RECORD_SIZE;
    if body.len() != expected_len {
        return Err(format!(
            "expected {} bytes for {} record(s), found {}",
            expected_len,
            count,
            body.len()
        ));
    }
    let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let actual = crc32(body);
    if stored != actual {
        return Err(format!("CRC mismatch: stored {:08X}, computed {:08X}", stored, actual));
    }
    let records = decode_records(&body[4..], count)?;
    check_records(&records)?;
    Ok(records)
}

/// Every identity appears once and every driver matches its radio type
fn check_records(records: &[RadioInterfaceRecord]) -> Result<(), String> {
    for (i, record) in records.iter().enumerate() {
        if !record.is_consistent() {
            return Err(format!(
                "record {}: driver {} does not match radio type {:?}",
                i,
                record.driver.name(),
                record.radio_type
            ));
        }
        if record.identity().is_empty() {
            continue;
        }
        if let Some(j) = records[..i]
            .iter()
            .position(|r| r.is_serial() == record.is_serial() && r.identity() == record.identity())
        {
            return Err(format!("records {} and {} share identity {}", j, i, record.identity()));
        }
    }
    Ok(())
}

/// Encode records with a leading count and no checksum
pub fn encode_records(records: &[RadioInterfaceRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + records.len() * RECORD_SIZE + 4);
    out.extend_from_slice(&(records.len() as i32).to_le_bytes());
    for record in records {
        out.extend_from_slice(&record.encode());
    }
    out
}

/// Read and range check the leading record count
pub(crate) fn read_count(bytes: &[u8]) -> Result<usize, String> {
    let head: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or("missing record count")?;
    let count = i32::from_le_bytes(head);
    if !(0..=MAX_RADIO_INTERFACES as i32).contains(&count) {
        return Err(format!("invalid record count {}", count));
    }
    Ok(count as usize)
}

/// Decode `count` consecutive records, applying load fix-ups
pub(crate) fn decode_records(bytes: &[u8], count: usize) -> Result<Vec<RadioInterfaceRecord>, String> {
    if bytes.len() < count * RECORD_SIZE {
        return Err(format!(
            "short read: {} bytes for {} record(s)",
            bytes.len(),
            count
        ));
    }
    bytes
        .chunks_exact(RECORD_SIZE)
        .take(count)
        .enumerate()
        .map(|(i, chunk)| {
            let mut record =
                RadioInterfaceRecord::decode(chunk).map_err(|e| format!("record {}: {}", i, e))?;
            record.reset_runtime_state();
            Ok(record)
        })
        .collect()
}

/// IEEE 802.3 CRC-32 (reflected, polynomial 0xEDB88320)
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_core::{Band, CardModel, RadioDriver, RadioType, SupportedBands};

    fn wifi(mac: &str, port: &str) -> RadioInterfaceRecord {
        RadioInterfaceRecord {
            phy_index: 0,
            name: format!("wlan-{}", mac),
            mac: mac.to_string(),
            usb_port: port.to_string(),
            radio_type: RadioType::Realtek,
            driver: RadioDriver::Rtl88xxau,
            card_model: CardModel::Awus036ach,
            supported_bands: SupportedBands::from(Band::Ghz24).with(Band::Ghz58),
            supported: true,
            enabled: true,
            configurable: true,
            current_freq_khz: 5_805_000,
            ..Default::default()
        }
    }

    fn ctx() -> RadioContext {
        RadioContext::new(RadioPaths::default())
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_registry_round_trip() {
        let records = vec![wifi("AA", "A"), wifi("BB", "B")];
        let bytes = encode_registry(&records);
        assert_eq!(bytes.len(), 4 + 2 * RECORD_SIZE + 4);
        assert_eq!(decode_registry(&bytes).unwrap(), records);
    }

    #[test]
    fn test_registry_rejects_bad_count_and_truncation() {
        let bytes = encode_registry(&[wifi("AA", "A")]);
        assert!(decode_registry(&bytes[..bytes.len() - 1]).is_err());

        let mut bad = encode_registry(&[]);
        bad[..4].copy_from_slice(&(MAX_RADIO_INTERFACES as i32 + 1).to_le_bytes());
        assert!(decode_registry(&bad).is_err());

        let mut negative = encode_registry(&[]);
        negative[..4].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(decode_registry(&negative).is_err());
    }

    #[test]
    fn test_registry_rejects_duplicate_mac() {
        let bytes = encode_registry(&[wifi("AA", "A"), wifi("AA", "B")]);
        let err = decode_registry(&bytes).unwrap_err();
        assert!(err.contains("share identity AA"), "{}", err);
    }

    #[test]
    fn test_registry_rejects_driver_type_mismatch() {
        let mut record = wifi("AA", "A");
        record.radio_type = RadioType::Atheros;
        let bytes = encode_registry(&[wifi("BB", "B"), record]);
        let err = decode_registry(&bytes).unwrap_err();
        assert!(err.starts_with("record 1"), "{}", err);
    }

    #[test]
    fn test_add_record_replaces_same_identity() {
        let mut ctx = ctx();
        assert_eq!(ctx.add_record(wifi("AA", "A")).unwrap(), 0);
        assert_eq!(ctx.add_record(wifi("BB", "B")).unwrap(), 1);
        let mut again = wifi("AA", "A");
        again.name = "renamed".into();
        assert_eq!(ctx.add_record(again).unwrap(), 0);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get(0).unwrap().name, "renamed");
    }

    #[test]
    fn test_add_record_full() {
        let mut ctx = ctx();
        for i in 0..MAX_RADIO_INTERFACES {
            ctx.add_record(wifi(&format!("M{}", i), "A")).unwrap();
        }
        assert!(matches!(
            ctx.add_record(wifi("EXTRA", "A")),
            Err(DetectError::RegistryFull { .. })
        ));
    }

    #[test]
    fn test_lookups_return_none() {
        let mut ctx = ctx();
        ctx.add_record(wifi("AA", "B3")).unwrap();
        assert_eq!(ctx.find_by_mac("AA"), Some(0));
        assert_eq!(ctx.find_by_usb_port("B3"), Some(0));
        assert_eq!(ctx.find_by_name("wlan-AA"), Some(0));
        assert_eq!(ctx.find_by_mac("ZZ"), None);
        assert!(ctx.get(5).is_none());
        assert!(!ctx.supports_frequency(5, 2_472_000));
    }

    #[test]
    fn test_set_frequency_validates_bands() {
        let mut ctx = ctx();
        ctx.add_record(wifi("AA", "A")).unwrap();
        assert!(ctx.set_frequency(0, 2_472_000).is_ok());
        assert_eq!(ctx.get(0).unwrap().current_freq_khz, 2_472_000);

        let err = ctx.set_frequency(0, 433_000).unwrap_err();
        assert!(matches!(err, DetectError::UnsupportedFrequency { index: 0, freq_khz: 433_000 }));
        assert_eq!(ctx.get(0).unwrap().current_freq_khz, 2_472_000);
    }

    #[test]
    fn test_remove_serial_radio_compacts() {
        let mut ctx = ctx();
        ctx.add_record(wifi("AA", "A")).unwrap();
        ctx.add_record(RadioInterfaceRecord {
            driver: RadioDriver::Serial,
            radio_type: RadioType::Serial,
            serial: true,
            driver_name: "/dev/ttyUSB0".into(),
            ..Default::default()
        })
        .unwrap();
        ctx.add_record(wifi("BB", "B")).unwrap();

        assert!(ctx.remove_serial_radio("/dev/ttyUSB0"));
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get(1).unwrap().mac, "BB");
        assert!(!ctx.remove_serial_radio("/dev/ttyUSB0"));
    }
}
