//! SiK modem discovery and configuration
//!
//! [`SikEngine`] probes candidate serial ports for SiK telemetry modems,
//! builds radio records for the ones that answer, and pushes frequency
//! plans and register changes back to them. Register values read from a
//! modem are cached in the record and in a last-known file, so a later
//! probe can try the modem's own serial speed first.

use radio_core::hardware::extra_flags;
use radio_core::record::{truncate_to_field, DESCRIPTION_LEN, MAC_LEN, PRODUCT_ID_LEN};
use radio_core::sik::{self, param};
use radio_core::{
    is_in_bands, Band, CapabilityFlags, CardModel, RadioDriver, RadioInterfaceRecord, RadioType,
    SupportedBands,
};
use tracing::{debug, info, warn};

use crate::error::DetectError;
use crate::paths::{write_replace, RadioPaths};
use crate::probe::{candidate_bauds, PortOpener, SikConfig, SikModem, SikReadout};
use crate::registry::{decode_records, encode_records, read_count, RadioContext};
use crate::scanner::{SerialContext, SerialPortRecord, SerialUsage, DEFAULT_SERIAL_SPEED};

/// Display name given to every SiK record
pub const SIK_RADIO_NAME: &str = "SiK Radio";

/// USB ordering token of SiK records, after every Wi-Fi token
const SIK_USB_PORT: &str = "T";

/// Desired SiK link settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyPlan {
    /// Lowest hopping frequency
    pub freq_khz: u32,
    /// Width of the hopping range above `freq_khz`
    pub spread_khz: u32,
    pub channels: u32,
    pub net_id: u32,
    /// Air data rate in bits per second
    pub air_speed: u32,
    /// Radio power in dBm; out of range values are not written
    pub tx_power: Option<u32>,
    pub ecc: Option<bool>,
    pub lbt: Option<bool>,
    pub manchester: Option<bool>,
}

impl FrequencyPlan {
    /// Default plan on `freq_khz`
    pub fn new(freq_khz: u32) -> Self {
        Self {
            freq_khz,
            spread_khz: sik::DEFAULT_FREQ_SPREAD_KHZ,
            channels: sik::DEFAULT_CHANNELS,
            net_id: sik::DEFAULT_NET_ID,
            air_speed: sik::DEFAULT_AIR_SPEED,
            tx_power: None,
            ecc: None,
            lbt: None,
            manchester: None,
        }
    }

    /// Plan matching what the modem currently runs
    pub fn from_current(record: &RadioInterfaceRecord) -> Self {
        let params = &record.params;
        let freq_khz = params
            .get(param::MIN_FREQ)
            .unwrap_or(record.current_freq_khz);
        let spread_khz = match (params.get(param::MIN_FREQ), params.get(param::MAX_FREQ)) {
            (Some(min), Some(max)) if max > min => max - min,
            _ => sik::DEFAULT_FREQ_SPREAD_KHZ,
        };
        Self {
            freq_khz,
            spread_khz,
            channels: params.get(param::NUM_CHANNELS).unwrap_or(sik::DEFAULT_CHANNELS),
            net_id: params.get(param::NET_ID).unwrap_or(sik::DEFAULT_NET_ID),
            air_speed: params
                .get(param::AIR_SPEED)
                .map(sik::decode_air_speed)
                .unwrap_or(sik::DEFAULT_AIR_SPEED),
            tx_power: params.get(param::TX_POWER),
            ecc: params.get(param::ECC).map(|v| v != 0),
            lbt: params.get(param::LBT_RSSI).map(|v| v != 0),
            manchester: params.get(param::MANCHESTER).map(|v| v != 0),
        }
    }

    /// Register writes that realize this plan, in write order
    pub fn target_registers(&self) -> Vec<(usize, u32)> {
        let mut out = vec![
            (param::AIR_SPEED, sik::encode_air_speed(self.air_speed)),
            (param::NET_ID, self.net_id),
        ];
        if let Some(power) = self.tx_power.filter(|p| (1..=sik::MAX_TX_POWER).contains(p)) {
            out.push((param::TX_POWER, power));
        }
        if let Some(ecc) = self.ecc {
            out.push((param::ECC, ecc as u32));
        }
        out.push((param::NUM_CHANNELS, self.channels));
        out.push((param::MIN_FREQ, self.freq_khz));
        out.push((param::MAX_FREQ, self.freq_khz.saturating_add(self.spread_khz)));
        out.push((param::DUTY_CYCLE, sik::DUTY_CYCLE_FULL));
        if let Some(lbt) = self.lbt {
            out.push((param::LBT_RSSI, if lbt { sik::LBT_RSSI_ON } else { 0 }));
        }
        if let Some(manchester) = self.manchester {
            out.push((param::MANCHESTER, manchester as u32));
        }
        out.push((param::MAX_WINDOW, sik::MAX_WINDOW_MS));
        out
    }
}

/// Result of pushing register changes to a modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    /// The modem already runs the requested values; nothing was sent
    Unchanged,
    /// Some registers were written
    Applied { written: usize, failed: usize },
}

impl PlanOutcome {
    pub fn is_complete(&self) -> bool {
        match self {
            PlanOutcome::Unchanged => true,
            PlanOutcome::Applied { failed, .. } => *failed == 0,
        }
    }
}

/// SiK discovery and configuration over a [`PortOpener`]
#[derive(Debug, Clone)]
pub struct SikEngine<O> {
    opener: O,
    config: SikConfig,
}

impl<O: PortOpener> SikEngine<O> {
    pub fn new(opener: O) -> Self {
        Self::with_config(opener, SikConfig::default())
    }

    pub fn with_config(opener: O, config: SikConfig) -> Self {
        Self { opener, config }
    }

    pub fn config(&self) -> &SikConfig {
        &self.config
    }

    /// Probe every eligible serial port and register the modems found
    ///
    /// Eligible ports are supported and either unassigned or already marked
    /// as SiK. Returns the number of modems found.
    pub async fn detect_radios(
        &self,
        radios: &mut RadioContext,
        serial: &mut SerialContext,
    ) -> Result<usize, DetectError> {
        let last_known = match load_last_known(radios.paths()) {
            Ok(records) => records,
            Err(e) => {
                debug!("No last known SiK radios: {}", e);
                Vec::new()
            }
        };

        let candidates: Vec<SerialPortRecord> = serial
            .ports()
            .iter()
            .filter(|p| p.supported && p.usage.is_sik_candidate())
            .cloned()
            .collect();
        info!("Probing {} serial port(s) for SiK radios", candidates.len());

        let mut found = 0;
        for port in &candidates {
            let guard = match serial.lock(&port.path) {
                Ok(guard) => guard,
                Err(e) => {
                    warn!("Skipping {}: {}", port.path, e);
                    continue;
                }
            };
            let previous = last_known.iter().find(|r| r.driver_name == port.path);
            let probed = self.probe_port(&port.path, previous).await;
            drop(guard);

            let Some((record, baud)) = probed else {
                if port.usage == SerialUsage::SikRadio {
                    warn!("SiK radio on {} no longer answers", port.path);
                }
                continue;
            };
            info!(
                "SiK radio on {} at {} bps: {} ({} kHz)",
                port.path, baud, record.description, record.current_freq_khz
            );
            radios.add_record(record)?;
            serial.set_usage(&port.path, SerialUsage::SikRadio);
            serial.set_baud(&port.path, baud);
            found += 1;
        }

        if found > 0 {
            if let Err(e) = serial.save() {
                warn!("Failed to save serial port configuration: {}", e);
            }
        }
        let sik: Vec<RadioInterfaceRecord> = radios.sik_records().cloned().collect();
        save_last_known(radios.paths(), &sik)?;
        Ok(found)
    }

    /// Try each candidate baud until a modem answers the escape sequence
    async fn probe_port(
        &self,
        path: &str,
        previous: Option<&RadioInterfaceRecord>,
    ) -> Option<(RadioInterfaceRecord, u32)> {
        let last_baud = previous
            .and_then(|r| r.params.get(param::SERIAL_SPEED))
            .map(sik::decode_serial_speed);

        for baud in candidate_bauds(last_baud, &self.config.platform_speeds) {
            debug!("Probing {} at {} bps", path, baud);
            let stream = match self.opener.open(path, baud) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to open {} at {} bps: {}", path, baud, e);
                    continue;
                }
            };
            let mut modem = SikModem::new(stream, path, self.config.clone());
            if modem.enter_command_mode().await.is_err() {
                continue;
            }
            match modem.read_all_parameters().await {
                Ok(readout) => return Some((build_sik_record(path, &readout), baud)),
                Err(e) => warn!("Failed to read SiK parameters on {}: {}", path, e),
            }
        }
        debug!("No SiK radio on {}", path);
        None
    }

    /// Push a frequency plan to the SiK modem at `index`
    pub async fn set_frequency_plan(
        &self,
        radios: &mut RadioContext,
        serial: &SerialContext,
        index: usize,
        plan: &FrequencyPlan,
    ) -> Result<PlanOutcome, DetectError> {
        let record = sik_record(radios, index)?;
        if !is_in_bands(plan.freq_khz, record.supported_bands) {
            warn!(
                "SiK radio {} does not support {} kHz (bands: {})",
                index, plan.freq_khz, record.supported_bands
            );
            return Err(DetectError::UnsupportedFrequency {
                index,
                freq_khz: plan.freq_khz,
            });
        }

        let outcome = self
            .apply_registers(radios, serial, index, &plan.target_registers())
            .await;
        if let Some(record) = radios.get_mut(index) {
            match &outcome {
                Ok(o) if o.is_complete() => {
                    record.current_freq_khz = plan.freq_khz;
                    record.last_freq_set_failed = false;
                    record.failed_freq_khz = 0;
                }
                _ => {
                    record.last_freq_set_failed = true;
                    record.failed_freq_khz = plan.freq_khz;
                }
            }
        }
        if matches!(outcome, Ok(PlanOutcome::Applied { .. })) {
            persist(radios);
        }
        outcome
    }

    /// Move the modem to a frequency with the default plan and its current air speed
    ///
    /// `0` re-applies the modem's current frequency. Values below 10000 are
    /// taken as MHz.
    pub async fn set_frequency(
        &self,
        radios: &mut RadioContext,
        serial: &SerialContext,
        index: usize,
        freq_khz: u32,
    ) -> Result<PlanOutcome, DetectError> {
        let current = FrequencyPlan::from_current(sik_record(radios, index)?);
        let mut plan = FrequencyPlan::new(match freq_khz {
            0 => current.freq_khz,
            f if f < 10_000 => f * 1000,
            f => f,
        });
        plan.air_speed = current.air_speed;
        self.set_frequency_plan(radios, serial, index, &plan).await
    }

    /// Set the modem output power in dBm
    pub async fn set_tx_power(
        &self,
        radios: &mut RadioContext,
        serial: &SerialContext,
        index: usize,
        power_dbm: u32,
    ) -> Result<PlanOutcome, DetectError> {
        if !(1..=sik::MAX_TX_POWER).contains(&power_dbm) {
            return Err(DetectError::InvalidParameter(format!(
                "SiK TX power {} dBm (1..={})",
                power_dbm,
                sik::MAX_TX_POWER
            )));
        }
        sik_record(radios, index)?;
        let outcome = self
            .apply_registers(radios, serial, index, &[(param::TX_POWER, power_dbm)])
            .await?;
        if outcome != PlanOutcome::Unchanged {
            persist(radios);
        }
        Ok(outcome)
    }

    /// Change the modem's serial speed and the port's stored speed with it
    pub async fn set_serial_speed(
        &self,
        radios: &mut RadioContext,
        serial: &mut SerialContext,
        index: usize,
        baud: u32,
    ) -> Result<PlanOutcome, DetectError> {
        let path = sik_record(radios, index)?.driver_name.clone();
        let code = sik::encode_serial_speed(baud);
        let outcome = self
            .apply_registers(radios, serial, index, &[(param::SERIAL_SPEED, code)])
            .await?;
        if outcome != PlanOutcome::Unchanged {
            persist(radios);
        }
        if outcome.is_complete() {
            let actual = sik::decode_serial_speed(code);
            serial.set_baud(&path, actual);
            serial.save()?;
            info!("Serial speed of {} is now {} bps", path, actual);
        }
        Ok(outcome)
    }

    /// Write the registers that differ from the cached values, then commit
    ///
    /// Once a command session was entered it always ends with `AT&W`/`ATZ`,
    /// even if every write failed.
    async fn apply_registers(
        &self,
        radios: &mut RadioContext,
        serial: &SerialContext,
        index: usize,
        targets: &[(usize, u32)],
    ) -> Result<PlanOutcome, DetectError> {
        let record = sik_record(radios, index)?;
        let mut pending: Vec<(usize, u32)> = targets
            .iter()
            .copied()
            .filter(|(reg, value)| record.params.get(*reg) != Some(*value))
            .collect();
        if pending.is_empty() {
            debug!("SiK radio {} already up to date", index);
            return Ok(PlanOutcome::Unchanged);
        }

        let path = record.driver_name.clone();
        let baud = serial
            .find_by_path(&path)
            .map(|p| p.baud)
            .or_else(|| record.params.get(param::SERIAL_SPEED).map(sik::decode_serial_speed))
            .unwrap_or(DEFAULT_SERIAL_SPEED);

        let _guard = serial.lock(&path)?;
        let stream = self.opener.open(&path, baud)?;
        let mut modem = SikModem::new(stream, path.as_str(), self.config.clone());
        info!("Writing {} register(s) to SiK radio on {}", pending.len(), path);

        let mut written = Vec::new();
        let mut entered = false;
        for attempt in 1..=self.config.write_retries.max(1) {
            if let Err(e) = modem.enter_command_mode().await {
                warn!("Attempt {} to enter command mode on {} failed: {}", attempt, path, e);
                continue;
            }
            entered = true;
            let mut failed = Vec::new();
            for (reg, value) in pending.drain(..) {
                match modem.write_parameter(reg, value).await {
                    Ok(()) => written.push((reg, value)),
                    Err(e) => {
                        warn!("ATS{}={} on {} failed: {}", reg, value, path, e);
                        failed.push((reg, value));
                    }
                }
            }
            pending = failed;
            if pending.is_empty() {
                break;
            }
        }
        if !entered {
            return Err(DetectError::Timeout {
                port: path,
                operation: "command mode".to_string(),
            });
        }
        modem.commit_to_flash().await;

        if let Some(record) = radios.get_mut(index) {
            for (reg, value) in &written {
                record.params.set(*reg, *value);
            }
        }

        Ok(PlanOutcome::Applied {
            written: written.len(),
            failed: pending.len(),
        })
    }
}

/// Persist the registry and the last-known SiK records; failures are only logged
fn persist(radios: &RadioContext) {
    let sik: Vec<RadioInterfaceRecord> = radios.sik_records().cloned().collect();
    if let Err(e) = save_last_known(radios.paths(), &sik) {
        warn!("Failed to save last known SiK radios: {}", e);
    }
    if let Err(e) = radios.save() {
        warn!("Failed to save radio configuration: {}", e);
    }
}

fn sik_record(radios: &RadioContext, index: usize) -> Result<&RadioInterfaceRecord, DetectError> {
    let record = radios
        .get(index)
        .ok_or_else(|| DetectError::NotFound(format!("radio interface {}", index)))?;
    if !record.is_sik() {
        return Err(DetectError::NotSikRadio(index));
    }
    Ok(record)
}

/// Air data rate of a SiK record in bytes per second, if known
pub fn air_baudrate_bytes(record: &RadioInterfaceRecord) -> Option<u32> {
    record
        .params
        .get(param::AIR_SPEED)
        .map(|code| sik::decode_air_speed(code) / 8)
}

/// Band of a modem whose whole frequency range fits inside it
///
/// A range straddling two bands, or missing either end, gives no band.
fn bands_from_range(min_khz: Option<u32>, max_khz: Option<u32>) -> SupportedBands {
    let mut bands = SupportedBands::empty();
    let (Some(min), Some(max)) = (min_khz, max_khz) else {
        return bands;
    };
    let band = [
        (400_000..=460_000, Band::Mhz433),
        (800_000..=890_000, Band::Mhz868),
        (891_000..=950_000, Band::Mhz915),
    ]
    .into_iter()
    .find(|(range, _)| range.contains(&min) && range.contains(&max))
    .map(|(_, band)| band);
    if let Some(band) = band {
        bands.insert(band);
    }
    bands
}

/// Radio record for a modem found on `path`
pub fn build_sik_record(path: &str, readout: &SikReadout) -> RadioInterfaceRecord {
    let params = readout.params;
    let identity = readout.identity.as_deref().unwrap_or("SIK");
    let last = path.chars().last().map(String::from).unwrap_or_default();
    let mac = format!("{}-{}", identity, last);
    let product_id = params
        .get(param::FORMAT)
        .map(|v| v.to_string())
        .unwrap_or_default();

    let mut record = RadioInterfaceRecord {
        name: SIK_RADIO_NAME.to_string(),
        description: truncate_to_field(&readout.description, DESCRIPTION_LEN).to_string(),
        driver_name: path.to_string(),
        mac: truncate_to_field(&mac, MAC_LEN).to_string(),
        product_id: truncate_to_field(&product_id, PRODUCT_ID_LEN).to_string(),
        usb_port: SIK_USB_PORT.to_string(),
        radio_type: RadioType::Sik,
        driver: RadioDriver::SerialSik,
        card_model: CardModel::Sik,
        supported_bands: bands_from_range(params.get(param::MIN_FREQ), params.get(param::MAX_FREQ)),
        supported: true,
        enabled: true,
        high_capacity: false,
        serial: true,
        configurable: true,
        tx_capable: true,
        datarate: params
            .get(param::AIR_SPEED)
            .map(|c| sik::decode_air_speed(c) as i32)
            .unwrap_or(0),
        current_freq_khz: params.get(param::MIN_FREQ).unwrap_or(0),
        params,
        ..Default::default()
    };
    record.capabilities = CapabilityFlags::default_for_card(true)
        | CapabilityFlags::SERIAL_LINK
        | CapabilityFlags::SIK_RADIO;
    if readout.firmware_old {
        record.extra_flags |= extra_flags::FIRMWARE_OLD;
    }
    record
}

/// Load the SiK records seen in earlier sessions
pub fn load_last_known(paths: &RadioPaths) -> Result<Vec<RadioInterfaceRecord>, DetectError> {
    let file = paths.sik_last_known();
    let bytes = std::fs::read(&file)?;
    let corrupt = |reason: String| DetectError::Corrupt {
        file: file.display().to_string(),
        reason,
    };
    let count = read_count(&bytes).map_err(corrupt)?;
    decode_records(&bytes[4..], count).map_err(corrupt)
}

pub fn save_last_known(paths: &RadioPaths, records: &[RadioInterfaceRecord]) -> Result<(), DetectError> {
    let file = paths.sik_last_known();
    write_replace(&file, &encode_records(records))?;
    debug!("Saved {} SiK record(s) to {}", records.len(), file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_core::SikParameterTable;

    fn readout() -> SikReadout {
        let mut params = SikParameterTable::new();
        params.set(param::FORMAT, 26);
        params.set(param::SERIAL_SPEED, 57);
        params.set(param::AIR_SPEED, 64);
        params.set(param::MIN_FREQ, 433_050);
        params.set(param::MAX_FREQ, 434_790);
        SikReadout {
            description: "SiK 2.2 on HM-TRP".to_string(),
            identity: Some("HM-TRP-433-A-B-433".to_string()),
            params,
            firmware_old: false,
        }
    }

    #[test]
    fn test_build_sik_record() {
        let record = build_sik_record("/dev/ttyUSB0", &readout());
        assert!(record.is_sik());
        assert!(record.is_serial());
        assert!(!record.high_capacity);
        assert_eq!(record.name, SIK_RADIO_NAME);
        assert_eq!(record.identity(), "/dev/ttyUSB0");
        assert_eq!(record.mac, "HM-TRP-433-A-B-433-");
        assert_eq!(record.product_id, "26");
        assert_eq!(record.current_freq_khz, 433_050);
        assert_eq!(record.datarate, 64_000);
        assert!(record.supported_bands.contains(Band::Mhz433));
        assert!(!record.supported_bands.contains(Band::Mhz915));
        assert!(!record.capabilities.contains(CapabilityFlags::VIDEO));
        assert_eq!(record.extra_flags & extra_flags::FIRMWARE_OLD, 0);
    }

    #[test]
    fn test_bands_from_range() {
        let bands = bands_from_range(Some(902_000), Some(928_000));
        assert!(bands.contains(Band::Mhz915));
        assert!(!bands.contains(Band::Mhz868));
        let bands = bands_from_range(Some(863_000), Some(870_000));
        assert!(bands.contains(Band::Mhz868));
        assert!(bands_from_range(Some(414_000), Some(454_000)).contains(Band::Mhz433));
        assert!(bands_from_range(Some(2_400_000), None).is_empty());
        assert!(bands_from_range(Some(915_000), None).is_empty());
        assert!(bands_from_range(None, None).is_empty());
    }

    #[test]
    fn test_bands_from_range_straddling_bands_is_empty() {
        assert!(bands_from_range(Some(868_000), Some(915_000)).is_empty());
        assert!(bands_from_range(Some(433_000), Some(928_000)).is_empty());
    }

    #[test]
    fn test_plan_targets_skip_out_of_range_power() {
        let mut plan = FrequencyPlan::new(915_000);
        plan.tx_power = Some(31);
        let regs = plan.target_registers();
        assert!(regs.iter().all(|(r, _)| *r != param::TX_POWER));
        assert!(regs.contains(&(param::MIN_FREQ, 915_000)));
        assert!(regs.contains(&(param::MAX_FREQ, 916_000)));
        assert!(regs.contains(&(param::DUTY_CYCLE, 100)));
        assert!(regs.contains(&(param::MAX_WINDOW, 50)));

        plan.tx_power = Some(20);
        plan.lbt = Some(true);
        let regs = plan.target_registers();
        assert!(regs.contains(&(param::TX_POWER, 20)));
        assert!(regs.contains(&(param::LBT_RSSI, 50)));
    }

    #[test]
    fn test_plan_from_current_round_trips() {
        let record = build_sik_record("/dev/ttyUSB0", &readout());
        let plan = FrequencyPlan::from_current(&record);
        assert_eq!(plan.freq_khz, 433_050);
        assert_eq!(plan.spread_khz, 1_740);
        assert_eq!(plan.air_speed, 64_000);
        assert_eq!(plan.tx_power, None);
    }

    #[test]
    fn test_air_baudrate_bytes() {
        let record = build_sik_record("/dev/ttyUSB0", &readout());
        assert_eq!(air_baudrate_bytes(&record), Some(8_000));
        assert_eq!(air_baudrate_bytes(&RadioInterfaceRecord::default()), None);
    }

    #[test]
    fn test_plan_outcome_complete() {
        assert!(PlanOutcome::Unchanged.is_complete());
        assert!(PlanOutcome::Applied { written: 3, failed: 0 }.is_complete());
        assert!(!PlanOutcome::Applied { written: 3, failed: 1 }.is_complete());
    }
}
