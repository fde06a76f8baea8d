//! Wi-Fi TX power through kernel module option files
//!
//! Each driver family reads its raw power index from a `modprobe.d` style
//! file holding a single `options <module> <key>=<value>` line. A pristine
//! copy may sit next to it with an `.org` suffix and is preferred as the
//! template when rewriting.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use radio_core::power::raw_to_mw;
use radio_core::{RadioDriver, RadioInterfaceRecord, DEFAULT_RADIO_TX_POWER, MAX_TX_POWER};
use tracing::{debug, info, warn};

use crate::error::DetectError;
use crate::registry::RadioContext;

/// Default directory of module option files
pub const DEFAULT_MODPROBE_DIR: &str = "/etc/modprobe.d";

/// Driver families sharing one power option file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerFamily {
    Atheros,
    Rtl8812au,
    Rtl8812eu,
}

impl PowerFamily {
    pub const ALL: [PowerFamily; 3] = [PowerFamily::Atheros, PowerFamily::Rtl8812au, PowerFamily::Rtl8812eu];

    pub fn for_driver(driver: RadioDriver) -> Option<Self> {
        match driver {
            RadioDriver::Atheros => Some(PowerFamily::Atheros),
            RadioDriver::Rtl88xxau
            | RadioDriver::Rtl8812au
            | RadioDriver::Realtek8812au
            | RadioDriver::Rtl88x2bu
            | RadioDriver::Mediatek => Some(PowerFamily::Rtl8812au),
            RadioDriver::Rtl8812eu => Some(PowerFamily::Rtl8812eu),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            PowerFamily::Atheros => "ath9k_hw.conf",
            PowerFamily::Rtl8812au => "88XXau.conf",
            PowerFamily::Rtl8812eu => "8812eu.conf",
        }
    }

    pub fn module(self) -> &'static str {
        match self {
            PowerFamily::Atheros => "ath9k_hw",
            PowerFamily::Rtl8812au => "88XXau",
            PowerFamily::Rtl8812eu => "8812eu",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            PowerFamily::Atheros => "txpower",
            PowerFamily::Rtl8812au | PowerFamily::Rtl8812eu => "rtw_tx_pwr_idx_override",
        }
    }

    pub fn drives(self, record: &RadioInterfaceRecord) -> bool {
        Self::for_driver(record.driver) == Some(self)
    }
}

/// Applies a raw power index to a live interface
pub trait PowerControl {
    fn set_interface_raw_power(&self, record: &RadioInterfaceRecord, raw: i32) -> Result<(), DetectError>;
}

/// Power changes only take effect on the next driver load
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveControl;

impl PowerControl for NoLiveControl {
    fn set_interface_raw_power(&self, _record: &RadioInterfaceRecord, _raw: i32) -> Result<(), DetectError> {
        Ok(())
    }
}

/// Sets the running interface's fixed TX power with `iw`
#[derive(Debug, Clone, Copy, Default)]
pub struct IwPowerControl;

impl IwPowerControl {
    /// Fixed power in mBm for a raw index on this card
    pub fn mbm_for(record: &RadioInterfaceRecord, raw: i32) -> Option<i32> {
        let mw = raw_to_mw(record.driver, record.card_model, raw);
        (mw > 0).then(|| (1000.0 * (mw as f64).log10()).round() as i32)
    }
}

impl PowerControl for IwPowerControl {
    fn set_interface_raw_power(&self, record: &RadioInterfaceRecord, raw: i32) -> Result<(), DetectError> {
        let mbm = Self::mbm_for(record, raw).ok_or_else(|| {
            DetectError::InvalidParameter(format!("raw TX power {} gives no output on {}", raw, record.name))
        })?;
        let status = Command::new("iw")
            .args(["dev", &record.name, "set", "txpower", "fixed", &mbm.to_string()])
            .status()?;
        if !status.success() {
            return Err(DetectError::IoError {
                port: record.name.clone(),
                reason: format!("iw set txpower exited with {}", status),
            });
        }
        debug!("Set {} to {} mBm", record.name, mbm);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TxPowerConfig {
    pub dir: PathBuf,
    /// Value written when a requested index is out of range
    pub default_raw: i32,
    /// Also push the value to running interfaces
    pub live_control: bool,
}

impl Default for TxPowerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_MODPROBE_DIR),
            default_raw: DEFAULT_RADIO_TX_POWER,
            live_control: true,
        }
    }
}

/// Reads and writes per-family raw TX power
pub struct TxPowerManager<C = NoLiveControl> {
    config: TxPowerConfig,
    control: C,
}

impl TxPowerManager<NoLiveControl> {
    pub fn new(config: TxPowerConfig) -> Self {
        Self {
            config,
            control: NoLiveControl,
        }
    }
}

impl<C: PowerControl> TxPowerManager<C> {
    pub fn with_control(config: TxPowerConfig, control: C) -> Self {
        Self { config, control }
    }

    pub fn config(&self) -> &TxPowerConfig {
        &self.config
    }

    fn file(&self, family: PowerFamily) -> PathBuf {
        self.config.dir.join(family.file_name())
    }

    fn pristine_file(&self, family: PowerFamily) -> PathBuf {
        self.config.dir.join(format!("{}.org", family.file_name()))
    }

    /// Raw power index stored for a family
    ///
    /// `None` when the file is missing, the key is absent or malformed, or
    /// the value lies outside `1..=71`.
    pub fn get_raw_power(&self, family: PowerFamily) -> Option<i32> {
        let text = fs::read_to_string(self.file(family)).ok()?;
        let value = find_value(&text, family.key())?;
        (1..=MAX_TX_POWER).contains(&value).then_some(value)
    }

    /// Store a raw power index for a family and return what was persisted
    ///
    /// Values outside `1..=71` are replaced with the configured default.
    /// File and live failures are logged; the result is re-read from disk.
    pub fn set_raw_power(
        &self,
        family: PowerFamily,
        raw: i32,
        radios: &RadioContext,
    ) -> Result<Option<i32>, DetectError> {
        let raw = if (1..=MAX_TX_POWER).contains(&raw) {
            raw
        } else {
            warn!(
                "Raw TX power {} out of range, using {}",
                raw, self.config.default_raw
            );
            self.config.default_raw
        };

        let template = fs::read_to_string(self.pristine_file(family))
            .or_else(|_| fs::read_to_string(self.file(family)))
            .unwrap_or_else(|_| {
                debug!("No option file for {}, creating one", family.module());
                format!("options {} {}=0\n", family.module(), family.key())
            });
        let text = replace_value(&template, family.module(), family.key(), raw);

        match fs::create_dir_all(&self.config.dir).and_then(|_| fs::write(self.file(family), text)) {
            Ok(()) => info!("Set {} raw TX power to {}", family.module(), raw),
            Err(e) => warn!("Failed to write {} option file: {}", family.module(), e),
        }

        if self.config.live_control {
            for record in radios.records().iter().filter(|r| family.drives(r)) {
                if let Err(e) = self.control.set_interface_raw_power(record, raw) {
                    warn!("Failed to apply TX power to {}: {}", record.name, e);
                }
            }
        }

        Ok(self.get_raw_power(family))
    }
}

/// Parse `key=value` out of an options line
fn find_value(text: &str, key: &str) -> Option<i32> {
    let start = text.find(key)? + key.len();
    let rest = text[start..].strip_prefix('=')?;
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '-'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Rewrite the value of `key`, appending it to the options line if absent
fn replace_value(text: &str, module: &str, key: &str, raw: i32) -> String {
    if let Some(pos) = text.find(key) {
        let value_start = pos + key.len();
        let rest = &text[value_start..];
        let value_end = match rest.strip_prefix('=') {
            Some(after) => {
                1 + after
                    .find(|c: char| !(c.is_ascii_digit() || c == '-'))
                    .unwrap_or(after.len())
            }
            None => 0,
        };
        return format!("{}{}={}{}", &text[..pos], key, raw, &rest[value_end..]);
    }

    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    match lines.iter_mut().find(|l| l.trim_start().starts_with("options")) {
        Some(line) => {
            line.push(' ');
            line.push_str(&format!("{}={}", key, raw));
        }
        None => lines.push(format!("options {} {}={}", module, key, raw)),
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_mapping() {
        assert_eq!(PowerFamily::for_driver(RadioDriver::Atheros), Some(PowerFamily::Atheros));
        assert_eq!(PowerFamily::for_driver(RadioDriver::Rtl88x2bu), Some(PowerFamily::Rtl8812au));
        assert_eq!(PowerFamily::for_driver(RadioDriver::Rtl8812eu), Some(PowerFamily::Rtl8812eu));
        assert_eq!(PowerFamily::for_driver(RadioDriver::SerialSik), None);
        assert_eq!(PowerFamily::Rtl8812au.file_name(), "88XXau.conf");
    }

    #[test]
    fn test_iw_power_in_mbm() {
        let record = RadioInterfaceRecord {
            driver: RadioDriver::Atheros,
            ..Default::default()
        };
        let mw = raw_to_mw(record.driver, record.card_model, 40);
        let mbm = IwPowerControl::mbm_for(&record, 40).unwrap();
        assert_eq!(mbm, (1000.0 * (mw as f64).log10()).round() as i32);
        assert_eq!(IwPowerControl::mbm_for(&record, 0), None);
    }

    #[test]
    fn test_find_value() {
        let text = "options 88XXau rtw_tx_pwr_idx_override=42\n";
        assert_eq!(find_value(text, "rtw_tx_pwr_idx_override"), Some(42));
        assert_eq!(find_value(text, "txpower"), None);
        assert_eq!(find_value("options ath9k_hw txpower=\n", "txpower"), None);
    }

    #[test]
    fn test_replace_value_in_place() {
        let text = "options ath9k_hw txpower=10 other=1\n";
        assert_eq!(
            replace_value(text, "ath9k_hw", "txpower", 33),
            "options ath9k_hw txpower=33 other=1\n"
        );
    }

    #[test]
    fn test_replace_value_appends_key() {
        let text = "options 8812eu rtw_drv_log_level=0\n";
        assert_eq!(
            replace_value(text, "8812eu", "rtw_tx_pwr_idx_override", 20),
            "options 8812eu rtw_drv_log_level=0 rtw_tx_pwr_idx_override=20\n"
        );
        assert_eq!(
            replace_value("", "8812eu", "rtw_tx_pwr_idx_override", 20),
            "options 8812eu rtw_tx_pwr_idx_override=20\n"
        );
    }
}
