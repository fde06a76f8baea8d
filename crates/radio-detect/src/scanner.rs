//! Serial port registry
//!
//! Enumerates local serial devices, persists their name, speed and usage
//! role to a flat text file, and hands out per-path locks so that two
//! sessions never share one byte stream.
//!
//! File layout:
//!
//! ```text
//! 2
//! Serial-0
//! /dev/serial0
//! 1 57600 0
//! Serial-USB0
//! /dev/ttyUSB0
//! 1 57600 7
//! ```
//!
//! Spaces in names and paths are stored as `*`.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use radio_core::{Band, ParseError};
use serde::{Deserialize, Serialize};
use serialport::SerialPortType;
use tracing::{debug, info, warn};

use crate::error::DetectError;
use crate::hwprobe::HardwareProbe;
use crate::paths::{write_replace, RadioPaths};
use crate::usb_ids::is_incompatible_serial_adapter;

/// Maximum number of serial ports tracked
pub const MAX_SERIAL_PORTS: usize = 6;

/// Always-present on-board UART
pub const PRIMARY_PORT_NAME: &str = "Serial-0";
pub const PRIMARY_PORT_PATH: &str = "/dev/serial0";

pub const DEFAULT_SERIAL_SPEED: u32 = 57_600;

/// Baud rates the platform UARTs support
pub const SERIAL_SPEEDS: [u32; 8] = [1_200, 2_400, 4_800, 9_600, 19_200, 38_400, 57_600, 115_200];

/// Information about a serial device reported by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Create from serialport crate's port info
    pub fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
            },
        }
    }
}

/// What a serial port is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SerialUsage {
    #[default]
    None,
    Telemetry,
    TelemetryMavlink,
    TelemetryLtm,
    MspOsd,
    MspOsdPitlab,
    DataLink,
    SikRadio,
    SerialRadio,
    Elrs433,
    Elrs868,
    Elrs915,
    Elrs24,
    CorePlugin,
}

impl SerialUsage {
    pub fn as_raw(self) -> i32 {
        match self {
            SerialUsage::None => 0,
            SerialUsage::Telemetry => 1,
            SerialUsage::TelemetryMavlink => 2,
            SerialUsage::TelemetryLtm => 3,
            SerialUsage::MspOsd => 4,
            SerialUsage::MspOsdPitlab => 5,
            SerialUsage::DataLink => 6,
            SerialUsage::SikRadio => 7,
            SerialUsage::SerialRadio => 8,
            SerialUsage::Elrs433 => 9,
            SerialUsage::Elrs868 => 10,
            SerialUsage::Elrs915 => 11,
            SerialUsage::Elrs24 => 12,
            SerialUsage::CorePlugin => 32,
        }
    }

    pub fn from_raw(value: i32) -> Result<Self, ParseError> {
        Ok(match value {
            0 => SerialUsage::None,
            1 => SerialUsage::Telemetry,
            2 => SerialUsage::TelemetryMavlink,
            3 => SerialUsage::TelemetryLtm,
            4 => SerialUsage::MspOsd,
            5 => SerialUsage::MspOsdPitlab,
            6 => SerialUsage::DataLink,
            7 => SerialUsage::SikRadio,
            8 => SerialUsage::SerialRadio,
            9 => SerialUsage::Elrs433,
            10 => SerialUsage::Elrs868,
            11 => SerialUsage::Elrs915,
            12 => SerialUsage::Elrs24,
            32 => SerialUsage::CorePlugin,
            other => {
                return Err(ParseError::UnknownValue {
                    kind: "serial usage",
                    value: other as i64,
                })
            }
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            SerialUsage::None => "None",
            SerialUsage::Telemetry => "Telemetry",
            SerialUsage::TelemetryMavlink => "MAVLink Telemetry",
            SerialUsage::TelemetryLtm => "LTM Telemetry",
            SerialUsage::MspOsd => "MSP OSD",
            SerialUsage::MspOsdPitlab => "MSP OSD (PitLab)",
            SerialUsage::DataLink => "Data Link",
            SerialUsage::SikRadio => "SiK Radio",
            SerialUsage::SerialRadio => "Serial Radio",
            SerialUsage::Elrs433 => "ELRS 433",
            SerialUsage::Elrs868 => "ELRS 868",
            SerialUsage::Elrs915 => "ELRS 915",
            SerialUsage::Elrs24 => "ELRS 2.4",
            SerialUsage::CorePlugin => "Core Plugin",
        }
    }

    /// Band served by an ELRS role
    pub fn elrs_band(self) -> Option<Band> {
        match self {
            SerialUsage::Elrs433 => Some(Band::Mhz433),
            SerialUsage::Elrs868 => Some(Band::Mhz868),
            SerialUsage::Elrs915 => Some(Band::Mhz915),
            SerialUsage::Elrs24 => Some(Band::Ghz24),
            _ => None,
        }
    }

    /// Ports that may be probed for a SiK modem
    pub fn is_sik_candidate(self) -> bool {
        matches!(self, SerialUsage::None | SerialUsage::SikRadio)
    }
}

impl fmt::Display for SerialUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One local serial device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortRecord {
    pub name: String,
    pub path: String,
    pub baud: u32,
    pub usage: SerialUsage,
    /// False for known-incompatible USB bridges
    pub supported: bool,
}

impl SerialPortRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            baud: DEFAULT_SERIAL_SPEED,
            usage: SerialUsage::None,
            supported: true,
        }
    }
}

/// Exclusive claim on a serial device path, released on drop
#[derive(Debug)]
pub struct PortGuard {
    path: String,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl PortGuard {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for PortGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.lock() {
            held.remove(&self.path);
        }
    }
}

/// Process-wide serial port registry
#[derive(Debug)]
pub struct SerialContext {
    ports: Vec<SerialPortRecord>,
    paths: RadioPaths,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl SerialContext {
    pub fn new(paths: RadioPaths) -> Self {
        Self {
            ports: Vec::new(),
            paths,
            locks: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn ports(&self) -> &[SerialPortRecord] {
        &self.ports
    }

    pub fn port(&self, index: usize) -> Option<&SerialPortRecord> {
        self.ports.get(index)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&SerialPortRecord> {
        self.ports.iter().find(|p| p.path == path)
    }

    /// Replace the in-memory set
    pub fn set_ports(&mut self, mut ports: Vec<SerialPortRecord>) {
        ports.truncate(MAX_SERIAL_PORTS);
        self.ports = ports;
    }

    pub fn has_unsupported_ports(&self) -> bool {
        self.ports.iter().any(|p| !p.supported)
    }

    /// Change the usage role of a port; returns false if the path is unknown
    pub fn set_usage(&mut self, path: &str, usage: SerialUsage) -> bool {
        match self.ports.iter_mut().find(|p| p.path == path) {
            Some(port) => {
                port.usage = usage;
                true
            }
            None => false,
        }
    }

    pub fn set_baud(&mut self, path: &str, baud: u32) -> bool {
        match self.ports.iter_mut().find(|p| p.path == path) {
            Some(port) => {
                port.baud = baud;
                true
            }
            None => false,
        }
    }

    /// Probe local serial devices
    ///
    /// Never fails: the primary port is always present and probe errors
    /// just yield fewer USB entries.
    pub fn enumerate(probe: &dyn HardwareProbe) -> Vec<SerialPortRecord> {
        info!("Enumerating serial ports...");
        let mut ports = vec![SerialPortRecord::new(PRIMARY_PORT_NAME, PRIMARY_PORT_PATH)];

        for (i, dev) in probe.list_serial_devices().into_iter().enumerate() {
            if ports.len() >= MAX_SERIAL_PORTS {
                warn!("Too many serial ports, ignoring {}", dev.port);
                break;
            }
            let mut record = SerialPortRecord::new(format!("Serial-USB{}", i), dev.port.clone());
            record.supported = !is_incompatible_serial_adapter(dev.vid, dev.product.as_deref());
            if !record.supported {
                warn!(
                    "Serial port {} uses an unsupported adapter ({})",
                    dev.port,
                    dev.product.as_deref().unwrap_or("unknown")
                );
            }
            ports.push(record);
        }

        for port in &ports {
            debug!("  {} - {} (supported: {})", port.name, port.path, port.supported);
        }
        info!("Found {} serial port(s)", ports.len());
        ports
    }

    /// Load the persisted port set, replacing the in-memory one
    pub fn load(&mut self) -> Result<(), DetectError> {
        let file = self.paths.serial_ports();
        let text = std::fs::read_to_string(&file)?;
        self.ports = parse_ports(&text).map_err(|reason| DetectError::Corrupt {
            file: file.display().to_string(),
            reason,
        })?;
        info!("Loaded {} serial port(s) from {}", self.ports.len(), file.display());
        Ok(())
    }

    pub fn save(&self) -> Result<(), DetectError> {
        let file = self.paths.serial_ports();
        write_replace(&file, format_ports(&self.ports).as_bytes())?;
        debug!("Saved {} serial port(s) to {}", self.ports.len(), file.display());
        Ok(())
    }

    /// Load stored settings and merge them onto a fresh enumeration
    ///
    /// A missing or corrupt file is replaced by the fresh enumeration.
    pub fn init(&mut self, probe: &dyn HardwareProbe) {
        let mut probed = Self::enumerate(probe);

        let must_save = match self.load() {
            Ok(()) => {
                let changed = reconcile(&self.ports, &mut probed);
                let all_known = probed
                    .iter()
                    .all(|p| self.ports.iter().any(|l| l.path == p.path));
                changed || !all_known || probed.len() != self.ports.len()
            }
            Err(e) => {
                warn!("No usable serial port configuration ({}), creating a new one", e);
                true
            }
        };

        self.ports = probed;
        if must_save {
            if let Err(e) = self.save() {
                warn!("Failed to save serial port configuration: {}", e);
            }
        }
    }

    /// Claim exclusive use of a device path
    pub fn lock(&self, path: &str) -> Result<PortGuard, DetectError> {
        let mut held = self
            .locks
            .lock()
            .map_err(|_| DetectError::PortBusy(path.to_string()))?;
        if !held.insert(path.to_string()) {
            return Err(DetectError::PortBusy(path.to_string()));
        }
        Ok(PortGuard {
            path: path.to_string(),
            locks: Arc::clone(&self.locks),
        })
    }
}

/// Copy stored name, speed and role onto probed ports with the same path
///
/// Returns true if any probed record changed. Ports only present in one
/// of the two sets are left alone.
pub fn reconcile(loaded: &[SerialPortRecord], probed: &mut [SerialPortRecord]) -> bool {
    let mut changed = false;
    for port in probed.iter_mut() {
        let Some(stored) = loaded.iter().find(|l| l.path == port.path) else {
            continue;
        };
        if port.name != stored.name || port.baud != stored.baud || port.usage != stored.usage {
            port.name = stored.name.clone();
            port.baud = stored.baud;
            port.usage = stored.usage;
            changed = true;
        }
    }
    changed
}

fn escape(s: &str) -> String {
    s.replace(' ', "*")
}

fn unescape(s: &str) -> String {
    s.replace('*', " ")
}

fn format_ports(ports: &[SerialPortRecord]) -> String {
    let mut out = format!("{}\n", ports.len());
    for port in ports {
        out.push_str(&format!(
            "{}\n{}\n{} {} {}\n",
            escape(&port.name),
            escape(&port.path),
            u8::from(port.supported),
            port.baud,
            port.usage.as_raw()
        ));
    }
    out
}

fn parse_ports(text: &str) -> Result<Vec<SerialPortRecord>, String> {
    let mut lines = text.lines();
    let count: usize = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or("missing port count")?;
    if count > MAX_SERIAL_PORTS {
        return Err(format!("invalid port count {}", count));
    }

    let mut ports = Vec::with_capacity(count);
    for i in 0..count {
        let name = lines.next().map(str::trim).filter(|l| !l.is_empty());
        let path = lines.next().map(str::trim).filter(|l| !l.is_empty());
        let fields = lines.next();
        let (Some(name), Some(path), Some(fields)) = (name, path, fields) else {
            return Err(format!("truncated record {}", i));
        };
        let values: Vec<i64> = fields
            .split_whitespace()
            .map(|v| v.parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("record {}: {}", i, e))?;
        let [supported, baud, usage] = values[..] else {
            return Err(format!("record {}: expected 3 fields", i));
        };
        let baud = u32::try_from(baud).map_err(|_| format!("record {}: bad speed {}", i, baud))?;
        let usage = match i32::try_from(usage).map_err(|e| e.to_string()).and_then(|u| {
            SerialUsage::from_raw(u).map_err(|e| e.to_string())
        }) {
            Ok(usage) => usage,
            Err(e) => {
                warn!("Discarding serial port {}: {}", path, e);
                continue;
            }
        };
        ports.push(SerialPortRecord {
            name: unescape(name),
            path: unescape(path),
            baud,
            usage,
            supported: supported != 0,
        });
    }
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwprobe::StaticProbe;
    use serialport::UsbPortInfo;

    fn usb(port: &str, vid: u16, product: &str) -> SerialPortInfo {
        SerialPortInfo {
            port: port.to_string(),
            vid: Some(vid),
            pid: Some(0x0001),
            manufacturer: None,
            product: Some(product.to_string()),
        }
    }

    #[test]
    fn test_serial_port_info_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x10C4,
            pid: 0xEA60,
            serial_number: Some("12345".to_string()),
            manufacturer: Some("Silicon Labs".to_string()),
            product: Some("CP2102".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyUSB0".to_string(), &usb_info);

        assert_eq!(info.vid, Some(0x10C4));
        assert_eq!(info.product.as_deref(), Some("CP2102"));
    }

    #[test]
    fn test_enumerate_always_has_primary() {
        let ports = SerialContext::enumerate(&StaticProbe::default());
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].path, PRIMARY_PORT_PATH);
        assert!(ports[0].supported);
    }

    #[test]
    fn test_enumerate_flags_ch340() {
        let probe = StaticProbe {
            serial_devices: vec![
                usb("/dev/ttyUSB0", 0x10C4, "CP2102"),
                usb("/dev/ttyUSB1", 0x1A86, "USB Serial"),
            ],
            ..Default::default()
        };
        let ports = SerialContext::enumerate(&probe);
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[1].name, "Serial-USB0");
        assert!(ports[1].supported);
        assert!(!ports[2].supported);
    }

    #[test]
    fn test_format_escapes_spaces() {
        let mut port = SerialPortRecord::new("My Port", "/dev/by id/x");
        port.usage = SerialUsage::SikRadio;
        let text = format_ports(&[port.clone()]);
        assert_eq!(text, "1\nMy*Port\n/dev/by*id/x\n1 57600 7\n");
        assert_eq!(parse_ports(&text).unwrap(), vec![port]);
    }

    #[test]
    fn test_parse_rejects_truncated() {
        assert!(parse_ports("2\nSerial-0\n/dev/serial0\n1 57600 0\n").is_err());
        assert!(parse_ports("").is_err());
        assert!(parse_ports("9\n").is_err());
        assert!(parse_ports("1\nA\n/dev/a\n1 57600\n").is_err());
    }

    #[test]
    fn test_parse_discards_unknown_usage() {
        let text = "2\nA\n/dev/a\n1 57600 99\nB\n/dev/b\n1 115200 9\n";
        let ports = parse_ports(text).unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].usage, SerialUsage::Elrs433);
    }

    #[test]
    fn test_reconcile_copies_matching_paths() {
        let mut stored = SerialPortRecord::new("Radio", "/dev/ttyUSB0");
        stored.baud = 115_200;
        stored.usage = SerialUsage::SikRadio;
        let loaded = vec![stored, SerialPortRecord::new("Gone", "/dev/ttyUSB9")];

        let mut probed = vec![
            SerialPortRecord::new("Serial-0", PRIMARY_PORT_PATH),
            SerialPortRecord::new("Serial-USB0", "/dev/ttyUSB0"),
        ];
        assert!(reconcile(&loaded, &mut probed));
        assert_eq!(probed[1].name, "Radio");
        assert_eq!(probed[1].baud, 115_200);
        assert_eq!(probed[0].usage, SerialUsage::None);
        assert_eq!(probed.len(), 2);

        assert!(!reconcile(&loaded, &mut probed));
    }

    #[test]
    fn test_lock_is_exclusive_per_path() {
        let ctx = SerialContext::new(RadioPaths::default());
        let guard = ctx.lock("/dev/ttyUSB0").unwrap();
        assert!(matches!(ctx.lock("/dev/ttyUSB0"), Err(DetectError::PortBusy(_))));
        let other = ctx.lock("/dev/ttyUSB1");
        assert!(other.is_ok());
        drop(guard);
        assert!(ctx.lock("/dev/ttyUSB0").is_ok());
    }
}
