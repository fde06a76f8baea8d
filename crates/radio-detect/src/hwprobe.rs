//! Operating system hardware queries
//!
//! Classification code never talks to the OS directly; it consumes the
//! structured results of a [`HardwareProbe`]. [`SystemProbe`] answers from
//! Linux sysfs, the `serialport` crate and `iw` phy listings.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serialport::available_ports;
use tracing::{debug, info, trace, warn};

use crate::error::DetectError;
use crate::scanner::SerialPortInfo;

/// A network interface reported by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name (e.g. `wlan0`)
    pub name: String,
    /// Wireless phy index, `None` for non-wireless interfaces
    pub phy_index: Option<i32>,
    /// MAC address as reported (`aa:bb:cc:dd:ee:ff`)
    pub mac: Option<String>,
    pub is_loopback: bool,
}

impl NetworkInterface {
    /// Only wireless, non-loopback interfaces are radio candidates
    pub fn is_radio_candidate(&self) -> bool {
        !self.is_loopback && self.phy_index.is_some()
    }
}

/// Frequencies advertised by a wireless phy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhyBandInfo {
    pub frequencies_mhz: Vec<u32>,
}

impl PhyBandInfo {
    pub fn advertises(&self, mhz: u32) -> bool {
        self.frequencies_mhz.contains(&mhz)
    }
}

/// A USB device backing a network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    /// Network interface bound to this device, if any
    pub interface: Option<String>,
    /// sysfs bus path of the USB interface (e.g. `1-1.2:1.0`)
    pub bus_path: String,
    pub vid: u16,
    pub pid: u16,
    pub product: Option<String>,
}

impl UsbDevice {
    /// `vid:pid` in lower case hex
    pub fn product_id(&self) -> String {
        format!("{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Source of hardware facts
pub trait HardwareProbe {
    fn list_network_interfaces(&self) -> Result<Vec<NetworkInterface>, DetectError>;

    /// Kernel driver string bound to an interface
    fn interface_driver(&self, interface: &str) -> Option<String>;

    fn phy_band_info(&self, phy_index: i32) -> Option<PhyBandInfo>;

    fn list_usb_devices(&self) -> Vec<UsbDevice>;

    /// USB serial devices, in a stable order
    fn list_serial_devices(&self) -> Vec<SerialPortInfo>;
}

/// Probe backed by the running Linux system
#[derive(Debug, Clone)]
pub struct SystemProbe {
    sysfs_net: PathBuf,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            sysfs_net: PathBuf::from("/sys/class/net"),
        }
    }

    fn read_trimmed(path: &Path) -> Option<String> {
        fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn usb_device_for(&self, interface: &str) -> Option<UsbDevice> {
        let device = fs::canonicalize(self.sysfs_net.join(interface).join("device")).ok()?;
        let bus_path = device.file_name()?.to_string_lossy().into_owned();
        // idVendor/idProduct live on the parent USB device node
        let usb_node = device.parent()?;
        let vid = Self::read_trimmed(&usb_node.join("idVendor"))?;
        let pid = Self::read_trimmed(&usb_node.join("idProduct"))?;
        Some(UsbDevice {
            interface: Some(interface.to_string()),
            bus_path,
            vid: u16::from_str_radix(&vid, 16).ok()?,
            pid: u16::from_str_radix(&pid, 16).ok()?,
            product: Self::read_trimmed(&usb_node.join("product")),
        })
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareProbe for SystemProbe {
    fn list_network_interfaces(&self) -> Result<Vec<NetworkInterface>, DetectError> {
        let entries = fs::read_dir(&self.sysfs_net)
            .map_err(|e| DetectError::EnumerationFailed(format!("{}: {}", self.sysfs_net.display(), e)))?;

        let mut result = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let base = self.sysfs_net.join(&name);
            let phy_index = Self::read_trimmed(&base.join("phy80211").join("index"))
                .and_then(|s| s.parse().ok());
            trace!("Network interface {} phy {:?}", name, phy_index);
            result.push(NetworkInterface {
                is_loopback: name == "lo",
                mac: Self::read_trimmed(&base.join("address")),
                name,
                phy_index,
            });
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn interface_driver(&self, interface: &str) -> Option<String> {
        let link = fs::read_link(self.sysfs_net.join(interface).join("device").join("driver")).ok()?;
        link.file_name().map(|n| n.to_string_lossy().into_owned())
    }

    fn phy_band_info(&self, phy_index: i32) -> Option<PhyBandInfo> {
        let output = Command::new("iw")
            .args(["phy", &format!("phy{}", phy_index), "info"])
            .output();
        let output = match output {
            Ok(out) if out.status.success() => out,
            Ok(out) => {
                warn!("iw phy{} info exited with {}", phy_index, out.status);
                return None;
            }
            Err(e) => {
                warn!("Failed to query phy{}: {}", phy_index, e);
                return None;
            }
        };
        Some(parse_phy_frequencies(&String::from_utf8_lossy(&output.stdout)))
    }

    fn list_usb_devices(&self) -> Vec<UsbDevice> {
        let interfaces = match self.list_network_interfaces() {
            Ok(list) => list,
            Err(e) => {
                warn!("Cannot list USB network devices: {}", e);
                return Vec::new();
            }
        };
        interfaces
            .iter()
            .filter_map(|iface| self.usb_device_for(&iface.name))
            .collect()
    }

    fn list_serial_devices(&self) -> Vec<SerialPortInfo> {
        match available_ports() {
            Ok(ports) => {
                let mut result: Vec<SerialPortInfo> = ports
                    .into_iter()
                    .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
                    .filter(|p| p.vid.is_some())
                    .collect();
                result.sort_by(|a, b| a.port.cmp(&b.port));
                info!("Found {} USB serial device(s)", result.len());
                result
            }
            Err(e) => {
                warn!("Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        }
    }
}

/// Extract advertised frequencies from `iw phy info` text
///
/// Lines look like `* 2412 MHz [1] (20.0 dBm)`; disabled channels are kept
/// since band support does not depend on regulatory state.
pub fn parse_phy_frequencies(text: &str) -> PhyBandInfo {
    let mut frequencies_mhz = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim().strip_prefix("* ") else {
            continue;
        };
        let mut words = rest.split_whitespace();
        let (Some(value), Some("MHz")) = (words.next(), words.next()) else {
            continue;
        };
        // iw may print fractional frequencies such as "2412.0"
        let whole = value.split('.').next().unwrap_or(value);
        if let Ok(mhz) = whole.parse::<u32>() {
            frequencies_mhz.push(mhz);
        }
    }
    debug!("Parsed {} phy frequencies", frequencies_mhz.len());
    PhyBandInfo { frequencies_mhz }
}

/// In-memory probe used by tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    pub interfaces: Vec<NetworkInterface>,
    pub drivers: Vec<(String, String)>,
    pub phys: Vec<(i32, PhyBandInfo)>,
    pub usb_devices: Vec<UsbDevice>,
    pub serial_devices: Vec<SerialPortInfo>,
}

impl HardwareProbe for StaticProbe {
    fn list_network_interfaces(&self) -> Result<Vec<NetworkInterface>, DetectError> {
        Ok(self.interfaces.clone())
    }

    fn interface_driver(&self, interface: &str) -> Option<String> {
        self.drivers
            .iter()
            .find(|(name, _)| name == interface)
            .map(|(_, driver)| driver.clone())
    }

    fn phy_band_info(&self, phy_index: i32) -> Option<PhyBandInfo> {
        self.phys
            .iter()
            .find(|(index, _)| *index == phy_index)
            .map(|(_, info)| info.clone())
    }

    fn list_usb_devices(&self) -> Vec<UsbDevice> {
        self.usb_devices.clone()
    }

    fn list_serial_devices(&self) -> Vec<SerialPortInfo> {
        self.serial_devices.clone()
    }
}
