//! Wi-Fi radio discovery and classification

use radio_core::record::{truncate_to_field, MAC_LEN};
use radio_core::{
    Band, CapabilityFlags, CardModel, RadioDriver, RadioInterfaceRecord, RadioType, SupportedBands,
    MAX_RADIO_INTERFACES,
};
use tracing::{debug, info, warn};

use crate::hwprobe::{HardwareProbe, PhyBandInfo};
use crate::usb_ids::{card_model_for_product_id, fallback_port_token, usb_port_token};

/// Result of classifying a driver string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverClass {
    pub radio_type: RadioType,
    pub driver: RadioDriver,
    pub supported: bool,
    pub tx_capable: bool,
}

impl DriverClass {
    const fn new(radio_type: RadioType, driver: RadioDriver, tx_capable: bool) -> Self {
        Self {
            radio_type,
            driver,
            supported: true,
            tx_capable,
        }
    }

    const UNKNOWN: Self = Self {
        radio_type: RadioType::Unknown,
        driver: RadioDriver::None,
        supported: false,
        tx_capable: false,
    };
}

/// Reduce a driver path to its last component
pub fn minimize_driver_name(driver: &str) -> &str {
    driver.trim().rsplit('/').next().unwrap_or("")
}

/// Classify a kernel driver string
pub fn classify_driver(driver: &str) -> DriverClass {
    let name = minimize_driver_name(driver).to_lowercase();

    if name.contains("rtl88xxau") {
        DriverClass::new(RadioType::Realtek, RadioDriver::Rtl88xxau, true)
    } else if name.contains("rtl8812au") {
        DriverClass::new(RadioType::Realtek, RadioDriver::Rtl8812au, true)
    } else if name.contains("8812au") {
        DriverClass::new(RadioType::Realtek, RadioDriver::Realtek8812au, true)
    } else if name.contains("8812eu") || name.contains("88x2eu") {
        DriverClass::new(RadioType::Realtek, RadioDriver::Rtl8812eu, true)
    } else if name.contains("rtl88x2bu") {
        DriverClass::new(RadioType::Realtek, RadioDriver::Rtl88x2bu, false)
    } else if name.contains("rtl8733bu") {
        DriverClass::new(RadioType::Realtek, RadioDriver::Rtl8733bu, false)
    } else if name.contains("rt2800usb") {
        DriverClass::new(RadioType::Ralink, RadioDriver::Ralink, true)
    } else if name.contains("mt7601u") {
        DriverClass::new(RadioType::Mediatek, RadioDriver::Mediatek, true)
    } else if name.contains("ath9k_htc") {
        DriverClass::new(RadioType::Atheros, RadioDriver::Atheros, true)
    } else {
        DriverClass::UNKNOWN
    }
}

/// Bands a phy supports, judged by one marker frequency per band
pub fn bands_from_phy(info: &PhyBandInfo) -> SupportedBands {
    let mut bands = SupportedBands::empty();
    for (mhz, band) in [
        (2377, Band::Ghz23),
        (2427, Band::Ghz24),
        (2512, Band::Ghz25),
        (5745, Band::Ghz58),
    ] {
        if info.advertises(mhz) {
            bands.insert(band);
        }
    }
    bands
}

/// Upper case MAC with separators removed
pub fn normalize_mac(mac: &str) -> String {
    mac.chars().filter(|c| *c != ':').collect::<String>().to_uppercase()
}

/// Fallback model when the USB id is not in the table
fn generic_model(driver: RadioDriver) -> CardModel {
    match driver {
        RadioDriver::Atheros => CardModel::AtherosGeneric,
        RadioDriver::Rtl88xxau | RadioDriver::Rtl8812au | RadioDriver::Realtek8812au => {
            CardModel::Rtl8812auGeneric
        }
        RadioDriver::Rtl8733bu => CardModel::Rtl8733bu,
        _ => CardModel::Unknown,
    }
}

/// Discover and classify Wi-Fi radios, sorted by USB port token
pub fn enumerate_wifi(probe: &dyn HardwareProbe) -> Vec<RadioInterfaceRecord> {
    let interfaces = match probe.list_network_interfaces() {
        Ok(list) => list,
        Err(e) => {
            warn!("Failed to list network interfaces: {}", e);
            return Vec::new();
        }
    };
    let usb_devices = probe.list_usb_devices();

    let mut records = Vec::new();
    for iface in interfaces.iter().filter(|i| i.is_radio_candidate()) {
        if records.len() >= MAX_RADIO_INTERFACES {
            warn!("Radio registry full, ignoring {}", iface.name);
            break;
        }

        let driver_string = probe.interface_driver(&iface.name).unwrap_or_default();
        let class = classify_driver(&driver_string);
        let phy_index = iface.phy_index.unwrap_or(-1);

        let mut record = RadioInterfaceRecord {
            phy_index,
            name: iface.name.clone(),
            description: class.radio_type.name().to_string(),
            driver_name: minimize_driver_name(&driver_string).to_string(),
            mac: iface.mac.as_deref().map(normalize_mac).unwrap_or_default(),
            radio_type: class.radio_type,
            driver: class.driver,
            supported: class.supported,
            enabled: true,
            configurable: class.supported,
            tx_capable: class.tx_capable,
            high_capacity: true,
            ..Default::default()
        };
        record.mac = truncate_to_field(&record.mac, MAC_LEN).to_string();

        if let Some(info) = probe.phy_band_info(phy_index) {
            record.supported_bands = bands_from_phy(&info);
        }

        let usb = usb_devices
            .iter()
            .find(|d| d.interface.as_deref() == Some(iface.name.as_str()));
        if let Some(dev) = usb {
            record.product_id = dev.product_id();
            record.usb_port = usb_port_token(&dev.bus_path).unwrap_or_default();
        }
        if record.usb_port.is_empty() {
            record.usb_port = fallback_port_token(records.len());
        }
        record.card_model = card_model_for_product_id(&record.product_id)
            .unwrap_or_else(|| generic_model(record.driver));

        record.capabilities = CapabilityFlags::CAN_RX | CapabilityFlags::VIDEO | CapabilityFlags::DATA;
        if record.tx_capable {
            record.capabilities |= CapabilityFlags::CAN_TX;
        }
        if record.high_capacity {
            record.capabilities |= CapabilityFlags::HIGH_CAPACITY;
        }

        if class.supported {
            info!(
                "Found {} radio {} ({}) on {}, bands: {}",
                record.description, record.name, record.driver, record.usb_port, record.supported_bands
            );
        } else {
            warn!(
                "Interface {} uses unsupported driver '{}', keeping it as unknown",
                record.name, record.driver_name
            );
        }
        records.push(record);
    }

    records.sort_by(|a, b| a.usb_port.cmp(&b.usb_port));
    debug!("Enumerated {} Wi-Fi interface(s)", records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwprobe::{NetworkInterface, StaticProbe, UsbDevice};

    #[test]
    fn test_classify_driver_order() {
        let c = classify_driver("/sys/bus/usb/drivers/rtl88XXau");
        assert_eq!(c.driver, RadioDriver::Rtl88xxau);
        assert_eq!(classify_driver("rtl8812au").driver, RadioDriver::Rtl8812au);
        assert_eq!(classify_driver("8812au").driver, RadioDriver::Realtek8812au);
        assert_eq!(classify_driver("rtl88x2eu").driver, RadioDriver::Rtl8812eu);
        assert_eq!(classify_driver("ath9k_htc").radio_type, RadioType::Atheros);
        assert_eq!(classify_driver("mt7601u").radio_type, RadioType::Mediatek);
        assert_eq!(classify_driver("rt2800usb").radio_type, RadioType::Ralink);
    }

    #[test]
    fn test_classify_rtl88x2bu_not_tx_capable() {
        let c = classify_driver("rtl88x2bu");
        assert!(c.supported);
        assert!(!c.tx_capable);
    }

    #[test]
    fn test_unknown_driver_kept_unsupported() {
        let c = classify_driver("iwlwifi");
        assert_eq!(c.radio_type, RadioType::Unknown);
        assert!(!c.supported);
    }

    #[test]
    fn test_bands_from_phy() {
        let info = PhyBandInfo {
            frequencies_mhz: vec![2412, 2427, 5745, 5805],
        };
        let bands = bands_from_phy(&info);
        assert!(bands.contains(Band::Ghz24));
        assert!(bands.contains(Band::Ghz58));
        assert!(!bands.contains(Band::Ghz23));
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("00:c0:ca:b1:23:45"), "00C0CAB12345");
    }

    fn iface(name: &str, phy: i32) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            phy_index: Some(phy),
            mac: Some(format!("00:11:22:33:44:0{}", phy)),
            is_loopback: false,
        }
    }

    #[test]
    fn test_enumerate_wifi_sorts_by_usb_token() {
        let probe = StaticProbe {
            interfaces: vec![
                NetworkInterface {
                    name: "lo".into(),
                    phy_index: None,
                    mac: None,
                    is_loopback: true,
                },
                iface("wlan0", 0),
                iface("wlan1", 1),
                iface("wlan2", 2),
            ],
            drivers: vec![
                ("wlan0".into(), "rtl88xxau".into()),
                ("wlan1".into(), "ath9k_htc".into()),
                ("wlan2".into(), "iwlwifi".into()),
            ],
            phys: vec![(
                0,
                PhyBandInfo {
                    frequencies_mhz: vec![2427, 5745],
                },
            )],
            usb_devices: vec![
                UsbDevice {
                    interface: Some("wlan0".into()),
                    bus_path: "1-1.3:1.0".into(),
                    vid: 0x0bda,
                    pid: 0x8812,
                    product: None,
                },
                UsbDevice {
                    interface: Some("wlan1".into()),
                    bus_path: "1-1.1:1.0".into(),
                    vid: 0x0cf3,
                    pid: 0x9271,
                    product: None,
                },
            ],
            serial_devices: vec![],
        };

        let records = enumerate_wifi(&probe);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "wlan1");
        assert_eq!(records[0].usb_port, "A");
        assert_eq!(records[0].card_model, CardModel::Tplink722n);
        assert_eq!(records[1].name, "wlan0");
        assert_eq!(records[1].card_model, CardModel::Awus036ach);
        assert_eq!(records[1].mac, "001122334400");
        assert!(records[1].supports_frequency(5_805_000));
        assert_eq!(records[2].name, "wlan2");
        assert_eq!(records[2].usb_port, "X3");
        assert!(!records[2].supported);
    }
}
