//! Radio Hardware Detection Library
//!
//! This crate discovers the radio hardware attached to a station, keeps it
//! in persistent registries and configures the devices that can be
//! configured:
//!
//! - **Scanner**: serial port registry with usage roles and port locks
//! - **Wi-Fi**: network interface classification into radio records
//! - **Registry**: the CRC protected radio interface registry
//! - **SiK**: AT-command probing and frequency plans for SiK modems
//! - **ELRS**: records for ports assigned an ELRS role
//! - **TX power**: per-driver raw power option files
//!
//! # Example
//!
//! ```rust,no_run
//! use radio_detect::{RadioContext, RadioPaths, SerialContext, SerialPortOpener, SikEngine, SystemProbe};
//!
//! # async fn run() -> Result<(), radio_detect::DetectError> {
//! let paths = RadioPaths::default();
//! let probe = SystemProbe::default();
//! let mut serial = SerialContext::new(paths.clone());
//! serial.init(&probe);
//!
//! let sik = SikEngine::new(SerialPortOpener);
//! let mut radios = RadioContext::new(paths);
//! radios.init(&probe, &mut serial, &sik).await?;
//!
//! for record in radios.records() {
//!     println!("{} {} ({})", record.usb_port, record.name, record.supported_bands);
//! }
//! # Ok(())
//! # }
//! ```

pub mod elrs;
pub mod error;
pub mod hwprobe;
pub mod paths;
pub mod probe;
pub mod registry;
pub mod scanner;
pub mod sik;
pub mod txpower;
pub mod usb_ids;
pub mod wifi;

pub use elrs::add_elrs_radios;
pub use error::DetectError;
pub use hwprobe::{HardwareProbe, StaticProbe, SystemProbe};
pub use paths::RadioPaths;
pub use probe::{PortOpener, SerialPortOpener, SikConfig, SikModem, SikReadout};
pub use registry::{crc32, decode_registry, encode_registry, RadioContext};
pub use scanner::{SerialContext, SerialPortInfo, SerialPortRecord, SerialUsage};
pub use sik::{FrequencyPlan, PlanOutcome, SikEngine};
pub use txpower::{IwPowerControl, NoLiveControl, PowerControl, PowerFamily, TxPowerConfig, TxPowerManager};
pub use wifi::enumerate_wifi;
