//! Radio Link Core Library
//!
//! This crate holds the I/O-free data model of the radio link layer:
//!
//! - **Bands**: band classification of a frequency and per-band channel tables
//! - **Hardware**: radio type, driver and card model enums plus capability flags
//! - **Records**: the radio interface record and its fixed binary layout
//! - **SiK**: the SiK register table and its encoded speed codes
//! - **AT**: the AT command vocabulary and response framing used by SiK modems
//! - **Power**: raw power index to mW conversion tables
//!
//! # Example
//!
//! ```rust
//! use radio_core::{band_of, is_in_bands, Band, SupportedBands};
//!
//! let bands = SupportedBands::from(Band::Ghz24).with(Band::Ghz58);
//! assert_eq!(band_of(5_805_000), Some(Band::Ghz58));
//! assert!(is_in_bands(2_472_000, bands));
//! assert!(!is_in_bands(433_000, bands));
//! ```

pub mod at;
pub mod bands;
pub mod error;
pub mod hardware;
pub mod power;
pub mod record;
pub mod sik;

pub use at::AtCommand;
pub use bands::{band_of, channel_index, is_in_bands, supported_channels, Band, SupportedBands};
pub use error::ParseError;
pub use hardware::{CapabilityFlags, CardModel, RadioDriver, RadioType};
pub use record::{RadioInterfaceRecord, RECORD_SIZE};
pub use sik::SikParameterTable;

/// Maximum number of radio interfaces tracked by a registry
pub const MAX_RADIO_INTERFACES: usize = 6;

/// Number of raw hardware parameter slots per interface
pub const MAX_RADIO_HW_PARAMS: usize = 16;

/// Highest valid raw TX power index
pub const MAX_TX_POWER: i32 = 71;

/// Raw power used when a requested value is out of range
pub const DEFAULT_RADIO_TX_POWER: i32 = 40;

/// Raw power given to newly seen controller cards
pub const DEFAULT_CONTROLLER_TX_POWER: i32 = 45;
