//! Frequency bands and channel tables
//!
//! Frequencies are always expressed in kHz. Seven bands are recognized,
//! each owning one bit of a [`SupportedBands`] mask. Classification is a
//! pure function of the frequency so it can be checked exhaustively.

use std::fmt;

/// Default frequency for 2.4 GHz links
pub const DEFAULT_FREQUENCY_24: u32 = 2_472_000;
/// Default frequency for 5.8 GHz links
pub const DEFAULT_FREQUENCY_58: u32 = 5_805_000;
/// Default frequency for 433 MHz links
pub const DEFAULT_FREQUENCY_433: u32 = 430_000;
/// Default frequency for 868 MHz links
pub const DEFAULT_FREQUENCY_868: u32 = 867_000;
/// Default frequency for 915 MHz links
pub const DEFAULT_FREQUENCY_915: u32 = 914_000;

/// One of the recognized RF bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Band {
    Mhz433,
    Mhz868,
    Mhz915,
    Ghz23,
    Ghz24,
    Ghz25,
    Ghz58,
}

impl Band {
    /// All bands in ascending frequency order
    pub const ALL: [Band; 7] = [
        Band::Mhz433,
        Band::Mhz868,
        Band::Mhz915,
        Band::Ghz23,
        Band::Ghz24,
        Band::Ghz25,
        Band::Ghz58,
    ];

    /// Bit of this band inside a [`SupportedBands`] mask
    pub const fn bit(self) -> u32 {
        match self {
            Band::Ghz23 => 1,
            Band::Ghz24 => 1 << 1,
            Band::Ghz25 => 1 << 2,
            Band::Ghz58 => 1 << 3,
            Band::Mhz433 => 1 << 4,
            Band::Mhz868 => 1 << 5,
            Band::Mhz915 => 1 << 6,
        }
    }

    /// Human readable band name
    pub fn name(self) -> &'static str {
        match self {
            Band::Mhz433 => "433 MHz",
            Band::Mhz868 => "868 MHz",
            Band::Mhz915 => "915 MHz",
            Band::Ghz23 => "2.3 GHz",
            Band::Ghz24 => "2.4 GHz",
            Band::Ghz25 => "2.5 GHz",
            Band::Ghz58 => "5.8 GHz",
        }
    }

    /// Narrow sub-GHz bands used by serial modems
    pub fn is_narrow(self) -> bool {
        matches!(self, Band::Mhz433 | Band::Mhz868 | Band::Mhz915)
    }

    /// Selectable channels for this band, in kHz
    pub fn channels(self) -> &'static [u32] {
        match self {
            Band::Mhz433 => &CHANNELS_433,
            Band::Mhz868 => &CHANNELS_868,
            Band::Mhz915 => &CHANNELS_915,
            Band::Ghz23 => &CHANNELS_23,
            Band::Ghz24 => &CHANNELS_24,
            Band::Ghz25 => &CHANNELS_25,
            Band::Ghz58 => &CHANNELS_58,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitmask of bands an interface can operate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SupportedBands(u32);

impl SupportedBands {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, band: Band) -> bool {
        self.0 & band.bit() != 0
    }

    pub fn insert(&mut self, band: Band) {
        self.0 |= band.bit();
    }

    pub fn with(mut self, band: Band) -> Self {
        self.insert(band);
        self
    }

    /// True if any of the narrow 433/868/915 bands is set
    pub fn has_narrow_band(self) -> bool {
        self.iter().any(Band::is_narrow)
    }

    /// Iterate over the bands present in the mask, lowest frequency first
    pub fn iter(self) -> impl Iterator<Item = Band> {
        Band::ALL.into_iter().filter(move |b| self.contains(*b))
    }
}

impl From<Band> for SupportedBands {
    fn from(band: Band) -> Self {
        Self(band.bit())
    }
}

impl fmt::Display for SupportedBands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(Band::name).collect();
        f.write_str(&names.join(", "))
    }
}

/// Classify a frequency into its band
///
/// Values below 10000 are legacy MHz values and are mapped to 2.4 GHz
/// (below 2700) or 5.8 GHz. Zero is the "no frequency" marker used by
/// records and link requests, so unlike a legacy MHz value it belongs to no
/// band. Neither does the 5 GHz gap boundary.
pub fn band_of(freq_khz: u32) -> Option<Band> {
    match freq_khz {
        0 => None,
        f if f < 10_000 => Some(if f < 2_700 { Band::Ghz24 } else { Band::Ghz58 }),
        f if f < 500_000 => Some(Band::Mhz433),
        f if f < 900_000 => Some(Band::Mhz868),
        f if f < 950_000 => Some(Band::Mhz915),
        f if f < 2_412_000 => Some(Band::Ghz23),
        f if f < 2_487_000 => Some(Band::Ghz24),
        f if f < 5_000_000 => Some(Band::Ghz25),
        5_000_000 => None,
        _ => Some(Band::Ghz58),
    }
}

/// True iff the band of `freq_khz` is set in `bands`
pub fn is_in_bands(freq_khz: u32, bands: SupportedBands) -> bool {
    band_of(freq_khz).is_some_and(|band| bands.contains(band))
}

/// Position of `freq_khz` inside the channel table of `band`
pub fn channel_index(band: Band, freq_khz: u32) -> Option<usize> {
    band.channels().iter().position(|&f| f == freq_khz)
}

/// All selectable channels for the bands in `bands`
///
/// With `separator` set, a `0` entry follows each band's channels so that
/// menus can draw a divider.
pub fn supported_channels(bands: SupportedBands, separator: bool) -> Vec<u32> {
    let mut out = Vec::new();
    for band in bands.iter() {
        out.extend_from_slice(band.channels());
        if separator {
            out.push(0);
        }
    }
    out
}

const fn stepped<const N: usize>(start: u32, step: u32) -> [u32; N] {
    let mut out = [0u32; N];
    let mut i = 0;
    while i < N {
        out[i] = start + step * i as u32;
        i += 1;
    }
    out
}

const CHANNELS_433: [u32; 21] = stepped(425_000, 1_000);
const CHANNELS_868: [u32; 18] = stepped(858_000, 1_000);
const CHANNELS_915: [u32; 11] = stepped(910_000, 1_000);
const CHANNELS_23: [u32; 20] = stepped(2_312_000, 5_000);

const CHANNELS_24: [u32; 14] = [
    2_412_000, 2_417_000, 2_422_000, 2_427_000, 2_432_000, 2_437_000, 2_442_000, 2_447_000,
    2_452_000, 2_457_000, 2_462_000, 2_467_000, 2_472_000, 2_484_000,
];

const CHANNELS_25: [u32; 16] = [
    2_487_000, 2_489_000, 2_492_000, 2_494_000, 2_497_000, 2_499_000, 2_512_000, 2_532_000,
    2_572_000, 2_592_000, 2_612_000, 2_632_000, 2_652_000, 2_672_000, 2_692_000, 2_712_000,
];

const CHANNELS_58: [u32; 27] = [
    5_180_000, 5_200_000, 5_220_000, 5_240_000, 5_260_000, 5_280_000, 5_300_000, 5_320_000,
    5_500_000, 5_520_000, 5_540_000, 5_560_000, 5_580_000, 5_600_000, 5_620_000, 5_640_000,
    5_660_000, 5_680_000, 5_700_000, 5_745_000, 5_765_000, 5_785_000, 5_805_000, 5_825_000,
    5_845_000, 5_865_000, 5_885_000,
];
