//! Controller interface preferences
//!
//! Per-card user settings keyed by MAC (name, role overrides, raw power)
//! and the ordered TX-preferred list. The text file looks like:
//!
//! ```text
//! radio_ifaces_v1
//! radio_cards_settings: 1
//! Left~Card 00C0CA112233 3 101 45
//! 0
//! TX_Preferred: 1
//!  00C0CA112233
//! Input_Interfaces: 0
//! ```
//!
//! The `Input_Interfaces` section belongs to another subsystem and is kept
//! verbatim.

use std::path::{Path, PathBuf};

use radio_core::{CapabilityFlags, CardModel, RadioInterfaceRecord, DEFAULT_CONTROLLER_TX_POWER};
use radio_detect::paths::{write_replace, RadioPaths};
use tracing::{debug, info, warn};

use crate::error::LinkError;

/// Format stamp on the first line
pub const PREFS_STAMP: &str = "radio_ifaces_v1";

/// Maximum number of remembered cards
pub const MAX_CARD_SETTINGS: usize = 20;

const CARDS_HEADER: &str = "radio_cards_settings:";
const TX_HEADER: &str = "TX_Preferred:";
const INPUT_HEADER: &str = "Input_Interfaces:";
const EMPTY_INPUT_SECTION: &str = "Input_Interfaces: 0\n";

/// User settings for one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSettings {
    pub mac: String,
    /// User defined name, empty when unset
    pub name: String,
    pub card_model: CardModel,
    pub flags: CapabilityFlags,
    pub raw_power: i32,
    /// Card is built into the controller
    pub internal: bool,
}

impl CardSettings {
    fn for_record(record: &RadioInterfaceRecord) -> Self {
        Self {
            mac: record.mac.clone(),
            name: String::new(),
            card_model: record.card_model,
            flags: CapabilityFlags::default_for_card(record.is_sik()),
            raw_power: DEFAULT_CONTROLLER_TX_POWER,
            internal: false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains(CapabilityFlags::DISABLED)
    }

    pub fn is_rx_only(&self) -> bool {
        !self.flags.contains(CapabilityFlags::CAN_TX)
    }

    pub fn is_tx_only(&self) -> bool {
        !self.flags.contains(CapabilityFlags::CAN_RX)
    }
}

/// Controller-side card settings and TX preference order
#[derive(Debug, Clone)]
pub struct ControllerPreferences {
    path: PathBuf,
    cards: Vec<CardSettings>,
    tx_preferred: Vec<String>,
    input_section: String,
}

impl ControllerPreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cards: Vec::new(),
            tx_preferred: Vec::new(),
            input_section: EMPTY_INPUT_SECTION.to_string(),
        }
    }

    pub fn from_paths(paths: &RadioPaths) -> Self {
        Self::new(paths.controller_interfaces())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cards(&self) -> &[CardSettings] {
        &self.cards
    }

    fn reset(&mut self) {
        self.cards.clear();
        self.tx_preferred.clear();
        self.input_section = EMPTY_INPUT_SECTION.to_string();
    }

    /// Load from disk
    ///
    /// A missing file is replaced by a fresh one. A malformed file resets
    /// the preferences to empty and is reported as corrupt.
    pub fn load(&mut self) -> Result<(), LinkError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No controller preferences at {}, creating defaults", self.path.display());
                self.reset();
                return self.save();
            }
            Err(e) => return Err(e.into()),
        };
        match parse_preferences(&text) {
            Ok((cards, tx_preferred, input_section)) => {
                debug!(
                    "Loaded {} card setting(s), {} TX preferred",
                    cards.len(),
                    tx_preferred.len()
                );
                self.cards = cards;
                self.tx_preferred = tx_preferred;
                self.input_section = input_section;
                Ok(())
            }
            Err(reason) => {
                warn!("Invalid controller preferences {}: {}", self.path.display(), reason);
                self.reset();
                Err(LinkError::Corrupt {
                    file: self.path.display().to_string(),
                    reason,
                })
            }
        }
    }

    pub fn save(&self) -> Result<(), LinkError> {
        write_replace(&self.path, self.format().as_bytes())?;
        debug!("Saved controller preferences to {}", self.path.display());
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to save controller preferences: {}", e);
        }
    }

    fn format(&self) -> String {
        let mut out = format!("{}\n{} {}\n", PREFS_STAMP, CARDS_HEADER, self.cards.len());
        for card in &self.cards {
            out.push_str(&format!(
                "{} {} {} {} {}\n{}\n",
                encode_name(&card.name),
                card.mac,
                card.card_model.as_raw(),
                card.flags.bits(),
                card.raw_power,
                u8::from(card.internal)
            ));
        }
        out.push_str(&format!("{} {}\n", TX_HEADER, self.tx_preferred.len()));
        for mac in &self.tx_preferred {
            out.push_str(&format!(" {}\n", mac));
        }
        out.push_str(&self.input_section);
        out
    }

    /// Settings of a known card
    pub fn find(&self, mac: &str) -> Option<&CardSettings> {
        self.cards.iter().find(|c| c.mac == mac)
    }

    /// Settings for a card, remembering it with defaults if unknown
    ///
    /// Returns `None` once the table is full.
    pub fn card(&mut self, record: &RadioInterfaceRecord) -> Option<&mut CardSettings> {
        if let Some(pos) = self.cards.iter().position(|c| c.mac == record.mac) {
            return self.cards.get_mut(pos);
        }
        if self.cards.len() >= MAX_CARD_SETTINGS {
            warn!("Card settings full, not remembering {}", record.mac);
            return None;
        }
        debug!("Remembering new card {} ({})", record.mac, record.card_model);
        self.cards.push(CardSettings::for_record(record));
        self.persist();
        self.cards.last_mut()
    }

    fn update(&mut self, record: &RadioInterfaceRecord, change: impl FnOnce(&mut CardSettings)) {
        if let Some(card) = self.card(record) {
            change(card);
            self.persist();
        }
    }

    pub fn is_disabled(&self, mac: &str) -> bool {
        self.find(mac).is_some_and(CardSettings::is_disabled)
    }

    pub fn is_rx_only(&self, mac: &str) -> bool {
        self.find(mac).is_some_and(CardSettings::is_rx_only)
    }

    pub fn is_tx_only(&self, mac: &str) -> bool {
        self.find(mac).is_some_and(CardSettings::is_tx_only)
    }

    pub fn set_disabled(&mut self, record: &RadioInterfaceRecord, disabled: bool) {
        self.update(record, |c| c.flags.set(CapabilityFlags::DISABLED, disabled));
    }

    /// Restrict the card to receiving, or give TX back
    pub fn set_rx_only(&mut self, record: &RadioInterfaceRecord, rx_only: bool) {
        self.update(record, |c| {
            c.flags.insert(CapabilityFlags::CAN_RX);
            c.flags.set(CapabilityFlags::CAN_TX, !rx_only);
        });
    }

    /// Restrict the card to transmitting, or give RX back
    pub fn set_tx_only(&mut self, record: &RadioInterfaceRecord, tx_only: bool) {
        self.update(record, |c| {
            c.flags.insert(CapabilityFlags::CAN_TX);
            c.flags.set(CapabilityFlags::CAN_RX, !tx_only);
        });
    }

    pub fn flags(&self, mac: &str) -> Option<CapabilityFlags> {
        self.find(mac).map(|c| c.flags)
    }

    pub fn set_flags(&mut self, record: &RadioInterfaceRecord, flags: CapabilityFlags) {
        self.update(record, |c| c.flags = flags);
    }

    pub fn name(&self, mac: &str) -> Option<&str> {
        self.find(mac).map(|c| c.name.as_str()).filter(|n| !n.is_empty())
    }

    pub fn set_name(&mut self, record: &RadioInterfaceRecord, name: &str) {
        let name = name.to_string();
        self.update(record, |c| c.name = name);
    }

    pub fn is_internal(&self, mac: &str) -> bool {
        self.find(mac).is_some_and(|c| c.internal)
    }

    pub fn set_internal(&mut self, record: &RadioInterfaceRecord, internal: bool) {
        self.update(record, |c| c.internal = internal);
    }

    pub fn raw_power(&self, mac: &str) -> i32 {
        self.find(mac)
            .map(|c| c.raw_power)
            .unwrap_or(DEFAULT_CONTROLLER_TX_POWER)
    }

    pub fn set_raw_power(&mut self, record: &RadioInterfaceRecord, raw: i32) {
        self.update(record, |c| c.raw_power = raw);
    }

    /// User name of a card, else its model name
    pub fn name_or_model(&self, record: &RadioInterfaceRecord) -> String {
        match self.name(&record.mac) {
            Some(name) => name.to_string(),
            None => record.card_model.name().to_string(),
        }
    }

    pub fn tx_preferred(&self) -> &[String] {
        &self.tx_preferred
    }

    /// 1-based position in the TX-preferred list, 0 when not listed
    pub fn tx_preferred_rank(&self, mac: &str) -> usize {
        self.tx_preferred
            .iter()
            .position(|m| m == mac)
            .map_or(0, |pos| pos + 1)
    }

    /// Put a card at the top of the TX-preferred list
    pub fn set_tx_preferred(&mut self, mac: &str) {
        self.tx_preferred.retain(|m| m != mac);
        self.tx_preferred.insert(0, mac.to_string());
        self.persist();
    }

    pub fn remove_tx_preferred(&mut self, mac: &str) {
        let before = self.tx_preferred.len();
        self.tx_preferred.retain(|m| m != mac);
        if self.tx_preferred.len() != before {
            self.persist();
        }
    }
}

fn encode_name(name: &str) -> String {
    if name.is_empty() {
        return "~".to_string();
    }
    name.chars()
        .map(|c| if c == ' ' || c == '\r' || c == '\n' { '~' } else { c })
        .collect()
}

fn decode_name(token: &str) -> String {
    if token == "~" {
        return String::new();
    }
    token.replace('~', " ")
}

fn section_count(line: Option<&str>, header: &str) -> Result<usize, String> {
    let line = line.ok_or_else(|| format!("missing {} section", header))?;
    line.trim()
        .strip_prefix(header)
        .and_then(|n| n.trim().parse().ok())
        .ok_or_else(|| format!("bad {} line '{}'", header, line))
}

type ParsedPreferences = (Vec<CardSettings>, Vec<String>, String);

fn parse_preferences(text: &str) -> Result<ParsedPreferences, String> {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some(PREFS_STAMP) {
        return Err("missing format stamp".to_string());
    }

    let count = section_count(lines.next(), CARDS_HEADER)?;
    if count > MAX_CARD_SETTINGS {
        return Err(format!("too many cards ({})", count));
    }
    let mut cards = Vec::with_capacity(count);
    for i in 0..count {
        let line = lines.next().ok_or_else(|| format!("card {} missing", i))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, mac, model, flags, power] = fields[..] else {
            return Err(format!("card {}: expected 5 fields", i));
        };
        let bad = |what: &str| format!("card {}: bad {}", i, what);
        let model: i32 = model.parse().map_err(|_| bad("card model"))?;
        let internal = lines
            .next()
            .and_then(|l| l.trim().parse::<u8>().ok())
            .ok_or_else(|| bad("internal flag"))?;
        cards.push(CardSettings {
            mac: mac.to_string(),
            name: decode_name(name),
            card_model: CardModel::from_raw(model).map_err(|e| format!("card {}: {}", i, e))?,
            flags: CapabilityFlags::from_bits(flags.parse().map_err(|_| bad("flags"))?),
            raw_power: power.parse().map_err(|_| bad("raw power"))?,
            internal: internal != 0,
        });
    }

    let count = section_count(lines.next(), TX_HEADER)?;
    let mut tx_preferred = Vec::with_capacity(count);
    for i in 0..count {
        let mac = lines
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| format!("TX preferred entry {} missing", i))?;
        tx_preferred.push(mac.to_string());
    }

    let rest: Vec<&str> = lines.collect();
    let input_section = if rest.first().is_some_and(|l| l.trim_start().starts_with(INPUT_HEADER)) {
        let mut s = rest.join("\n");
        s.push('\n');
        s
    } else {
        EMPTY_INPUT_SECTION.to_string()
    };

    Ok((cards, tx_preferred, input_section))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mac: &str, model: CardModel) -> RadioInterfaceRecord {
        RadioInterfaceRecord {
            mac: mac.to_string(),
            card_model: model,
            ..Default::default()
        }
    }

    fn temp_prefs(name: &str) -> ControllerPreferences {
        let dir = std::env::temp_dir().join(format!("radio-links-prefs-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        ControllerPreferences::new(dir.join("controller_interfaces.cfg"))
    }

    #[test]
    fn test_name_encoding() {
        assert_eq!(encode_name(""), "~");
        assert_eq!(encode_name("Left Card\r\n"), "Left~Card~~");
        assert_eq!(decode_name("~"), "");
        assert_eq!(decode_name("Left~Card"), "Left Card");
    }

    #[test]
    fn test_new_card_defaults() {
        let mut prefs = temp_prefs("defaults");
        let card = prefs.card(&record("AA", CardModel::Awus036ach)).unwrap();
        assert_eq!(card.raw_power, 45);
        assert!(card.flags.contains(CapabilityFlags::VIDEO));
        assert!(!card.is_rx_only());

        let sik = RadioInterfaceRecord {
            driver: radio_core::RadioDriver::SerialSik,
            ..record("SIK-0", CardModel::Sik)
        };
        let card = prefs.card(&sik).unwrap();
        assert!(!card.flags.contains(CapabilityFlags::VIDEO));
    }

    #[test]
    fn test_card_table_is_bounded() {
        let mut prefs = temp_prefs("bounded");
        for i in 0..MAX_CARD_SETTINGS {
            assert!(prefs.card(&record(&format!("MAC{}", i), CardModel::Unknown)).is_some());
        }
        assert!(prefs.card(&record("ONE-MORE", CardModel::Unknown)).is_none());
        assert!(prefs.card(&record("MAC3", CardModel::Unknown)).is_some());
    }

    #[test]
    fn test_tx_preferred_order() {
        let mut prefs = temp_prefs("txpref");
        prefs.set_tx_preferred("A");
        prefs.set_tx_preferred("B");
        assert_eq!(prefs.tx_preferred_rank("B"), 1);
        assert_eq!(prefs.tx_preferred_rank("A"), 2);
        assert_eq!(prefs.tx_preferred_rank("C"), 0);
        prefs.set_tx_preferred("A");
        assert_eq!(prefs.tx_preferred(), ["A".to_string(), "B".to_string()]);
        prefs.remove_tx_preferred("A");
        assert_eq!(prefs.tx_preferred_rank("B"), 1);
    }

    #[test]
    fn test_role_overrides() {
        let mut prefs = temp_prefs("roles");
        let r = record("AA", CardModel::Unknown);
        prefs.set_rx_only(&r, true);
        assert!(prefs.is_rx_only("AA"));
        assert!(!prefs.is_tx_only("AA"));
        prefs.set_tx_only(&r, true);
        assert!(prefs.is_tx_only("AA"));
        assert!(!prefs.is_rx_only("AA"));
        prefs.set_disabled(&r, true);
        assert!(prefs.is_disabled("AA"));
        assert!(!prefs.is_disabled("BB"));
    }

    #[test]
    fn test_name_or_model() {
        let mut prefs = temp_prefs("names");
        let r = record("AA", CardModel::Awus036ach);
        assert_eq!(prefs.name_or_model(&r), CardModel::Awus036ach.name());
        prefs.set_name(&r, "Left card");
        assert_eq!(prefs.name_or_model(&r), "Left card");
        assert_eq!(prefs.name_or_model(&record("BB", CardModel::Unknown)), "Generic");
    }

    #[test]
    fn test_parse_rejects_bad_stamp_and_short_sections() {
        assert!(parse_preferences("radio_ifaces_v0\n").is_err());
        assert!(parse_preferences("radio_ifaces_v1\nradio_cards_settings: 1\n").is_err());
        assert!(parse_preferences("radio_ifaces_v1\nradio_cards_settings: 0\nTX_Preferred: 2\n A\n").is_err());
    }

    #[test]
    fn test_parse_keeps_input_section() {
        let text = "radio_ifaces_v1\nradio_cards_settings: 0\nTX_Preferred: 0\nInput_Interfaces: 1\nkbd 1 2\n";
        let (_, _, input) = parse_preferences(text).unwrap();
        assert_eq!(input, "Input_Interfaces: 1\nkbd 1 2\n");
    }
}
