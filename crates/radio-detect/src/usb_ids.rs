//! USB identification for serial bridges and Wi-Fi radio cards
//!
//! Serial bridges are matched by vendor ID to flag the CH340 family, which
//! cannot drive telemetry radios reliably. Wi-Fi cards are matched by `vid:pid`
//! substrings to a known [`CardModel`], and USB bus paths are turned into
//! short ordering tokens.

use radio_core::CardModel;

/// WCH CH340/CH341 vendor id
pub const CH340_VID: u16 = 0x1A86;

/// CH340 bridges drop bytes at telemetry rates and are marked unsupported
pub fn is_incompatible_serial_adapter(vid: Option<u16>, description: Option<&str>) -> bool {
    if vid == Some(CH340_VID) {
        return true;
    }
    description.is_some_and(|d| d.contains("340"))
}

/// Product id substrings of known Wi-Fi cards, matched in order
const CARD_PRODUCT_IDS: &[(&str, CardModel)] = &[
    ("cf3:9271", CardModel::Tplink722n),
    ("148f:3070", CardModel::Awus036nh),
    ("b05:17d2", CardModel::AsusAc56),
    ("846:9052", CardModel::NetgearA6100),
    ("bda:881a", CardModel::Rtl8812auDualAntenna),
    ("bda:8812", CardModel::Awus036ach),
    ("bda:8811", CardModel::Awus036acs),
    ("bda:0811", CardModel::Awus036acs),
    ("bda:811", CardModel::Awus036acs),
    ("2604:12", CardModel::TendaU12),
    ("2604:0012", CardModel::TendaU12),
    ("2357:120", CardModel::ArcherT2uPlus),
    ("2357:0120", CardModel::ArcherT2uPlus),
    ("bda:8813", CardModel::Rtl8814au),
    ("bda:a81a", CardModel::Blue8812eu),
];

/// Card model for a USB product id such as `0bda:8812` or `0BDA/8812`
pub fn card_model_for_product_id(product_id: &str) -> Option<CardModel> {
    let normalized = product_id.to_lowercase().replace('/', ":");
    CARD_PRODUCT_IDS
        .iter()
        .find(|(pattern, _)| normalized.contains(pattern))
        .map(|(_, model)| *model)
}

/// Maximum length of a USB port token
pub const USB_PORT_TOKEN_MAX: usize = 5;

/// Derive an ordering token from a sysfs USB bus path
///
/// `1-3:1.0` (device on root port 3) becomes `C`; `1-1.2.3:1.0` (hub on
/// port 1, device on hub port 2, then port 3) becomes `B3`. The letter is
/// the hub position and the digits the downstream port chain.
pub fn usb_port_token(bus_path: &str) -> Option<String> {
    let device = bus_path.split(':').next()?;
    let (_, chain) = device.rsplit_once('-')?;
    if chain.is_empty() {
        return None;
    }

    if !chain.contains('.') {
        let n: u32 = chain.parse().ok()?;
        return port_letter(n).map(String::from);
    }

    let (_, downstream) = chain.split_once('.')?;
    let mut chars = downstream.chars();
    let letter = port_letter(chars.next()?.to_digit(10)?)?;
    // skip the separator after the hub position
    chars.next();
    let mut token = String::from(letter);
    token.extend(chars.take(USB_PORT_TOKEN_MAX - 1));
    Some(token)
}

fn port_letter(n: u32) -> Option<char> {
    if (1..=26).contains(&n) {
        char::from_u32('A' as u32 + n - 1)
    } else {
        None
    }
}

/// Fallback token when topology is unknown
pub fn fallback_port_token(position: usize) -> String {
    format!("X{}", position + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incompatible_adapters() {
        assert!(is_incompatible_serial_adapter(Some(CH340_VID), None));
        assert!(is_incompatible_serial_adapter(None, Some("USB2.0-Serial CH340")));
        assert!(!is_incompatible_serial_adapter(Some(0x10C4), Some("CP2102")));
        assert!(!is_incompatible_serial_adapter(Some(0x0403), None));
        assert!(!is_incompatible_serial_adapter(None, None));
    }

    #[test]
    fn test_card_models_by_product_id() {
        assert_eq!(card_model_for_product_id("0bda:8812"), Some(CardModel::Awus036ach));
        assert_eq!(card_model_for_product_id("0BDA/881A"), Some(CardModel::Rtl8812auDualAntenna));
        assert_eq!(card_model_for_product_id("0bda:0811"), Some(CardModel::Awus036acs));
        assert_eq!(card_model_for_product_id("2604:0012"), Some(CardModel::TendaU12));
        assert_eq!(card_model_for_product_id("0bda:a81a"), Some(CardModel::Blue8812eu));
        assert_eq!(card_model_for_product_id("0cf3:9271"), Some(CardModel::Tplink722n));
        assert_eq!(card_model_for_product_id("dead:beef"), None);
    }

    #[test]
    fn test_usb_port_tokens() {
        assert_eq!(usb_port_token("1-3:1.0").as_deref(), Some("C"));
        assert_eq!(usb_port_token("1-1.2:1.0").as_deref(), Some("B"));
        assert_eq!(usb_port_token("1-1.2.3:1.0").as_deref(), Some("B3"));
        assert_eq!(usb_port_token("1-1.4.3.2.1:1.0").as_deref(), Some("D3.2."));
        assert_eq!(usb_port_token("usb1"), None);
        assert_eq!(usb_port_token("1-"), None);
        assert_eq!(usb_port_token("1-1.x"), None);
    }

    #[test]
    fn test_fallback_tokens_preserve_order() {
        assert_eq!(fallback_port_token(0), "X1");
        assert!(fallback_port_token(1) < fallback_port_token(2));
    }
}
