//! Controller link assignment
//!
//! Decides which local interfaces receive and transmit for each of the
//! vehicle's radio links. Every function here is pure over the registry
//! records and the controller preferences, the result is a
//! [`LinkAssignmentPlan`] that [`apply_plan`] later pushes into a
//! [`RadioContext`].
//!
//! Interfaces are always visited in registry order, which the registry keeps
//! sorted by USB port token, so "first found" is stable across boots.

use radio_core::bands::{
    DEFAULT_FREQUENCY_24, DEFAULT_FREQUENCY_433, DEFAULT_FREQUENCY_58, DEFAULT_FREQUENCY_868,
    DEFAULT_FREQUENCY_915,
};
use radio_core::{supported_channels, Band, CapabilityFlags, RadioInterfaceRecord, SupportedBands};
use radio_detect::RadioContext;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::prefs::ControllerPreferences;

/// One vehicle radio link as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRequest {
    pub freq_khz: u32,
    /// Capabilities an RX interface must carry. `ELRS_RADIO` marks an ELRS link.
    pub required: CapabilityFlags,
}

impl LinkRequest {
    pub fn new(freq_khz: u32) -> Self {
        Self {
            freq_khz,
            required: CapabilityFlags::empty(),
        }
    }

    pub fn with_required(mut self, flags: CapabilityFlags) -> Self {
        self.required |= flags;
        self
    }

    fn is_elrs(&self) -> bool {
        self.required.contains(CapabilityFlags::ELRS_RADIO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentOptions {
    /// Keep every TX candidate active instead of only the preferred one
    pub auto_tx: bool,
}

impl Default for AssignmentOptions {
    fn default() -> Self {
        Self { auto_tx: true }
    }
}

/// Role of one local interface in a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterfaceAssignment {
    /// Registry index
    pub index: usize,
    pub freq_khz: u32,
    pub rx: bool,
    pub tx: bool,
}

/// Result of an assignment run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkAssignmentPlan {
    pub interfaces: Vec<InterfaceAssignment>,
}

impl LinkAssignmentPlan {
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&InterfaceAssignment> {
        self.interfaces.iter().find(|a| a.index == index)
    }

    pub fn frequency_of(&self, index: usize) -> Option<u32> {
        self.get(index).map(|a| a.freq_khz)
    }

    /// RX interfaces on `freq_khz`, in registry order
    pub fn rx_indices(&self, freq_khz: u32) -> Vec<usize> {
        self.interfaces
            .iter()
            .filter(|a| a.rx && a.freq_khz == freq_khz)
            .map(|a| a.index)
            .collect()
    }

    /// TX interfaces on `freq_khz`, in registry order
    pub fn tx_indices(&self, freq_khz: u32) -> Vec<usize> {
        self.interfaces
            .iter()
            .filter(|a| a.tx && a.freq_khz == freq_khz)
            .map(|a| a.index)
            .collect()
    }

    pub fn count_rx(&self) -> usize {
        self.interfaces.iter().filter(|a| a.rx).count()
    }

    pub fn count_tx(&self) -> usize {
        self.interfaces.iter().filter(|a| a.tx).count()
    }

    fn push(&mut self, index: usize, freq_khz: u32, rx: bool, tx: bool) {
        if rx || tx {
            self.push_tuned(index, freq_khz, rx, tx);
        }
    }

    /// Record the frequency even when the interface has no role
    fn push_tuned(&mut self, index: usize, freq_khz: u32, rx: bool, tx: bool) {
        self.interfaces.push(InterfaceAssignment {
            index,
            freq_khz,
            rx,
            tx,
        });
    }
}

/// Capability flags after user overrides
fn effective_flags(record: &RadioInterfaceRecord, prefs: &ControllerPreferences) -> CapabilityFlags {
    prefs.flags(&record.mac).unwrap_or(record.capabilities)
}

fn is_usable(record: &RadioInterfaceRecord, prefs: &ControllerPreferences) -> bool {
    record.supported
        && !record.capabilities.contains(CapabilityFlags::DISABLED)
        && !effective_flags(record, prefs).contains(CapabilityFlags::DISABLED)
}

/// ELRS links only pair with ELRS radios, everything else goes by band
fn matches_link(record: &RadioInterfaceRecord, link: &LinkRequest) -> bool {
    if link.is_elrs() || record.is_elrs() {
        return link.is_elrs() && record.is_elrs();
    }
    record.supports_frequency(link.freq_khz)
}

fn can_rx(record: &RadioInterfaceRecord, link: &LinkRequest, prefs: &ControllerPreferences) -> bool {
    if !is_usable(record, prefs) || !matches_link(record, link) {
        return false;
    }
    let flags = effective_flags(record, prefs);
    let mut needed = link.required;
    needed.remove(CapabilityFlags::ELRS_RADIO);
    flags.contains(CapabilityFlags::CAN_RX) && flags.contains(needed)
}

fn can_tx(record: &RadioInterfaceRecord, link: &LinkRequest, prefs: &ControllerPreferences) -> bool {
    if !is_usable(record, prefs) || !matches_link(record, link) || !record.tx_capable {
        return false;
    }
    effective_flags(record, prefs).contains(CapabilityFlags::CAN_TX | CapabilityFlags::DATA)
}

/// Most preferred TX candidate: lowest listed rank, unlisted last, first found on ties
fn most_preferred(candidates: &[usize], records: &[RadioInterfaceRecord], prefs: &ControllerPreferences) -> Option<usize> {
    candidates.iter().copied().min_by_key(|&i| {
        match records.get(i).map(|r| prefs.tx_preferred_rank(&r.mac)) {
            Some(rank) if rank > 0 => rank,
            _ => usize::MAX,
        }
    })
}

fn narrow_tx(tx: Vec<usize>, records: &[RadioInterfaceRecord], prefs: &ControllerPreferences) -> Vec<usize> {
    most_preferred(&tx, records, prefs).into_iter().collect()
}

/// Assign interfaces for a vehicle with one active radio link
pub fn assign_single(
    records: &[RadioInterfaceRecord],
    prefs: &ControllerPreferences,
    link: LinkRequest,
    options: AssignmentOptions,
) -> Result<LinkAssignmentPlan, LinkError> {
    info!("Assigning interfaces to a single link on {} kHz", link.freq_khz);

    let rx: Vec<usize> = (0..records.len())
        .filter(|&i| can_rx(&records[i], &link, prefs))
        .collect();
    let mut tx: Vec<usize> = (0..records.len())
        .filter(|&i| can_tx(&records[i], &link, prefs))
        .collect();

    if rx.is_empty() {
        warn!("No interface can receive on {} kHz", link.freq_khz);
        return Err(LinkError::NoRxInterface { freq_khz: link.freq_khz });
    }
    if tx.is_empty() {
        warn!("No interface can transmit on {} kHz", link.freq_khz);
        return Err(LinkError::NoTxInterface { freq_khz: link.freq_khz });
    }
    if !options.auto_tx {
        tx = narrow_tx(tx, records, prefs);
    }

    let mut plan = LinkAssignmentPlan::default();
    for i in 0..records.len() {
        plan.push(i, link.freq_khz, rx.contains(&i), tx.contains(&i));
    }
    debug!("Single link plan: RX {:?}, TX {:?}", rx, tx);
    Ok(plan)
}

/// Assign interfaces for a vehicle with two active radio links
///
/// Every usable interface is tuned to exactly one of the two frequencies.
/// Interfaces that can only serve one are placed first, then the ones that
/// can serve both fill whichever link still misses an RX or TX role, then
/// balance. An interface serving neither is parked on the second frequency
/// without a role.
pub fn assign_dual(
    records: &[RadioInterfaceRecord],
    prefs: &ControllerPreferences,
    links: [LinkRequest; 2],
    options: AssignmentOptions,
) -> Result<LinkAssignmentPlan, LinkError> {
    info!(
        "Assigning interfaces to two links on {} kHz and {} kHz",
        links[0].freq_khz, links[1].freq_khz
    );

    let serves = |i: usize, k: usize| can_rx(&records[i], &links[k], prefs) || can_tx(&records[i], &links[k], prefs);

    let mut owner: Vec<Option<usize>> = vec![None; records.len()];
    let mut ambiguous = Vec::new();
    for i in 0..records.len() {
        match (serves(i, 0), serves(i, 1)) {
            (true, false) => owner[i] = Some(0),
            (false, true) => owner[i] = Some(1),
            (true, true) => ambiguous.push(i),
            (false, false) if is_usable(&records[i], prefs) => {
                debug!("Interface {} serves neither link, parked on {} kHz", i, links[1].freq_khz);
                owner[i] = Some(1);
            }
            (false, false) => {}
        }
    }

    let count_on = |owner: &[Option<usize>], k: usize, role: &dyn Fn(usize) -> bool| {
        owner
            .iter()
            .enumerate()
            .filter(|(i, o)| **o == Some(k) && role(*i))
            .count()
    };

    for i in ambiguous {
        let needs = |k: usize| {
            let rx_missing = count_on(&owner, k, &|j| can_rx(&records[j], &links[k], prefs)) == 0;
            let tx_missing = count_on(&owner, k, &|j| can_tx(&records[j], &links[k], prefs)) == 0;
            (rx_missing && can_rx(&records[i], &links[k], prefs)) || (tx_missing && can_tx(&records[i], &links[k], prefs))
        };
        let k = if needs(0) {
            0
        } else if needs(1) {
            1
        } else {
            let load0 = count_on(&owner, 0, &|_| true);
            let load1 = count_on(&owner, 1, &|_| true);
            usize::from(load1 < load0)
        };
        debug!("Interface {} serves both links, placed on {} kHz", i, links[k].freq_khz);
        owner[i] = Some(k);
    }

    let mut plan = LinkAssignmentPlan::default();
    for (k, link) in links.iter().enumerate() {
        let rx: Vec<usize> = (0..records.len())
            .filter(|&i| owner[i] == Some(k) && can_rx(&records[i], link, prefs))
            .collect();
        let mut tx: Vec<usize> = (0..records.len())
            .filter(|&i| owner[i] == Some(k) && can_tx(&records[i], link, prefs))
            .collect();
        if rx.is_empty() {
            warn!("No interface left to receive on {} kHz", link.freq_khz);
            return Err(LinkError::NoRxInterface { freq_khz: link.freq_khz });
        }
        if tx.is_empty() {
            warn!("No interface left to transmit on {} kHz", link.freq_khz);
            return Err(LinkError::NoTxInterface { freq_khz: link.freq_khz });
        }
        if !options.auto_tx {
            tx = narrow_tx(tx, records, prefs);
        }
        debug!("Link {} kHz: RX {:?}, TX {:?}", link.freq_khz, rx, tx);
        for i in 0..records.len() {
            if owner[i] == Some(k) {
                plan.push_tuned(i, link.freq_khz, rx.contains(&i), tx.contains(&i));
            }
        }
    }
    plan.interfaces.sort_by_key(|a| a.index);
    Ok(plan)
}

/// Listen for a vehicle on a known frequency, no TX
pub fn assign_search(
    records: &[RadioInterfaceRecord],
    prefs: &ControllerPreferences,
    freq_khz: u32,
) -> Result<LinkAssignmentPlan, LinkError> {
    info!("Assigning interfaces to search on {} kHz", freq_khz);
    let link = LinkRequest::new(freq_khz);
    let mut plan = LinkAssignmentPlan::default();
    for (i, record) in records.iter().enumerate() {
        plan.push(i, freq_khz, can_rx(record, &link, prefs), false);
    }
    if plan.is_empty() {
        warn!("No interface can search on {} kHz", freq_khz);
        return Err(LinkError::NoRxInterface { freq_khz });
    }
    Ok(plan)
}

/// Frequency an interface starts on before any vehicle is known
pub fn default_frequency(bands: SupportedBands) -> Option<u32> {
    if bands.contains(Band::Ghz24) {
        return Some(DEFAULT_FREQUENCY_24);
    }
    if bands.contains(Band::Ghz58) {
        return Some(DEFAULT_FREQUENCY_58);
    }
    let narrow = [
        (Band::Mhz433, DEFAULT_FREQUENCY_433),
        (Band::Mhz868, DEFAULT_FREQUENCY_868),
        (Band::Mhz915, DEFAULT_FREQUENCY_915),
    ];
    narrow
        .iter()
        .find(|(band, _)| bands.contains(*band))
        .map(|(_, freq)| *freq)
        .or_else(|| supported_channels(bands, false).first().copied())
}

/// Assign interfaces for pairing with a vehicle not seen before
///
/// Each interface goes to its own default frequency. TX is narrowed to the
/// single most preferred candidate.
pub fn assign_first_pairing(
    records: &[RadioInterfaceRecord],
    prefs: &ControllerPreferences,
) -> Result<LinkAssignmentPlan, LinkError> {
    info!("Assigning interfaces for first pairing");

    let mut freqs = vec![0u32; records.len()];
    let mut rx = Vec::new();
    let mut tx = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let Some(freq) = default_frequency(record.supported_bands) else {
            debug!("Interface {} has no usable band", i);
            continue;
        };
        let link = LinkRequest::new(freq);
        freqs[i] = freq;
        if can_rx(record, &link, prefs) {
            rx.push(i);
        }
        if can_tx(record, &link, prefs) {
            tx.push(i);
        }
    }

    if rx.is_empty() && tx.is_empty() {
        warn!("No usable interface for pairing");
        return Err(LinkError::NoUsableInterface);
    }
    if let Some(&first) = rx.first() {
        if tx.is_empty() {
            return Err(LinkError::NoTxInterface { freq_khz: freqs[first] });
        }
    } else if let Some(&first) = tx.first() {
        return Err(LinkError::NoRxInterface { freq_khz: freqs[first] });
    }
    let tx = narrow_tx(tx, records, prefs);

    let mut plan = LinkAssignmentPlan::default();
    for (i, &freq) in freqs.iter().enumerate() {
        plan.push(i, freq, rx.contains(&i), tx.contains(&i));
    }
    debug!("Pairing plan: RX {:?}, TX {:?}", rx, tx);
    Ok(plan)
}

/// Tune and open interfaces as the plan says
///
/// Returns the number of interfaces whose frequency was applied. Interfaces
/// not in the plan are left closed.
pub fn apply_plan(radios: &mut RadioContext, plan: &LinkAssignmentPlan) -> usize {
    let mut applied = 0;
    for index in 0..radios.len() {
        let assignment = plan.get(index).copied();
        if let Some(a) = assignment {
            match radios.set_frequency(index, a.freq_khz) {
                Ok(()) => applied += 1,
                Err(e) => warn!("Interface {}: failed to tune to {} kHz: {}", index, a.freq_khz, e),
            }
        }
        if let Some(record) = radios.get_mut(index) {
            record.opened_for_read = assignment.is_some_and(|a| a.rx);
            record.opened_for_write = assignment.is_some_and(|a| a.tx);
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> ControllerPreferences {
        let dir = std::env::temp_dir().join(format!("radio-links-assign-{}", std::process::id()));
        ControllerPreferences::new(dir.join("unused.cfg"))
    }

    fn card(mac: &str, bands: SupportedBands) -> RadioInterfaceRecord {
        RadioInterfaceRecord {
            mac: mac.to_string(),
            supported: true,
            tx_capable: true,
            supported_bands: bands,
            capabilities: CapabilityFlags::default_for_card(false),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_frequency() {
        assert_eq!(default_frequency(Band::Ghz24.into()), Some(DEFAULT_FREQUENCY_24));
        assert_eq!(
            default_frequency(SupportedBands::from(Band::Ghz58).with(Band::Ghz24)),
            Some(DEFAULT_FREQUENCY_24)
        );
        assert_eq!(default_frequency(Band::Ghz58.into()), Some(DEFAULT_FREQUENCY_58));
        assert_eq!(default_frequency(Band::Mhz868.into()), Some(DEFAULT_FREQUENCY_868));
        assert_eq!(default_frequency(Band::Ghz23.into()), Some(2_312_000));
        assert_eq!(default_frequency(SupportedBands::empty()), None);
    }

    #[test]
    fn test_unsupported_or_disabled_are_skipped() {
        let mut disabled = card("B", Band::Ghz58.into());
        disabled.capabilities.insert(CapabilityFlags::DISABLED);
        let mut unsupported = card("C", Band::Ghz58.into());
        unsupported.supported = false;
        let records = vec![card("A", Band::Ghz58.into()), disabled, unsupported];

        let plan = assign_single(&records, &prefs(), LinkRequest::new(5_805_000), AssignmentOptions::default()).unwrap();
        assert_eq!(plan.rx_indices(5_805_000), vec![0]);
        assert_eq!(plan.tx_indices(5_805_000), vec![0]);
    }

    #[test]
    fn test_not_tx_capable_is_rx_only() {
        let mut rx_only = card("A", Band::Ghz58.into());
        rx_only.tx_capable = false;
        let records = vec![rx_only, card("B", Band::Ghz58.into())];
        let plan = assign_single(&records, &prefs(), LinkRequest::new(5_805_000), AssignmentOptions::default()).unwrap();
        assert_eq!(plan.rx_indices(5_805_000), vec![0, 1]);
        assert_eq!(plan.tx_indices(5_805_000), vec![1]);
    }

    #[test]
    fn test_required_flags_filter_rx() {
        let mut no_video = card("A", Band::Ghz58.into());
        no_video.capabilities.remove(CapabilityFlags::VIDEO);
        let records = vec![no_video, card("B", Band::Ghz58.into())];
        let link = LinkRequest::new(5_805_000).with_required(CapabilityFlags::VIDEO);
        let plan = assign_single(&records, &prefs(), link, AssignmentOptions::default()).unwrap();
        assert_eq!(plan.rx_indices(5_805_000), vec![1]);
    }

    #[test]
    fn test_elrs_matches_only_elrs_links() {
        let elrs = RadioInterfaceRecord {
            card_model: radio_core::CardModel::Elrs,
            capabilities: CapabilityFlags::DATA | CapabilityFlags::CAN_RX | CapabilityFlags::CAN_TX,
            ..card("ELRSUSB1", Band::Ghz24.into())
        };
        let wifi = card("A", Band::Ghz24.into());
        let elrs_link = LinkRequest::new(2_400_000).with_required(CapabilityFlags::ELRS_RADIO);
        let plain = LinkRequest::new(2_472_000);

        assert!(can_rx(&elrs, &elrs_link, &prefs()));
        assert!(!can_rx(&wifi, &elrs_link, &prefs()));
        assert!(!can_rx(&elrs, &plain, &prefs()));
        assert!(can_rx(&wifi, &plain, &prefs()));
    }

    #[test]
    fn test_search_never_transmits() {
        let records = vec![card("A", Band::Ghz58.into()), card("B", Band::Ghz24.into())];
        let plan = assign_search(&records, &prefs(), 5_805_000).unwrap();
        assert_eq!(plan.rx_indices(5_805_000), vec![0]);
        assert_eq!(plan.count_tx(), 0);
        assert!(matches!(
            assign_search(&records, &prefs(), 915_000),
            Err(LinkError::NoRxInterface { freq_khz: 915_000 })
        ));
    }
}
