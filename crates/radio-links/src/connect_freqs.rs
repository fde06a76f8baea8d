//! Per-vehicle main connect frequency
//!
//! Remembers which frequency the controller last used to reach each vehicle,
//! one `vehicleId frequencyKhz` line per vehicle.

use std::path::{Path, PathBuf};

use radio_detect::paths::{write_replace, RadioPaths};
use tracing::{debug, warn};

use crate::error::LinkError;

/// Maximum number of remembered vehicles
pub const MAX_CONNECT_FREQUENCIES: usize = 50;

#[derive(Debug, Clone)]
pub struct ConnectFrequencies {
    path: PathBuf,
    /// Oldest entry first
    entries: Vec<(u32, u32)>,
}

impl ConnectFrequencies {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    pub fn from_paths(paths: &RadioPaths) -> Self {
        Self::new(paths.connect_frequencies())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load from disk, a missing file means no entries
    pub fn load(&mut self) -> Result<(), LinkError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.entries.clear();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace().map(str::parse::<u32>);
            match (fields.next(), fields.next()) {
                (Some(Ok(id)), Some(Ok(freq))) => entries.push((id, freq)),
                _ => {
                    warn!("Invalid connect frequency line {} in {}", n + 1, self.path.display());
                    self.entries.clear();
                    return Err(LinkError::Corrupt {
                        file: self.path.display().to_string(),
                        reason: format!("bad line {}", n + 1),
                    });
                }
            }
        }
        if entries.len() > MAX_CONNECT_FREQUENCIES {
            let excess = entries.len() - MAX_CONNECT_FREQUENCIES;
            entries.drain(..excess);
        }
        debug!("Loaded {} connect frequencies", entries.len());
        self.entries = entries;
        Ok(())
    }

    pub fn save(&self) -> Result<(), LinkError> {
        let text: String = self
            .entries
            .iter()
            .map(|(id, freq)| format!("{} {}\n", id, freq))
            .collect();
        write_replace(&self.path, text.as_bytes())?;
        Ok(())
    }

    pub fn connect_frequency(&self, vehicle_id: u32) -> Option<u32> {
        self.entries
            .iter()
            .find(|(id, _)| *id == vehicle_id)
            .map(|(_, freq)| *freq)
    }

    /// Remember the frequency for a vehicle and save
    pub fn set_connect_frequency(&mut self, vehicle_id: u32, freq_khz: u32) -> Result<(), LinkError> {
        if let Some(entry) = self.entries.iter_mut().find(|(id, _)| *id == vehicle_id) {
            entry.1 = freq_khz;
        } else {
            if self.entries.len() >= MAX_CONNECT_FREQUENCIES {
                let (dropped, _) = self.entries.remove(0);
                debug!("Connect frequencies full, forgetting vehicle {}", dropped);
            }
            self.entries.push((vehicle_id, freq_khz));
        }
        self.save()
    }

    /// Forget vehicles not in `known_ids`, saving if anything changed
    pub fn prune(&mut self, known_ids: &[u32]) -> Result<usize, LinkError> {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| known_ids.contains(id));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> ConnectFrequencies {
        let dir = std::env::temp_dir().join(format!("radio-links-connect-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        ConnectFrequencies::new(dir.join("connect_frequencies.txt"))
    }

    #[test]
    fn test_set_and_reload() {
        let mut store = temp_store("reload");
        store.set_connect_frequency(1001, 5_805_000).unwrap();
        store.set_connect_frequency(1002, 2_472_000).unwrap();
        store.set_connect_frequency(1001, 5_745_000).unwrap();

        let mut loaded = ConnectFrequencies::new(store.path());
        loaded.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.connect_frequency(1001), Some(5_745_000));
        assert_eq!(loaded.connect_frequency(1002), Some(2_472_000));
        assert_eq!(loaded.connect_frequency(7), None);
    }

    #[test]
    fn test_oldest_dropped_at_capacity() {
        let mut store = temp_store("capacity");
        for id in 0..MAX_CONNECT_FREQUENCIES as u32 {
            store.set_connect_frequency(id, 5_805_000).unwrap();
        }
        store.set_connect_frequency(999, 2_472_000).unwrap();
        assert_eq!(store.len(), MAX_CONNECT_FREQUENCIES);
        assert_eq!(store.connect_frequency(0), None);
        assert_eq!(store.connect_frequency(1), Some(5_805_000));
        assert_eq!(store.connect_frequency(999), Some(2_472_000));
    }

    #[test]
    fn test_prune() {
        let mut store = temp_store("prune");
        store.set_connect_frequency(1, 5_805_000).unwrap();
        store.set_connect_frequency(2, 5_805_000).unwrap();
        assert_eq!(store.prune(&[2, 3]).unwrap(), 1);
        assert_eq!(store.connect_frequency(1), None);
        assert_eq!(store.connect_frequency(2), Some(5_805_000));
    }

    #[test]
    fn test_missing_and_bad_file() {
        let mut store = temp_store("bad");
        store.load().unwrap();
        assert!(store.is_empty());

        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "12 5805000\nbogus\n").unwrap();
        assert!(matches!(store.load(), Err(LinkError::Corrupt { .. })));
        assert!(store.is_empty());
    }
}
