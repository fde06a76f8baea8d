//! Locations of persisted hardware state

use std::path::{Path, PathBuf};

/// Default directory for persisted radio state
pub const DEFAULT_CONFIG_DIR: &str = "/var/lib/radiolink";

/// File locations used by the registries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioPaths {
    config_dir: PathBuf,
}

impl RadioPaths {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Binary radio interface registry
    pub fn hardware_info(&self) -> PathBuf {
        self.config_dir.join("radio_hw_info.dat")
    }

    /// Last known good SiK modem records
    pub fn sik_last_known(&self) -> PathBuf {
        self.config_dir.join("sik_radios.dat")
    }

    /// Serial port registry
    pub fn serial_ports(&self) -> PathBuf {
        self.config_dir.join("serial_ports.cfg")
    }

    /// Controller interface preferences
    pub fn controller_interfaces(&self) -> PathBuf {
        self.config_dir.join("controller_interfaces.cfg")
    }

    /// Per-vehicle main connect frequencies
    pub fn connect_frequencies(&self) -> PathBuf {
        self.config_dir.join("model_connect_frequencies.cfg")
    }
}

impl Default for RadioPaths {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_DIR)
    }
}

/// Write `data` through a temporary sibling and rename it into place
pub fn write_replace(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_live_in_config_dir() {
        let paths = RadioPaths::new("/tmp/radios");
        assert_eq!(paths.hardware_info(), PathBuf::from("/tmp/radios/radio_hw_info.dat"));
        assert_eq!(paths.serial_ports().parent(), Some(Path::new("/tmp/radios")));
    }
}
