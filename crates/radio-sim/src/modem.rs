//! Virtual SiK modem for testing
//!
//! This module provides a simulated SiK telemetry modem that answers the
//! AT command set over a byte stream: the escape sequence, `ATI`, register
//! queries and writes, `AT&W`, `ATZ` and `ATO`. Every command line is
//! echoed back before its response, like the real firmware does.

use radio_core::at::{self, AtCommand};
use radio_core::sik::{decode_serial_speed, param};
use radio_core::{SikParameterTable, MAX_RADIO_HW_PARAMS};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Configuration for creating a virtual modem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualSikConfig {
    /// `ATI` banner
    pub description: String,
    /// Answers to `ATI1` through `ATI4`
    pub info: [String; 4],
    /// Initial register values
    pub params: SikParameterTable,
    /// Never acknowledge the escape sequence
    pub silent: bool,
    /// Swallow register writes without echo or answer
    #[serde(default)]
    pub drop_writes: bool,
}

impl Default for VirtualSikConfig {
    fn default() -> Self {
        let mut params = SikParameterTable::new();
        for (index, value) in [
            (param::FORMAT, 26),
            (param::SERIAL_SPEED, 57),
            (param::AIR_SPEED, 64),
            (param::NET_ID, 25),
            (param::TX_POWER, 20),
            (param::ECC, 0),
            (6, 1),
            (7, 0),
            (param::MIN_FREQ, 915_000),
            (param::MAX_FREQ, 928_000),
            (param::NUM_CHANNELS, 50),
            (param::DUTY_CYCLE, 100),
            (param::LBT_RSSI, 0),
            (param::MANCHESTER, 0),
            (14, 0),
            (param::MAX_WINDOW, 131),
        ] {
            params.set(index, value);
        }
        Self {
            description: "SiK 2.2 on HM-TRP".to_string(),
            info: [
                "SiK2.2".to_string(),
                "78".to_string(),
                "915".to_string(),
                "0".to_string(),
            ],
            params,
            silent: false,
            drop_writes: false,
        }
    }
}

/// Virtual SiK modem
///
/// Feed it the bytes a host writes with [`VirtualSikModem::process_bytes`]
/// and send back what it returns.
#[derive(Debug, Clone)]
pub struct VirtualSikModem {
    description: String,
    info: [String; 4],
    params: SikParameterTable,
    silent: bool,
    drop_writes: bool,
    command_mode: bool,
    line: Vec<u8>,
    /// Accepted `ATSn=` writes (for test verification)
    param_writes: usize,
    flash_writes: usize,
    reboots: usize,
}

impl Default for VirtualSikModem {
    fn default() -> Self {
        Self::from_config(VirtualSikConfig::default())
    }
}

impl VirtualSikModem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: VirtualSikConfig) -> Self {
        Self {
            description: config.description,
            info: config.info,
            params: config.params,
            silent: config.silent,
            drop_writes: config.drop_writes,
            command_mode: false,
            line: Vec::new(),
            param_writes: 0,
            flash_writes: 0,
            reboots: 0,
        }
    }

    pub fn params(&self) -> &SikParameterTable {
        &self.params
    }

    pub fn set_param(&mut self, index: usize, value: u32) {
        self.params.set(index, value);
    }

    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn set_drop_writes(&mut self, drop_writes: bool) {
        self.drop_writes = drop_writes;
    }

    pub fn in_command_mode(&self) -> bool {
        self.command_mode
    }

    pub fn param_writes(&self) -> usize {
        self.param_writes
    }

    pub fn flash_writes(&self) -> usize {
        self.flash_writes
    }

    pub fn reboots(&self) -> usize {
        self.reboots
    }

    /// Serial speed the modem listens on
    pub fn serial_speed(&self) -> u32 {
        decode_serial_speed(self.params[param::SERIAL_SPEED])
    }

    /// Consume host bytes and return the modem's output
    pub fn process_bytes(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &byte in data {
            if self.silent {
                continue;
            }
            match byte {
                b'\r' => {
                    let line = String::from_utf8_lossy(&self.line).into_owned();
                    self.line.clear();
                    if self.command_mode {
                        self.respond(line.trim(), &mut out);
                    }
                }
                b'\n' => {}
                _ => {
                    self.line.push(byte);
                    if self.line.ends_with(at::ESCAPE_SEQUENCE) {
                        self.line.clear();
                        self.command_mode = true;
                        debug!("Virtual SiK modem entered command mode");
                        out.extend_from_slice(b"OK\r\n");
                    } else if !self.command_mode && self.line.len() > 64 {
                        // air data; only the escape tail matters
                        let keep = self.line.len() - 2;
                        self.line.drain(..keep);
                    }
                }
            }
        }
        out
    }

    fn respond(&mut self, line: &str, out: &mut Vec<u8>) {
        trace!("Virtual SiK modem received '{}'", line);
        let command = AtCommand::parse(line);
        if self.drop_writes && matches!(command, Some(AtCommand::SetParam(..))) {
            return;
        }
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");

        let answer = match command {
            Some(AtCommand::Identify(0)) => Some(self.description.clone()),
            Some(AtCommand::Identify(n)) => Some(
                self.info
                    .get(n as usize - 1)
                    .cloned()
                    .unwrap_or_else(|| "ERROR".to_string()),
            ),
            Some(AtCommand::QueryParam(index)) => Some(match self.params.get(index) {
                Some(value) => value.to_string(),
                None if index < MAX_RADIO_HW_PARAMS => "0".to_string(),
                None => "ERROR".to_string(),
            }),
            Some(AtCommand::SetParam(index, value)) => {
                if self.params.set(index, value) {
                    self.param_writes += 1;
                    Some("OK".to_string())
                } else {
                    Some("ERROR".to_string())
                }
            }
            Some(AtCommand::WriteFlash) => {
                self.flash_writes += 1;
                Some("OK".to_string())
            }
            Some(AtCommand::Reboot) => {
                self.reboots += 1;
                self.command_mode = false;
                None
            }
            Some(AtCommand::ExitCommandMode) => {
                self.command_mode = false;
                None
            }
            Some(AtCommand::EnterCommandMode) => Some("OK".to_string()),
            None => Some("ERROR".to_string()),
        };

        if let Some(answer) = answer {
            out.extend_from_slice(answer.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enter(modem: &mut VirtualSikModem) {
        assert_eq!(modem.process_bytes(b"+++"), b"OK\r\n");
    }

    #[test]
    fn test_ignores_commands_outside_command_mode() {
        let mut modem = VirtualSikModem::new();
        assert!(modem.process_bytes(b"ATI\r").is_empty());
        assert!(!modem.in_command_mode());
    }

    #[test]
    fn test_echo_then_answer() {
        let mut modem = VirtualSikModem::new();
        enter(&mut modem);
        assert_eq!(modem.process_bytes(b"ATS8?\r"), b"ATS8?\r\n915000\r\n");
        assert_eq!(modem.process_bytes(b"ATI\r"), b"ATI\r\nSiK 2.2 on HM-TRP\r\n");
        assert_eq!(modem.process_bytes(b"ATI3\r"), b"ATI3\r\n915\r\n");
    }

    #[test]
    fn test_set_param_and_flash() {
        let mut modem = VirtualSikModem::new();
        enter(&mut modem);
        assert_eq!(modem.process_bytes(b"ATS3=27\r"), b"ATS3=27\r\nOK\r\n");
        assert_eq!(modem.process_bytes(b"ATS16=1\r"), b"ATS16=1\r\nERROR\r\n");
        modem.process_bytes(b"AT&W\r");
        assert_eq!(modem.params()[param::NET_ID], 27);
        assert_eq!(modem.param_writes(), 1);
        assert_eq!(modem.flash_writes(), 1);
    }

    #[test]
    fn test_exit_and_reboot_only_echo() {
        let mut modem = VirtualSikModem::new();
        enter(&mut modem);
        assert_eq!(modem.process_bytes(b"ATO\r"), b"ATO\r\n");
        assert!(!modem.in_command_mode());
        enter(&mut modem);
        assert_eq!(modem.process_bytes(b"ATZ\r"), b"ATZ\r\n");
        assert!(!modem.in_command_mode());
        assert_eq!(modem.reboots(), 1);
    }

    #[test]
    fn test_silent_modem_never_answers() {
        let mut modem = VirtualSikModem::from_config(VirtualSikConfig {
            silent: true,
            ..Default::default()
        });
        assert!(modem.process_bytes(b"+++").is_empty());
        assert!(!modem.in_command_mode());
    }

    #[test]
    fn test_escape_after_air_data() {
        let mut modem = VirtualSikModem::new();
        let mut data = vec![b'x'; 200];
        data.extend_from_slice(b"+++");
        assert_eq!(modem.process_bytes(&data), b"OK\r\n");
    }

    #[test]
    fn test_default_serial_speed() {
        assert_eq!(VirtualSikModem::new().serial_speed(), 57_600);
    }

    #[test]
    fn test_dropped_writes_get_no_answer() {
        let mut modem = VirtualSikModem::new();
        modem.set_drop_writes(true);
        enter(&mut modem);
        assert!(modem.process_bytes(b"ATS3=27\r").is_empty());
        assert_eq!(modem.params()[param::NET_ID], 25);
        assert_eq!(modem.param_writes(), 0);
        assert_eq!(modem.process_bytes(b"ATS3?\r"), b"ATS3?\r\n25\r\n");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn stays_quiet_without_escape(data in prop::collection::vec(any::<u8>().prop_filter("no escape", |b| *b != b'+'), 0..512)) {
                let mut modem = VirtualSikModem::new();
                prop_assert!(modem.process_bytes(&data).is_empty());
                prop_assert!(!modem.in_command_mode());
            }

            #[test]
            fn written_register_reads_back(index in 0usize..MAX_RADIO_HW_PARAMS, value in 0u32..1_000_000) {
                let mut modem = VirtualSikModem::new();
                enter(&mut modem);
                let write = format!("ATS{}={}\r", index, value);
                let expected = format!("ATS{}={}\r\nOK\r\n", index, value);
                prop_assert_eq!(modem.process_bytes(write.as_bytes()), expected.into_bytes());
                let query = format!("ATS{}?\r", index);
                let expected = format!("ATS{}?\r\n{}\r\n", index, value);
                prop_assert_eq!(modem.process_bytes(query.as_bytes()), expected.into_bytes());
            }

            #[test]
            fn split_writes_match_whole_write(index in 0usize..MAX_RADIO_HW_PARAMS, value in 0u32..1_000_000, cut in 0usize..16) {
                let command = format!("+++ATS{}={}\rATS{}?\r", index, value, index);
                let bytes = command.as_bytes();
                let cut = cut.min(bytes.len());

                let mut whole = VirtualSikModem::new();
                let expected = whole.process_bytes(bytes);

                let mut split = VirtualSikModem::new();
                let mut out = split.process_bytes(&bytes[..cut]);
                out.extend(split.process_bytes(&bytes[cut..]));
                prop_assert_eq!(out, expected);
                prop_assert_eq!(split.params().get(index), Some(value));
            }
        }
    }
}
