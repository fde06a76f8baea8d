//! SiK modem AT-command session
//!
//! A [`SikModem`] owns one serial byte stream for the duration of a
//! configuration exchange. Every exchange is strictly sequential: a command
//! is only written after the previous response arrived or its deadline
//! passed. Nothing here persists state across sessions.

use std::time::Duration;

use radio_core::at::{self, AtCommand};
use radio_core::sik::param;
use radio_core::{SikParameterTable, MAX_RADIO_HW_PARAMS};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::DetectError;
use crate::scanner::SERIAL_SPEEDS;

/// Timing configuration for SiK sessions
#[derive(Debug, Clone)]
pub struct SikConfig {
    /// Window for draining stale input before the escape sequence
    pub flush_window: Duration,
    /// Deadline for `OK` after the escape sequence
    pub command_mode_timeout: Duration,
    /// Deadline for each command response
    pub response_timeout: Duration,
    /// Command-mode attempts when writing a frequency plan
    pub write_retries: u32,
    /// Baud rates the platform can open
    pub platform_speeds: Vec<u32>,
    /// Query `ATI1..ATI4` to build a stable identity
    pub read_identity: bool,
}

impl Default for SikConfig {
    fn default() -> Self {
        Self {
            flush_window: Duration::from_millis(100),
            command_mode_timeout: Duration::from_millis(3000),
            response_timeout: Duration::from_millis(2000),
            write_retries: 3,
            platform_speeds: SERIAL_SPEEDS.to_vec(),
            read_identity: true,
        }
    }
}

/// Opens serial device paths as async byte streams
pub trait PortOpener {
    type Port: AsyncRead + AsyncWrite + Unpin;

    fn open(&self, path: &str, baud: u32) -> Result<Self::Port, DetectError>;
}

/// Opens real serial ports through tokio-serial
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    type Port = tokio_serial::SerialStream;

    fn open(&self, path: &str, baud: u32) -> Result<Self::Port, DetectError> {
        use tokio_serial::SerialPortBuilderExt;

        tokio_serial::new(path, baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| DetectError::OpenFailed {
                port: path.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Everything read from a modem in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SikReadout {
    /// `ATI` banner
    pub description: String,
    /// `ATI1..ATI4` joined with the band, if requested
    pub identity: Option<String>,
    pub params: SikParameterTable,
    /// Firmware predates SiK 2.2
    pub firmware_old: bool,
}

/// An AT-command session over an exclusively owned stream
pub struct SikModem<S> {
    stream: S,
    port: String,
    config: SikConfig,
}

impl<S> SikModem<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, port: impl Into<String>, config: SikConfig) -> Self {
        Self {
            stream,
            port: port.into(),
            config,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn io_error(&self, e: std::io::Error) -> DetectError {
        DetectError::IoError {
            port: self.port.clone(),
            reason: e.to_string(),
        }
    }

    fn timeout_error(&self, operation: impl Into<String>) -> DetectError {
        DetectError::Timeout {
            port: self.port.clone(),
            operation: operation.into(),
        }
    }

    /// Drain bytes already pending on the port
    async fn flush_input(&mut self) {
        let deadline = Instant::now() + self.config.flush_window;
        let mut buf = [0u8; 256];
        let mut dropped = 0usize;
        loop {
            match timeout_at(deadline, self.stream.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => dropped += n,
                _ => break,
            }
        }
        if dropped > 0 {
            debug!("Discarded {} stale byte(s) on {}", dropped, self.port);
        }
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), DetectError> {
        self.stream.write_all(bytes).await.map_err(|e| self.io_error(e))?;
        self.stream.flush().await.map_err(|e| self.io_error(e))
    }

    /// Send the escape sequence and wait for `OK`
    pub async fn enter_command_mode(&mut self) -> Result<(), DetectError> {
        self.flush_input().await;
        trace!("Sending escape sequence on {}", self.port);
        self.write_bytes(at::ESCAPE_SEQUENCE).await?;

        let deadline = Instant::now() + self.config.command_mode_timeout;
        let mut response = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match timeout_at(deadline, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    warn!("Port {} closed while entering command mode", self.port);
                    return Err(self.io_error(std::io::ErrorKind::UnexpectedEof.into()));
                }
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buf[..n]);
                    if at::contains_ok(&response) {
                        debug!("Entered command mode on {}", self.port);
                        return Ok(());
                    }
                }
                Ok(Err(e)) => {
                    warn!("Read error on {} entering command mode: {}", self.port, e);
                    return Err(self.io_error(e));
                }
                Err(_) => {
                    warn!(
                        "No OK from {} after escape sequence ({} byte(s) received)",
                        self.port,
                        response.len()
                    );
                    return Err(self.timeout_error("command mode"));
                }
            }
        }
    }

    /// Send one command and return the canonical last response line
    ///
    /// `ATZ` gets no response and returns an empty string.
    pub async fn send_command(&mut self, cmd: AtCommand) -> Result<String, DetectError> {
        trace!("Sending {} on {}", cmd, self.port);
        self.write_bytes(&cmd.encode()).await?;
        if !cmd.expects_response() {
            return Ok(String::new());
        }

        let wanted = cmd.expected_lines();
        let deadline = Instant::now() + self.config.response_timeout;
        let mut response = Vec::new();
        let mut buf = [0u8; 128];
        while at::count_lines(&response) < wanted {
            match timeout_at(deadline, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) => return Err(self.io_error(std::io::ErrorKind::UnexpectedEof.into())),
                Ok(Ok(n)) => response.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(self.io_error(e)),
                Err(_) => {
                    debug!(
                        "{} on {}: {} of {} line(s) before deadline",
                        cmd,
                        self.port,
                        at::count_lines(&response),
                        wanted
                    );
                    break;
                }
            }
        }

        at::canonical_response(&response).map_err(|e| {
            warn!("{} on {} failed ({} byte(s)): {}", cmd, self.port, response.len(), e);
            if response.len() < 2 {
                self.timeout_error(cmd.to_string())
            } else {
                DetectError::Parse(e)
            }
        })
    }

    /// Read the banner, optional identity and all registers, then leave command mode
    ///
    /// Must be called in command mode.
    pub async fn read_all_parameters(&mut self) -> Result<SikReadout, DetectError> {
        let description = self.send_command(AtCommand::Identify(0)).await?;
        let description: String = description.chars().take(62).collect();
        let firmware_old = !description.contains("SiK 2.2");
        if firmware_old {
            info!("Modem on {} runs old firmware: {}", self.port, description);
        }

        let identity = if self.config.read_identity {
            Some(self.read_identity().await)
        } else {
            None
        };

        let mut params = SikParameterTable::new();
        for index in 0..MAX_RADIO_HW_PARAMS {
            match self.send_command(AtCommand::QueryParam(index)).await {
                Ok(text) => match at::parse_value(&text) {
                    Some(value) => {
                        params.set(index, value);
                    }
                    None => warn!("ATS{}? on {} returned '{}'", index, self.port, text),
                },
                Err(e) => warn!("ATS{}? on {} failed: {}", index, self.port, e),
            }
        }

        if let Err(e) = self.exit_command_mode().await {
            warn!("Failed to leave command mode on {}: {}", self.port, e);
        }

        Ok(SikReadout {
            description,
            identity,
            params,
            firmware_old,
        })
    }

    async fn read_identity(&mut self) -> String {
        let mut parts = Vec::with_capacity(5);
        for n in 1..=4u8 {
            match self.send_command(AtCommand::Identify(n)).await {
                Ok(text) => parts.push(text),
                Err(_) => parts.push("X".to_string()),
            }
        }
        let band = match self.send_command(AtCommand::QueryParam(param::MIN_FREQ)).await {
            Ok(text) => match at::parse_value(&text) {
                Some(f) if f < 500_000 => "433",
                Some(f) if f < 890_000 => "868",
                Some(_) => "915",
                None => "NNN",
            },
            Err(_) => "NNN",
        };
        parts.push(band.to_string());
        let mut identity = parts.join("-");
        identity.retain(|c| !c.is_whitespace());
        identity
    }

    /// Write one register; any non-empty answer counts as success
    pub async fn write_parameter(&mut self, index: usize, value: u32) -> Result<(), DetectError> {
        if index >= MAX_RADIO_HW_PARAMS {
            return Err(DetectError::InvalidParameter(format!("register {}", index)));
        }
        let answer = self.send_command(AtCommand::SetParam(index, value)).await?;
        debug!("ATS{}={} on {}: {}", index, value, self.port, answer);
        Ok(())
    }

    /// Persist registers and reboot the modem; failures are only logged
    pub async fn commit_to_flash(&mut self) {
        if let Err(e) = self.send_command(AtCommand::WriteFlash).await {
            warn!("AT&W on {} failed: {}", self.port, e);
        }
        if let Err(e) = self.send_command(AtCommand::Reboot).await {
            warn!("ATZ on {} failed: {}", self.port, e);
        }
    }

    pub async fn exit_command_mode(&mut self) -> Result<(), DetectError> {
        self.send_command(AtCommand::ExitCommandMode).await.map(|_| ())
    }
}

/// Baud rates to try for a port, most likely first
///
/// The last known rate leads, then every platform rate of at least 57600
/// in descending order, without repeats.
pub fn candidate_bauds(last_known: Option<u32>, platform_speeds: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    if let Some(baud) = last_known {
        out.push(baud);
    }
    let mut fast: Vec<u32> = platform_speeds.iter().copied().filter(|b| *b >= 57_600).collect();
    fast.sort_unstable_by(|a, b| b.cmp(a));
    for baud in fast {
        if !out.contains(&baud) {
            out.push(baud);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sik_config_default() {
        let config = SikConfig::default();
        assert_eq!(config.flush_window, Duration::from_millis(100));
        assert_eq!(config.command_mode_timeout, Duration::from_millis(3000));
        assert_eq!(config.response_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_candidate_bauds() {
        assert_eq!(candidate_bauds(None, &SERIAL_SPEEDS), vec![115_200, 57_600]);
        assert_eq!(candidate_bauds(Some(57_600), &SERIAL_SPEEDS), vec![57_600, 115_200]);
        assert_eq!(
            candidate_bauds(Some(19_200), &SERIAL_SPEEDS),
            vec![19_200, 115_200, 57_600]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_mode_times_out_on_silent_peer() {
        let (client, _peer) = tokio::io::duplex(256);
        let mut modem = SikModem::new(client, "/dev/null", SikConfig::default());
        let start = Instant::now();
        let result = modem.enter_command_mode().await;
        assert!(matches!(result, Err(DetectError::Timeout { .. })));
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_mode_ignores_stale_ok() {
        let (client, mut peer) = tokio::io::duplex(256);
        peer.write_all(b"OK\r\n").await.unwrap();
        let mut modem = SikModem::new(client, "/dev/null", SikConfig::default());
        assert!(modem.enter_command_mode().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reboot_needs_no_response() {
        let (client, _peer) = tokio::io::duplex(256);
        let mut modem = SikModem::new(client, "/dev/null", SikConfig::default());
        assert_eq!(modem.send_command(AtCommand::Reboot).await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_parameter_rejects_out_of_range() {
        let (client, _peer) = tokio::io::duplex(256);
        let mut modem = SikModem::new(client, "/dev/null", SikConfig::default());
        assert!(matches!(
            modem.write_parameter(MAX_RADIO_HW_PARAMS, 1).await,
            Err(DetectError::InvalidParameter(_))
        ));
    }
}
