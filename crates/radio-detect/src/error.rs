//! Error types for radio hardware detection and configuration

use radio_core::ParseError;
use thiserror::Error;

/// Errors that can occur during detection, persistence and modem configuration
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate devices
    #[error("failed to enumerate devices: {0}")]
    EnumerationFailed(String),

    /// Failed to open serial port
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// Timeout waiting for a modem response
    #[error("timeout on {port} waiting for {operation}")]
    Timeout { port: String, operation: String },

    /// I/O error while talking to a device
    #[error("I/O error on {port}: {reason}")]
    IoError { port: String, reason: String },

    /// Port busy or in use
    #[error("port {0} is busy or in use")]
    PortBusy(String),

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted file failed validation
    #[error("corrupt file {file}: {reason}")]
    Corrupt { file: String, reason: String },

    /// Malformed modem response or record
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Frequency outside the bands of the addressed interface
    #[error("interface {index} does not support {freq_khz} kHz")]
    UnsupportedFrequency { index: usize, freq_khz: u32 },

    /// Addressed interface is not a SiK modem
    #[error("interface {0} is not a SiK radio")]
    NotSikRadio(usize),

    /// Registry has no room left
    #[error("registry full ({capacity} entries)")]
    RegistryFull { capacity: usize },

    /// Lookup failed
    #[error("not found: {0}")]
    NotFound(String),

    /// Value outside the accepted range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
