//! Error types for radio record decoding and AT response parsing

use thiserror::Error;

/// Errors that can occur while decoding persisted records or modem responses
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is too short to hold a full record
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// A persisted enum field holds a value outside its known set
    #[error("unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: i64 },

    /// Modem response could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}
