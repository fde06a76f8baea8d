//! Error types for link assignment and controller preferences

use thiserror::Error;

/// Errors reported by the controller link layer
#[derive(Debug, Error)]
pub enum LinkError {
    /// No interface can receive on a link frequency
    #[error("no RX capable interface for {freq_khz} kHz")]
    NoRxInterface { freq_khz: u32 },

    /// No interface can transmit on a link frequency
    #[error("no TX capable interface for {freq_khz} kHz")]
    NoTxInterface { freq_khz: u32 },

    /// Nothing usable is attached at all
    #[error("no usable radio interface")]
    NoUsableInterface,

    /// Persisted file failed validation
    #[error("corrupt file {file}: {reason}")]
    Corrupt { file: String, reason: String },

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
