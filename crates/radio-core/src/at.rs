//! AT command wire protocol spoken by SiK modems
//!
//! Requests are ASCII lines terminated by a single `\r`, except the bare
//! `+++` escape sequence that switches the modem into command mode.
//! Responses are `\r`/`\n` terminated lines; modems echo the command line
//! before the answer, so a query yields two lines and mode-exit commands
//! yield one.
//!
//! # Example
//!
//! ```rust
//! use radio_core::at::{canonical_response, AtCommand};
//!
//! let cmd = AtCommand::QueryParam(8);
//! assert_eq!(cmd.encode(), b"ATS8?\r".to_vec());
//!
//! let answer = canonical_response(b"ATS8?\r\n433050\r\n").unwrap();
//! assert_eq!(answer, "433050");
//! ```

use std::fmt;

use crate::error::ParseError;

/// Escape sequence that enters command mode
pub const ESCAPE_SEQUENCE: &[u8] = b"+++";

/// A single AT request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    /// `+++`
    EnterCommandMode,
    /// `ATI` for 0, `ATIn` otherwise
    Identify(u8),
    /// `ATSn?`
    QueryParam(usize),
    /// `ATSn=value`
    SetParam(usize, u32),
    /// `AT&W`
    WriteFlash,
    /// `ATZ`
    Reboot,
    /// `ATO`
    ExitCommandMode,
}

impl AtCommand {
    /// Bytes to put on the wire
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.to_string().into_bytes();
        if *self != AtCommand::EnterCommandMode {
            out.push(b'\r');
        }
        out
    }

    /// Number of response lines to wait for
    pub fn expected_lines(&self) -> usize {
        match self {
            AtCommand::ExitCommandMode | AtCommand::Reboot => 1,
            _ => 2,
        }
    }

    /// `ATZ` reboots the modem and never answers
    pub fn expects_response(&self) -> bool {
        *self != AtCommand::Reboot
    }

    /// Parse a received request line (without terminator)
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line == "+++" {
            return Some(AtCommand::EnterCommandMode);
        }
        let upper = line.to_ascii_uppercase();
        let body = upper.strip_prefix("AT")?;
        match body {
            "&W" => return Some(AtCommand::WriteFlash),
            "Z" => return Some(AtCommand::Reboot),
            "O" => return Some(AtCommand::ExitCommandMode),
            "I" => return Some(AtCommand::Identify(0)),
            _ => {}
        }
        if let Some(n) = body.strip_prefix('I') {
            return n.parse().ok().map(AtCommand::Identify);
        }
        let reg = body.strip_prefix('S')?;
        if let Some(index) = reg.strip_suffix('?') {
            return index.parse().ok().map(AtCommand::QueryParam);
        }
        let (index, value) = reg.split_once('=')?;
        Some(AtCommand::SetParam(index.parse().ok()?, value.parse().ok()?))
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtCommand::EnterCommandMode => f.write_str("+++"),
            AtCommand::Identify(0) => f.write_str("ATI"),
            AtCommand::Identify(n) => write!(f, "ATI{}", n),
            AtCommand::QueryParam(index) => write!(f, "ATS{}?", index),
            AtCommand::SetParam(index, value) => write!(f, "ATS{}={}", index, value),
            AtCommand::WriteFlash => f.write_str("AT&W"),
            AtCommand::Reboot => f.write_str("ATZ"),
            AtCommand::ExitCommandMode => f.write_str("ATO"),
        }
    }
}

/// True once `O`,`K` followed by a line terminator appears anywhere in `buf`
pub fn contains_ok(buf: &[u8]) -> bool {
    buf.windows(3)
        .any(|w| w[0] == b'O' && w[1] == b'K' && (w[2] == b'\r' || w[2] == b'\n'))
}

/// Number of terminated lines received so far
///
/// A line ends at `\r`, or at a `\n` that does not follow a `\r`.
pub fn count_lines(buf: &[u8]) -> usize {
    buf.iter()
        .enumerate()
        .filter(|&(i, &b)| b == b'\r' || (b == b'\n' && (i == 0 || buf[i - 1] != b'\r')))
        .count()
}

/// Reduce a raw response to its canonical last line
///
/// Leading and trailing terminators are stripped and only the last line
/// is kept, so the echoed command is dropped.
pub fn canonical_response(buf: &[u8]) -> Result<String, ParseError> {
    if buf.len() < 2 {
        return Err(ParseError::InvalidResponse(format!(
            "response too short ({} bytes)",
            buf.len()
        )));
    }
    let text = String::from_utf8_lossy(buf);
    text.split(|c: char| c == '\r' || c == '\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| ParseError::InvalidResponse("empty response".to_string()))
}

/// Parse the leading decimal digits of a register value
pub fn parse_value(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits: &str = match text.find(|c: char| !c.is_ascii_digit()) {
        Some(end) => &text[..end],
        None => text,
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
