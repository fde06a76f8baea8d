//! Radio Link Simulation Library
//!
//! This crate provides simulated hardware for testing radio configuration
//! without physical modems:
//!
//! - **VirtualSikModem**: answers the SiK AT command set and keeps a register table
//! - **run_virtual_sik_task**: serves a virtual modem over an async byte stream
//!
//! # Example
//!
//! ```rust
//! use radio_sim::VirtualSikModem;
//!
//! let mut modem = VirtualSikModem::new();
//! assert_eq!(modem.process_bytes(b"+++"), b"OK\r\n");
//! assert_eq!(modem.process_bytes(b"ATS3?\r"), b"ATS3?\r\n25\r\n");
//! ```

pub mod modem;
pub mod modem_task;

pub use modem::{VirtualSikConfig, VirtualSikModem};
pub use modem_task::run_virtual_sik_task;
