//! Radio Link Controller Library
//!
//! Controller-side policy on top of the detected hardware:
//!
//! - **Preferences**: per-card user settings and the TX-preferred order
//! - **Assignment**: which interfaces receive and transmit for each vehicle link
//! - **Connect frequencies**: the last frequency used to reach each vehicle
//!
//! # Example
//!
//! ```rust,no_run
//! use radio_detect::{RadioContext, RadioPaths};
//! use radio_links::{assign_single, AssignmentOptions, ControllerPreferences, LinkRequest};
//!
//! let paths = RadioPaths::default();
//! let mut radios = RadioContext::new(paths.clone());
//! radios.load()?;
//!
//! let mut prefs = ControllerPreferences::from_paths(&paths);
//! prefs.load()?;
//!
//! let plan = assign_single(
//!     radios.records(),
//!     &prefs,
//!     LinkRequest::new(5_805_000),
//!     AssignmentOptions { auto_tx: false },
//! )?;
//! println!("RX on {:?}", plan.rx_indices(5_805_000));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assign;
pub mod connect_freqs;
pub mod error;
pub mod prefs;

pub use assign::{
    apply_plan, assign_dual, assign_first_pairing, assign_search, assign_single, default_frequency,
    AssignmentOptions, InterfaceAssignment, LinkAssignmentPlan, LinkRequest,
};
pub use connect_freqs::ConnectFrequencies;
pub use error::LinkError;
pub use prefs::{CardSettings, ControllerPreferences};
